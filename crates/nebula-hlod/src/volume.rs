//! Override volume handling: turns authored volumes into forced seed clusters.

use rustc_hash::FxHashSet;
use tracing::debug;

use crate::cluster::{Candidate, Cluster};
use crate::scene::{NodeHandle, OverrideVolume};

/// Forced clusters seeded by volumes, plus the candidates they claimed.
#[derive(Debug, Default)]
pub struct VolumeSeeds {
    pub clusters: Vec<Cluster>,
    pub claimed: FxHashSet<NodeHandle>,
}

impl VolumeSeeds {
    pub fn is_claimed(&self, handle: &NodeHandle) -> bool {
        self.claimed.contains(handle)
    }
}

/// Build one forced cluster per volume that applies to `level` and contains
/// at least one candidate.
///
/// Volumes are visited in order; a candidate contained in several volumes
/// goes to the first one.
pub fn seed_volume_clusters(
    level: usize,
    candidates: &[Candidate],
    volumes: &[OverrideVolume],
) -> VolumeSeeds {
    let mut seeds = VolumeSeeds::default();

    for volume in volumes.iter().filter(|v| v.applies_to(level)) {
        let contained: Vec<&Candidate> = candidates
            .iter()
            .filter(|c| !seeds.claimed.contains(&c.handle) && volume.contains(&c.bound))
            .collect();

        let Some(cluster) = Cluster::forced(contained.iter().copied()) else {
            continue;
        };

        debug!(
            level,
            volume = volume.id.0,
            members = cluster.member_count(),
            "seeded volume cluster"
        );
        seeds.claimed.extend(contained.iter().map(|c| c.handle));
        seeds.clusters.push(cluster);
    }

    seeds
}
