//! Per-level candidate set and the greedy agglomerative merge loop.
//!
//! The graph owns an index-based arena of clusters for exactly one level
//! pass. Merged-away clusters are tombstoned in place so indices stay stable
//! while the loop runs; the merge result is appended at the end.

use nebula_config::LevelSettings;
use tracing::trace;

use crate::cluster::{Candidate, Cluster};
use crate::scene::{NodeHandle, OverrideVolume};
use crate::volume::{VolumeSeeds, seed_volume_clusters};

/// Lifecycle of one level pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GraphState {
    Seeded,
    Merging,
    Finalized,
}

/// How unclaimed candidates (not inside any volume) are seeded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeedMode {
    /// One singleton per candidate; the merge loop groups them.
    Automatic,
    /// Unclaimed candidates are left out of the level entirely.
    VolumesOnly,
    /// All unclaimed candidates form one forced cluster.
    SingleCluster,
    /// Lower-level placeholders each become their own forced cluster;
    /// carried objects are clustered automatically.
    ReusePrevious,
}

impl SeedMode {
    pub fn for_level(level: usize, settings: &LevelSettings, single_cluster: bool) -> Self {
        if single_cluster {
            SeedMode::SingleCluster
        } else if settings.only_generate_clusters_for_volumes {
            SeedMode::VolumesOnly
        } else if level > 0 && settings.reuse_previous_level_clusters {
            SeedMode::ReusePrevious
        } else {
            SeedMode::Automatic
        }
    }
}

/// Thresholds the merge loop enforces.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MergeRules {
    /// Cheapest pair above this cost ends the pass.
    pub highest_cost: f64,
    /// Pairs whose union would exceed this radius are never merged.
    pub desired_bound_radius: Option<f64>,
    /// Pairs whose union would fill less than this are never merged.
    pub desired_filling_percentage: f64,
    /// Forced clusters take part in the scan and may absorb automatic ones.
    pub volumes_absorb_neighbors: bool,
}

impl MergeRules {
    pub fn from_settings(settings: &LevelSettings, volumes_absorb_neighbors: bool) -> Self {
        Self {
            highest_cost: settings.highest_cost,
            desired_bound_radius: settings.desired_bound_radius,
            desired_filling_percentage: settings.desired_filling_percentage,
            volumes_absorb_neighbors,
        }
    }
}

impl Default for MergeRules {
    fn default() -> Self {
        Self {
            highest_cost: f64::INFINITY,
            desired_bound_radius: None,
            desired_filling_percentage: 0.0,
            volumes_absorb_neighbors: false,
        }
    }
}

/// Cheapest mergeable pair found by a scan. `first < second`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MergePair {
    pub first: usize,
    pub second: usize,
    pub cost: f64,
}

/// Result of one [`ClusterGraph::step`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum StepOutcome {
    /// `pair` was merged into the cluster at `index`.
    Merged { pair: MergePair, index: usize },
    /// No further merge is possible or affordable; the graph is finalized.
    Finished,
}

/// Working set of clusters for one level.
#[derive(Debug)]
pub struct ClusterGraph {
    level: usize,
    clusters: Vec<Cluster>,
    rules: MergeRules,
    state: GraphState,
    merges: usize,
}

impl ClusterGraph {
    /// Wrap pre-built clusters (already seeded).
    pub fn from_clusters(level: usize, clusters: Vec<Cluster>, rules: MergeRules) -> Self {
        Self {
            level,
            clusters,
            rules,
            state: GraphState::Seeded,
            merges: 0,
        }
    }

    /// Seed the graph: volume clusters first, then the unclaimed candidates
    /// according to `mode`.
    pub fn initialize(
        level: usize,
        candidates: &[Candidate],
        volumes: &[OverrideVolume],
        rules: MergeRules,
        mode: SeedMode,
    ) -> Self {
        let VolumeSeeds {
            mut clusters,
            claimed,
        } = seed_volume_clusters(level, candidates, volumes);
        let unclaimed = candidates.iter().filter(|c| !claimed.contains(&c.handle));

        match mode {
            SeedMode::Automatic => clusters.extend(unclaimed.map(Cluster::singleton)),
            SeedMode::VolumesOnly => {}
            SeedMode::SingleCluster => clusters.extend(Cluster::forced(unclaimed)),
            SeedMode::ReusePrevious => {
                for candidate in unclaimed {
                    let cluster = match candidate.handle {
                        NodeHandle::Placeholder(_) => Cluster::forced([candidate]),
                        NodeHandle::Object(_) => Some(Cluster::singleton(candidate)),
                    };
                    clusters.extend(cluster);
                }
            }
        }

        Self::from_clusters(level, clusters, rules)
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn state(&self) -> GraphState {
        self.state
    }

    /// Arena slots, tombstones included.
    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    pub fn valid_count(&self) -> usize {
        self.clusters.iter().filter(|c| c.is_valid()).count()
    }

    fn scannable(&self, cluster: &Cluster) -> bool {
        cluster.is_valid() && (!cluster.is_forced() || self.rules.volumes_absorb_neighbors)
    }

    /// Merge cost of `a` and `b` if the pair satisfies the radius and filling rules.
    fn eligible_cost(&self, a: &Cluster, b: &Cluster) -> Option<f64> {
        if a.is_forced() && b.is_forced() {
            return None;
        }
        let preview = Cluster::preview_merge(a, b);
        if let Some(max_radius) = self.rules.desired_bound_radius
            && preview.bound.radius() > max_radius
        {
            return None;
        }
        if preview.filling_factor < self.rules.desired_filling_percentage
            || preview.cost.is_nan()
        {
            return None;
        }
        Some(preview.cost)
    }

    /// Cheapest mergeable pair, ties broken by the lowest `(first, second)`.
    pub fn find_best_merge_pair(&self) -> Option<MergePair> {
        let mut best: Option<MergePair> = None;

        for (i, a) in self.clusters.iter().enumerate() {
            if !self.scannable(a) {
                continue;
            }
            for (j, b) in self.clusters.iter().enumerate().skip(i + 1) {
                if !self.scannable(b) {
                    continue;
                }
                let Some(cost) = self.eligible_cost(a, b) else {
                    continue;
                };
                if best.is_none_or(|current| cost < current.cost) {
                    best = Some(MergePair {
                        first: i,
                        second: j,
                        cost,
                    });
                }
            }
        }

        best
    }

    /// Perform the cheapest affordable merge, or finalize the graph.
    pub fn step(&mut self) -> StepOutcome {
        if self.state == GraphState::Finalized {
            return StepOutcome::Finished;
        }
        self.state = GraphState::Merging;

        let pair = match self.find_best_merge_pair() {
            Some(pair) if pair.cost <= self.rules.highest_cost => pair,
            _ => {
                self.state = GraphState::Finalized;
                return StepOutcome::Finished;
            }
        };

        let merged = Cluster::merge(&self.clusters[pair.first], &self.clusters[pair.second]);
        self.clusters[pair.first].invalidate();
        self.clusters[pair.second].invalidate();
        self.clusters.push(merged);
        self.merges += 1;

        trace!(
            level = self.level,
            first = pair.first,
            second = pair.second,
            cost = pair.cost,
            "merged clusters"
        );

        StepOutcome::Merged {
            pair,
            index: self.clusters.len() - 1,
        }
    }

    /// Step until finalized. Returns the number of merges performed.
    pub fn run(&mut self) -> usize {
        let before = self.merges;
        while let StepOutcome::Merged { .. } = self.step() {}
        self.merges - before
    }

    /// Consume the graph, yielding the surviving clusters in arena order.
    pub fn into_clusters(self) -> Vec<Cluster> {
        self.clusters.into_iter().filter(Cluster::is_valid).collect()
    }
}
