//! Candidate groupings of scene nodes for one level pass.
//!
//! A cluster's cost is `radius³ × weight`, with the radius taken from the
//! half diagonal of its bound and the weight summed over its members. Both
//! factors only grow when clusters merge, so cost never decreases.

use nebula_math::Aabb;

use crate::scene::NodeHandle;

/// One clusterable input of a level: a scene object or a lower-level placeholder.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate {
    pub handle: NodeHandle,
    pub bound: Aabb,
    pub weight: f64,
}

impl Candidate {
    pub fn new(handle: impl Into<NodeHandle>, bound: Aabb, weight: f64) -> Self {
        Self {
            handle: handle.into(),
            bound,
            weight: weight.max(0.0),
        }
    }
}

/// Bound, cost and filling factor a merge would produce, without building it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MergePreview {
    pub bound: Aabb,
    pub cost: f64,
    pub filling_factor: f64,
}

/// A group of member nodes with a cached union bound and cost.
#[derive(Clone, Debug, PartialEq)]
pub struct Cluster {
    members: Vec<NodeHandle>,
    bound: Aabb,
    weight: f64,
    cost: f64,
    filling_factor: f64,
    forced: bool,
}

impl Cluster {
    /// Single-member cluster.
    pub fn singleton(candidate: &Candidate) -> Self {
        Self {
            members: vec![candidate.handle],
            bound: candidate.bound,
            weight: candidate.weight,
            cost: cluster_cost(&candidate.bound, candidate.weight),
            filling_factor: 1.0,
            forced: false,
        }
    }

    /// Cluster seeded by an override volume (or single-cluster mode).
    /// Returns `None` when there are no members.
    pub fn forced<'a>(candidates: impl IntoIterator<Item = &'a Candidate>) -> Option<Self> {
        let mut cluster = candidates
            .into_iter()
            .map(Cluster::singleton)
            .reduce(|acc, next| Cluster::merge(&acc, &next))?;
        cluster.forced = true;
        Some(cluster)
    }

    /// Cost of the cluster `merge(a, b)` would produce. Symmetric.
    pub fn merge_cost(a: &Cluster, b: &Cluster) -> f64 {
        cluster_cost(&a.bound.union(&b.bound), a.weight + b.weight)
    }

    /// Bound, cost and filling factor of `merge(a, b)` without copying members.
    pub fn preview_merge(a: &Cluster, b: &Cluster) -> MergePreview {
        let bound = a.bound.union(&b.bound);
        MergePreview {
            bound,
            cost: cluster_cost(&bound, a.weight + b.weight),
            filling_factor: merged_filling_factor(a, b, &bound),
        }
    }

    /// Union of both clusters. Pure: `a` and `b` stay untouched.
    /// The result is forced if either input is.
    pub fn merge(a: &Cluster, b: &Cluster) -> Cluster {
        let preview = Cluster::preview_merge(a, b);
        let mut members = Vec::with_capacity(a.members.len() + b.members.len());
        members.extend_from_slice(&a.members);
        members.extend_from_slice(&b.members);
        Cluster {
            members,
            bound: preview.bound,
            weight: a.weight + b.weight,
            cost: preview.cost,
            filling_factor: preview.filling_factor,
            forced: a.forced || b.forced,
        }
    }

    /// False once the cluster has been consumed by a merge.
    pub fn is_valid(&self) -> bool {
        !self.members.is_empty()
    }

    /// Turn the cluster into a tombstone, keeping its arena slot.
    pub(crate) fn invalidate(&mut self) {
        self.members.clear();
    }

    pub fn members(&self) -> &[NodeHandle] {
        &self.members
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn bound(&self) -> &Aabb {
        &self.bound
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn cost(&self) -> f64 {
        self.cost
    }

    /// Share of the bound's volume covered by member bounds (approximate, 0..=1).
    pub fn filling_factor(&self) -> f64 {
        self.filling_factor
    }

    /// Seeded by a volume: always materialized regardless of thresholds.
    pub fn is_forced(&self) -> bool {
        self.forced
    }
}

fn cluster_cost(bound: &Aabb, weight: f64) -> f64 {
    bound.radius().powi(3) * weight
}

/// Covered volume of both inputs minus their overlap, over the union volume.
fn merged_filling_factor(a: &Cluster, b: &Cluster, union: &Aabb) -> f64 {
    let union_volume = union.volume();
    if union_volume <= 0.0 {
        return 1.0;
    }
    let overlap = a
        .bound
        .intersection(&b.bound)
        .map_or(0.0, |region| region.volume());
    let covered =
        a.filling_factor * a.bound.volume() + b.filling_factor * b.bound.volume() - overlap;
    (covered / union_volume).clamp(0.0, 1.0)
}
