//! # LOD Cost Accounting
//!
//! Each LOD bucket tracks the set of visible instances in it and their
//! summed render cost. Costs are added and subtracted incrementally and are
//! never recomputed; integer sums keep add/remove round trips exact.

use std::collections::HashMap;

use marionette_core::InstanceId;
use marionette_provider::{LodFlags, PrimitiveCost};

/// Number of LOD buckets per entity.
pub const LOD_BUCKETS: usize = LodFlags::MAX_BUCKETS as usize;

/// Aggregated render cost.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct LodCost {
    /// Total vertices.
    pub vertices: u64,
    /// Total triangles.
    pub triangles: u64,
    /// Total skinned vertices.
    pub skinned_vertices: u64,
}

impl LodCost {
    /// Zero cost.
    pub const ZERO: Self = Self {
        vertices: 0,
        triangles: 0,
        skinned_vertices: 0,
    };

    fn add(&mut self, cost: PrimitiveCost) {
        self.vertices += u64::from(cost.vertices);
        self.triangles += u64::from(cost.triangles);
        self.skinned_vertices += u64::from(cost.skinned_vertices);
    }

    fn subtract(&mut self, cost: PrimitiveCost) {
        debug_assert!(self.vertices >= u64::from(cost.vertices), "LOD cost underflow");
        self.vertices = self.vertices.saturating_sub(u64::from(cost.vertices));
        self.triangles = self.triangles.saturating_sub(u64::from(cost.triangles));
        self.skinned_vertices = self
            .skinned_vertices
            .saturating_sub(u64::from(cost.skinned_vertices));
    }

    /// Checks if nothing is accounted.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.vertices == 0 && self.triangles == 0 && self.skinned_vertices == 0
    }
}

impl std::ops::Add for LodCost {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            vertices: self.vertices + rhs.vertices,
            triangles: self.triangles + rhs.triangles,
            skinned_vertices: self.skinned_vertices + rhs.skinned_vertices,
        }
    }
}

/// Visible instances of one LOD bucket.
#[derive(Clone, Debug, Default)]
pub struct LodBucket {
    instances: HashMap<InstanceId, PrimitiveCost>,
    cost: LodCost,
}

impl LodBucket {
    /// Adds an instance. Returns `false` if it was already present.
    pub fn add_instance(&mut self, instance: InstanceId, cost: PrimitiveCost) -> bool {
        if self.instances.contains_key(&instance) {
            return false;
        }
        self.instances.insert(instance, cost);
        self.cost.add(cost);
        true
    }

    /// Removes an instance, subtracting the cost it was added with.
    ///
    /// Returns `false` if it was not present.
    pub fn remove_instance(&mut self, instance: InstanceId) -> bool {
        match self.instances.remove(&instance) {
            Some(cost) => {
                self.cost.subtract(cost);
                true
            }
            None => false,
        }
    }

    /// Checks whether `instance` is accounted here.
    #[must_use]
    pub fn contains(&self, instance: InstanceId) -> bool {
        self.instances.contains_key(&instance)
    }

    /// Accumulated cost.
    #[must_use]
    pub const fn cost(&self) -> LodCost {
        self.cost
    }

    /// Number of visible instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Checks if the bucket holds no instances.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

/// All LOD buckets of one entity.
#[derive(Clone, Debug, Default)]
pub struct LodTable {
    buckets: [LodBucket; LOD_BUCKETS],
    range: Option<(u8, u8)>,
}

impl LodTable {
    /// Creates empty buckets.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accounts a visible instance in `bucket`.
    pub fn add_instance(&mut self, bucket: u8, instance: InstanceId, cost: PrimitiveCost) -> bool {
        self.buckets
            .get_mut(usize::from(bucket))
            .is_some_and(|b| b.add_instance(instance, cost))
    }

    /// Removes a visible instance from `bucket`.
    pub fn remove_instance(&mut self, bucket: u8, instance: InstanceId) -> bool {
        self.buckets
            .get_mut(usize::from(bucket))
            .is_some_and(|b| b.remove_instance(instance))
    }

    /// Bucket `index`, if in range.
    #[must_use]
    pub fn bucket(&self, index: u8) -> Option<&LodBucket> {
        self.buckets.get(usize::from(index))
    }

    /// Sum over every bucket.
    #[must_use]
    pub fn total_cost(&self) -> LodCost {
        self.buckets
            .iter()
            .fold(LodCost::ZERO, |acc, bucket| acc + bucket.cost())
    }

    /// Recomputes the lowest and highest occupied buckets.
    pub fn refresh_range(&mut self) -> Option<(u8, u8)> {
        let mut occupied = self
            .buckets
            .iter()
            .enumerate()
            .filter(|(_, bucket)| !bucket.is_empty())
            .filter_map(|(index, _)| u8::try_from(index).ok());
        self.range = occupied.next().map(|low| {
            let high = occupied.last().unwrap_or(low);
            (low, high)
        });
        self.range
    }

    /// `[lowest, highest]` occupied buckets as of the last refresh.
    #[must_use]
    pub const fn range(&self) -> Option<(u8, u8)> {
        self.range
    }

    /// Drops every instance.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
