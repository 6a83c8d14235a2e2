//! # Avatar Manager
//!
//! Drives every live entity once per tick in insertion order. All entities
//! share one frame budget, each capped at `max_steps_per_entity`; earlier
//! entities get first claim, so late entities may be starved on a busy
//! frame and catch up on the next.

use marionette_core::EntityHandle;
use marionette_entity::{AvatarEntity, EntityConfig, FrameBudget, SchedulerStats, TickStatus};
use marionette_provider::AvatarProvider;

use crate::config::MarionetteConfig;

/// Counters for one manager tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ManagerStats {
    /// Tick number, starting at 1.
    pub tick: u64,
    /// Entities driven.
    pub entities: usize,
    /// Entities already in sync.
    pub synced: usize,
    /// Entities whose rebuild yielded.
    pub running: usize,
    /// Entities blocked on the provider.
    pub waiting: usize,
    /// Rebuilds committed.
    pub committed: usize,
    /// Rebuilds failed.
    pub failed: usize,
    /// Rebuilds abandoned for a newer version.
    pub superseded: usize,
    /// Entities that reached their turn with no budget left.
    pub starved: usize,
    /// Scheduler steps taken across all entities.
    pub steps: u32,
}

impl ManagerStats {
    fn record(&mut self, status: &TickStatus) {
        match status {
            TickStatus::Inactive | TickStatus::Synced => self.synced += 1,
            TickStatus::ProviderNotReady | TickStatus::Waiting => self.waiting += 1,
            TickStatus::Running => self.running += 1,
            TickStatus::Committed(_) => self.committed += 1,
            TickStatus::Failed(_) => self.failed += 1,
            TickStatus::Superseded => self.superseded += 1,
        }
    }
}

/// Owns and ticks a set of avatar entities.
#[derive(Debug)]
pub struct AvatarManager {
    config: MarionetteConfig,
    entities: Vec<AvatarEntity>,
    ticks: u64,
}

impl AvatarManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new(config: MarionetteConfig) -> Self {
        Self {
            config,
            entities: Vec::new(),
            ticks: 0,
        }
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &MarionetteConfig {
        &self.config
    }

    /// Adds and initializes an entity with the default entity settings.
    ///
    /// Returns `None` if `handle` is already managed.
    pub fn add_entity(&mut self, handle: EntityHandle) -> Option<&mut AvatarEntity> {
        let config = self.config.entity.clone();
        self.add_entity_with(handle, config)
    }

    /// Adds and initializes an entity with its own settings.
    ///
    /// Returns `None` if `handle` is already managed.
    pub fn add_entity_with(
        &mut self,
        handle: EntityHandle,
        config: EntityConfig,
    ) -> Option<&mut AvatarEntity> {
        if self.contains(handle) {
            tracing::warn!("{} is already managed", handle);
            return None;
        }
        let mut entity = AvatarEntity::new(handle, config);
        entity.initialize();
        self.entities.push(entity);
        self.entities.last_mut()
    }

    /// Tears down and forgets an entity. Returns `false` if unknown.
    pub fn remove_entity(&mut self, handle: EntityHandle) -> bool {
        let Some(index) = self.position(handle) else {
            return false;
        };
        let mut entity = self.entities.remove(index);
        entity.teardown();
        true
    }

    /// Checks whether `handle` is managed.
    #[must_use]
    pub fn contains(&self, handle: EntityHandle) -> bool {
        self.position(handle).is_some()
    }

    fn position(&self, handle: EntityHandle) -> Option<usize> {
        self.entities.iter().position(|e| e.handle() == handle)
    }

    /// A managed entity.
    #[must_use]
    pub fn entity(&self, handle: EntityHandle) -> Option<&AvatarEntity> {
        self.entities.iter().find(|e| e.handle() == handle)
    }

    /// A managed entity, mutably (to add listeners).
    pub fn entity_mut(&mut self, handle: EntityHandle) -> Option<&mut AvatarEntity> {
        self.entities.iter_mut().find(|e| e.handle() == handle)
    }

    /// Managed entities in update order.
    pub fn entities(&self) -> impl Iterator<Item = &AvatarEntity> {
        self.entities.iter()
    }

    /// Number of managed entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Checks if no entities are managed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Ticks every entity under the configured wall-clock frame budget.
    pub fn tick(&mut self, provider: &dyn AvatarProvider) -> ManagerStats {
        let mut budget = FrameBudget::from_duration(self.config.frame_budget());
        self.tick_with_budget(provider, &mut budget)
    }

    /// Ticks every entity under `budget`.
    pub fn tick_with_budget(
        &mut self,
        provider: &dyn AvatarProvider,
        budget: &mut FrameBudget,
    ) -> ManagerStats {
        self.ticks += 1;
        let mut stats = ManagerStats {
            tick: self.ticks,
            entities: self.entities.len(),
            ..ManagerStats::default()
        };
        let per_entity = self.config.scheduler.max_steps_per_entity;

        for entity in &mut self.entities {
            if budget.is_exhausted() {
                stats.starved += 1;
            }
            let mut slice = budget.slice(per_entity);
            let status = entity.tick(provider, &mut slice);
            budget.charge(&slice);
            stats.steps = stats.steps.saturating_add(slice.steps_used());
            stats.record(&status);
        }

        tracing::trace!(
            "Tick {}: {} entities, {} steps, {} committed, {} starved",
            stats.tick,
            stats.entities,
            stats.steps,
            stats.committed,
            stats.starved
        );
        stats
    }

    /// Scheduler counters summed over all entities.
    #[must_use]
    pub fn scheduler_totals(&self) -> SchedulerStats {
        self.entities
            .iter()
            .map(AvatarEntity::stats)
            .fold(SchedulerStats::default(), |mut total, s| {
                total.steps += s.steps;
                total.holds += s.holds;
                total.waits += s.waits;
                total.delays += s.delays;
                total.started += s.started;
                total.completed += s.completed;
                total.cancelled += s.cancelled;
                total.preempted += s.preempted;
                total
            })
    }

    /// Tears down every entity, in reverse update order.
    pub fn clear(&mut self) {
        while let Some(mut entity) = self.entities.pop() {
            entity.teardown();
        }
    }
}

impl Drop for AvatarManager {
    fn drop(&mut self) {
        self.clear();
    }
}
