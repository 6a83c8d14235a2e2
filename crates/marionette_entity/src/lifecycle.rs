//! # Entity Lifecycle
//!
//! ```text
//! None -> Created -> Skeleton -> DefaultAvatar -> UserAvatar
//!                             \-> FastLoad -----/
//! ```
//!
//! States only move forward until teardown, and none is skipped: a jump to
//! `UserAvatar` from `Skeleton` passes through `DefaultAvatar`. Each state
//! entered produces exactly one event. `PreTeardown` precedes the return to
//! `None`.
//!
//! Listener panics are caught and logged so one listener cannot stall the
//! pipeline or starve the others.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crossbeam_channel::{Receiver, Sender};
use marionette_core::EntityHandle;
use marionette_provider::ContentTier;

use crate::error::LoadError;

/// Load progress of an entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum LifecycleState {
    /// Not initialized, or torn down.
    #[default]
    None,
    /// Initialized, nothing loaded.
    Created,
    /// A skeleton is committed.
    Skeleton,
    /// Default avatar content is committed.
    DefaultAvatar,
    /// Fast-load content is committed.
    FastLoad,
    /// The user's own avatar is committed.
    UserAvatar,
}

impl LifecycleState {
    /// Position in the forward order. `DefaultAvatar` and `FastLoad` share
    /// a rank.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Created => 1,
            Self::Skeleton => 2,
            Self::DefaultAvatar | Self::FastLoad => 3,
            Self::UserAvatar => 4,
        }
    }

    /// State reached by committing content of `tier`.
    #[must_use]
    pub const fn for_tier(tier: ContentTier) -> Self {
        match tier {
            ContentTier::Default => Self::DefaultAvatar,
            ContentTier::FastLoad => Self::FastLoad,
            ContentTier::User => Self::UserAvatar,
        }
    }

    const fn at_rank(rank: u8) -> Self {
        match rank {
            0 => Self::None,
            1 => Self::Created,
            2 => Self::Skeleton,
            3 => Self::DefaultAvatar,
            _ => Self::UserAvatar,
        }
    }

    /// States entered, in order, when moving from `self` to `target`.
    ///
    /// Empty unless `target` ranks strictly higher.
    #[must_use]
    pub fn path_to(self, target: Self) -> Vec<Self> {
        (self.rank() + 1..=target.rank())
            .map(|rank| {
                if rank == target.rank() {
                    target
                } else {
                    Self::at_rank(rank)
                }
            })
            .collect()
    }

    /// Checks whether pipelines may run.
    #[must_use]
    pub const fn is_live(self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Notification delivered to entity listeners.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntityEvent {
    /// Entered `Created`.
    Created,
    /// Entered `Skeleton`.
    SkeletonLoaded,
    /// Entered `DefaultAvatar`.
    DefaultAvatarLoaded,
    /// Entered `FastLoad`.
    FastLoadAvatarLoaded,
    /// Entered `UserAvatar`.
    UserAvatarLoaded,
    /// Teardown is about to release everything.
    PreTeardown,
    /// A rebuild failed.
    LoadFailed(LoadError),
}

impl EntityEvent {
    /// The event announcing `state`.
    #[must_use]
    pub const fn entered(state: LifecycleState) -> Option<Self> {
        match state {
            LifecycleState::None => None,
            LifecycleState::Created => Some(Self::Created),
            LifecycleState::Skeleton => Some(Self::SkeletonLoaded),
            LifecycleState::DefaultAvatar => Some(Self::DefaultAvatarLoaded),
            LifecycleState::FastLoad => Some(Self::FastLoadAvatarLoaded),
            LifecycleState::UserAvatar => Some(Self::UserAvatarLoaded),
        }
    }
}

/// Receives entity notifications.
pub trait EntityListener: Send {
    /// Called once per event, on the simulation thread.
    fn on_event(&mut self, entity: EntityHandle, event: &EntityEvent);
}

impl<F> EntityListener for F
where
    F: FnMut(EntityHandle, &EntityEvent) + Send,
{
    fn on_event(&mut self, entity: EntityHandle, event: &EntityEvent) {
        self(entity, event);
    }
}

/// Forwards events into a channel for another layer to drain.
#[derive(Debug, Clone)]
pub struct ChannelListener {
    sender: Sender<(EntityHandle, EntityEvent)>,
}

impl ChannelListener {
    /// Creates a listener and the receiving end of its unbounded channel.
    #[must_use]
    pub fn unbounded() -> (Self, Receiver<(EntityHandle, EntityEvent)>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (Self { sender }, receiver)
    }

    /// Wraps an existing sender.
    #[must_use]
    pub const fn from_sender(sender: Sender<(EntityHandle, EntityEvent)>) -> Self {
        Self { sender }
    }
}

impl EntityListener for ChannelListener {
    fn on_event(&mut self, entity: EntityHandle, event: &EntityEvent) {
        if self.sender.try_send((entity, event.clone())).is_err() {
            tracing::debug!("Event receiver for {} gone or full; dropping {:?}", entity, event);
        }
    }
}

/// Registered listeners of one entity.
#[derive(Default)]
pub struct ListenerSet {
    listeners: Vec<Box<dyn EntityListener>>,
}

impl ListenerSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a listener.
    pub fn push(&mut self, listener: Box<dyn EntityListener>) {
        self.listeners.push(listener);
    }

    /// Number of listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Checks if no listeners are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Delivers `event` to every listener. Returns how many panicked.
    pub fn notify(&mut self, entity: EntityHandle, event: &EntityEvent) -> usize {
        let mut panicked = 0;
        for listener in &mut self.listeners {
            let delivered = catch_unwind(AssertUnwindSafe(|| listener.on_event(entity, event)));
            if delivered.is_err() {
                tracing::error!("Listener panicked handling {:?} for {}", event, entity);
                panicked += 1;
            }
        }
        panicked
    }
}

impl fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerSet")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Forward-only state holder.
#[derive(Debug, Default)]
pub struct Lifecycle {
    state: LifecycleState,
}

impl Lifecycle {
    /// Starts in `None`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: LifecycleState::None,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> LifecycleState {
        self.state
    }

    /// Moves forward to `target`, entering each intermediate state and
    /// notifying once per state entered. Returns the number of states
    /// entered; zero if `target` is not ahead.
    pub fn advance(
        &mut self,
        target: LifecycleState,
        entity: EntityHandle,
        listeners: &mut ListenerSet,
    ) -> usize {
        let path = self.state.path_to(target);
        for &state in &path {
            tracing::info!("{} lifecycle: {} -> {}", entity, self.state, state);
            self.state = state;
            if let Some(event) = EntityEvent::entered(state) {
                listeners.notify(entity, &event);
            }
        }
        path.len()
    }

    /// Returns to `None`. The caller fires `PreTeardown` first.
    pub fn reset(&mut self, entity: EntityHandle) {
        tracing::info!("{} lifecycle: {} -> None", entity, self.state);
        self.state = LifecycleState::None;
    }
}
