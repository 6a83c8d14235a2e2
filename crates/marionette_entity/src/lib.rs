//! # Marionette Entity
//!
//! Keeps one avatar's locally built scene (skeleton, renderables, visible
//! set, LOD cost) in step with the provider's published state.
//!
//! ## Flow
//!
//! ```text
//! published versions ──> VersionTracker::plan ──> RebuildPipeline
//!                                                   │ staged, budgeted
//!                                                   v
//!                      SceneState <── single commit step
//!                           │
//!                           └──> Lifecycle ──> listeners
//! ```
//!
//! ## Rules
//!
//! 1. Partial results are never visible: pipelines stage, then commit once
//! 2. Joint proxies survive rebuilds when their node id survives
//! 3. Nothing here blocks; waiting is a scheduler signal

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod entity;
pub mod error;
pub mod lifecycle;
pub mod lod;
pub mod pipeline;
pub mod primitive;
pub mod renderable;
pub mod scene;
pub mod scheduler;
pub mod skeleton;
pub mod visibility;

pub use config::{EntityConfig, PrimitiveFailurePolicy, SchedulerConfig};
pub use entity::{AvatarEntity, TickStatus};
pub use error::{LoadError, LoadResult};
pub use lifecycle::{ChannelListener, EntityEvent, EntityListener, LifecycleState};
pub use lod::{LodCost, LodTable, LOD_BUCKETS};
pub use pipeline::{CommitReport, RebuildPipeline};
pub use renderable::{Renderable, RenderableSet};
pub use scene::SceneState;
pub use scheduler::{FrameBudget, RunOutcome, Scheduler, SchedulerStats, Step, Task};
pub use skeleton::{JointProxy, Skeleton, SkeletonDiff, SkeletonJoint};
pub use visibility::VisibilityReport;
