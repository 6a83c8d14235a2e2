//! # Marionette Provider Boundary
//!
//! The native avatar SDK is an opaque collaborator. This crate pins down
//! exactly what the synchronization core asks of it:
//!
//! ```text
//! query_pose                    -> joints (node id, parent index) @ hierarchy version
//! query_render_state            -> all / visible mesh nodes, primitive count, versions
//! query_primitive_render_state  -> mesh node, asset, instance, joint mapping
//! pending_count                 -> rebuilds wait until this is zero
//! asset                         -> shared primitive, polled for readiness
//! ```
//!
//! ## Threading
//!
//! The core runs on the simulation thread. Asset decode happens on the
//! provider's own workers, which publish readiness through atomics on
//! [`PrimitiveAsset`]; the core only ever polls.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod assets;
pub mod error;
pub mod provider;
pub mod simulation;

pub use assets::{
    AssetRegistry, AssetStatus, LodFlags, PrimitiveAsset, PrimitiveCost, PrimitiveData,
};
pub use error::{ProviderError, ProviderResult};
pub use provider::{
    AvatarProvider, ContentTier, PoseJoint, PoseSnapshot, PrimitiveRenderState,
    RenderStateSnapshot,
};
pub use simulation::{RenderPublish, ScriptedProvider};
