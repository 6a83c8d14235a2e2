//! # Marionette Core
//!
//! Shared vocabulary for keeping a locally built avatar scene in step with
//! an external, asynchronous avatar provider:
//! - Opaque identifiers issued by the provider
//! - Version tokens for hierarchy, all-nodes and visible-nodes state
//! - Generational proxy pools standing in for engine scene objects
//!
//! ## Architecture Rules
//!
//! 1. **Nothing speculative** - a `current` version only moves on commit
//! 2. **Stable identity** - a proxy handle is never reused without a new generation
//! 3. **Flat storage** - hierarchies are index arrays, not pointer graphs
//!
//! ## Example
//!
//! ```rust,ignore
//! use marionette_core::{ProxyPool, VersionTracker};
//!
//! let mut tracker = VersionTracker::new();
//! let decision = tracker.plan(published, None);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod ids;
pub mod memory;
pub mod transform;
pub mod version;

pub use ids::{EntityHandle, InstanceId, JointType, NodeId, PrimitiveId};
pub use memory::{Handle, ProxyPool};
pub use transform::Transform;
pub use version::{
    RebuildKind, SyncDecision, VersionToken, VersionTracker, VersionTriple,
};
