//! # Load Error Types
//!
//! Everything that can stop a rebuild. None of these cross the provider
//! boundary as panics; they end the pipeline and surface through
//! `EntityEvent::LoadFailed`.

use marionette_core::{NodeId, PrimitiveId, VersionToken};
use marionette_provider::ProviderError;
use thiserror::Error;

/// Errors that end a rebuild pipeline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// The pose could not be queried.
    #[error("pose query failed: {0}")]
    PoseQuery(ProviderError),

    /// The render state could not be queried.
    #[error("render state query failed: {0}")]
    RenderStateQuery(ProviderError),

    /// A primitive descriptor could not be queried.
    #[error("primitive {index} query failed: {source}")]
    PrimitiveQuery {
        /// Primitive index in the render state.
        index: u32,
        /// Provider status.
        source: ProviderError,
    },

    /// A joint names a parent outside the pose array.
    #[error("joint {joint} has invalid parent index {parent}")]
    InvalidParentIndex {
        /// Offending joint index.
        joint: usize,
        /// Parent index it names.
        parent: i32,
    },

    /// Two joints share a node id.
    #[error("duplicate joint node {0}")]
    DuplicateNode(NodeId),

    /// The provider has no asset with this id.
    #[error("primitive asset {0} not found")]
    AssetNotFound(PrimitiveId),

    /// The asset load was cancelled or failed.
    #[error("primitive asset {0} cancelled or failed")]
    AssetCancelled(PrimitiveId),

    /// A skinned primitive names a joint the skeleton lacks.
    #[error("primitive {primitive} maps to missing joint node {node}")]
    JointMapping {
        /// Primitive being mapped.
        primitive: PrimitiveId,
        /// Node with no joint.
        node: NodeId,
    },

    /// Joint mapping length differs from the asset's joint list.
    #[error("primitive {primitive} expects {expected} joints, mapping has {actual}")]
    JointCountMismatch {
        /// Primitive being mapped.
        primitive: PrimitiveId,
        /// Joints in the asset.
        expected: usize,
        /// Entries in the provider mapping.
        actual: usize,
    },

    /// An asset stayed pending longer than the configured timeout.
    #[error("primitive asset {primitive} still loading after {ticks} ticks")]
    AssetTimeout {
        /// Asset that never loaded.
        primitive: PrimitiveId,
        /// Ticks waited.
        ticks: u32,
    },

    /// Provider data belongs to another hierarchy version than the rebuild.
    #[error("hierarchy moved: expected {expected}, provider has {actual}")]
    HierarchyMismatch {
        /// Version the rebuild targets.
        expected: VersionToken,
        /// Version the provider returned.
        actual: VersionToken,
    },
}

impl LoadError {
    /// Checks whether the rebuild should be abandoned and re-planned
    /// rather than reported as a failure.
    #[inline]
    #[must_use]
    pub const fn is_superseded(&self) -> bool {
        matches!(self, Self::HierarchyMismatch { .. })
    }

    /// Checks whether this error is scoped to one primitive and is
    /// therefore subject to the primitive failure policy.
    #[inline]
    #[must_use]
    pub const fn is_primitive_local(&self) -> bool {
        matches!(
            self,
            Self::JointMapping { .. } | Self::JointCountMismatch { .. }
        )
    }
}

/// Result type for rebuild steps.
pub type LoadResult<T> = Result<T, LoadError>;
