//! # Provider Error Types
//!
//! Status codes returned across the provider boundary.

use marionette_core::EntityHandle;
use thiserror::Error;

/// Errors a provider query can report.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The provider has nothing to hand out yet; ask again next tick.
    #[error("provider not ready")]
    NotReady,

    /// The query failed outright.
    #[error("provider query failed: {0}")]
    Failed(String),

    /// The entity handle is unknown to the provider.
    #[error("unknown entity: {0}")]
    UnknownEntity(EntityHandle),

    /// A primitive index past the published primitive count.
    #[error("primitive index {index} out of range (count {count})")]
    PrimitiveIndexOutOfRange {
        /// Requested index.
        index: u32,
        /// Published primitive count.
        count: u32,
    },
}

impl ProviderError {
    /// Checks whether retrying next tick can succeed.
    #[inline]
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::NotReady)
    }
}

/// Result type for provider queries.
pub type ProviderResult<T> = Result<T, ProviderError>;
