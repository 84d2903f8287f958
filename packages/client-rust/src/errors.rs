//! Client-side error types.
//!
//! Planning errors come from `orbit-core` and pass through unchanged.
//! Metadata fetch failures are wrapped into the cloneable [`MetadataError`]
//! so one failed refresh can be broadcast to every caller waiting on that
//! attempt. Nothing here is retried by the client core; retry policy belongs
//! to the layers wrapping the transport.

use orbit_core::plan::PlanError;

/// A failed metadata refresh attempt.
///
/// Cloneable by design: the cache delivers the same error value to all
/// waiters of the attempt that failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("metadata request failed: {message}")]
pub struct MetadataError {
    /// Rendered cause of the failed fetch.
    pub message: String,
}

impl MetadataError {
    /// Wraps a provider failure, rendering the full error chain.
    #[must_use]
    pub fn from_fetch(error: &anyhow::Error) -> Self {
        Self {
            message: format!("{error:#}"),
        }
    }
}

/// Unified error of the client surface.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Query planning failed (validation or lookup).
    #[error(transparent)]
    Plan(#[from] PlanError),
    /// A metadata refresh attempt failed.
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    /// The requested space is not present in the schema snapshot.
    #[error("space '{name}' not found")]
    SpaceNotFound {
        /// The unresolved space name.
        name: String,
    },
    /// The requested space id is not present in the schema snapshot.
    #[error("space with id {id} not found")]
    SpaceIdNotFound {
        /// The unresolved space id.
        id: u32,
    },
    /// The requested index is not present in the schema snapshot.
    #[error("index '{name}' not found in space '{space}'")]
    IndexNotFound {
        /// The unresolved index name.
        name: String,
        /// Space searched.
        space: String,
    },
    /// The requested index id is not present in the schema snapshot.
    #[error("index with id {id} not found in space '{space}'")]
    IndexIdNotFound {
        /// The unresolved index id.
        id: u32,
        /// Space searched.
        space: String,
    },
    /// `Cursor::get` was called with no element at the current position.
    #[error("cursor has no element at the current position")]
    CursorPosition,
    /// The underlying transport failed.
    #[error("transport error: {0}")]
    Transport(#[source] anyhow::Error),
}
