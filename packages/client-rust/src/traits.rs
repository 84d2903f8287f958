//! Collaborator interfaces the client core calls out to.
//!
//! Implementations live in the connection layer and are out of scope here:
//! framing, pooling, node selection, retries, and authentication all happen
//! behind these traits. Both are object-safe and injected as trait objects.

use async_trait::async_trait;

use orbit_core::plan::SelectRequest;
use orbit_core::schema::SchemaSnapshot;
use orbit_core::types::{FieldValue, Tuple};

/// Fetches a full schema snapshot from the server.
///
/// Invoked only by [`MetadataCache`](crate::metadata::MetadataCache), at
/// most once concurrently. Timeouts and cancellation are the implementor's
/// concern; the cache imposes neither.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Returns a snapshot of all spaces and indexes at once.
    async fn fetch(&self) -> anyhow::Result<SchemaSnapshot>;
}

/// Wire transport executing the planner's two output shapes.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Executes a direct binary-protocol scan.
    async fn execute_scan(&self, request: SelectRequest) -> anyhow::Result<Vec<Tuple>>;

    /// Calls a server-side stored procedure with positional arguments,
    /// returning the rows it produced.
    async fn execute_call(&self, function: &str, args: Vec<FieldValue>)
        -> anyhow::Result<Vec<Tuple>>;
}
