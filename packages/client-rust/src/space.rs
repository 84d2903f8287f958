//! Space handle: the glue between cache, planner, and transport.
//!
//! A [`Space`] resolves its metadata through the cache, plans a request in
//! its execution mode, and hands the result to the transport. It is the
//! "select" operation a [`Cursor`](crate::cursor::Cursor) re-invokes per
//! batch, exposed through the [`SelectSource`] trait so cursors can also be
//! driven by stubs in tests.
//!
//! Handles are cheap to construct and meant for per-request use; they are
//! not designed for concurrent invocation of the same instance.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use orbit_core::conditions::Conditions;
use orbit_core::types::Tuple;

use crate::config::ClientConfig;
use crate::cursor::{Cursor, Paging};
use crate::errors::ClientError;
use crate::metadata::MetadataCache;
use crate::traits::Transport;

/// How a space executes selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Direct binary-protocol scans against a single node.
    Direct,
    /// Remote-procedure calls on a clustered proxy.
    Proxy {
        /// Name of the server-side select procedure.
        function: String,
    },
}

/// Asynchronous select invoked by [`Cursor`] once per batch.
#[async_trait]
pub trait SelectSource: Send + Sync {
    /// Runs one select with fully adjusted conditions.
    async fn select(&self, conditions: &Conditions) -> Result<Vec<Tuple>, ClientError>;
}

/// Handle to one remote space.
pub struct Space {
    name: String,
    transport: Arc<dyn Transport>,
    metadata: Arc<MetadataCache>,
    mode: ExecutionMode,
    config: ClientConfig,
}

impl Space {
    /// Creates a handle with the default [`ClientConfig`].
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        transport: Arc<dyn Transport>,
        metadata: Arc<MetadataCache>,
        mode: ExecutionMode,
    ) -> Self {
        Self {
            name: name.into(),
            transport,
            metadata,
            mode,
            config: ClientConfig::default(),
        }
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Creates a proxy-mode handle using the configured select procedure.
    #[must_use]
    pub fn proxy(
        name: impl Into<String>,
        transport: Arc<dyn Transport>,
        metadata: Arc<MetadataCache>,
        config: ClientConfig,
    ) -> Self {
        let function = config.proxy_select_function.clone();
        Self::new(name, transport, metadata, ExecutionMode::Proxy { function })
            .with_config(config)
    }

    /// Name of the space this handle addresses.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The handle's execution mode.
    #[must_use]
    pub fn mode(&self) -> &ExecutionMode {
        &self.mode
    }

    /// Plans `conditions` in this handle's mode and executes the result.
    ///
    /// # Errors
    ///
    /// Planning errors ([`ClientError::Plan`]), metadata errors, an unknown
    /// space name, or a transport failure.
    pub async fn select(&self, conditions: &Conditions) -> Result<Vec<Tuple>, ClientError> {
        let snapshot = self.metadata.snapshot().await?;
        let space = snapshot
            .space_by_name(&self.name)
            .ok_or_else(|| ClientError::SpaceNotFound {
                name: self.name.clone(),
            })?;
        match &self.mode {
            ExecutionMode::Direct => {
                let request = conditions.to_select_request(&snapshot, space)?;
                debug!(
                    space = %self.name,
                    index = request.index_id,
                    iterator = ?request.iterator,
                    "executing direct scan"
                );
                self.transport
                    .execute_scan(request)
                    .await
                    .map_err(ClientError::Transport)
            }
            ExecutionMode::Proxy { function } => {
                let query = conditions.to_proxy_query(&snapshot, space)?;
                debug!(
                    space = %self.name,
                    function = %function,
                    conditions = query.conditions.len(),
                    "executing proxy call"
                );
                let args = query.call_args(&self.name);
                self.transport
                    .execute_call(function, args)
                    .await
                    .map_err(ClientError::Transport)
            }
        }
    }

    /// Lazy batch iterator over this space with an explicit batch size.
    ///
    /// The paging mode follows the execution mode: direct scans page by
    /// offset, proxied selects page by anchor.
    #[must_use]
    pub fn cursor(&self, conditions: Conditions, batch_size: u32) -> Cursor<'_> {
        let paging = match self.mode {
            ExecutionMode::Direct => Paging::Offset,
            ExecutionMode::Proxy { .. } => Paging::Anchor,
        };
        Cursor::new(self, conditions, batch_size, paging)
    }

    /// Lazy batch iterator using the configured default batch size.
    #[must_use]
    pub fn cursor_with_default_batch(&self, conditions: Conditions) -> Cursor<'_> {
        self.cursor(conditions, self.config.cursor_batch_size)
    }
}

#[async_trait]
impl SelectSource for Space {
    async fn select(&self, conditions: &Conditions) -> Result<Vec<Tuple>, ClientError> {
        Self::select(self, conditions).await
    }
}
