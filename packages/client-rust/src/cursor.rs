//! Lazy batch-fetch cursor over a space select.
//!
//! A [`Cursor`] walks a result set one batch at a time, re-invoking its
//! [`SelectSource`](crate::space::SelectSource) with conditions adjusted for
//! the next page. The caller's `Conditions` value is cloned per batch and
//! never mutated. Two paging modes exist, matching the two execution modes:
//! direct scans page by a running row offset; proxied selects page by an
//! exclusive anchor set to the last row of the previous batch, because the
//! proxy planner rejects offsets.
//!
//! Errors from the underlying select, including planner validation errors,
//! propagate to the caller of `next()` and are never retried.

use tracing::debug;

use orbit_core::conditions::Conditions;
use orbit_core::types::Tuple;

use crate::errors::ClientError;
use crate::space::SelectSource;

/// How the cursor addresses the next batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Paging {
    /// Running row offset on top of the base conditions' own offset.
    Offset,
    /// Exclusive "start after" anchor set to the last row of the previous
    /// batch.
    Anchor,
}

/// Stateful batch iterator: `next()` advances, `get()` reads.
///
/// Not meant for concurrent use; every caller should hold its own cursor.
pub struct Cursor<'a> {
    source: &'a dyn SelectSource,
    base: Conditions,
    batch_size: u32,
    paging: Paging,
    batch: Vec<Tuple>,
    position: usize,
    /// Rows fetched so far, capped at the base conditions' overall limit.
    fetched: u32,
    exhausted: bool,
}

impl<'a> Cursor<'a> {
    /// Creates a cursor over `source`. The first fetch happens on the first
    /// `next()` call.
    #[must_use]
    pub fn new(
        source: &'a dyn SelectSource,
        conditions: Conditions,
        batch_size: u32,
        paging: Paging,
    ) -> Self {
        Self {
            source,
            base: conditions,
            batch_size,
            paging,
            batch: Vec::new(),
            position: 0,
            fetched: 0,
            exhausted: false,
        }
    }

    /// Advances to the next row, fetching the next batch when the current
    /// one is consumed. Returns whether a current row exists afterwards.
    ///
    /// # Errors
    ///
    /// Whatever the underlying select raises; the cursor does not retry.
    pub async fn next(&mut self) -> Result<bool, ClientError> {
        if self.position + 1 < self.batch.len() {
            self.position += 1;
            return Ok(true);
        }
        if self.exhausted {
            return Ok(false);
        }
        self.fetch_next_batch().await
    }

    /// The row at the current position.
    ///
    /// # Errors
    ///
    /// [`ClientError::CursorPosition`] when no row is current — before the
    /// first `next()`, or after `next()` reported exhaustion. This is a
    /// misuse of the cursor, not a recoverable condition.
    pub fn get(&self) -> Result<&Tuple, ClientError> {
        self.batch.get(self.position).ok_or(ClientError::CursorPosition)
    }

    async fn fetch_next_batch(&mut self) -> Result<bool, ClientError> {
        let overall = self.base.limit();
        let remaining = if overall == u32::MAX {
            u32::MAX
        } else {
            overall.saturating_sub(self.fetched)
        };
        if remaining == 0 {
            self.finish();
            return Ok(false);
        }

        let mut conditions = self.base.clone().with_limit(self.batch_size.min(remaining));
        conditions = match self.paging {
            Paging::Offset => {
                conditions.with_offset(self.base.offset().saturating_add(self.fetched))
            }
            Paging::Anchor => match self.batch.last() {
                // The server excludes the anchor row and returns what
                // follows it.
                Some(last) => conditions.start_after(last.clone()),
                // First batch: keep whatever anchor the caller set.
                None => conditions,
            },
        };

        let batch = self.source.select(&conditions).await?;
        debug!(
            rows = batch.len(),
            fetched = self.fetched,
            paging = ?self.paging,
            "cursor fetched batch"
        );
        self.fetched = self
            .fetched
            .saturating_add(u32::try_from(batch.len()).unwrap_or(u32::MAX));
        self.position = 0;
        if batch.is_empty() {
            self.finish();
            return Ok(false);
        }
        self.batch = batch;
        Ok(true)
    }

    fn finish(&mut self) {
        self.exhausted = true;
        self.batch = Vec::new();
        self.position = 0;
    }
}
