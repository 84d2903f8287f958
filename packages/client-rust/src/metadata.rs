//! Lazily loaded, single-flight schema metadata cache.
//!
//! [`MetadataCache`] keeps the latest [`SchemaSnapshot`] behind an
//! `ArcSwapOption`: lookups are lock-free reads of an immutable snapshot,
//! and a successful refresh replaces all four lookup maps as one unit, so
//! readers never observe a torn state.
//!
//! Refreshes are lazy. The cache starts stale; [`MetadataCache::schedule_refresh`]
//! re-arms the stale flag without blocking; the first caller to observe the
//! flag becomes the sole refresher while every concurrent caller joins the
//! same attempt through a `watch` channel. At most one fetch is ever in
//! flight, and a failing fetch delivers its error to exactly the callers
//! that waited on that attempt — the flag is then re-armed so a later caller
//! retries, and a previously stored snapshot stays readable throughout.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, warn};

use orbit_core::schema::{IndexMetadata, SchemaSnapshot, SpaceMetadata};

use crate::errors::{ClientError, MetadataError};
use crate::traits::MetadataProvider;

/// Broadcast state of one refresh attempt.
#[derive(Debug, Clone)]
enum Attempt {
    /// The fetch is still in flight.
    Pending,
    /// The fetch finished with this result.
    Done(Result<Arc<SchemaSnapshot>, MetadataError>),
}

/// What a caller found when it needed fresh metadata.
enum Claim {
    /// The cache is fresh; here is the snapshot.
    Fresh(Arc<SchemaSnapshot>),
    /// Another caller is fetching; wait on its attempt.
    Waiter(watch::Receiver<Attempt>),
    /// This caller fetches; broadcast the result through the sender.
    Refresher(watch::Sender<Attempt>),
}

/// Lazily loaded cache of space and index metadata.
pub struct MetadataCache {
    provider: Box<dyn MetadataProvider>,
    snapshot: ArcSwapOption<SchemaSnapshot>,
    /// True when the next lookup must fetch before serving. Starts true.
    stale: AtomicBool,
    /// Receiver of the in-flight refresh attempt, if one is running.
    in_flight: Mutex<Option<watch::Receiver<Attempt>>>,
}

impl fmt::Debug for MetadataCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataCache")
            .field("loaded", &self.snapshot.load().is_some())
            .field("stale", &self.stale.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl MetadataCache {
    /// Creates an empty cache. The first lookup triggers the first fetch.
    #[must_use]
    pub fn new(provider: Box<dyn MetadataProvider>) -> Self {
        Self {
            provider,
            snapshot: ArcSwapOption::empty(),
            stale: AtomicBool::new(true),
            in_flight: Mutex::new(None),
        }
    }

    /// Marks the cache stale without blocking. The next lookup refreshes.
    pub fn schedule_refresh(&self) {
        self.stale.store(true, Ordering::Release);
    }

    /// The last successfully loaded snapshot, if any, without fetching.
    ///
    /// Serves callers that only need lookups while the cache is stale or a
    /// refresh keeps failing.
    #[must_use]
    pub fn cached(&self) -> Option<Arc<SchemaSnapshot>> {
        self.snapshot.load_full()
    }

    /// Returns a snapshot, fetching first if the cache is stale or was
    /// never loaded.
    ///
    /// # Errors
    ///
    /// [`ClientError::Metadata`] when the refresh attempt this caller
    /// joined (or ran) fails.
    pub async fn snapshot(&self) -> Result<Arc<SchemaSnapshot>, ClientError> {
        // Fast path: fresh cache, lock-free read. Acquire pairs with the
        // Release of the refresh that cleared the flag, so the snapshot it
        // stored is visible here.
        if !self.stale.load(Ordering::Acquire) {
            if let Some(snapshot) = self.snapshot.load_full() {
                return Ok(snapshot);
            }
        }
        loop {
            match self.claim() {
                Claim::Fresh(snapshot) => return Ok(snapshot),
                Claim::Refresher(tx) => return Ok(self.refresh(tx).await?),
                Claim::Waiter(mut rx) => {
                    loop {
                        let attempt = rx.borrow_and_update().clone();
                        if let Attempt::Done(result) = attempt {
                            let snapshot = result?;
                            return Ok(snapshot);
                        }
                        if rx.changed().await.is_err() {
                            // The refresher was dropped mid-fetch without
                            // completing the attempt; go claim again.
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Decides this caller's role under the in-flight lock.
    fn claim(&self) -> Claim {
        let mut slot = self.in_flight.lock();
        if let Some(rx) = slot.as_ref() {
            let abandoned =
                matches!(&*rx.borrow(), Attempt::Pending) && rx.has_changed().is_err();
            if !abandoned {
                return Claim::Waiter(rx.clone());
            }
            // A cancelled refresher left its attempt behind; discard it so
            // this caller can start a fresh one.
            *slot = None;
            self.stale.store(true, Ordering::Release);
        }
        if !self.stale.load(Ordering::Acquire) {
            if let Some(snapshot) = self.snapshot.load_full() {
                return Claim::Fresh(snapshot);
            }
        }
        let (tx, rx) = watch::channel(Attempt::Pending);
        *slot = Some(rx);
        self.stale.store(false, Ordering::Release);
        Claim::Refresher(tx)
    }

    /// Runs one fetch and broadcasts its outcome to the attempt's waiters.
    async fn refresh(
        &self,
        tx: watch::Sender<Attempt>,
    ) -> Result<Arc<SchemaSnapshot>, MetadataError> {
        debug!("refreshing schema metadata");
        let result = match self.provider.fetch().await {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                // Store before clearing the slot: a caller that sees neither
                // an in-flight attempt nor a stale flag must see this
                // snapshot.
                self.snapshot.store(Some(Arc::clone(&snapshot)));
                debug!(spaces = snapshot.space_count(), "schema metadata refreshed");
                Ok(snapshot)
            }
            Err(error) => {
                let error = MetadataError::from_fetch(&error);
                // Re-arm so a later caller retries. Only the waiters of
                // this attempt receive the failure; the stored snapshot, if
                // any, stays readable.
                self.stale.store(true, Ordering::Release);
                warn!(error = %error, "schema metadata refresh failed");
                Err(error)
            }
        };
        *self.in_flight.lock() = None;
        // A send error only means every waiter is already gone.
        let _ = tx.send(Attempt::Done(result.clone()));
        result
    }

    // ---- lookups ----

    /// Space metadata by name.
    ///
    /// # Errors
    ///
    /// [`ClientError::Metadata`] if loading fails,
    /// [`ClientError::SpaceNotFound`] if the space is unknown.
    pub async fn space_by_name(&self, name: &str) -> Result<Arc<SpaceMetadata>, ClientError> {
        let snapshot = self.snapshot().await?;
        snapshot
            .space_by_name(name)
            .cloned()
            .ok_or_else(|| ClientError::SpaceNotFound {
                name: name.to_string(),
            })
    }

    /// Space metadata by id.
    ///
    /// # Errors
    ///
    /// [`ClientError::Metadata`] if loading fails,
    /// [`ClientError::SpaceIdNotFound`] if the id is unknown.
    pub async fn space_by_id(&self, space_id: u32) -> Result<Arc<SpaceMetadata>, ClientError> {
        let snapshot = self.snapshot().await?;
        snapshot
            .space_by_id(space_id)
            .cloned()
            .ok_or(ClientError::SpaceIdNotFound { id: space_id })
    }

    /// Index metadata by space name and index name.
    ///
    /// # Errors
    ///
    /// [`ClientError::Metadata`] if loading fails,
    /// [`ClientError::SpaceNotFound`] / [`ClientError::IndexNotFound`] if
    /// either name is unknown.
    pub async fn index_by_name(
        &self,
        space_name: &str,
        index_name: &str,
    ) -> Result<Arc<IndexMetadata>, ClientError> {
        let snapshot = self.snapshot().await?;
        if snapshot.space_by_name(space_name).is_none() {
            return Err(ClientError::SpaceNotFound {
                name: space_name.to_string(),
            });
        }
        snapshot
            .index_by_name(space_name, index_name)
            .cloned()
            .ok_or_else(|| ClientError::IndexNotFound {
                name: index_name.to_string(),
                space: space_name.to_string(),
            })
    }

    /// Index metadata by space name and index id.
    ///
    /// # Errors
    ///
    /// [`ClientError::Metadata`] if loading fails,
    /// [`ClientError::SpaceNotFound`] / [`ClientError::IndexIdNotFound`] if
    /// the space or index is unknown.
    pub async fn index_by_id(
        &self,
        space_name: &str,
        index_id: u32,
    ) -> Result<Arc<IndexMetadata>, ClientError> {
        let snapshot = self.snapshot().await?;
        let space = snapshot
            .space_by_name(space_name)
            .ok_or_else(|| ClientError::SpaceNotFound {
                name: space_name.to_string(),
            })?;
        snapshot
            .index_by_id(space.space_id(), index_id)
            .cloned()
            .ok_or_else(|| ClientError::IndexIdNotFound {
                id: index_id,
                space: space_name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Semaphore;

    use orbit_core::schema::{FieldMetadata, IndexPartMetadata};

    use super::*;

    fn test_snapshot() -> SchemaSnapshot {
        SchemaSnapshot::new(
            vec![SpaceMetadata::new(
                512,
                1,
                "users",
                vec![FieldMetadata::new("id", "unsigned", false)],
            )],
            vec![IndexMetadata::new(
                512,
                0,
                "primary",
                "tree",
                true,
                vec![IndexPartMetadata::new(0, "unsigned")],
            )],
        )
    }

    /// Counts fetches; fails while `fail` is set.
    struct CountingProvider {
        calls: Arc<AtomicUsize>,
        fail: Arc<AtomicBool>,
    }

    impl CountingProvider {
        fn create() -> (Box<Self>, Arc<AtomicUsize>, Arc<AtomicBool>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let fail = Arc::new(AtomicBool::new(false));
            (
                Box::new(Self {
                    calls: Arc::clone(&calls),
                    fail: Arc::clone(&fail),
                }),
                calls,
                fail,
            )
        }
    }

    #[async_trait]
    impl MetadataProvider for CountingProvider {
        async fn fetch(&self) -> anyhow::Result<SchemaSnapshot> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("connection reset");
            }
            Ok(test_snapshot())
        }
    }

    /// Counts fetches and blocks each one until a permit is released.
    struct GatedProvider {
        calls: Arc<AtomicUsize>,
        gate: Arc<Semaphore>,
    }

    #[async_trait]
    impl MetadataProvider for GatedProvider {
        async fn fetch(&self) -> anyhow::Result<SchemaSnapshot> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let _permit = self.gate.acquire().await?;
            Ok(test_snapshot())
        }
    }

    // ---- idempotence ----

    #[tokio::test]
    async fn repeated_lookups_fetch_once() {
        let (provider, calls, _) = CountingProvider::create();
        let cache = MetadataCache::new(provider);

        let first = cache.space_by_name("users").await.unwrap();
        let second = cache.space_by_name("users").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn schedule_refresh_marks_stale_without_fetching() {
        let (provider, calls, _) = CountingProvider::create();
        let cache = MetadataCache::new(provider);
        cache.snapshot().await.unwrap();

        cache.schedule_refresh();
        // No fetch happens until someone looks something up.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.cached().is_some());

        cache.snapshot().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // Fresh again: further lookups stay on the cached snapshot.
        cache.snapshot().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    // ---- single flight ----

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_lookups_share_one_fetch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Semaphore::new(0));
        let cache = Arc::new(MetadataCache::new(Box::new(GatedProvider {
            calls: Arc::clone(&calls),
            gate: Arc::clone(&gate),
        })));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.snapshot().await })
            })
            .collect();

        // Let every task reach the cache before the fetch may complete.
        tokio::time::sleep(Duration::from_millis(50)).await;
        gate.add_permits(1);

        let mut snapshots = Vec::new();
        for task in tasks {
            snapshots.push(task.await.unwrap().unwrap());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for snapshot in &snapshots[1..] {
            assert!(Arc::ptr_eq(&snapshots[0], snapshot));
        }
    }

    // ---- failure handling ----

    #[tokio::test]
    async fn failed_first_fetch_surfaces_and_rearms() {
        let (provider, calls, fail) = CountingProvider::create();
        fail.store(true, Ordering::SeqCst);
        let cache = MetadataCache::new(provider);

        let error = cache.snapshot().await.unwrap_err();
        assert!(matches!(error, ClientError::Metadata(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.cached().is_none());

        // The stale flag was re-armed: the next lookup retries and succeeds.
        fail.store(false, Ordering::SeqCst);
        cache.snapshot().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_snapshot_readable() {
        let (provider, calls, fail) = CountingProvider::create();
        let cache = MetadataCache::new(provider);
        let loaded = cache.snapshot().await.unwrap();

        cache.schedule_refresh();
        fail.store(true, Ordering::SeqCst);
        let error = cache.snapshot().await.unwrap_err();
        assert!(matches!(error, ClientError::Metadata(_)));

        // Stale-but-available: the old snapshot is still served without a
        // fetch to callers that only need lookups.
        let cached = cache.cached().unwrap();
        assert!(Arc::ptr_eq(&loaded, &cached));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        fail.store(false, Ordering::SeqCst);
        let refreshed = cache.snapshot().await.unwrap();
        assert!(!Arc::ptr_eq(&loaded, &refreshed));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    // ---- lookups ----

    #[tokio::test]
    async fn lookups_resolve_names_ids_and_misses() {
        let (provider, _, _) = CountingProvider::create();
        let cache = MetadataCache::new(provider);

        assert_eq!(cache.space_by_name("users").await.unwrap().space_id(), 512);
        assert_eq!(cache.space_by_id(512).await.unwrap().name(), "users");
        assert_eq!(
            cache.index_by_name("users", "primary").await.unwrap().index_id(),
            0
        );
        assert_eq!(
            cache.index_by_id("users", 0).await.unwrap().name(),
            "primary"
        );

        assert!(matches!(
            cache.space_by_name("missing").await.unwrap_err(),
            ClientError::SpaceNotFound { .. }
        ));
        assert!(matches!(
            cache.space_by_id(7).await.unwrap_err(),
            ClientError::SpaceIdNotFound { id: 7 }
        ));
        assert!(matches!(
            cache.index_by_name("users", "missing").await.unwrap_err(),
            ClientError::IndexNotFound { .. }
        ));
        assert!(matches!(
            cache.index_by_name("missing", "primary").await.unwrap_err(),
            ClientError::SpaceNotFound { .. }
        ));
        assert!(matches!(
            cache.index_by_id("users", 9).await.unwrap_err(),
            ClientError::IndexIdNotFound { id: 9, .. }
        ));
    }
}
