use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use agora_cache::KvCache;
use agora_db::Database;
use agora_types::models::{Metadata, PostsPage};
use agora_types::pagination::PaginateFilter;

use crate::error::ServiceError;
use crate::service::post_from_row;
use crate::store::run_blocking;

/// Cache key of the page-1 / top-5 / `-vote_count` snapshot.
pub const TOP_POSTS_KEY: &str = "top_5_posts";

pub const DEFAULT_TOP_POSTS_TTL: Duration = Duration::from_secs(3600);

/// Read-through cache for the hottest listing shape.
///
/// The snapshot is disposable: a missing, expired, or unreadable entry just
/// means the listing is served from the store. Only [`TopPostsCache::refresh`]
/// writes it, and only with a fully serialized page.
#[derive(Clone)]
pub struct TopPostsCache {
    cache: Arc<dyn KvCache>,
    db: Arc<Database>,
    ttl: Duration,
    store_timeout: Duration,
}

impl TopPostsCache {
    pub fn new(cache: Arc<dyn KvCache>, db: Arc<Database>, ttl: Duration, store_timeout: Duration) -> Self {
        Self {
            cache,
            db,
            ttl,
            store_timeout,
        }
    }

    /// Returns the cached snapshot, or `None` on a miss. Backend errors and
    /// malformed payloads count as misses.
    pub fn read(&self) -> Option<PostsPage> {
        let raw = match self.cache.get(TOP_POSTS_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("Top posts cache read failed: {}", e);
                return None;
            }
        };

        match serde_json::from_str::<PostsPage>(&raw) {
            Ok(page) => Some(page),
            Err(e) => {
                warn!("Discarding malformed top posts snapshot: {}", e);
                None
            }
        }
    }

    /// Recomputes the snapshot from the store and overwrites the cache entry
    /// with a fresh TTL. Nothing is written unless the query and the
    /// serialization both succeed.
    pub async fn refresh(&self) -> Result<(), ServiceError> {
        let filter = PaginateFilter::top_posts();
        let query = filter.clone();
        let (rows, total) =
            run_blocking(&self.db, self.store_timeout, move |db| db.list_posts(&query)).await?;

        let page = PostsPage {
            posts: rows.into_iter().map(post_from_row).collect(),
            metadata: Metadata::calculate(total, filter.page, filter.page_size),
        };
        let payload = serde_json::to_string(&page)
            .map_err(|e| ServiceError::Internal(format!("failed to serialize top posts: {e}")))?;

        self.cache.set(TOP_POSTS_KEY, payload, self.ttl)?;
        debug!("Top posts snapshot refreshed ({} posts)", page.posts.len());
        Ok(())
    }

    /// Starts the background refresher and returns the handle used to
    /// request refreshes. Must be called from within a Tokio runtime.
    pub fn spawn_refresher(self) -> RefreshHandle {
        // One slot: a request that arrives while another is still queued
        // is covered by the queued one, which has not read the store yet.
        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(run_refresh_loop(self, rx));
        RefreshHandle { tx }
    }
}

/// Fire-and-forget trigger for the top posts refresher.
#[derive(Clone)]
pub struct RefreshHandle {
    tx: mpsc::Sender<()>,
}

impl RefreshHandle {
    /// Requests a refresh without waiting for it. Returns immediately.
    pub fn schedule(&self) {
        match self.tx.try_send(()) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(())) => {}
            Err(mpsc::error::TrySendError::Closed(())) => {
                warn!("Top posts refresher is gone; snapshot will go stale until TTL");
            }
        }
    }
}

/// Runs refreshes one at a time, in request order. Failures are logged and
/// dropped; the previous snapshot (or its absence) stays as it was.
async fn run_refresh_loop(cache: TopPostsCache, mut rx: mpsc::Receiver<()>) {
    info!("Top posts refresher started");

    while rx.recv().await.is_some() {
        if let Err(e) = cache.refresh().await {
            error!("Failed to refresh top posts cache: {}", e);
        }
    }

    debug!("Top posts refresher stopped");
}
