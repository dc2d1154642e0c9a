use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use agora_cache::KvCache;
use agora_db::Database;
use agora_db::models::PostRow;
use agora_types::models::{Metadata, Post, PostsPage, VoteValue};
use agora_types::pagination::PaginateFilter;

use crate::error::ServiceError;
use crate::store::run_blocking;
use crate::top_posts::{RefreshHandle, TopPostsCache};

/// Posts, their vote totals, and the vote ledger, with authorization applied.
///
/// Every mutation that can change the top posts snapshot schedules a
/// background refresh after the store write succeeds. The caller gets its
/// answer without waiting for it.
#[derive(Clone)]
pub struct PostService {
    db: Arc<Database>,
    top: TopPostsCache,
    refresh: RefreshHandle,
    store_timeout: Duration,
}

impl PostService {
    /// Spawns the top posts refresher, so this must run inside a Tokio runtime.
    pub fn new(db: Arc<Database>, cache: Arc<dyn KvCache>, top_posts_ttl: Duration, store_timeout: Duration) -> Self {
        let top = TopPostsCache::new(cache, Arc::clone(&db), top_posts_ttl, store_timeout);
        let refresh = top.clone().spawn_refresher();
        Self {
            db,
            top,
            refresh,
            store_timeout,
        }
    }

    async fn blocking<F, T>(&self, f: F) -> Result<T, ServiceError>
    where
        F: FnOnce(&Database) -> agora_db::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        run_blocking(&self.db, self.store_timeout, f).await
    }

    // -- Reads --

    /// One page of posts. `filter` must already be validated.
    pub async fn get_all_posts(&self, filter: PaginateFilter) -> Result<PostsPage, ServiceError> {
        if filter.is_top_posts() {
            if let Some(page) = self.top.read() {
                debug!("Top posts served from cache");
                return Ok(page);
            }
            // Populated by the refresher, never from this read, so a slow
            // listing cannot overwrite a newer snapshot.
            self.refresh.schedule();
        }

        let (page, page_size) = (filter.page, filter.page_size);
        let (rows, total) = self
            .blocking(move |db| db.list_posts(&filter))
            .await
            .inspect_err(|e| error!("Failed to list posts: {}", e))?;

        Ok(PostsPage {
            posts: rows.into_iter().map(post_from_row).collect(),
            metadata: Metadata::calculate(total, page, page_size),
        })
    }

    pub async fn get_post_by_id(&self, id: &str) -> Result<Post, ServiceError> {
        let id = id.to_string();
        let row = self
            .blocking(move |db| db.get_post_by_id(&id))
            .await
            .map_err(|e| e.for_resource("post"))?;
        Ok(post_from_row(row))
    }

    pub async fn get_post_by_title(&self, title: &str) -> Result<Post, ServiceError> {
        let title = title.to_string();
        let row = self
            .blocking(move |db| db.get_post_by_title(&title))
            .await
            .map_err(|e| e.for_resource("post"))?;
        Ok(post_from_row(row))
    }

    // -- Writes --

    pub async fn create_post(&self, user_id: &str, title: &str, text: &str) -> Result<Post, ServiceError> {
        let id = Uuid::new_v4().to_string();
        let (user_id, title, text) = (user_id.to_string(), title.to_string(), text.to_string());
        let row = self
            .blocking(move |db| db.create_post(&id, &title, &text, &user_id))
            .await
            .inspect_err(|e| error!("Failed to create post: {}", e))?;

        info!("Post {} created by {}", row.id, row.user_id);
        Ok(post_from_row(row))
    }

    /// Owner only.
    pub async fn update_post(&self, id: &str, user_id: &str, title: &str, text: &str) -> Result<Post, ServiceError> {
        self.authorize_owner(id, user_id).await?;

        let (id, title, text) = (id.to_string(), title.to_string(), text.to_string());
        let row = self
            .blocking(move |db| db.update_post(&id, &title, &text))
            .await
            .map_err(|e| e.for_resource("post"))?;

        self.refresh.schedule();
        Ok(post_from_row(row))
    }

    /// Owner only. The post's votes go with it.
    pub async fn delete_post(&self, id: &str, user_id: &str) -> Result<(), ServiceError> {
        self.authorize_owner(id, user_id).await?;

        let post_id = id.to_string();
        self.blocking(move |db| db.delete_post(&post_id))
            .await
            .map_err(|e| e.for_resource("post"))?;

        info!("Post {} deleted by {}", id, user_id);
        self.refresh.schedule();
        Ok(())
    }

    // -- Votes --

    /// Records `user_id`'s vote on a post, replacing any earlier one.
    /// Voting on your own post is forbidden.
    pub async fn add_vote(&self, post_id: &str, user_id: &str, value: VoteValue) -> Result<(), ServiceError> {
        let post = self.get_post_by_id(post_id).await?;
        if post.user_id == user_id {
            debug!("User {} tried to vote on own post {}", user_id, post_id);
            return Err(ServiceError::Forbidden);
        }

        let (pid, uid) = (post_id.to_string(), user_id.to_string());
        self.blocking(move |db| db.upsert_vote(&pid, &uid, value))
            .await
            .inspect_err(|e| error!("Failed to record vote on {}: {}", post_id, e))?;

        self.refresh.schedule();
        Ok(())
    }

    /// Withdraws `user_id`'s vote. Succeeds whether or not a vote existed.
    pub async fn remove_vote(&self, post_id: &str, user_id: &str) -> Result<(), ServiceError> {
        self.get_post_by_id(post_id).await?;

        let (pid, uid) = (post_id.to_string(), user_id.to_string());
        let removed = self
            .blocking(move |db| db.remove_vote(&pid, &uid))
            .await
            .inspect_err(|e| error!("Failed to remove vote on {}: {}", post_id, e))?;

        if removed {
            self.refresh.schedule();
        }
        Ok(())
    }

    async fn authorize_owner(&self, post_id: &str, user_id: &str) -> Result<(), ServiceError> {
        let post = self.get_post_by_id(post_id).await?;
        if post.user_id != user_id {
            warn!("User {} is not the owner of post {}", user_id, post_id);
            return Err(ServiceError::Forbidden);
        }
        Ok(())
    }
}

pub(crate) fn post_from_row(row: PostRow) -> Post {
    Post {
        created_at: parse_timestamp(&row.created_at),
        updated_at: parse_timestamp(&row.updated_at),
        id: row.id,
        title: row.title,
        text: row.text,
        user_id: row.user_id,
        vote_count: row.vote_count,
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => ts.with_timezone(&Utc),
        Err(e) => {
            warn!("Unparseable timestamp {:?} in posts table: {}", raw, e);
            DateTime::UNIX_EPOCH
        }
    }
}

#[cfg(test)]
mod tests {
    use agora_cache::MemoryCache;
    use agora_types::pagination::POST_SORT_SAFELIST;

    use super::*;
    use crate::store::DEFAULT_STORE_TIMEOUT;
    use crate::top_posts::{DEFAULT_TOP_POSTS_TTL, TOP_POSTS_KEY};

    struct Fixture {
        service: PostService,
        db: Arc<Database>,
        cache: MemoryCache,
    }

    fn fixture() -> Fixture {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.create_user("alice", "alice@example.com", "h").unwrap();
        db.create_user("bob", "bob@example.com", "h").unwrap();
        let cache = MemoryCache::new();
        let service = PostService::new(
            Arc::clone(&db),
            Arc::new(cache.clone()),
            DEFAULT_TOP_POSTS_TTL,
            DEFAULT_STORE_TIMEOUT,
        );
        Fixture { service, db, cache }
    }

    async fn wait_for_snapshot(cache: &MemoryCache, pred: impl Fn(&PostsPage) -> bool) -> bool {
        for _ in 0..200 {
            if let Some(raw) = cache.get(TOP_POSTS_KEY).unwrap() {
                if pred(&serde_json::from_str(&raw).unwrap()) {
                    return true;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_vote_scenario() {
        let f = fixture();
        let post = f.service.create_post("alice", "Hello", "first").await.unwrap();
        assert_eq!(post.vote_count, 0);

        f.service.add_vote(&post.id, "bob", VoteValue::Up).await.unwrap();
        assert_eq!(f.service.get_post_by_id(&post.id).await.unwrap().vote_count, 1);

        f.service.add_vote(&post.id, "bob", VoteValue::Down).await.unwrap();
        assert_eq!(f.service.get_post_by_id(&post.id).await.unwrap().vote_count, -1);

        f.service.remove_vote(&post.id, "bob").await.unwrap();
        assert_eq!(f.service.get_post_by_id(&post.id).await.unwrap().vote_count, 0);

        // Removing again is a no-op.
        f.service.remove_vote(&post.id, "bob").await.unwrap();
    }

    #[tokio::test]
    async fn test_self_vote_is_forbidden() {
        let f = fixture();
        let post = f.service.create_post("alice", "Mine", "x").await.unwrap();
        let err = f.service.add_vote(&post.id, "alice", VoteValue::Up).await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden));
        assert!(f.db.get_votes_for_post(&post.id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_vote_on_missing_post() {
        let f = fixture();
        let err = f.service.add_vote("nope", "bob", VoteValue::Up).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound("post")));
    }

    #[tokio::test]
    async fn test_only_owner_may_update_or_delete() {
        let f = fixture();
        let post = f.service.create_post("alice", "Mine", "x").await.unwrap();

        let err = f.service.update_post(&post.id, "bob", "Stolen", "y").await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden));
        let err = f.service.delete_post(&post.id, "bob").await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden));

        f.service.add_vote(&post.id, "bob", VoteValue::Up).await.unwrap();
        let updated = f.service.update_post(&post.id, "alice", "Edited", "z").await.unwrap();
        assert_eq!(updated.title, "Edited");
        assert_eq!(updated.vote_count, 1);

        f.service.delete_post(&post.id, "alice").await.unwrap();
        let err = f.service.get_post_by_id(&post.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound("post")));
    }

    #[tokio::test]
    async fn test_listing_pages_and_metadata() {
        let f = fixture();
        for i in 0..3 {
            f.service.create_post("alice", &format!("t{i}"), "x").await.unwrap();
        }
        let filter = PaginateFilter {
            page: 2,
            page_size: 2,
            sort: "created_at".into(),
            sort_safelist: POST_SORT_SAFELIST,
        };
        let page = f.service.get_all_posts(filter.clone()).await.unwrap();
        assert_eq!(page.posts.len(), 1);
        assert_eq!(page.posts[0].title, "t2");
        assert_eq!(page.metadata.current_page, 2);
        assert_eq!(page.metadata.last_page, 2);
        assert_eq!(page.metadata.total_records, 3);

        let beyond = f.service.get_all_posts(PaginateFilter { page: 9, ..filter }).await.unwrap();
        assert!(beyond.posts.is_empty());
        assert_eq!(beyond.metadata, Metadata::default());
    }

    #[tokio::test]
    async fn test_top_posts_cache_hit_skips_store() {
        let f = fixture();
        let canned = PostsPage {
            posts: vec![],
            metadata: Metadata::calculate(42, 1, 5),
        };
        f.cache
            .set(TOP_POSTS_KEY, serde_json::to_string(&canned).unwrap(), Duration::from_secs(60))
            .unwrap();

        let page = f.service.get_all_posts(PaginateFilter::top_posts()).await.unwrap();
        assert_eq!(page, canned);
    }

    #[tokio::test]
    async fn test_vote_refreshes_snapshot_eventually() {
        let f = fixture();
        let post = f.service.create_post("alice", "Hot", "x").await.unwrap();
        f.service.add_vote(&post.id, "bob", VoteValue::Up).await.unwrap();

        let refreshed = wait_for_snapshot(&f.cache, |p| {
            p.posts.first().is_some_and(|top| top.id == post.id && top.vote_count == 1)
        })
        .await;
        assert!(refreshed);
    }

    #[tokio::test]
    async fn test_cache_miss_falls_through_and_schedules_fill() {
        let f = fixture();
        f.service.create_post("alice", "Cold", "x").await.unwrap();

        let page = f.service.get_all_posts(PaginateFilter::top_posts()).await.unwrap();
        assert_eq!(page.posts.len(), 1);
        assert!(wait_for_snapshot(&f.cache, |p| p.posts.len() == 1).await);
    }

    #[test]
    fn test_bad_timestamp_falls_back_to_epoch() {
        assert_eq!(parse_timestamp("yesterday"), DateTime::UNIX_EPOCH);
        let ts = parse_timestamp("2024-05-01T12:00:00.000000Z");
        assert_eq!(ts.to_rfc3339(), "2024-05-01T12:00:00+00:00");
    }
}
