use std::sync::Arc;
use std::time::Duration;

use argon2::Params;
use chrono::TimeDelta;

use agora_cache::KvCache;
use agora_db::Database;

use crate::credentials::Credentials;
use crate::service::PostService;
use crate::store::DEFAULT_STORE_TIMEOUT;
use crate::tokens::TokenService;
use crate::top_posts::DEFAULT_TOP_POSTS_TTL;

pub type AppState = Arc<AppStateInner>;

/// Knobs the binary reads from its environment.
#[derive(Clone)]
pub struct Settings {
    pub jwt_secret: String,
    pub access_token_ttl: TimeDelta,
    pub top_posts_ttl: Duration,
    pub store_timeout: Duration,
    pub password_params: Params,
}

impl Settings {
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            access_token_ttl: TimeDelta::hours(24),
            top_posts_ttl: DEFAULT_TOP_POSTS_TTL,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            password_params: Params::default(),
        }
    }
}

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub posts: PostService,
    pub tokens: TokenService,
    pub credentials: Credentials,
    pub store_timeout: Duration,
}

impl AppStateInner {
    /// One cache backs both the top posts snapshot and the token denylist;
    /// their keys never collide. Must be called inside a Tokio runtime.
    pub fn new(db: Arc<Database>, cache: Arc<dyn KvCache>, settings: Settings) -> AppState {
        let posts = PostService::new(
            Arc::clone(&db),
            Arc::clone(&cache),
            settings.top_posts_ttl,
            settings.store_timeout,
        );
        let tokens = TokenService::new(&settings.jwt_secret, settings.access_token_ttl, cache);

        Arc::new(Self {
            db,
            posts,
            tokens,
            credentials: Credentials::new(settings.password_params),
            store_timeout: settings.store_timeout,
        })
    }
}
