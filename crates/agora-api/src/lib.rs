pub mod auth;
pub mod credentials;
pub mod error;
pub mod middleware;
pub mod posts;
pub mod routes;
pub mod service;
pub mod state;
pub mod store;
pub mod tokens;
pub mod top_posts;
pub mod votes;

pub use error::{AuthError, ServiceError};
pub use routes::build_router;
pub use state::{AppState, AppStateInner, Settings};
