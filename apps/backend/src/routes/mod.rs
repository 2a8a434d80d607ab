mod problems;
pub mod review;

use axum::Router;
use std::sync::Arc;

use crate::AppState;

pub use review::CardLocks;

pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/problems", problems::router())
        .nest("/review", review::router())
}
