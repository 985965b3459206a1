/// API routes and handlers
pub mod upload;

use crate::context::AppContext;
use axum::Router;

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new().merge(upload::routes())
}
