//! API routes — the §6 HTTP surface.

use axum::Router;

use crate::AppState;

mod approvals;
mod tasks;

pub fn api_router() -> Router<AppState> {
    Router::new()
        .nest("/tasks", tasks::router())
        .nest("/approvals", approvals::router())
}
