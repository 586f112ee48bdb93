use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn availability_routes(state: Arc<AppConfig>) -> Router {
    let protected_routes = Router::new()
        .route("/doctors/{doctor_id}/windows", post(handlers::create_window))
        .route("/doctors/{doctor_id}/windows", get(handlers::list_windows))
        .route("/windows/{window_id}", delete(handlers::delete_window))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
