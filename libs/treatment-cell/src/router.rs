use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, put},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn treatment_routes(state: Arc<AppConfig>) -> Router {
    let protected_routes = Router::new()
        .route("/appointments/{appointment_id}", put(handlers::attach_treatment))
        .route("/appointments/{appointment_id}", get(handlers::get_treatment))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
