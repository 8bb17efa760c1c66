use crate::{
    handlers::{diagnostics, health_check, ready_check},
    routes::auth_middleware::auth_middleware,
    AppState,
};
use axum::{middleware, routing::get, Router};
use std::sync::Arc;

/// Create API routes
pub fn create_api_routes(state: Arc<AppState>) -> Router {
    let protected = Router::<Arc<AppState>>::new()
        .route("/v1/diagnostics", get(diagnostics))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::<Arc<AppState>>::new()
        .route("/v1/health", get(health_check))
        .route("/v1/ready", get(ready_check))
        .merge(protected)
        .with_state(state)
}
