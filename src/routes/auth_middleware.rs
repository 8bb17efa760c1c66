use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum::http::StatusCode;
use std::sync::Arc;
use tracing::{error, info};

use crate::models::ErrorResponse;
use crate::services::auth_service::get_auth_token;
use crate::AppState;

/// Resolve the bearer credential and attach the `Identity` for handlers
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let token = match get_auth_token(req.headers(), None) {
        Ok(token) => token,
        Err(e) => {
            info!("Rejected API request without credential: {}", e);
            return ErrorResponse::reply(StatusCode::UNAUTHORIZED, e).into_response();
        }
    };

    let identity = match state.verifier.verify(Some(&token)).await {
        Ok(identity) => identity,
        Err(e) => {
            error!("API token validation failed: {}", e);
            return ErrorResponse::reply(StatusCode::UNAUTHORIZED, e.to_string()).into_response();
        }
    };

    req.extensions_mut().insert(identity);
    next.run(req).await
}
