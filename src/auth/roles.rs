use axum::{http::StatusCode, Json};

use crate::models::ErrorResponse;
use crate::ws::Identity;

pub const ADMIN_ROLE: &str = "admin";

pub fn is_admin(identity: &Identity) -> bool {
    identity.has_role(ADMIN_ROLE)
}

pub fn ensure_admin(identity: &Identity) -> Result<(), (StatusCode, Json<ErrorResponse>)> {
    if is_admin(identity) {
        return Ok(());
    }
    Err(ErrorResponse::reply(StatusCode::FORBIDDEN, "Admin access required"))
}
