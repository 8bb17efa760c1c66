pub mod auth_service;
pub mod sync_service;

pub use auth_service::{IdentityProvider, JwtVerifier};
pub use sync_service::SyncCoordinator;
