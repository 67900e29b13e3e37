//! Security Router

use axum::{Router, routing::get};
use platform::rate_limit::RateLimitStore;

use crate::domain::repository::{CredentialRepository, SessionRepository};
use crate::presentation::handlers::{self, SecurityAppState};

/// Create the security router for any backend implementation
pub fn security_router<R, L, C>(state: SecurityAppState<R, L, C>) -> Router
where
    R: SessionRepository + Send + Sync + 'static,
    L: RateLimitStore + Send + Sync + 'static,
    C: CredentialRepository + Send + Sync + 'static,
{
    Router::new()
        .route(
            "/login",
            get(handlers::login_form::<R, L, C>).post(handlers::sign_in::<R, L, C>),
        )
        .route(
            "/logout",
            get(handlers::logout_form::<R, L, C>).post(handlers::sign_out::<R, L, C>),
        )
        .route("/status", get(handlers::session_status::<R, L, C>))
        .with_state(state)
}
