//! Security (Session / CSRF / Throttling) Backend Module
//!
//! Clean Architecture structure:
//! - `domain/` - Session identifiers, form fields, repository traits
//! - `application/` - Session store, CSRF guard, throttler, orchestrator, use cases
//! - `infra/` - In-memory backends
//! - `presentation/` - HTTP extractor, handlers, DTOs, router
//!
//! ## Features
//! - Cookie-based server-side sessions with regeneration and flash values
//! - Origin-bound CSRF tokens
//! - Password hashing with bcrypt, Argon2i or Argon2id
//! - Fixed-window rate limiting per client
//!
//! ## Security Model
//! - Sessions bound to a client fingerprint (IP + User-Agent)
//! - Unknown session identifiers are replaced, never adopted
//! - Token and fingerprint comparisons run in constant time
//! - State-changing requests pass CSRF verification before consuming rate budget

pub mod application;
pub mod domain;
pub mod error;
pub mod infra;
pub mod presentation;


// Re-exports for convenience
pub use application::config::SecurityConfig;
pub use application::orchestrator::SecurityOrchestrator;
pub use error::{SecurityError, SecurityResult};
pub use infra::memory::{MemoryCredentialRepository, MemoryRateLimitStore, MemorySessionRepository};
pub use presentation::handlers::SecurityAppState;
pub use presentation::router::security_router;

// Re-export kernel error types for unified error handling
pub use kernel::error::{
    app_error::{AppError, AppResult},
    kind::ErrorKind,
};

pub mod config {
    pub use crate::application::config::*;
}

pub mod handlers {
    pub use crate::presentation::handlers::*;
}

pub mod router {
    pub use crate::presentation::router::*;
}
