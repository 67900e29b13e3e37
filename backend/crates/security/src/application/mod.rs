//! Application Layer
//!
//! Use cases and application services.

pub mod check_session;
pub mod config;
pub mod csrf;
pub mod orchestrator;
pub mod session_store;
pub mod sign_in;
pub mod sign_out;
pub mod throttler;

// Re-exports
pub use check_session::CheckSessionUseCase;
pub use config::{CsrfConfig, SecurityConfig, SessionConfig};
pub use csrf::CsrfGuard;
pub use orchestrator::SecurityOrchestrator;
pub use session_store::SessionStore;
pub use sign_in::{SignInInput, SignInOutput, SignInUseCase};
pub use sign_out::SignOutUseCase;
pub use throttler::Throttler;
