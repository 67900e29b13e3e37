//! Domain Layer
//!
//! Session entity, submitted form fields, and repository traits.

pub mod form;
pub mod repository;
pub mod session;

// Re-exports
pub use form::FormFields;
pub use repository::{CredentialRepository, SessionRepository};
pub use session::{SessionData, SessionId, SessionState};
