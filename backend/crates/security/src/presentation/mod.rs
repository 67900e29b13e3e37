//! Presentation Layer
//!
//! HTTP handlers, DTOs, request extractors, and router.

pub mod dto;
pub mod extract;
pub mod handlers;
pub mod router;

pub use extract::Client;
pub use handlers::SecurityAppState;
pub use router::security_router;
