//! Infrastructure Layer
//!
//! Storage backend implementations.

pub mod memory;

pub use memory::{MemoryCredentialRepository, MemoryRateLimitStore, MemorySessionRepository};
