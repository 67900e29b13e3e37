//! Repository Traits
//!
//! Interfaces for data persistence. Implementations are in infrastructure layer.

use platform::password::HashedPassword;

use crate::domain::session::{SessionData, SessionId};
use crate::error::SecurityResult;

/// Session storage trait
#[trait_variant::make(SessionRepository: Send)]
pub trait LocalSessionRepository {
    /// Load the data bag of a session
    async fn load(&self, id: &SessionId) -> SecurityResult<Option<SessionData>>;

    /// Create or replace the data bag of a session
    async fn save(&self, id: &SessionId, data: &SessionData) -> SecurityResult<()>;

    /// Delete a session; deleting an unknown session is not an error
    async fn destroy(&self, id: &SessionId) -> SecurityResult<()>;
}

/// Stored credential lookup
#[trait_variant::make(CredentialRepository: Send)]
pub trait LocalCredentialRepository {
    /// Find the stored password hash for a user name
    async fn find_hash(&self, user_name: &str) -> SecurityResult<Option<String>>;

    /// Replace the stored password hash (after a rehash)
    async fn update_hash(&self, user_name: &str, hash: &HashedPassword) -> SecurityResult<()>;
}
