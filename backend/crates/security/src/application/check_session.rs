//! Check Session Use Case
//!
//! Reports whether the current session belongs to a signed-in user.

use crate::application::session_store::SessionStore;
use crate::domain::repository::SessionRepository;
use crate::domain::session::is_truthy;
use crate::error::{SecurityError, SecurityResult};

/// Check session use case
#[derive(Debug, Clone)]
pub struct CheckSessionUseCase {
    logged_in_key: String,
}

impl CheckSessionUseCase {
    pub fn new(logged_in_key: impl Into<String>) -> Self {
        Self {
            logged_in_key: logged_in_key.into(),
        }
    }

    /// Whether the user is logged in
    ///
    /// Without an active session this is an error, not `false`.
    pub fn logged_in<R>(&self, session: &SessionStore<R>) -> SecurityResult<bool>
    where
        R: SessionRepository,
    {
        if !session.exists() {
            return Err(SecurityError::SessionNotActive);
        }
        Ok(session.value(&self.logged_in_key).is_some_and(is_truthy))
    }
}
