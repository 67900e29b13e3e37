//! Sign Out Use Case

use crate::application::session_store::SessionStore;
use crate::domain::repository::SessionRepository;
use crate::error::SecurityResult;

/// Sign out use case
#[derive(Debug, Clone, Copy, Default)]
pub struct SignOutUseCase;

impl SignOutUseCase {
    pub fn new() -> Self {
        Self
    }

    /// Destroy the session; returns whether there was one to destroy
    pub async fn execute<R>(&self, session: &mut SessionStore<R>) -> SecurityResult<bool>
    where
        R: SessionRepository,
    {
        let stopped = session.stop().await?;
        if stopped {
            tracing::info!("User signed out");
        }
        Ok(stopped)
    }
}
