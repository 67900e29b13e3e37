//! Sign In Use Case
//!
//! Verifies credentials, upgrades outdated hashes, and marks the session as
//! logged in.

use std::sync::Arc;

use platform::password::{ClearTextPassword, PasswordHasher};
use serde_json::Value;

use crate::application::session_store::SessionStore;
use crate::domain::repository::{CredentialRepository, SessionRepository};
use crate::error::{SecurityError, SecurityResult};

/// Session key holding the signed-in user name
pub const USER_KEY: &str = "user";

/// Sign in input
pub struct SignInInput {
    pub user_name: String,
    pub password: ClearTextPassword,
}

/// Sign in output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignInOutput {
    pub user_name: String,
    /// The stored hash was replaced under the current configuration
    pub rehashed: bool,
}

/// Sign in use case
pub struct SignInUseCase<C>
where
    C: CredentialRepository,
{
    credentials: Arc<C>,
    hasher: Arc<PasswordHasher>,
    logged_in_key: String,
}

impl<C> SignInUseCase<C>
where
    C: CredentialRepository,
{
    pub fn new(
        credentials: Arc<C>,
        hasher: Arc<PasswordHasher>,
        logged_in_key: impl Into<String>,
    ) -> Self {
        Self {
            credentials,
            hasher,
            logged_in_key: logged_in_key.into(),
        }
    }

    pub async fn execute<R>(
        &self,
        session: &mut SessionStore<R>,
        input: SignInInput,
    ) -> SecurityResult<SignInOutput>
    where
        R: SessionRepository,
    {
        if !session.exists() {
            return Err(SecurityError::SessionNotActive);
        }

        let stored = self.credentials.find_hash(&input.user_name).await?;

        // Unknown users still pay for one hash computation
        let valid = self
            .hasher
            .verify(&input.password, stored.as_deref().unwrap_or_default());
        let Some(stored) = stored.filter(|_| valid) else {
            tracing::warn!(client = %session.context().identity(), "Invalid login attempt");
            return Err(SecurityError::InvalidCredentials);
        };

        let mut rehashed = false;
        if self.hasher.needs_rehash(&stored) {
            // A password the current algorithm cannot take keeps its old hash
            match self.hasher.compute(&input.password) {
                Ok(upgraded) => {
                    self.credentials
                        .update_hash(&input.user_name, &upgraded)
                        .await?;
                    rehashed = true;
                    tracing::info!(
                        algorithm = %self.hasher.algorithm(),
                        "Password hash upgraded"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        algorithm = %self.hasher.algorithm(),
                        error = %e,
                        "Password hash upgrade skipped"
                    );
                }
            }
        }

        session.regenerate(true).await?;
        session.put(self.logged_in_key.clone(), true);
        session.put(USER_KEY, Value::String(input.user_name.clone()));

        tracing::info!(
            session = %session.id().map(|id| id.short()).unwrap_or_default(),
            "User signed in"
        );

        Ok(SignInOutput {
            user_name: input.user_name,
            rehashed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::config::{HashAlgorithm, HasherConfig, SessionConfig};
    use crate::infra::memory::{MemoryCredentialRepository, MemorySessionRepository};
    use platform::client::RequestContext;
    use platform::password::{Argon2Params, BcryptParams, StoredHash};

    fn fast(algorithm: HashAlgorithm) -> PasswordHasher {
        PasswordHasher::new(HasherConfig {
            algorithm,
            bcrypt: BcryptParams { cost: 4 },
            argon2: Argon2Params {
                memory_cost: 1024,
                time_cost: 1,
                parallelism: 1,
            },
        })
        .unwrap()
    }

    async fn session() -> SessionStore<MemorySessionRepository> {
        let ctx = RequestContext::default()
            .with_remote_addr("192.0.2.44".parse().unwrap())
            .with_user_agent("Mozilla/5.0")
            .with_target("/login");
        SessionStore::open(
            Arc::new(MemorySessionRepository::new()),
            SessionConfig::development(),
            ctx,
        )
        .await
        .unwrap()
    }

    fn input(user_name: &str, password: &str) -> SignInInput {
        SignInInput {
            user_name: user_name.to_string(),
            password: ClearTextPassword::new(password),
        }
    }

    #[tokio::test]
    async fn test_sign_in_marks_session() {
        let hasher = fast(HashAlgorithm::Argon2id);
        let credentials = Arc::new(MemoryCredentialRepository::new());
        let hash = hasher.compute(&ClearTextPassword::new("correct horse")).unwrap();
        credentials.insert("alice", hash.as_str());

        let use_case = SignInUseCase::new(credentials, Arc::new(hasher), "logged_in");
        let mut store = session().await;
        let before = store.id().unwrap().clone();

        let output = use_case
            .execute(&mut store, input("alice", "correct horse"))
            .await
            .unwrap();
        assert_eq!(output.user_name, "alice");
        assert!(!output.rehashed);
        assert_eq!(store.get("logged_in", Value::Null), Value::Bool(true));
        assert_eq!(store.get(USER_KEY, Value::Null), Value::from("alice"));
        assert_ne!(store.id().unwrap(), &before);
    }

    #[tokio::test]
    async fn test_sign_in_rejects_bad_credentials() {
        let hasher = fast(HashAlgorithm::Bcrypt);
        let credentials = Arc::new(MemoryCredentialRepository::new());
        let hash = hasher.compute(&ClearTextPassword::new("secret")).unwrap();
        credentials.insert("bob", hash.as_str());

        let use_case = SignInUseCase::new(credentials, Arc::new(hasher), "logged_in");
        let mut store = session().await;

        for (user, password) in [("bob", "wrong"), ("nobody", "secret")] {
            assert!(matches!(
                use_case.execute(&mut store, input(user, password)).await,
                Err(SecurityError::InvalidCredentials)
            ));
        }
        assert!(!store.has("logged_in"));
    }

    #[tokio::test]
    async fn test_sign_in_upgrades_outdated_hash() {
        let credentials = Arc::new(MemoryCredentialRepository::new());
        let legacy = fast(HashAlgorithm::Bcrypt)
            .compute(&ClearTextPassword::new("secret"))
            .unwrap();
        credentials.insert("carol", legacy.as_str());

        let hasher = fast(HashAlgorithm::Argon2id);
        let use_case = SignInUseCase::new(credentials.clone(), Arc::new(hasher), "logged_in");
        let mut store = session().await;

        let output = use_case
            .execute(&mut store, input("carol", "secret"))
            .await
            .unwrap();
        assert!(output.rehashed);

        let upgraded = credentials.find_hash("carol").await.unwrap().unwrap();
        assert_eq!(
            StoredHash::parse(&upgraded).unwrap().algorithm(),
            HashAlgorithm::Argon2id
        );
    }

    #[tokio::test]
    async fn test_sign_in_keeps_hash_the_new_algorithm_cannot_take() {
        // 80 bytes: fine for Argon2, over the bcrypt limit
        let long_password = "p".repeat(80);
        let credentials = Arc::new(MemoryCredentialRepository::new());
        let legacy = fast(HashAlgorithm::Argon2id)
            .compute(&ClearTextPassword::new(long_password.as_str()))
            .unwrap();
        credentials.insert("dave", legacy.as_str());

        let hasher = fast(HashAlgorithm::Bcrypt);
        let use_case = SignInUseCase::new(credentials.clone(), Arc::new(hasher), "logged_in");
        let mut store = session().await;

        let output = use_case
            .execute(&mut store, input("dave", &long_password))
            .await
            .unwrap();
        assert!(!output.rehashed);
        assert_eq!(store.get("logged_in", Value::Null), Value::Bool(true));
        assert_eq!(
            credentials.find_hash("dave").await.unwrap().as_deref(),
            Some(legacy.as_str())
        );
    }

    #[tokio::test]
    async fn test_sign_in_requires_session() {
        let use_case = SignInUseCase::new(
            Arc::new(MemoryCredentialRepository::new()),
            Arc::new(fast(HashAlgorithm::Argon2id)),
            "logged_in",
        );
        let mut store = SessionStore::new(
            Arc::new(MemorySessionRepository::new()),
            SessionConfig::development(),
            RequestContext::default(),
        );
        assert!(matches!(
            use_case.execute(&mut store, input("alice", "pw")).await,
            Err(SecurityError::SessionNotActive)
        ));
    }
}
