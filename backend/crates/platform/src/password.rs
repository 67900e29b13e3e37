//! Password Hashing and Verification
//!
//! Credential hashing under a configurable algorithm with upgrade-in-place:
//! - bcrypt (modular crypt format, `$2b$<cost>$...`)
//! - Argon2i / Argon2id (PHC string format, `$argon2id$v=19$m=..,t=..,p=..$...`)
//! - Zeroization of clear text passwords
//! - Rehash detection against the current configuration
//!
//! ## Security Features
//! - bcrypt inputs longer than 72 bytes are rejected instead of silently
//!   truncated
//! - Verification runs the algorithm's own constant-time comparison
//! - A malformed stored hash costs the same work as a wrong password

use std::fmt;
use std::str::FromStr;

use argon2::{
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher as _, PasswordVerifier as _, Version,
    password_hash::SaltString,
};
use rand::rngs::OsRng;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

// ============================================================================
// Constants
// ============================================================================

/// bcrypt only reads the first 72 bytes of its input
pub const BCRYPT_MAX_PASSWORD_BYTES: usize = 72;

/// Default bcrypt work factor
pub const DEFAULT_BCRYPT_COST: u32 = 10;

/// Default Argon2 memory cost in KiB (64 MiB)
pub const DEFAULT_ARGON2_MEMORY_COST: u32 = 65_536;

/// Default Argon2 iterations
pub const DEFAULT_ARGON2_TIME_COST: u32 = 4;

/// Default Argon2 lanes
pub const DEFAULT_ARGON2_PARALLELISM: u32 = 1;

const BCRYPT_MIN_COST: u32 = 4;
const BCRYPT_MAX_COST: u32 = 31;
const BCRYPT_BODY_LEN: usize = 53;

/// Fixed input for timing-equalising work; valid under every algorithm
const DUMMY_PASSWORD: &str = "dummy-password-for-timing";

// ============================================================================
// Error Types
// ============================================================================

/// Password hashing/verification errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PasswordHashError {
    /// Input violates an algorithm constraint (caller bug, not retried)
    #[error("The password supplied is invalid: {0}")]
    InvalidInput(&'static str),

    /// Hasher configuration is out of range
    #[error("Invalid password hasher configuration: {0}")]
    InvalidConfig(String),

    /// Hashing operation failed
    #[error("Password hashing failed: {0}")]
    HashingFailed(String),

    /// Stored hash is not a recognised bcrypt/Argon2 string
    #[error("Invalid password hash format")]
    InvalidHashFormat,
}

// ============================================================================
// Configuration
// ============================================================================

/// Supported hashing algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashAlgorithm {
    Bcrypt,
    Argon2i,
    #[default]
    Argon2id,
}

impl HashAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Bcrypt => "bcrypt",
            HashAlgorithm::Argon2i => "argon2i",
            HashAlgorithm::Argon2id => "argon2id",
        }
    }
}

impl FromStr for HashAlgorithm {
    type Err = PasswordHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bcrypt" | "2y" | "2b" => Ok(HashAlgorithm::Bcrypt),
            "argon2i" => Ok(HashAlgorithm::Argon2i),
            "argon2id" => Ok(HashAlgorithm::Argon2id),
            other => Err(PasswordHashError::InvalidConfig(format!(
                "unknown algorithm `{other}`"
            ))),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// bcrypt parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BcryptParams {
    /// Work factor (log2 rounds), 4..=31
    pub cost: u32,
}

impl Default for BcryptParams {
    fn default() -> Self {
        Self {
            cost: DEFAULT_BCRYPT_COST,
        }
    }
}

/// Argon2 parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Argon2Params {
    /// Memory cost in KiB
    pub memory_cost: u32,
    /// Number of iterations
    pub time_cost: u32,
    /// Degree of parallelism (lanes)
    pub parallelism: u32,
}

impl Default for Argon2Params {
    fn default() -> Self {
        Self {
            memory_cost: DEFAULT_ARGON2_MEMORY_COST,
            time_cost: DEFAULT_ARGON2_TIME_COST,
            parallelism: DEFAULT_ARGON2_PARALLELISM,
        }
    }
}

impl Argon2Params {
    fn to_params(self) -> Result<Params, PasswordHashError> {
        Params::new(self.memory_cost, self.time_cost, self.parallelism, None)
            .map_err(|e| PasswordHashError::InvalidConfig(e.to_string()))
    }
}

/// Password hasher configuration
///
/// Only the parameters of the selected `algorithm` are used for new hashes,
/// but both sets are validated so a later algorithm switch cannot fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HasherConfig {
    pub algorithm: HashAlgorithm,
    pub bcrypt: BcryptParams,
    pub argon2: Argon2Params,
}

impl HasherConfig {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self {
            algorithm,
            ..Default::default()
        }
    }

    /// Validate all parameters are positive and within algorithm limits
    pub fn validate(&self) -> Result<(), PasswordHashError> {
        let cost = self.bcrypt.cost;
        if !(BCRYPT_MIN_COST..=BCRYPT_MAX_COST).contains(&cost) {
            return Err(PasswordHashError::InvalidConfig(format!(
                "bcrypt cost must be between {BCRYPT_MIN_COST} and {BCRYPT_MAX_COST} (got {cost})"
            )));
        }

        let argon = self.argon2;
        if argon.memory_cost == 0 || argon.time_cost == 0 || argon.parallelism == 0 {
            return Err(PasswordHashError::InvalidConfig(
                "argon2 costs must be positive integers".to_string(),
            ));
        }
        argon.to_params()?;

        Ok(())
    }
}

// ============================================================================
// Clear Text Password (Zeroized on drop)
// ============================================================================

/// Clear text password with automatic memory zeroization
///
/// - Does not implement `Clone` to prevent accidental copies
/// - Debug output is redacted
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct ClearTextPassword(String);

impl ClearTextPassword {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for ClearTextPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ClearTextPassword")
            .field(&"[REDACTED]")
            .finish()
    }
}

// ============================================================================
// Hashed Password (Safe to store)
// ============================================================================

/// Algorithm-tagged hash string as produced by [`PasswordHasher::compute`]
#[derive(Clone, PartialEq, Eq)]
pub struct HashedPassword {
    hash: String,
}

impl HashedPassword {
    pub fn as_str(&self) -> &str {
        &self.hash
    }
}

impl fmt::Debug for HashedPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashedPassword")
            .field("hash", &"[HASH]")
            .finish()
    }
}

impl AsRef<str> for HashedPassword {
    fn as_ref(&self) -> &str {
        &self.hash
    }
}

// ============================================================================
// Stored Hash (parsed algorithm tag)
// ============================================================================

/// Algorithm and parameters embedded in a stored hash
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoredHash {
    Bcrypt(BcryptParams),
    Argon2i(Argon2Params),
    Argon2id(Argon2Params),
}

impl StoredHash {
    /// Parse the algorithm tag and parameters of a stored hash
    pub fn parse(hash: &str) -> Result<Self, PasswordHashError> {
        if hash.starts_with("$2") {
            return parse_bcrypt(hash);
        }

        let parsed = PasswordHash::new(hash).map_err(|_| PasswordHashError::InvalidHashFormat)?;
        let algorithm = Algorithm::try_from(parsed.algorithm)
            .map_err(|_| PasswordHashError::InvalidHashFormat)?;
        let params = Params::try_from(&parsed).map_err(|_| PasswordHashError::InvalidHashFormat)?;
        let params = Argon2Params {
            memory_cost: params.m_cost(),
            time_cost: params.t_cost(),
            parallelism: params.p_cost(),
        };

        match algorithm {
            Algorithm::Argon2i => Ok(StoredHash::Argon2i(params)),
            Algorithm::Argon2id => Ok(StoredHash::Argon2id(params)),
            // Argon2d is never produced by this hasher
            _ => Err(PasswordHashError::InvalidHashFormat),
        }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        match self {
            StoredHash::Bcrypt(_) => HashAlgorithm::Bcrypt,
            StoredHash::Argon2i(_) => HashAlgorithm::Argon2i,
            StoredHash::Argon2id(_) => HashAlgorithm::Argon2id,
        }
    }
}

/// `$2a$`, `$2b$`, `$2x$`, `$2y$` followed by a two digit cost and a 53 char body
fn parse_bcrypt(hash: &str) -> Result<StoredHash, PasswordHashError> {
    let mut parts = hash.split('$');
    let (Some(""), Some(variant), Some(cost), Some(body), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return Err(PasswordHashError::InvalidHashFormat);
    };

    if !matches!(variant, "2a" | "2b" | "2x" | "2y") || body.len() != BCRYPT_BODY_LEN {
        return Err(PasswordHashError::InvalidHashFormat);
    }

    let cost: u32 = cost
        .parse()
        .map_err(|_| PasswordHashError::InvalidHashFormat)?;

    Ok(StoredHash::Bcrypt(BcryptParams { cost }))
}

// ============================================================================
// Password Hasher
// ============================================================================

/// Computes, verifies and migrates credential hashes
///
/// ## Examples
/// ```rust
/// use platform::password::{ClearTextPassword, HashAlgorithm, HasherConfig, PasswordHasher};
///
/// let mut config = HasherConfig::new(HashAlgorithm::Bcrypt);
/// config.bcrypt.cost = 4;
/// let hasher = PasswordHasher::new(config)?;
///
/// let password = ClearTextPassword::new("correct horse");
/// let hashed = hasher.compute(&password)?;
/// assert!(hasher.verify(&password, hashed.as_str()));
/// assert!(!hasher.needs_rehash(hashed.as_str()));
/// # Ok::<(), platform::password::PasswordHashError>(())
/// ```
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    config: HasherConfig,
}

impl PasswordHasher {
    /// Create a hasher; the configuration is validated here, never later
    pub fn new(config: HasherConfig) -> Result<Self, PasswordHashError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &HasherConfig {
        &self.config
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.config.algorithm
    }

    /// Compute a new hash under the configured algorithm
    ///
    /// ## Errors
    /// - `InvalidInput` for bcrypt passwords longer than 72 bytes or
    ///   containing NUL bytes (both would be silently truncated)
    pub fn compute(
        &self,
        password: &ClearTextPassword,
    ) -> Result<HashedPassword, PasswordHashError> {
        let hash = match self.config.algorithm {
            HashAlgorithm::Bcrypt => {
                let bytes = password.as_bytes();
                if bytes.len() > BCRYPT_MAX_PASSWORD_BYTES {
                    return Err(PasswordHashError::InvalidInput(
                        "bcrypt passwords must not exceed 72 bytes",
                    ));
                }
                if bytes.contains(&0) {
                    return Err(PasswordHashError::InvalidInput(
                        "bcrypt passwords must not contain NUL bytes",
                    ));
                }
                bcrypt::hash(bytes, self.config.bcrypt.cost)
                    .map_err(|e| PasswordHashError::HashingFailed(e.to_string()))?
            }
            HashAlgorithm::Argon2i => self.argon2_hash(Algorithm::Argon2i, password)?,
            HashAlgorithm::Argon2id => self.argon2_hash(Algorithm::Argon2id, password)?,
        };

        Ok(HashedPassword { hash })
    }

    fn argon2_hash(
        &self,
        algorithm: Algorithm,
        password: &ClearTextPassword,
    ) -> Result<String, PasswordHashError> {
        // Generate random salt (128 bits = 16 bytes)
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::new(algorithm, Version::V0x13, self.config.argon2.to_params()?);

        argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| PasswordHashError::HashingFailed(e.to_string()))
    }

    /// Verify a password against a stored hash of any supported algorithm
    ///
    /// The stored hash decides the algorithm, not the current configuration,
    /// so records written before an algorithm switch keep verifying.
    pub fn verify(&self, password: &ClearTextPassword, hash: &str) -> bool {
        let stored = match StoredHash::parse(hash) {
            Ok(stored) => stored,
            Err(_) => {
                // Spend the same work as a real verification
                let _ = self.compute(&ClearTextPassword::new(DUMMY_PASSWORD));
                tracing::debug!("Password verification against malformed hash");
                return false;
            }
        };

        match stored {
            StoredHash::Bcrypt(_) => {
                let bytes = password.as_bytes();
                // bcrypt truncates at 72 bytes and at NUL, so such input never matches
                if bytes.len() > BCRYPT_MAX_PASSWORD_BYTES || bytes.contains(&0) {
                    let _ = bcrypt::verify(DUMMY_PASSWORD, hash);
                    tracing::debug!("Password verification with input bcrypt cannot represent");
                    return false;
                }
                bcrypt::verify(bytes, hash).unwrap_or(false)
            }
            StoredHash::Argon2i(_) | StoredHash::Argon2id(_) => {
                let Ok(parsed) = PasswordHash::new(hash) else {
                    return false;
                };
                // Argon2 uses constant-time comparison internally
                Argon2::default()
                    .verify_password(password.as_bytes(), &parsed)
                    .is_ok()
            }
        }
    }

    /// Check whether a stored hash was produced under a different
    /// algorithm or different parameters than the current configuration
    ///
    /// Unparseable hashes always need a rehash.
    pub fn needs_rehash(&self, hash: &str) -> bool {
        let Ok(stored) = StoredHash::parse(hash) else {
            return true;
        };

        match (self.config.algorithm, stored) {
            (HashAlgorithm::Bcrypt, StoredHash::Bcrypt(params)) => params != self.config.bcrypt,
            (HashAlgorithm::Argon2i, StoredHash::Argon2i(params))
            | (HashAlgorithm::Argon2id, StoredHash::Argon2id(params)) => {
                params != self.config.argon2
            }
            _ => true,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
