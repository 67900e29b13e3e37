//! Platform Crate - Technical Infrastructure
//!
//! This crate provides the primitives the security layer is built from:
//! - Cryptographic utilities (SHA-512, URL-safe Base64, constant-time compare)
//! - Password hashing (bcrypt, Argon2i, Argon2id) with rehash detection
//! - Cookie management (session cookie issue/expiry)
//! - Rate limiting infrastructure (fixed-window accounting, store trait)
//! - Client identification (request context, fingerprint)
//! - Response header sink with "already sent" detection

pub mod client;
pub mod cookie;
pub mod crypto;
pub mod headers;
pub mod password;
pub mod rate_limit;
