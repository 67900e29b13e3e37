//! Shared Kernel - Cross-crate error vocabulary
//!
//! This crate contains the vocabulary every security component reports
//! failures in:
//! - [`error::kind::ErrorKind`] - HTTP-facing classification
//! - [`error::app_error::AppError`] - unified error carrying message, action
//!   and response headers (e.g. rate-limit metadata)
//!
//! **Design Principle**: Only include things whose meaning is identical in
//! every crate of the workspace.

pub mod error {
    pub mod app_error;
    pub mod conversions;
    pub mod kind;
}
