//! Error types for pool operations
//!
//! Rate-limited and duplicate-in-flight login requests are deliberately not
//! errors: they defer silently and surface on the log stream only.

use account_session::SessionError;

/// Errors from pool operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("duplicate identity: {0}")]
    DuplicateIdentity(String),

    #[error("no account matching {0}")]
    NoMatchingAccount(String),

    #[error("bootstrap login failed: {0}")]
    Bootstrap(#[from] SessionError),

    #[error("account {0} has no established principal")]
    NotLoggedIn(String),

    #[error("inventory retrieval failed: {0}")]
    Inventory(String),
}

/// Result alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;
