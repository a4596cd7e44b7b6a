//! Common types for the account session pool

mod secret;
mod error;

pub use secret::Secret;
pub use error::{Error, Result};
