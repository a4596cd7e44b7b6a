//! Session pool orchestrator
//!
//! Owns a collection of account sessions and coordinates their independently
//! failing login state machines under one shared constraint: the rolling
//! login-rate budget. Registration enforces identity uniqueness, batch
//! operations are all-or-nothing, and every session's log events are
//! republished on a single broadcast stream.
//!
//! Account lifecycle:
//! 1. Caller registers an account → channel factory builds the transport,
//!    a session task starts, status is observable via the returned handle
//! 2. `add_and_login` resolves once the bootstrap login settles; bootstrap
//!    failure rejects the call but leaves the account registered
//! 3. Re-logins (self-healing or caller-driven) pass through the pool-wide
//!    limiter and retry with exponential backoff forever
//! 4. Callers pick accounts by classification through the rotation selector
//! 5. `shutdown()` stops every session task and cancels pending retries

pub mod config;
pub mod error;
pub mod limiter;
pub mod pool;
mod select;

pub use config::Config;
pub use error::{Error, Result};
pub use limiter::{LoginLimiter, spawn_reset_task};
pub use pool::{OwnedItem, Pool, PoolOptions};
