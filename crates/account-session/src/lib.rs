//! Per-account session machinery
//!
//! Everything that belongs to a single managed account lives here: credential
//! material, the collaborator interfaces for the two authentication channels,
//! the exponential login backoff, and the login state machine task. The
//! `account-pool` crate composes these into an orchestrated collection.
//!
//! Session lifecycle:
//! 1. Pool registers an account → channel factory builds the transport,
//!    a session task is spawned, the caller gets a `SessionHandle`
//! 2. First `login()` call is the bootstrap: its outcome resolves the
//!    caller's future; every later call is fire-and-forget
//! 3. The connection channel reports `PrincipalEstablished`, then hands out
//!    short-lived web credentials via `WebSessionReplaced`
//! 4. Cookies are propagated to the web and trade collaborators; success
//!    resets the backoff, failure schedules a retry
//! 5. `ConnectionLost` / `WebSessionExpired` re-enter the login path with
//!    exponential backoff, indefinitely

pub mod backoff;
pub mod channel;
pub mod credentials;
pub mod event;
mod metrics;
pub mod session;
pub mod sim;

pub use backoff::Backoff;
pub use channel::{
    ChannelError, ChannelEvent, ChannelFactory, Channels, ConnectionChannel, InventoryClient,
    InventoryItem, PrincipalId, ResultCode, TimeCodeGenerator, TradeChannel, WebChannel,
};
pub use credentials::{AccountIdentity, ConfirmationConfig, ConfirmationMode, LoginCredentials};
pub use event::{LogEvent, LogLevel};
pub use session::{LoginBudget, SessionConfig, SessionError, SessionHandle};
