//! Collaborator interfaces for the two authentication channels
//!
//! The session machine never speaks the wire protocol itself; it drives a
//! set of externally supplied collaborators and reacts to the typed events
//! they emit. Trait methods that must be awaited use `Pin<Box<dyn Future>>`
//! returns for dyn-compatibility (`Arc<dyn TradeChannel>` etc.), the same
//! shape the rest of the codebase uses at its seams.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use common::Secret;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::credentials::{AccountIdentity, LoginCredentials};
use crate::session::SessionConfig;

/// Stable principal identity resolved by the connection channel once a logon
/// succeeds. Rendered as its 64-bit decimal form everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrincipalId(pub u64);

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result code attached to a resolved connection-channel logon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCode {
    Ok,
    InvalidCredentials,
    RateLimitExceeded,
    ServiceUnavailable,
    Other(u32),
}

impl ResultCode {
    pub fn is_ok(&self) -> bool {
        matches!(self, ResultCode::Ok)
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultCode::Ok => write!(f, "ok"),
            ResultCode::InvalidCredentials => write!(f, "invalid credentials"),
            ResultCode::RateLimitExceeded => write!(f, "rate limit exceeded"),
            ResultCode::ServiceUnavailable => write!(f, "service unavailable"),
            ResultCode::Other(code) => write!(f, "result code {code}"),
        }
    }
}

/// Errors surfaced by channel collaborators.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("cookie propagation failed: {0}")]
    Cookies(String),

    #[error("inventory fetch failed: {0}")]
    Inventory(String),

    #[error("channel transport error: {0}")]
    Transport(String),
}

/// Asynchronous events emitted by a session's channels.
///
/// Typed message passing replaces listener attachment: the session task is
/// the single consumer, so no two handlers for one account ever run
/// concurrently.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// The connection channel resolved a logon attempt.
    PrincipalEstablished {
        principal: PrincipalId,
        result: ResultCode,
    },
    /// The connection channel issued fresh short-lived web credentials.
    WebSessionReplaced {
        session_id: String,
        cookies: Vec<String>,
    },
    /// The connection channel dropped its authenticated state.
    ConnectionLost { reason: String },
    /// The web-session channel invalidated its cookies.
    WebSessionExpired { reason: String },
}

/// The persistent, protocol-level authenticated connection.
///
/// Logon completion is asynchronous: `log_on` returns immediately and the
/// outcome arrives as a [`ChannelEvent`].
pub trait ConnectionChannel: Send + Sync {
    /// Begin a connection-channel logon. `time_code` carries the short-lived
    /// two-factor credential when the account has a shared secret configured.
    fn log_on(&self, credentials: &LoginCredentials, time_code: Option<&str>);

    /// Ask an established connection for a fresh web session.
    fn refresh_web_session(&self);

    /// The resolved principal identity, if one is currently established.
    fn principal(&self) -> Option<PrincipalId>;
}

/// The short-lived, cookie-based credential channel.
pub trait WebChannel: Send + Sync {
    fn set_cookies<'a>(
        &'a self,
        cookies: &'a [String],
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

    /// Whether the current cookie set is still usable.
    fn session_valid(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>>;

    /// (Re)start the mobile-confirmation poller. `identity_secret` is passed
    /// in automatic mode and withheld in manual mode.
    fn start_confirmation_poller<'a>(
        &'a self,
        poll_interval: Duration,
        identity_secret: Option<&'a Secret<String>>,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
}

/// The trade-negotiation collaborator.
///
/// Consumes web-session cookies and, on success, reports the API key it
/// resolved for the account. Also owns the opaque resumable blob the caller
/// may persist across restarts; the session never interprets it.
pub trait TradeChannel: Send + Sync {
    fn set_cookies<'a>(
        &'a self,
        cookies: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<String, ChannelError>> + Send + 'a>>;

    /// Current resumable state blob for persistence by the caller.
    fn resumable_state(&self) -> serde_json::Value;

    /// Restore a previously persisted blob at construction time.
    fn resume(&self, state: serde_json::Value);
}

/// Derived one-time-credential generator for two-factor logons.
/// Cryptographic derivation itself is supplied externally.
pub trait TimeCodeGenerator: Send + Sync {
    fn current_code(&self, shared_secret: &Secret<String>) -> String;
}

/// One item returned by an inventory fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryItem {
    pub asset_id: String,
    pub app_id: u32,
    pub context_id: u64,
    pub amount: u32,
    pub tradable: bool,
    #[serde(default)]
    pub market_name: Option<String>,
}

/// Inventory retrieval collaborator, keyed by resolved principal identity.
pub trait InventoryClient: Send + Sync {
    fn fetch<'a>(
        &'a self,
        principal: PrincipalId,
        app_id: u32,
        context_id: u64,
        tradable_only: bool,
        retries: u32,
        language: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<InventoryItem>, ChannelError>> + Send + 'a>>;
}

/// The transport bundle for one account, built at registration time.
pub struct Channels {
    pub connection: Arc<dyn ConnectionChannel>,
    pub web: Arc<dyn WebChannel>,
    pub trade: Arc<dyn TradeChannel>,
    pub events: mpsc::UnboundedReceiver<ChannelEvent>,
}

/// Builds a [`Channels`] bundle for a newly registered account.
pub trait ChannelFactory: Send + Sync {
    fn connect(&self, identity: &AccountIdentity, config: &SessionConfig) -> Channels;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_code_ok_check() {
        assert!(ResultCode::Ok.is_ok());
        assert!(!ResultCode::InvalidCredentials.is_ok());
        assert!(!ResultCode::Other(63).is_ok());
    }

    #[test]
    fn result_code_display() {
        assert_eq!(ResultCode::InvalidCredentials.to_string(), "invalid credentials");
        assert_eq!(ResultCode::Other(84).to_string(), "result code 84");
    }

    #[test]
    fn principal_id_displays_as_decimal() {
        let principal = PrincipalId(76561197960265731);
        assert_eq!(principal.to_string(), "76561197960265731");
    }

    #[test]
    fn inventory_item_round_trips_through_json() {
        let json = r#"{"asset_id":"101","app_id":440,"context_id":2,"amount":1,"tradable":true}"#;
        let item: InventoryItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.asset_id, "101");
        assert_eq!(item.market_name, None);
    }
}
