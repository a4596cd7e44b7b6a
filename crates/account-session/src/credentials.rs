//! Account identity and credential material

use std::time::Duration;

use common::Secret;
use serde::Deserialize;

/// Immutable identity of a managed account.
///
/// `id` is an optional stable application-level identifier that survives an
/// account-name change; `kind`/`subkind` are caller-assigned classification
/// tags used only for selection and rotation, never for authentication.
#[derive(Debug, Clone, Default)]
pub struct AccountIdentity {
    pub account_name: String,
    pub id: Option<String>,
    pub kind: Option<String>,
    pub subkind: Option<String>,
}

impl AccountIdentity {
    pub fn named(account_name: impl Into<String>) -> Self {
        Self {
            account_name: account_name.into(),
            ..Self::default()
        }
    }
}

/// Credentials handed to the connection channel at logon time.
///
/// `shared_secret` feeds the time-code generator for automated two-factor
/// logons; `identity_secret` signs mobile confirmations. Both are optional
/// and both stay redacted in logs via [`Secret`].
#[derive(Debug, Clone)]
pub struct LoginCredentials {
    pub account_name: String,
    pub password: Secret<String>,
    pub shared_secret: Option<Secret<String>>,
    pub identity_secret: Option<Secret<String>>,
    pub proxy: Option<String>,
}

impl LoginCredentials {
    pub fn new(account_name: impl Into<String>, password: impl Into<Secret<String>>) -> Self {
        Self {
            account_name: account_name.into(),
            password: password.into(),
            shared_secret: None,
            identity_secret: None,
            proxy: None,
        }
    }
}

/// How the confirmation poller is started once a web session is live.
///
/// `Auto` passes the identity secret to the poller so it accepts every mobile
/// confirmation on its own; `Manual` starts the poller without the secret and
/// leaves key generation to the collaborator's own callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationMode {
    Auto,
    Manual,
}

/// Confirmation-poller behaviour for an account.
#[derive(Debug, Clone)]
pub struct ConfirmationConfig {
    pub mode: ConfirmationMode,
    pub poll_interval: Duration,
}

impl ConfirmationConfig {
    /// 10 seconds is a safe default that avoids rate limiting on the
    /// confirmation endpoint.
    pub fn auto() -> Self {
        Self {
            mode: ConfirmationMode::Auto,
            poll_interval: Duration::from_secs(10),
        }
    }
}
