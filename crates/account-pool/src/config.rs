//! Configuration types and loading
//!
//! Passwords and two-factor secrets are never stored in the TOML directly.
//! Each one resolves from an `ACCOUNT_<FIELD>_<NAME>` env var or a `*_file`
//! path, env var taking precedence, so config files can be committed without
//! leaking credential material.

use std::path::{Path, PathBuf};
use std::time::Duration;

use account_session::{
    AccountIdentity, ConfirmationConfig, ConfirmationMode, LoginCredentials, SessionConfig,
};
use common::Secret;
use serde::Deserialize;

use crate::pool::PoolOptions;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pool: PoolSection,
    #[serde(default)]
    pub accounts: Vec<AccountEntry>,
}

/// Pool-wide tuning
#[derive(Debug, Deserialize)]
pub struct PoolSection {
    #[serde(default = "default_login_window")]
    pub login_window_secs: u64,
    #[serde(default = "default_login_limit")]
    pub login_limit: u32,
    /// Confirmation behaviour applied to every account that does not carry
    /// its own `confirmation_mode`.
    #[serde(default)]
    pub confirmation_mode: Option<ConfirmationMode>,
    #[serde(default = "default_confirmation_poll")]
    pub confirmation_poll_secs: u64,
}

impl Default for PoolSection {
    fn default() -> Self {
        Self {
            login_window_secs: default_login_window(),
            login_limit: default_login_limit(),
            confirmation_mode: None,
            confirmation_poll_secs: default_confirmation_poll(),
        }
    }
}

/// One managed account
#[derive(Debug, Deserialize)]
pub struct AccountEntry {
    pub account_name: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub subkind: Option<String>,
    #[serde(default)]
    pub proxy: Option<String>,
    #[serde(default)]
    pub confirmation_mode: Option<ConfirmationMode>,

    /// Path to a file containing the password (alternative to the
    /// ACCOUNT_PASSWORD_<NAME> env var)
    #[serde(default)]
    pub password_file: Option<PathBuf>,
    #[serde(default)]
    pub shared_secret_file: Option<PathBuf>,
    #[serde(default)]
    pub identity_secret_file: Option<PathBuf>,

    #[serde(skip)]
    pub password: Option<Secret<String>>,
    #[serde(skip)]
    pub shared_secret: Option<Secret<String>>,
    #[serde(skip)]
    pub identity_secret: Option<Secret<String>>,
}

fn default_login_window() -> u64 {
    60
}

fn default_login_limit() -> u32 {
    4
}

fn default_confirmation_poll() -> u64 {
    10
}

/// Env var name for a secret field: `ACCOUNT_PASSWORD_ALICE` for account
/// "alice". Non-alphanumeric characters in the account name map to `_`.
fn env_key(field: &str, account_name: &str) -> String {
    let suffix: String = account_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("ACCOUNT_{field}_{suffix}")
}

/// Resolve one secret: env var first, then the file path, else None.
fn resolve_secret(
    field: &str,
    account_name: &str,
    file: Option<&Path>,
) -> common::Result<Option<Secret<String>>> {
    if let Ok(value) = std::env::var(env_key(field, account_name)) {
        return Ok(Some(Secret::new(value)));
    }
    if let Some(path) = file {
        let value = std::fs::read_to_string(path).map_err(|e| {
            common::Error::Config(format!(
                "failed to read {} file {} for account {account_name}: {e}",
                field.to_ascii_lowercase(),
                path.display()
            ))
        })?;
        let value = value.trim().to_owned();
        if !value.is_empty() {
            return Ok(Some(Secret::new(value)));
        }
    }
    Ok(None)
}

impl Config {
    /// Load configuration from a TOML file and resolve every account's
    /// secret material.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if config.pool.login_window_secs == 0 {
            return Err(common::Error::Config(
                "login_window_secs must be greater than 0".into(),
            ));
        }
        if config.pool.confirmation_poll_secs == 0 {
            return Err(common::Error::Config(
                "confirmation_poll_secs must be greater than 0".into(),
            ));
        }

        for (i, account) in config.accounts.iter().enumerate() {
            if account.account_name.is_empty() {
                return Err(common::Error::Config(format!(
                    "accounts[{i}] has an empty account_name"
                )));
            }
            let duplicate = config.accounts[..i]
                .iter()
                .any(|earlier| earlier.account_name == account.account_name);
            if duplicate {
                return Err(common::Error::Config(format!(
                    "account {} is listed more than once",
                    account.account_name
                )));
            }
        }

        for account in &mut config.accounts {
            let name = account.account_name.clone();
            account.password =
                resolve_secret("PASSWORD", &name, account.password_file.as_deref())?;
            if account.password.is_none() {
                return Err(common::Error::Config(format!(
                    "no password for account {name}: set {} or password_file",
                    env_key("PASSWORD", &name)
                )));
            }
            account.shared_secret =
                resolve_secret("SHARED_SECRET", &name, account.shared_secret_file.as_deref())?;
            account.identity_secret = resolve_secret(
                "IDENTITY_SECRET",
                &name,
                account.identity_secret_file.as_deref(),
            )?;
        }

        Ok(config)
    }

    /// Pool options from the `[pool]` section. Collaborators (time codes,
    /// inventory client) are wired by the caller, not the config file.
    pub fn pool_options(&self) -> PoolOptions {
        PoolOptions {
            login_window: Duration::from_secs(self.pool.login_window_secs),
            login_limit: self.pool.login_limit,
            default_confirmation: self.pool.confirmation_mode.map(|mode| ConfirmationConfig {
                mode,
                poll_interval: Duration::from_secs(self.pool.confirmation_poll_secs),
            }),
            time_codes: None,
            inventory: None,
        }
    }

    /// Registration specs for every configured account, in file order.
    pub fn account_specs(&self) -> common::Result<Vec<(AccountIdentity, SessionConfig)>> {
        let mut specs = Vec::with_capacity(self.accounts.len());
        for account in &self.accounts {
            let password = account.password.clone().ok_or_else(|| {
                common::Error::Config(format!(
                    "password for account {} was not resolved",
                    account.account_name
                ))
            })?;

            let identity = AccountIdentity {
                account_name: account.account_name.clone(),
                id: account.id.clone(),
                kind: account.kind.clone(),
                subkind: account.subkind.clone(),
            };
            let mut credentials = LoginCredentials::new(&account.account_name, password);
            credentials.shared_secret = account.shared_secret.clone();
            credentials.identity_secret = account.identity_secret.clone();
            credentials.proxy = account.proxy.clone();

            let mut session = SessionConfig::new(credentials);
            session.confirmation = account.confirmation_mode.map(|mode| ConfirmationConfig {
                mode,
                poll_interval: Duration::from_secs(self.pool.confirmation_poll_secs),
            });
            specs.push((identity, session));
        }
        Ok(specs)
    }
}
