//! Account session state machine
//!
//! One actor task per account. The task is the single consumer of the
//! account's channel events and login commands, so no two handlers for the
//! same account ever run concurrently; sessions for different accounts
//! interleave freely and share only the pool-wide login budget.
//!
//! Login path:
//! 1. `login()` request, dropped with a logged error if one is already
//!    queued, or (for re-logins) if the pool-wide budget is exhausted
//! 2. backoff delay elapses; the in-flight guard clears at dispatch, since
//!    completion arrives through channel events, not this call's return path
//! 3. no principal on the connection channel → full logon; otherwise the web
//!    session is refreshed only if it is no longer valid
//! 4. `WebSessionReplaced` propagates cookies to the web and trade
//!    collaborators; success resets the backoff, failure schedules a retry
//!
//! The first login is the bootstrap: its outcome resolves the future returned
//! by `SessionHandle::login()`. Every later failure only logs and self-heals.

use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::time::Sleep;

use crate::backoff::Backoff;
use crate::channel::{
    ChannelEvent, Channels, ConnectionChannel, PrincipalId, ResultCode, TimeCodeGenerator,
    TradeChannel, WebChannel,
};
use crate::credentials::{AccountIdentity, ConfirmationConfig, ConfirmationMode, LoginCredentials};
use crate::event::{LogEvent, LogSink};
use crate::metrics;

/// Pool-wide admission budget for non-bootstrap logins.
///
/// Implemented by the pool's rolling-window limiter; sessions only ever ask
/// for a single grant. Bootstrap logins bypass the budget entirely.
pub trait LoginBudget: Send + Sync {
    fn try_consume(&self) -> bool;
}

/// Errors surfaced through a session's bootstrap future.
///
/// Nothing after the bootstrap propagates as an error: post-bootstrap
/// failures are retried indefinitely and reported on the log stream only.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    #[error("bootstrap login failed: {0}")]
    BootstrapFailed(ResultCode),

    #[error("web session propagation failed: {0}")]
    Propagation(String),

    #[error("session task stopped")]
    Stopped,
}

/// Per-account configuration supplied at registration time.
#[derive(Clone)]
pub struct SessionConfig {
    pub credentials: LoginCredentials,
    /// Overrides the pool default when set.
    pub confirmation: Option<ConfirmationConfig>,
    /// Opaque resumable blob from a previous run, handed to the trade
    /// collaborator at construction and never interpreted here.
    pub resume: Option<serde_json::Value>,
}

impl SessionConfig {
    pub fn new(credentials: LoginCredentials) -> Self {
        Self {
            credentials,
            confirmation: None,
            resume: None,
        }
    }
}

/// Commands accepted by a session task.
enum Command {
    Login,
    Shutdown,
}

/// Caller-facing handle to a running session task.
///
/// Owned by the pool (and cloned out to callers via `Arc`); the index is
/// assigned at registration and stays stable for the pool's lifetime.
pub struct SessionHandle {
    index: usize,
    identity: AccountIdentity,
    commands: mpsc::UnboundedSender<Command>,
    principal: watch::Receiver<Option<PrincipalId>>,
    api_key: watch::Receiver<Option<String>>,
    bootstrap: Mutex<Option<oneshot::Receiver<Result<(), SessionError>>>>,
    trade: Arc<dyn TradeChannel>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("index", &self.index)
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl SessionHandle {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn identity(&self) -> &AccountIdentity {
        &self.identity
    }

    pub fn account_name(&self) -> &str {
        &self.identity.account_name
    }

    /// Resolved principal identity, once the connection channel established one.
    pub fn principal(&self) -> Option<PrincipalId> {
        *self.principal.borrow()
    }

    /// Whether the connection channel has reported a stable principal.
    pub fn connection_established(&self) -> bool {
        self.principal().is_some()
    }

    /// API key resolved by the trade collaborator after the last successful
    /// cookie propagation.
    pub fn api_key(&self) -> Option<String> {
        self.api_key.borrow().clone()
    }

    /// Current resumable blob, for persistence by the caller between runs.
    pub fn resumable_state(&self) -> serde_json::Value {
        self.trade.resumable_state()
    }

    /// Request a login.
    ///
    /// The first call is the bootstrap and resolves with its outcome; every
    /// later call is fire-and-forget: duplicate or rate-limited requests are
    /// logged and dropped by the task, and failures surface on the log stream.
    pub async fn login(&self) -> Result<(), SessionError> {
        let pending = self.bootstrap.lock().await.take();
        self.commands
            .send(Command::Login)
            .map_err(|_| SessionError::Stopped)?;
        match pending {
            Some(rx) => rx.await.map_err(|_| SessionError::Stopped)?,
            None => Ok(()),
        }
    }

    /// Stop the session task, cancelling any pending retry timer. The session
    /// stays registered in the pool but no longer reacts to anything.
    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }
}

/// Spawn the session task for a newly registered account and return its handle.
pub fn spawn(
    index: usize,
    identity: AccountIdentity,
    config: SessionConfig,
    channels: Channels,
    budget: Arc<dyn LoginBudget>,
    time_codes: Option<Arc<dyn TimeCodeGenerator>>,
    log_tx: mpsc::UnboundedSender<LogEvent>,
) -> SessionHandle {
    let log = LogSink::new(identity.account_name.clone(), log_tx);

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (principal_tx, principal_rx) = watch::channel(None);
    let (api_key_tx, api_key_rx) = watch::channel(None);
    let (bootstrap_tx, bootstrap_rx) = oneshot::channel();

    if let Some(state) = config.resume {
        channels.trade.resume(state);
        log.debug("restored resumable state");
    }

    let task = SessionTask {
        credentials: config.credentials,
        confirmation: config.confirmation,
        connection: channels.connection,
        web: channels.web,
        trade: channels.trade.clone(),
        events: channels.events,
        commands: command_rx,
        budget,
        time_codes,
        log,
        backoff: Backoff::default(),
        login_in_flight: false,
        first_login: true,
        bootstrap: Some(bootstrap_tx),
        principal_tx,
        api_key_tx,
        pending_login: None,
    };
    tokio::spawn(task.run());

    SessionHandle {
        index,
        identity,
        commands: command_tx,
        principal: principal_rx,
        api_key: api_key_rx,
        bootstrap: Mutex::new(Some(bootstrap_rx)),
        trade: channels.trade,
    }
}

struct SessionTask {
    credentials: LoginCredentials,
    confirmation: Option<ConfirmationConfig>,
    connection: Arc<dyn ConnectionChannel>,
    web: Arc<dyn WebChannel>,
    trade: Arc<dyn TradeChannel>,
    events: mpsc::UnboundedReceiver<ChannelEvent>,
    commands: mpsc::UnboundedReceiver<Command>,
    budget: Arc<dyn LoginBudget>,
    time_codes: Option<Arc<dyn TimeCodeGenerator>>,
    log: LogSink,
    backoff: Backoff,
    login_in_flight: bool,
    first_login: bool,
    bootstrap: Option<oneshot::Sender<Result<(), SessionError>>>,
    principal_tx: watch::Sender<Option<PrincipalId>>,
    api_key_tx: watch::Sender<Option<String>>,
    pending_login: Option<Pin<Box<Sleep>>>,
}

impl SessionTask {
    async fn run(mut self) {
        loop {
            tokio::select! {
                () = Self::armed(&mut self.pending_login), if self.pending_login.is_some() => {
                    self.pending_login = None;
                    self.dispatch_login().await;
                }
                command = self.commands.recv() => match command {
                    Some(Command::Login) => self.request_login(),
                    Some(Command::Shutdown) | None => {
                        self.log.debug("session task stopping");
                        break;
                    }
                },
                event = self.events.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        self.log.error("channel event stream closed, stopping session task");
                        break;
                    }
                },
            }
        }
    }

    async fn armed(pending: &mut Option<Pin<Box<Sleep>>>) {
        match pending {
            Some(sleep) => sleep.as_mut().await,
            None => std::future::pending::<()>().await,
        }
    }

    /// Admission for a login request: duplicate-call guard, then the
    /// pool-wide budget (bypassed for bootstrap logins), then the backoff
    /// timer is armed.
    fn request_login(&mut self) {
        if self.login_in_flight {
            self.log.error("a login is already queued, blocking attempt");
            metrics::record_login_blocked("in_flight");
            return;
        }

        if !self.first_login && !self.budget.try_consume() {
            self.log
                .error("maximum logins reached for the current window, blocking attempt");
            metrics::record_login_blocked("rate_limited");
            return;
        }

        self.login_in_flight = true;
        let delay = self.backoff.next_delay();
        self.log
            .info(format!("scheduling login attempt in {}s", delay.as_secs()));
        self.pending_login = Some(Box::pin(tokio::time::sleep(delay)));
    }

    /// The backoff delay elapsed: dispatch the attempt.
    async fn dispatch_login(&mut self) {
        // Cleared at dispatch rather than completion; the outcome arrives
        // through channel events, not through this call's return path.
        self.login_in_flight = false;
        metrics::record_login_dispatched(self.first_login);

        let time_code = match (&self.credentials.shared_secret, &self.time_codes) {
            (Some(secret), Some(generator)) => Some(generator.current_code(secret)),
            _ => None,
        };

        if self.connection.principal().is_none() {
            self.log.debug("logging into connection channel");
            self.connection.log_on(&self.credentials, time_code.as_deref());
        } else if self.web.session_valid().await {
            self.log.debug("web session still valid, not refreshing");
        } else {
            self.log.debug("requesting fresh web session");
            self.connection.refresh_web_session();
        }
    }

    async fn handle_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::PrincipalEstablished { principal, result } => {
                self.on_principal_established(principal, result);
            }
            ChannelEvent::WebSessionReplaced { session_id, cookies } => {
                self.on_web_session_replaced(session_id, cookies).await;
            }
            ChannelEvent::ConnectionLost { reason } => {
                self.log.error("logged out of the connection channel, retrying");
                self.log.stack(reason);
                self.request_login();
            }
            ChannelEvent::WebSessionExpired { reason } => {
                self.log.stack(reason);
                if self.connection.principal().is_some() {
                    self.log.error("web session expired, retrying");
                    self.request_login();
                } else {
                    self.log.error(
                        "web session expired, not retrying: connection channel is logged out",
                    );
                }
            }
        }
    }

    fn on_principal_established(&mut self, principal: PrincipalId, result: ResultCode) {
        if !result.is_ok() {
            self.log
                .error(format!("connection logon failed: {result}"));
            metrics::record_login_outcome(false);
            if let Some(tx) = self.bootstrap.take() {
                let _ = tx.send(Err(SessionError::BootstrapFailed(result)));
            }
            return;
        }
        self.principal_tx.send_replace(Some(principal));
        self.log
            .debug(format!("connection channel established principal {principal}"));
    }

    async fn on_web_session_replaced(&mut self, session_id: String, cookies: Vec<String>) {
        self.log.debug(format!("replacing web session {session_id}"));
        self.web.set_cookies(&cookies).await;

        if let (Some(secret), Some(confirmation)) =
            (&self.credentials.identity_secret, &self.confirmation)
        {
            match confirmation.mode {
                ConfirmationMode::Auto => {
                    self.web
                        .start_confirmation_poller(confirmation.poll_interval, Some(secret))
                        .await;
                }
                ConfirmationMode::Manual => {
                    self.web
                        .start_confirmation_poller(confirmation.poll_interval, None)
                        .await;
                }
            }
        }

        match self.trade.set_cookies(&cookies).await {
            Ok(api_key) => {
                self.backoff.reset();
                self.api_key_tx.send_replace(Some(api_key));
                self.log.info("logged in");
                metrics::record_login_outcome(true);
                if self.first_login {
                    self.first_login = false;
                    if let Some(tx) = self.bootstrap.take() {
                        let _ = tx.send(Ok(()));
                    }
                }
            }
            Err(err) => {
                // Treated exactly like a login failure.
                self.log.error("replacing cookies on the trade channel failed");
                self.log.stack(err.to_string());
                metrics::record_login_outcome(false);
                if let Some(tx) = self.bootstrap.take() {
                    let _ = tx.send(Err(SessionError::Propagation(err.to_string())));
                    return;
                }
                self.request_login();
            }
        }
    }
}
