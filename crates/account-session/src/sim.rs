//! In-memory channel doubles
//!
//! A scriptable stand-in for the external collaborators, used by the tests in
//! this workspace. One [`SimAccount`] plays all three channel roles for a
//! single account: logons resolve from a scripted result queue (successful by
//! default), a successful logon immediately hands out a fresh web session,
//! and the trade channel accepts cookies unless told otherwise. Web-session
//! validity is scripted explicitly via [`SimAccount::set_web_valid`] rather
//! than inferred from cookie propagation.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::Secret;
use tokio::sync::mpsc;

use crate::channel::{
    ChannelError, ChannelEvent, ChannelFactory, Channels, ConnectionChannel, InventoryClient,
    InventoryItem, PrincipalId, ResultCode, TradeChannel, WebChannel,
};
use crate::credentials::{AccountIdentity, LoginCredentials};
use crate::session::{LoginBudget, SessionConfig};

/// Budget that always grants; session-level tests use it where the limiter
/// is not under test.
pub struct UnlimitedBudget;

impl LoginBudget for UnlimitedBudget {
    fn try_consume(&self) -> bool {
        true
    }
}

#[derive(Default)]
struct SimState {
    established: Option<PrincipalId>,
    web_valid: bool,
    logon_results: VecDeque<ResultCode>,
    trade_results: VecDeque<Result<String, String>>,
    log_on_calls: usize,
    refresh_calls: usize,
    web_cookie_calls: usize,
    trade_cookie_calls: usize,
    poller_starts: Vec<(Duration, bool)>,
    last_time_code: Option<String>,
    resumed: Option<serde_json::Value>,
}

/// Scriptable channel double for one account.
#[derive(Clone)]
pub struct SimAccount {
    principal: PrincipalId,
    state: Arc<Mutex<SimState>>,
    events: mpsc::UnboundedSender<ChannelEvent>,
    receiver: Arc<Mutex<Option<mpsc::UnboundedReceiver<ChannelEvent>>>>,
}

impl SimAccount {
    pub fn new(principal: PrincipalId) -> Self {
        let (events, receiver) = mpsc::unbounded_channel();
        Self {
            principal,
            state: Arc::new(Mutex::new(SimState::default())),
            events,
            receiver: Arc::new(Mutex::new(Some(receiver))),
        }
    }

    /// Build the transport bundle for this account. Panics if called twice;
    /// a session owns exactly one event receiver.
    pub fn channels(&self) -> Channels {
        let events = self
            .receiver
            .lock()
            .unwrap()
            .take()
            .expect("channels() already taken for this sim account");
        Channels {
            connection: Arc::new(self.clone()),
            web: Arc::new(self.clone()),
            trade: Arc::new(self.clone()),
            events,
        }
    }

    /// Queue the result for the next logon. Unqueued logons succeed.
    pub fn push_logon_result(&self, result: ResultCode) {
        self.state.lock().unwrap().logon_results.push_back(result);
    }

    /// Queue the result for the next trade-channel cookie propagation.
    /// Unqueued propagations succeed with api key `"simkey"`.
    pub fn push_trade_result(&self, result: Result<String, String>) {
        self.state.lock().unwrap().trade_results.push_back(result);
    }

    pub fn set_web_valid(&self, valid: bool) {
        self.state.lock().unwrap().web_valid = valid;
    }

    /// Drop the authenticated connection state and notify the session.
    pub fn drop_connection(&self, reason: &str) {
        self.state.lock().unwrap().established = None;
        let _ = self.events.send(ChannelEvent::ConnectionLost {
            reason: reason.into(),
        });
    }

    /// Drop the authenticated connection state without an event, for
    /// simulating a stale web-session expiry arriving after a logout.
    pub fn drop_connection_silently(&self) {
        self.state.lock().unwrap().established = None;
    }

    /// Invalidate the web session and notify the session.
    pub fn expire_web_session(&self, reason: &str) {
        self.state.lock().unwrap().web_valid = false;
        let _ = self.events.send(ChannelEvent::WebSessionExpired {
            reason: reason.into(),
        });
    }

    pub fn log_on_calls(&self) -> usize {
        self.state.lock().unwrap().log_on_calls
    }

    pub fn refresh_calls(&self) -> usize {
        self.state.lock().unwrap().refresh_calls
    }

    pub fn web_cookie_calls(&self) -> usize {
        self.state.lock().unwrap().web_cookie_calls
    }

    pub fn trade_cookie_calls(&self) -> usize {
        self.state.lock().unwrap().trade_cookie_calls
    }

    /// `(poll_interval, identity_secret_passed)` per poller start.
    pub fn poller_starts(&self) -> Vec<(Duration, bool)> {
        self.state.lock().unwrap().poller_starts.clone()
    }

    pub fn last_time_code(&self) -> Option<String> {
        self.state.lock().unwrap().last_time_code.clone()
    }

    fn issue_web_session(&self) {
        let _ = self.events.send(ChannelEvent::WebSessionReplaced {
            session_id: format!("sim-{}", self.principal),
            cookies: vec![format!("sessionid=sim-{}", self.principal)],
        });
    }
}

impl ConnectionChannel for SimAccount {
    fn log_on(&self, _credentials: &LoginCredentials, time_code: Option<&str>) {
        let result = {
            let mut state = self.state.lock().unwrap();
            state.log_on_calls += 1;
            state.last_time_code = time_code.map(str::to_owned);
            let result = state.logon_results.pop_front().unwrap_or(ResultCode::Ok);
            if result.is_ok() {
                state.established = Some(self.principal);
            }
            result
        };
        let _ = self.events.send(ChannelEvent::PrincipalEstablished {
            principal: self.principal,
            result,
        });
        if result.is_ok() {
            self.issue_web_session();
        }
    }

    fn refresh_web_session(&self) {
        self.state.lock().unwrap().refresh_calls += 1;
        self.issue_web_session();
    }

    fn principal(&self) -> Option<PrincipalId> {
        self.state.lock().unwrap().established
    }
}

impl WebChannel for SimAccount {
    fn set_cookies<'a>(
        &'a self,
        _cookies: &'a [String],
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            self.state.lock().unwrap().web_cookie_calls += 1;
        })
    }

    fn session_valid(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        Box::pin(async move { self.state.lock().unwrap().web_valid })
    }

    fn start_confirmation_poller<'a>(
        &'a self,
        poll_interval: Duration,
        identity_secret: Option<&'a Secret<String>>,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            self.state
                .lock()
                .unwrap()
                .poller_starts
                .push((poll_interval, identity_secret.is_some()));
        })
    }
}

impl TradeChannel for SimAccount {
    fn set_cookies<'a>(
        &'a self,
        _cookies: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<String, ChannelError>> + Send + 'a>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            state.trade_cookie_calls += 1;
            match state.trade_results.pop_front() {
                Some(Ok(api_key)) => Ok(api_key),
                Some(Err(message)) => Err(ChannelError::Cookies(message)),
                None => Ok("simkey".into()),
            }
        })
    }

    fn resumable_state(&self) -> serde_json::Value {
        self.state
            .lock()
            .unwrap()
            .resumed
            .clone()
            .unwrap_or_else(|| serde_json::json!({}))
    }

    fn resume(&self, state: serde_json::Value) {
        self.state.lock().unwrap().resumed = Some(state);
    }
}

/// Factory producing [`SimAccount`] transports, with principals assigned
/// sequentially from the standard individual-account base.
pub struct SimFactory {
    accounts: Mutex<HashMap<String, SimAccount>>,
    next_principal: Mutex<u64>,
}

impl SimFactory {
    pub fn new() -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            next_principal: Mutex::new(76561197960265728),
        }
    }

    /// Sim double for an account, created on first use. Call before
    /// registration to script bootstrap behaviour.
    pub fn account(&self, account_name: &str) -> SimAccount {
        let mut accounts = self.accounts.lock().unwrap();
        if let Some(existing) = accounts.get(account_name) {
            return existing.clone();
        }
        let mut next = self.next_principal.lock().unwrap();
        *next += 1;
        let sim = SimAccount::new(PrincipalId(*next));
        accounts.insert(account_name.to_owned(), sim.clone());
        sim
    }
}

impl Default for SimFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelFactory for SimFactory {
    fn connect(&self, identity: &AccountIdentity, _config: &SessionConfig) -> Channels {
        self.account(&identity.account_name).channels()
    }
}

/// Scriptable inventory collaborator keyed by principal.
#[derive(Default)]
pub struct SimInventory {
    responses: Mutex<HashMap<PrincipalId, Result<Vec<InventoryItem>, String>>>,
}

impl SimInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_items(&self, principal: PrincipalId, items: Vec<InventoryItem>) {
        self.responses.lock().unwrap().insert(principal, Ok(items));
    }

    pub fn fail(&self, principal: PrincipalId, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(principal, Err(message.into()));
    }
}

/// Convenience constructor for test items.
pub fn sim_item(asset_id: &str, app_id: u32) -> InventoryItem {
    InventoryItem {
        asset_id: asset_id.into(),
        app_id,
        context_id: 2,
        amount: 1,
        tradable: true,
        market_name: None,
    }
}

impl InventoryClient for SimInventory {
    fn fetch<'a>(
        &'a self,
        principal: PrincipalId,
        _app_id: u32,
        _context_id: u64,
        _tradable_only: bool,
        _retries: u32,
        _language: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<InventoryItem>, ChannelError>> + Send + 'a>> {
        Box::pin(async move {
            match self.responses.lock().unwrap().get(&principal) {
                Some(Ok(items)) => Ok(items.clone()),
                Some(Err(message)) => Err(ChannelError::Inventory(message.clone())),
                None => Ok(Vec::new()),
            }
        })
    }
}
