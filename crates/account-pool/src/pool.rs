//! Pool orchestration and account lookup
//!
//! The pool owns the ordered session collection. Indexes are assigned at
//! registration and stay stable for the pool's lifetime; lookup by anything
//! other than index is a linear scan, which is fine at pool scale (tens of
//! accounts, not thousands). All cross-session state (the login limiter and
//! the rotation cursors) is owned here and passed by reference to the
//! components that need it, never kept as ambient state.

use std::sync::Arc;
use std::time::Duration;

use account_session::{
    AccountIdentity, ChannelFactory, ConfirmationConfig, InventoryClient, InventoryItem, LogEvent,
    LoginBudget, PrincipalId, SessionConfig, SessionHandle, TimeCodeGenerator, session,
};
use futures_util::future::try_join_all;
use tokio::sync::{Mutex, RwLock, broadcast, mpsc};
use tracing::info;

use crate::error::{Error, Result};
use crate::limiter::{LoginLimiter, spawn_reset_task};
use crate::select::{RotationKey, Rotations};

/// Pool-level tuning and shared collaborators.
#[derive(Clone)]
pub struct PoolOptions {
    /// Rolling window for the login-rate budget.
    pub login_window: Duration,
    /// Non-bootstrap logins admitted per window, across the whole pool.
    pub login_limit: u32,
    /// Confirmation behaviour applied to accounts that carry an identity
    /// secret but no per-account override.
    pub default_confirmation: Option<ConfirmationConfig>,
    /// Generator for derived one-time login credentials.
    pub time_codes: Option<Arc<dyn TimeCodeGenerator>>,
    /// Inventory collaborator used by [`Pool::load_inventories`].
    pub inventory: Option<Arc<dyn InventoryClient>>,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            login_window: Duration::from_secs(60),
            login_limit: 4,
            default_confirmation: None,
            time_codes: None,
            inventory: None,
        }
    }
}

/// An inventory item tagged with its owning account.
#[derive(Debug, Clone)]
pub struct OwnedItem {
    pub owner: PrincipalId,
    pub owner_index: usize,
    pub item: InventoryItem,
}

/// Session pool managing many independently failing account sessions.
pub struct Pool {
    options: PoolOptions,
    factory: Arc<dyn ChannelFactory>,
    sessions: RwLock<Vec<Arc<SessionHandle>>>,
    limiter: Arc<LoginLimiter>,
    rotations: Rotations,
    log_tx: mpsc::UnboundedSender<LogEvent>,
    events: broadcast::Sender<LogEvent>,
    background: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl Pool {
    /// Create a pool. Spawns the limiter-reset task and the log forwarder;
    /// both are stopped by [`Pool::shutdown`].
    pub fn new(options: PoolOptions, factory: Arc<dyn ChannelFactory>) -> Self {
        let limiter = Arc::new(LoginLimiter::new(options.login_limit));
        let reset_task = spawn_reset_task(limiter.clone(), options.login_window);

        let (log_tx, mut log_rx) = mpsc::unbounded_channel::<LogEvent>();
        let (events, _) = broadcast::channel(256);
        let forward = events.clone();
        let forward_task = tokio::spawn(async move {
            while let Some(event) = log_rx.recv().await {
                // No subscribers is fine.
                let _ = forward.send(event);
            }
        });

        info!(
            login_limit = options.login_limit,
            login_window_secs = options.login_window.as_secs(),
            "pool initialized"
        );
        Self {
            options,
            factory,
            sessions: RwLock::new(Vec::new()),
            limiter,
            rotations: Rotations::default(),
            log_tx,
            events,
            background: Mutex::new(vec![reset_task, forward_task]),
        }
    }

    /// Register an account without logging it in.
    ///
    /// Fails with `DuplicateIdentity` if the login name or a non-empty stable
    /// identifier is already present. Separating construction from login lets
    /// callers batch-register and then log in selectively.
    pub async fn register(
        &self,
        identity: AccountIdentity,
        mut config: SessionConfig,
    ) -> Result<Arc<SessionHandle>> {
        let mut sessions = self.sessions.write().await;

        for existing in sessions.iter() {
            if existing.account_name() == identity.account_name {
                return Err(Error::DuplicateIdentity(format!(
                    "an account with login name {} already exists",
                    identity.account_name
                )));
            }
            // An empty identifier carries no identity and never collides.
            if let (Some(new_id), Some(existing_id)) = (&identity.id, &existing.identity().id)
                && !new_id.is_empty()
                && new_id == existing_id
            {
                return Err(Error::DuplicateIdentity(format!(
                    "an account with identifier {new_id} already exists"
                )));
            }
        }

        if config.confirmation.is_none() {
            config.confirmation = self.options.default_confirmation.clone();
        }

        let channels = self.factory.connect(&identity, &config);
        let index = sessions.len();
        let account = identity.account_name.clone();
        let handle = Arc::new(session::spawn(
            index,
            identity,
            config,
            channels,
            self.limiter.clone() as Arc<dyn LoginBudget>,
            self.options.time_codes.clone(),
            self.log_tx.clone(),
        ));
        sessions.push(handle.clone());
        info!(account = %account, index, "registered account session");
        Ok(handle)
    }

    /// Register an account and wait for its bootstrap login.
    ///
    /// A bootstrap failure rejects this call but the account stays
    /// registered, in a non-active state.
    pub async fn add_and_login(
        &self,
        identity: AccountIdentity,
        config: SessionConfig,
    ) -> Result<Arc<SessionHandle>> {
        let handle = self.register(identity, config).await?;
        handle.login().await?;
        Ok(handle)
    }

    /// Register a batch of accounts in order. Short-circuits on the first
    /// duplicate; earlier registrations stay in the pool.
    pub async fn register_all(
        &self,
        specs: Vec<(AccountIdentity, SessionConfig)>,
    ) -> Result<Vec<Arc<SessionHandle>>> {
        let mut handles = Vec::with_capacity(specs.len());
        for (identity, config) in specs {
            handles.push(self.register(identity, config).await?);
        }
        Ok(handles)
    }

    /// Register a batch and log every account in, all-or-nothing: the first
    /// bootstrap failure rejects the aggregate, but siblings that already
    /// logged in stay registered and active.
    pub async fn add_and_login_all(
        &self,
        specs: Vec<(AccountIdentity, SessionConfig)>,
    ) -> Result<Vec<Arc<SessionHandle>>> {
        let handles = self.register_all(specs).await?;
        try_join_all(handles.iter().map(|handle| handle.login())).await?;
        Ok(handles)
    }

    /// Number of registered accounts.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// O(1) lookup by the stable registration index.
    pub async fn by_index(&self, index: usize) -> Option<Arc<SessionHandle>> {
        self.sessions.read().await.get(index).cloned()
    }

    /// Linear scan by stable application-level identifier.
    pub async fn by_id(&self, id: &str) -> Option<Arc<SessionHandle>> {
        self.sessions
            .read()
            .await
            .iter()
            .find(|s| s.identity().id.as_deref() == Some(id))
            .cloned()
    }

    /// Linear scan by login name.
    pub async fn by_account_name(&self, account_name: &str) -> Option<Arc<SessionHandle>> {
        self.sessions
            .read()
            .await
            .iter()
            .find(|s| s.account_name() == account_name)
            .cloned()
    }

    /// Linear scan by resolved principal identity.
    pub async fn by_principal(&self, principal: PrincipalId) -> Option<Arc<SessionHandle>> {
        self.sessions
            .read()
            .await
            .iter()
            .find(|s| s.principal() == Some(principal))
            .cloned()
    }

    /// Ordered view of accounts with the given classification.
    pub async fn by_kind(&self, kind: &str) -> Vec<Arc<SessionHandle>> {
        self.sessions
            .read()
            .await
            .iter()
            .filter(|s| s.identity().kind.as_deref() == Some(kind))
            .cloned()
            .collect()
    }

    /// Ordered view of accounts whose classification is any of `kinds`.
    pub async fn by_kinds(&self, kinds: &[&str]) -> Vec<Arc<SessionHandle>> {
        self.sessions
            .read()
            .await
            .iter()
            .filter(|s| {
                s.identity()
                    .kind
                    .as_deref()
                    .is_some_and(|kind| kinds.contains(&kind))
            })
            .cloned()
            .collect()
    }

    /// Ordered view of accounts with the given classification pair.
    pub async fn by_kind_and_subkind(&self, kind: &str, subkind: &str) -> Vec<Arc<SessionHandle>> {
        self.sessions
            .read()
            .await
            .iter()
            .filter(|s| {
                s.identity().kind.as_deref() == Some(kind)
                    && s.identity().subkind.as_deref() == Some(subkind)
            })
            .cloned()
            .collect()
    }

    /// Rotate through accounts of a classification.
    pub async fn next_by_kind(&self, kind: &str) -> Result<Arc<SessionHandle>> {
        self.next_by_kind_repeating(kind, 0).await
    }

    /// Rotate through accounts of a classification, holding each selection
    /// for `repeat` further calls before advancing.
    pub async fn next_by_kind_repeating(&self, kind: &str, repeat: u32) -> Result<Arc<SessionHandle>> {
        let matching = self.by_kind(kind).await;
        self.rotate(RotationKey::Kind(kind.to_owned()), &matching, repeat)
            .await
    }

    /// Rotate through accounts of a classification pair.
    pub async fn next_by_subkind(&self, kind: &str, subkind: &str) -> Result<Arc<SessionHandle>> {
        self.next_by_subkind_repeating(kind, subkind, 0).await
    }

    pub async fn next_by_subkind_repeating(
        &self,
        kind: &str,
        subkind: &str,
        repeat: u32,
    ) -> Result<Arc<SessionHandle>> {
        let matching = self.by_kind_and_subkind(kind, subkind).await;
        self.rotate(
            RotationKey::Subkind(kind.to_owned(), subkind.to_owned()),
            &matching,
            repeat,
        )
        .await
    }

    async fn rotate(
        &self,
        key: RotationKey,
        matching: &[Arc<SessionHandle>],
        repeat: u32,
    ) -> Result<Arc<SessionHandle>> {
        let description = key.describe();
        self.rotations
            .next(key, matching, repeat)
            .await
            .ok_or(Error::NoMatchingAccount(description))
    }

    /// Subscribe to the unified log-event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<LogEvent> {
        self.events.subscribe()
    }

    /// Fetch every account's inventory in parallel, tagging items with the
    /// owning account. All-or-nothing: one failed fetch rejects the
    /// aggregate, matching the batch-login semantics.
    pub async fn load_inventories(
        &self,
        app_id: u32,
        context_id: u64,
        tradable_only: bool,
        retries: u32,
        language: &str,
    ) -> Result<Vec<OwnedItem>> {
        let client = self
            .options
            .inventory
            .clone()
            .ok_or_else(|| Error::Inventory("no inventory client configured".into()))?;
        let sessions = self.sessions.read().await.clone();

        let fetches = sessions.iter().map(|session| {
            let client = client.clone();
            async move {
                let principal = session
                    .principal()
                    .ok_or_else(|| Error::NotLoggedIn(session.account_name().to_owned()))?;
                let items = client
                    .fetch(principal, app_id, context_id, tradable_only, retries, language)
                    .await
                    .map_err(|e| {
                        Error::Inventory(format!("{}: {e}", session.account_name()))
                    })?;
                Ok::<_, Error>(
                    items
                        .into_iter()
                        .map(|item| OwnedItem {
                            owner: principal,
                            owner_index: session.index(),
                            item,
                        })
                        .collect::<Vec<_>>(),
                )
            }
        });

        let groups = try_join_all(fetches).await?;
        Ok(groups.into_iter().flatten().collect())
    }

    /// Stop every session task (cancelling pending retry timers) and the
    /// pool's background tasks. Sessions stay registered but inert.
    pub async fn shutdown(&self) {
        for session in self.sessions.read().await.iter() {
            session.shutdown();
        }
        for task in self.background.lock().await.drain(..) {
            task.abort();
        }
        info!("pool shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use account_session::sim::{SimFactory, SimInventory, sim_item};
    use account_session::{LogLevel, LoginCredentials, ResultCode, SessionError};

    fn spec(name: &str, kind: Option<&str>, subkind: Option<&str>) -> (AccountIdentity, SessionConfig) {
        let identity = AccountIdentity {
            account_name: name.to_owned(),
            id: None,
            kind: kind.map(str::to_owned),
            subkind: subkind.map(str::to_owned),
        };
        (identity, SessionConfig::new(LoginCredentials::new(name, "pw")))
    }

    fn spec_with_id(name: &str, id: &str) -> (AccountIdentity, SessionConfig) {
        let (mut identity, config) = spec(name, None, None);
        identity.id = Some(id.to_owned());
        (identity, config)
    }

    fn sim_pool() -> (Pool, Arc<SimFactory>) {
        let factory = Arc::new(SimFactory::new());
        let pool = Pool::new(PoolOptions::default(), factory.clone());
        (pool, factory)
    }

    #[tokio::test(start_paused = true)]
    async fn register_assigns_stable_indexes() {
        let (pool, _factory) = sim_pool();
        let (ia, ca) = spec("alice", None, None);
        let (ib, cb) = spec("bob", None, None);

        let a = pool.register(ia, ca).await.unwrap();
        let b = pool.register(ib, cb).await.unwrap();

        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(pool.len().await, 2);
        assert_eq!(
            pool.by_index(1).await.unwrap().account_name(),
            "bob"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_account_name_is_rejected() {
        let (pool, _factory) = sim_pool();
        let (ia, ca) = spec("alice", None, None);
        pool.register(ia, ca).await.unwrap();

        let (dup, config) = spec("alice", None, None);
        let err = pool.register(dup, config).await.unwrap_err();
        assert!(matches!(err, Error::DuplicateIdentity(_)));
        assert_eq!(pool.len().await, 1, "failed registration must not change the count");
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_stable_id_is_rejected() {
        let (pool, _factory) = sim_pool();
        let (ia, ca) = spec_with_id("alice", "storage-1");
        pool.register(ia, ca).await.unwrap();

        let (ib, cb) = spec_with_id("bob", "storage-1");
        let err = pool.register(ib, cb).await.unwrap_err();
        assert!(matches!(err, Error::DuplicateIdentity(_)));
        assert_eq!(pool.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_stable_ids_do_not_collide() {
        let (pool, _factory) = sim_pool();
        let (ia, ca) = spec_with_id("alice", "");
        let (ib, cb) = spec_with_id("bob", "");

        pool.register(ia, ca).await.unwrap();
        pool.register(ib, cb).await.unwrap();
        assert_eq!(pool.len().await, 2, "an empty id carries no identity");
    }

    #[tokio::test(start_paused = true)]
    async fn add_and_login_resolves_with_an_active_session() {
        let (pool, _factory) = sim_pool();
        let (identity, config) = spec("alice", None, None);

        let handle = pool.add_and_login(identity, config).await.unwrap();

        assert!(handle.connection_established());
        assert_eq!(pool.by_principal(handle.principal().unwrap()).await.unwrap().index(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn bootstrap_failure_rejects_but_account_stays_registered() {
        let (pool, factory) = sim_pool();
        factory
            .account("alice")
            .push_logon_result(ResultCode::InvalidCredentials);

        let (identity, config) = spec("alice", None, None);
        let err = pool.add_and_login(identity, config).await.unwrap_err();

        assert!(matches!(
            err,
            Error::Bootstrap(SessionError::BootstrapFailed(ResultCode::InvalidCredentials))
        ));
        assert_eq!(pool.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn batch_login_is_all_or_nothing_but_keeps_siblings() {
        let (pool, factory) = sim_pool();
        factory
            .account("carol")
            .push_logon_result(ResultCode::ServiceUnavailable);

        let specs = vec![
            spec("alice", None, None),
            spec("bob", None, None),
            spec("carol", None, None),
        ];
        let err = pool.add_and_login_all(specs).await.unwrap_err();
        assert!(matches!(err, Error::Bootstrap(_)));

        // All three remain registered; the healthy siblings are active.
        assert_eq!(pool.len().await, 3);
        assert!(pool.by_account_name("alice").await.unwrap().connection_established());
        assert!(pool.by_account_name("bob").await.unwrap().connection_established());
        assert!(!pool.by_account_name("carol").await.unwrap().connection_established());
    }

    #[tokio::test(start_paused = true)]
    async fn lookup_by_id_and_name() {
        let (pool, _factory) = sim_pool();
        let (ia, ca) = spec_with_id("alice", "storage-1");
        pool.register(ia, ca).await.unwrap();

        assert_eq!(pool.by_id("storage-1").await.unwrap().account_name(), "alice");
        assert!(pool.by_id("storage-2").await.is_none());
        assert!(pool.by_account_name("alice").await.is_some());
        assert!(pool.by_account_name("mallory").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn by_kinds_filters_across_several_classifications() {
        let (pool, _factory) = sim_pool();
        pool.register_all(vec![
            spec("a", Some("storage"), None),
            spec("b", Some("trade"), None),
            spec("c", Some("banking"), None),
            spec("d", None, None),
        ])
        .await
        .unwrap();

        let matching = pool.by_kinds(&["storage", "banking"]).await;
        let names: Vec<&str> = matching.iter().map(|s| s.account_name()).collect();
        assert_eq!(names, vec!["a", "c"], "registration order is preserved");
        assert!(pool.by_kinds(&["ghost"]).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn rotation_cycles_through_matching_accounts() {
        let (pool, _factory) = sim_pool();
        pool.register_all(vec![
            spec("a", Some("x"), None),
            spec("b", Some("y"), None),
            spec("c", Some("x"), None),
        ])
        .await
        .unwrap();

        let picks: Vec<String> = {
            let mut out = Vec::new();
            for _ in 0..4 {
                out.push(pool.next_by_kind("x").await.unwrap().account_name().to_owned());
            }
            out
        };
        assert_eq!(picks, vec!["a", "c", "a", "c"]);

        assert_eq!(pool.next_by_kind("y").await.unwrap().account_name(), "b");
    }

    #[tokio::test(start_paused = true)]
    async fn rotation_repeat_holds_a_selection() {
        let (pool, _factory) = sim_pool();
        pool.register_all(vec![spec("a", Some("x"), None), spec("c", Some("x"), None)])
            .await
            .unwrap();

        let mut picks = Vec::new();
        for _ in 0..6 {
            picks.push(
                pool.next_by_kind_repeating("x", 1)
                    .await
                    .unwrap()
                    .account_name()
                    .to_owned(),
            );
        }
        assert_eq!(picks, vec!["a", "a", "c", "c", "a", "a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn rotation_by_subkind() {
        let (pool, _factory) = sim_pool();
        pool.register_all(vec![
            spec("a", Some("x"), Some("s1")),
            spec("b", Some("x"), Some("s2")),
            spec("c", Some("x"), Some("s1")),
        ])
        .await
        .unwrap();

        let first = pool.next_by_subkind("x", "s1").await.unwrap();
        let second = pool.next_by_subkind("x", "s1").await.unwrap();
        assert_eq!(first.account_name(), "a");
        assert_eq!(second.account_name(), "c");
    }

    #[tokio::test(start_paused = true)]
    async fn rotation_with_no_match_errors() {
        let (pool, _factory) = sim_pool();
        let err = pool.next_by_kind("ghost").await.unwrap_err();
        assert!(matches!(err, Error::NoMatchingAccount(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn log_events_are_republished_on_the_broadcast_stream() {
        let (pool, _factory) = sim_pool();
        let mut events = pool.subscribe();

        let (identity, config) = spec("alice", None, None);
        pool.add_and_login(identity, config).await.unwrap();
        // Let the forwarder task drain the session's backlog.
        tokio::time::sleep(Duration::from_millis(1)).await;

        let mut saw_login = false;
        while let Ok(event) = events.try_recv() {
            assert_eq!(event.account, "alice");
            if event.level == LogLevel::Info && event.message == "logged in" {
                saw_login = true;
            }
        }
        assert!(saw_login, "expected a forwarded 'logged in' event");
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limiter_blocks_relogins_beyond_the_window_budget() {
        let factory = Arc::new(SimFactory::new());
        let options = PoolOptions {
            login_limit: 2,
            ..PoolOptions::default()
        };
        let pool = Pool::new(options, factory.clone());

        let (identity, config) = spec("alice", None, None);
        let handle = pool.add_and_login(identity, config).await.unwrap();
        let sim = factory.account("alice");
        let mut events = pool.subscribe();

        // Three fire-and-forget re-logins, each allowed to settle before the
        // next: the third exceeds the window budget of 2.
        for _ in 0..3 {
            sim.set_web_valid(false);
            handle.login().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        }

        assert_eq!(sim.refresh_calls(), 2, "only two re-logins may dispatch");
        let mut saw_blocked = false;
        while let Ok(event) = events.try_recv() {
            if event.message.contains("maximum logins reached") {
                saw_blocked = true;
            }
        }
        assert!(saw_blocked, "expected a rate-limit log event");

        // A fresh window restores the budget.
        tokio::time::sleep(Duration::from_secs(61)).await;
        sim.set_web_valid(false);
        handle.login().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(sim.refresh_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn bootstrap_logins_bypass_the_limiter() {
        let factory = Arc::new(SimFactory::new());
        let options = PoolOptions {
            login_limit: 0,
            ..PoolOptions::default()
        };
        let pool = Pool::new(options, factory);

        // Zero budget, yet every bootstrap goes through.
        pool.add_and_login_all(vec![
            spec("alice", None, None),
            spec("bob", None, None),
        ])
        .await
        .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn load_inventories_tags_items_with_their_owner() {
        let factory = Arc::new(SimFactory::new());
        let inventory = Arc::new(SimInventory::new());
        let options = PoolOptions {
            inventory: Some(inventory.clone()),
            ..PoolOptions::default()
        };
        let pool = Pool::new(options, factory.clone());

        let handles = pool
            .add_and_login_all(vec![spec("alice", None, None), spec("bob", None, None)])
            .await
            .unwrap();
        let alice = handles[0].principal().unwrap();
        let bob = handles[1].principal().unwrap();
        inventory.set_items(alice, vec![sim_item("101", 440), sim_item("102", 440)]);
        inventory.set_items(bob, vec![sim_item("201", 440)]);

        let mut items = pool
            .load_inventories(440, 2, true, 3, "english")
            .await
            .unwrap();
        items.sort_by(|a, b| a.item.asset_id.cmp(&b.item.asset_id));

        assert_eq!(items.len(), 3);
        assert_eq!(items[0].owner, alice);
        assert_eq!(items[0].owner_index, 0);
        assert_eq!(items[2].owner, bob);
        assert_eq!(items[2].owner_index, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn load_inventories_rejects_on_any_failed_fetch() {
        let factory = Arc::new(SimFactory::new());
        let inventory = Arc::new(SimInventory::new());
        let options = PoolOptions {
            inventory: Some(inventory.clone()),
            ..PoolOptions::default()
        };
        let pool = Pool::new(options, factory.clone());

        let handles = pool
            .add_and_login_all(vec![spec("alice", None, None), spec("bob", None, None)])
            .await
            .unwrap();
        inventory.set_items(handles[0].principal().unwrap(), vec![sim_item("101", 440)]);
        inventory.fail(handles[1].principal().unwrap(), "storage backend down");

        let err = pool
            .load_inventories(440, 2, true, 3, "english")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Inventory(_)), "got: {err}");
    }

    #[tokio::test(start_paused = true)]
    async fn load_inventories_requires_established_principals() {
        let factory = Arc::new(SimFactory::new());
        let options = PoolOptions {
            inventory: Some(Arc::new(SimInventory::new())),
            ..PoolOptions::default()
        };
        let pool = Pool::new(options, factory);

        // Registered but never logged in.
        let (identity, config) = spec("alice", None, None);
        pool.register(identity, config).await.unwrap();

        let err = pool
            .load_inventories(440, 2, true, 3, "english")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotLoggedIn(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_sessions_and_cancels_pending_retries() {
        let (pool, factory) = sim_pool();
        let (identity, config) = spec("alice", None, None);
        let handle = pool.add_and_login(identity, config).await.unwrap();
        let sim = factory.account("alice");

        sim.drop_connection("socket closed");
        pool.shutdown().await;
        tokio::time::sleep(Duration::from_secs(120)).await;

        assert_eq!(sim.log_on_calls(), 1, "no retry may fire after shutdown");
        assert!(matches!(
            handle.login().await.unwrap_err(),
            SessionError::Stopped
        ));
    }
}
