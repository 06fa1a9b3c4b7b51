// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The account pool: ownership of protocol handles, the per-account
//! lifecycle state machine, selection with daily rate limiting, and the
//! reconnect/maintenance supervisors.
//!
//! Lock discipline: the `accounts` map lock guards membership only and is
//! held briefly; each account has its own slot lock serializing every
//! state-machine or row mutation for that account. Lock order is always
//! map before slot, never the reverse. Teardown (supervisor join, handle
//! disconnect) happens outside both locks.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use chrono::Utc;
use courier_config::PoolConfig;
use courier_core::{
    AccountStatus, ApiCredentials, ClientError, ProtocolClient, ProtocolConnector, ProxyConfig,
    SelfInfo,
};
use courier_storage::queries::accounts;
use courier_storage::{AccountRecord, Database};
use regex::Regex;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::PoolError;
use crate::report::{AccountStatusEntry, PoolStatusReport};
use crate::supervisor::{spawn_supervisor, ReconnectPolicy, SupervisorHandle};

/// International number pattern: `+` followed by 10-15 digits.
static PHONE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+[1-9]\d{9,14}$").expect("valid phone pattern"));

/// Outcome of [`AccountPool::complete_auth`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// Sign-in finished; the account is active.
    Authorized(SelfInfo),
    /// The account has two-factor auth enabled; call `complete_auth` again
    /// with the password.
    TwoFactorRequired,
}

/// In-memory state of one managed account. Guarded by the slot lock.
struct AccountSlot {
    record: AccountRecord,
    client: Option<Arc<dyn ProtocolClient>>,
    supervisor: Option<SupervisorHandle>,
    /// Set when the slot has been removed from the map; stale references
    /// must treat the account as gone.
    removed: bool,
}

/// Pool of authenticated protocol sessions.
pub struct AccountPool {
    config: PoolConfig,
    db: Arc<Database>,
    connector: Arc<dyn ProtocolConnector>,
    accounts: Mutex<HashMap<String, Arc<Mutex<AccountSlot>>>>,
    shutdown_token: CancellationToken,
    maintenance: Mutex<Option<JoinHandle<()>>>,
}

impl AccountPool {
    pub fn new(
        config: PoolConfig,
        db: Arc<Database>,
        connector: Arc<dyn ProtocolConnector>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            db,
            connector,
            accounts: Mutex::new(HashMap::new()),
            shutdown_token: CancellationToken::new(),
            maintenance: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    fn policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            base_delay: Duration::from_millis(self.config.reconnect_base_delay_ms),
            max_delay: Duration::from_millis(self.config.reconnect_max_delay_ms),
            max_attempts: self.config.reconnect_max_attempts,
            max_flood_wait: Duration::from_secs(self.config.max_flood_wait_secs),
        }
    }

    async fn slot(&self, phone: &str) -> Option<Arc<Mutex<AccountSlot>>> {
        self.accounts.lock().await.get(phone).cloned()
    }

    /// Register a new account: validate, persist a `pending_code` row, open
    /// a connection, and request a verification code. The registration is
    /// rolled back on any failure, leaving no partial state.
    pub async fn register(
        self: &Arc<Self>,
        phone: &str,
        credentials: &ApiCredentials,
        proxy: Option<&str>,
    ) -> Result<(), PoolError> {
        let phone = phone.trim();
        if !PHONE_PATTERN.is_match(phone) {
            return Err(PoolError::InvalidPhone {
                phone: phone.to_string(),
            });
        }
        if !credentials.is_complete() {
            return Err(PoolError::MissingCredentials);
        }
        let proxy_config = match proxy {
            Some(raw) => Some(raw.parse::<ProxyConfig>().map_err(PoolError::InvalidProxy)?),
            None => None,
        };

        if self.accounts.lock().await.contains_key(phone) {
            return Err(PoolError::DuplicateAccount {
                phone: phone.to_string(),
            });
        }
        if accounts::get_account(&self.db, phone).await?.is_some() {
            return Err(PoolError::DuplicateAccount {
                phone: phone.to_string(),
            });
        }

        let now = now_string();
        let record = AccountRecord {
            phone: phone.to_string(),
            api_id: credentials.api_id,
            api_hash: credentials.api_hash.clone(),
            proxy: proxy.map(str::to_string),
            status: AccountStatus::PendingCode,
            user_id: None,
            username: None,
            error_count: 0,
            last_error: None,
            created_at: now.clone(),
            updated_at: now,
            last_activity: None,
            daily_count: 0,
            last_reset_date: today_string(),
        };
        accounts::insert_account(&self.db, &record).await?;

        let slot = Arc::new(Mutex::new(AccountSlot {
            record,
            client: None,
            supervisor: None,
            removed: false,
        }));
        self.accounts
            .lock()
            .await
            .insert(phone.to_string(), Arc::clone(&slot));

        let result = self
            .begin_sign_in(&slot, phone, credentials, proxy_config.as_ref())
            .await;
        if result.is_err() {
            self.discard_registration(phone, &slot).await;
        }
        result
    }

    /// Connection phase of registration: connect, reject sessions that are
    /// already authorized, and request the verification code.
    async fn begin_sign_in(
        &self,
        slot: &Arc<Mutex<AccountSlot>>,
        phone: &str,
        credentials: &ApiCredentials,
        proxy: Option<&ProxyConfig>,
    ) -> Result<(), PoolError> {
        let client = self
            .connector
            .create(phone, credentials, proxy)
            .await
            .map_err(|e| PoolError::from_client(phone, e))?;
        client
            .connect()
            .await
            .map_err(|e| PoolError::from_client(phone, e))?;

        match client.is_authorized().await {
            Ok(true) => {
                let identity = match client.get_self().await {
                    Ok(info) => info.username.unwrap_or_else(|| info.user_id.to_string()),
                    Err(_) => "unknown".to_string(),
                };
                client.disconnect().await;
                return Err(PoolError::AlreadyAuthorized {
                    phone: phone.to_string(),
                    identity,
                });
            }
            Ok(false) => {}
            Err(e) => {
                client.disconnect().await;
                return Err(PoolError::from_client(phone, e));
            }
        }

        if let Err(e) = client.request_login_code().await {
            client.disconnect().await;
            return Err(PoolError::from_client(phone, e));
        }

        slot.lock().await.client = Some(client);
        info!(phone, "verification code requested");
        Ok(())
    }

    /// Roll back a failed registration: drop the slot and the pending row.
    async fn discard_registration(&self, phone: &str, slot: &Arc<Mutex<AccountSlot>>) {
        self.accounts.lock().await.remove(phone);
        let client = {
            let mut slot = slot.lock().await;
            slot.removed = true;
            slot.client.take()
        };
        if let Some(client) = client {
            client.disconnect().await;
        }
        if let Err(e) = accounts::delete_account(&self.db, phone).await {
            warn!(phone, error = %e, "failed to delete discarded registration row");
        }
    }

    /// Resume a pending registration with the verification code and, when
    /// the account has two-factor auth, the password.
    pub async fn complete_auth(
        self: &Arc<Self>,
        phone: &str,
        code: Option<&str>,
        password: Option<&str>,
    ) -> Result<AuthOutcome, PoolError> {
        let slot_arc = self.slot(phone).await.ok_or_else(|| PoolError::AccountNotFound {
            phone: phone.to_string(),
        })?;
        let mut slot = slot_arc.lock().await;
        if slot.removed {
            return Err(PoolError::AccountNotFound {
                phone: phone.to_string(),
            });
        }
        let client = slot.client.clone().ok_or_else(|| PoolError::NoPendingSignIn {
            phone: phone.to_string(),
        })?;

        match slot.record.status {
            AccountStatus::PendingCode => {
                let code = code.ok_or(PoolError::CodeRequired)?;
                match client.sign_in_code(code).await {
                    Ok(info) => {
                        let info = self.finish_auth(phone, &mut slot, info).await?;
                        Ok(AuthOutcome::Authorized(info))
                    }
                    Err(ClientError::PasswordRequired) => match password {
                        Some(pw) => self.try_password(phone, &mut slot, &*client, pw).await,
                        None => {
                            self.persist_status(&mut slot, phone, AccountStatus::PendingTwoFactor)
                                .await?;
                            Ok(AuthOutcome::TwoFactorRequired)
                        }
                    },
                    Err(e) => Err(PoolError::from_client(phone, e)),
                }
            }
            AccountStatus::PendingTwoFactor => match password {
                Some(pw) => self.try_password(phone, &mut slot, &*client, pw).await,
                None => Ok(AuthOutcome::TwoFactorRequired),
            },
            _ => Err(PoolError::NoPendingSignIn {
                phone: phone.to_string(),
            }),
        }
    }

    async fn try_password(
        self: &Arc<Self>,
        phone: &str,
        slot: &mut AccountSlot,
        client: &dyn ProtocolClient,
        password: &str,
    ) -> Result<AuthOutcome, PoolError> {
        match client.sign_in_password(password).await {
            Ok(info) => {
                let info = self.finish_auth(phone, slot, info).await?;
                Ok(AuthOutcome::Authorized(info))
            }
            Err(e) => {
                // Keep the sign-in resumable: the password can be retried.
                self.persist_status(slot, phone, AccountStatus::PendingTwoFactor)
                    .await?;
                Err(PoolError::from_client(phone, e))
            }
        }
    }

    /// Transition a freshly authorized account to `active`, record its
    /// network identity, and arm the reconnect supervisor.
    async fn finish_auth(
        self: &Arc<Self>,
        phone: &str,
        slot: &mut AccountSlot,
        info: SelfInfo,
    ) -> Result<SelfInfo, PoolError> {
        let now = now_string();
        accounts::update_status(&self.db, phone, AccountStatus::Active).await?;
        accounts::update_identity(&self.db, phone, info.user_id, info.username.as_deref())
            .await?;
        accounts::clear_error(&self.db, phone).await?;
        accounts::update_usage(
            &self.db,
            phone,
            slot.record.daily_count,
            Some(now.as_str()),
            &slot.record.last_reset_date,
        )
        .await?;

        slot.record.status = AccountStatus::Active;
        slot.record.user_id = Some(info.user_id);
        slot.record.username = info.username.clone();
        slot.record.error_count = 0;
        slot.record.last_error = None;
        slot.record.last_activity = Some(now);

        if self.config.auto_reconnect && slot.supervisor.is_none() {
            slot.supervisor = Some(spawn_supervisor(
                Arc::downgrade(self),
                phone.to_string(),
                self.policy(),
                &self.shutdown_token,
            ));
        }

        info!(
            phone,
            user_id = info.user_id,
            username = info.username.as_deref().unwrap_or(""),
            "account authorized"
        );
        Ok(info)
    }

    /// Connect an account. No-op success when already connected.
    pub async fn connect(self: &Arc<Self>, phone: &str) -> Result<(), PoolError> {
        let slot_arc = self.slot(phone).await.ok_or_else(|| PoolError::AccountNotFound {
            phone: phone.to_string(),
        })?;
        let mut slot = slot_arc.lock().await;
        if slot.removed {
            return Err(PoolError::AccountNotFound {
                phone: phone.to_string(),
            });
        }
        self.connect_slot(&mut slot, phone).await?;
        if self.config.auto_reconnect && slot.supervisor.is_none() {
            slot.supervisor = Some(spawn_supervisor(
                Arc::downgrade(self),
                phone.to_string(),
                self.policy(),
                &self.shutdown_token,
            ));
        }
        Ok(())
    }

    /// Connect logic shared by `connect` and the supervisor path. Does not
    /// touch the supervisor handle. Caller holds the slot lock.
    async fn connect_slot(&self, slot: &mut AccountSlot, phone: &str) -> Result<(), PoolError> {
        if slot.record.status == AccountStatus::Banned {
            return Err(PoolError::Banned {
                phone: phone.to_string(),
            });
        }
        if let Some(ref client) = slot.client {
            if client.is_connected() {
                return Ok(());
            }
        }

        let client = match slot.client.clone() {
            Some(client) => client,
            None => {
                let credentials = ApiCredentials {
                    api_id: slot.record.api_id,
                    api_hash: slot.record.api_hash.clone(),
                };
                let proxy = match slot.record.proxy.as_deref() {
                    Some(raw) => {
                        Some(raw.parse::<ProxyConfig>().map_err(PoolError::InvalidProxy)?)
                    }
                    None => None,
                };
                let client = self
                    .connector
                    .create(phone, &credentials, proxy.as_ref())
                    .await
                    .map_err(|e| PoolError::from_client(phone, e))?;
                slot.client = Some(Arc::clone(&client));
                client
            }
        };

        if let Err(e) = client.connect().await {
            return self.handle_connect_failure(slot, phone, e).await;
        }

        match client.is_authorized().await {
            Ok(true) => {}
            Ok(false) => {
                client.disconnect().await;
                slot.client = None;
                self.persist_status(slot, phone, AccountStatus::Offline).await?;
                return Err(PoolError::NotAuthorized {
                    phone: phone.to_string(),
                });
            }
            Err(e) => return self.handle_connect_failure(slot, phone, e).await,
        }

        if let Ok(info) = client.get_self().await {
            slot.record.user_id = Some(info.user_id);
            slot.record.username = info.username.clone();
            if let Err(e) =
                accounts::update_identity(&self.db, phone, info.user_id, info.username.as_deref())
                    .await
            {
                warn!(phone, error = %e, "failed to persist account identity");
            }
        }

        accounts::update_status(&self.db, phone, AccountStatus::Active).await?;
        accounts::clear_error(&self.db, phone).await?;
        slot.record.status = AccountStatus::Active;
        slot.record.error_count = 0;
        slot.record.last_error = None;
        info!(phone, "account connected");
        Ok(())
    }

    /// Classify a connect failure, advance the state machine, and persist.
    async fn handle_connect_failure(
        &self,
        slot: &mut AccountSlot,
        phone: &str,
        error: ClientError,
    ) -> Result<(), PoolError> {
        match error {
            ClientError::FloodWait { seconds } => {
                slot.record.last_error = Some(format!("flood wait for {seconds}s"));
                self.persist_status(slot, phone, AccountStatus::FloodWait).await?;
                warn!(phone, seconds, "connect flood-waited");
                Err(PoolError::RateLimited { seconds })
            }
            ClientError::PhoneBanned => {
                if let Some(client) = slot.client.take() {
                    client.disconnect().await;
                }
                self.persist_status(slot, phone, AccountStatus::Banned).await?;
                warn!(phone, "account banned by the network");
                Err(PoolError::Banned {
                    phone: phone.to_string(),
                })
            }
            other => {
                accounts::record_error(&self.db, phone, &other.to_string()).await?;
                slot.record.error_count += 1;
                slot.record.last_error = Some(other.to_string());
                let status = if slot.record.error_count >= self.config.error_limit {
                    AccountStatus::Limited
                } else {
                    AccountStatus::Error
                };
                self.persist_status(slot, phone, status).await?;
                warn!(
                    phone,
                    error_count = slot.record.error_count,
                    status = %status,
                    error = %other,
                    "connect failed"
                );
                Err(PoolError::from_client(phone, other))
            }
        }
    }

    /// Persist a status transition, advancing in-memory state only after
    /// the store accepted it.
    async fn persist_status(
        &self,
        slot: &mut AccountSlot,
        phone: &str,
        status: AccountStatus,
    ) -> Result<(), PoolError> {
        accounts::update_status(&self.db, phone, status).await?;
        slot.record.status = status;
        Ok(())
    }

    /// Disconnect an account: cancel its supervisor and release the handle.
    /// Idempotent when already disconnected.
    pub async fn disconnect(&self, phone: &str) -> Result<(), PoolError> {
        let slot_arc = self.slot(phone).await.ok_or_else(|| PoolError::AccountNotFound {
            phone: phone.to_string(),
        })?;
        let (supervisor, client) = {
            let mut slot = slot_arc.lock().await;
            if slot.removed {
                return Err(PoolError::AccountNotFound {
                    phone: phone.to_string(),
                });
            }
            if !slot.record.status.is_terminal() {
                self.persist_status(&mut slot, phone, AccountStatus::Offline)
                    .await?;
            }
            (slot.supervisor.take(), slot.client.take())
        };
        // Teardown outside the slot lock: the supervisor may be blocked on it.
        if let Some(supervisor) = supervisor {
            supervisor.shutdown().await;
        }
        if let Some(client) = client {
            client.disconnect().await;
        }
        info!(phone, "account disconnected");
        Ok(())
    }

    /// Disconnect-then-connect.
    pub async fn reconnect(self: &Arc<Self>, phone: &str) -> Result<(), PoolError> {
        self.disconnect(phone).await?;
        self.connect(phone).await
    }

    /// Reconnect path used by the supervisor and the maintenance task:
    /// leaves the supervisor handle untouched so a supervisor can never
    /// cancel itself.
    pub(crate) async fn supervised_reconnect(&self, phone: &str) -> Result<(), PoolError> {
        let slot_arc = self.slot(phone).await.ok_or_else(|| PoolError::AccountNotFound {
            phone: phone.to_string(),
        })?;
        let mut slot = slot_arc.lock().await;
        if slot.removed {
            return Err(PoolError::AccountNotFound {
                phone: phone.to_string(),
            });
        }
        if let Some(ref client) = slot.client {
            if client.is_connected() {
                return Ok(());
            }
        }
        if let Some(client) = slot.client.take() {
            client.disconnect().await;
        }
        self.connect_slot(&mut slot, phone).await
    }

    /// Signal that an account's connection was observed dead. Arms the
    /// account's supervisor; borrowers must never close the handle
    /// themselves.
    pub async fn report_disconnect(&self, phone: &str) {
        if let Some(slot_arc) = self.slot(phone).await {
            let slot = slot_arc.lock().await;
            match slot.supervisor {
                Some(ref supervisor) => {
                    debug!(phone, "disconnect reported, supervisor armed");
                    supervisor.trigger();
                }
                None => debug!(phone, "disconnect reported, no supervisor armed"),
            }
        }
    }

    /// Borrow the live handle for an account, if any. The pool retains
    /// ownership.
    pub async fn client(&self, phone: &str) -> Option<Arc<dyn ProtocolClient>> {
        let slot_arc = self.slot(phone).await?;
        let slot = slot_arc.lock().await;
        if slot.removed {
            return None;
        }
        slot.client.clone()
    }

    /// Snapshot of an account row as the pool currently sees it.
    pub async fn account(&self, phone: &str) -> Option<AccountRecord> {
        let slot_arc = self.slot(phone).await?;
        let slot = slot_arc.lock().await;
        if slot.removed {
            return None;
        }
        Some(slot.record.clone())
    }

    /// Borrow a connected, authorized handle, connecting first if needed.
    pub async fn ensure_connected(
        self: &Arc<Self>,
        phone: &str,
    ) -> Result<Arc<dyn ProtocolClient>, PoolError> {
        let slot_arc = self.slot(phone).await.ok_or_else(|| PoolError::AccountNotFound {
            phone: phone.to_string(),
        })?;
        let mut slot = slot_arc.lock().await;
        if slot.removed {
            return Err(PoolError::AccountNotFound {
                phone: phone.to_string(),
            });
        }
        let connected = slot
            .client
            .as_ref()
            .is_some_and(|client| client.is_connected());
        if !connected {
            self.connect_slot(&mut slot, phone).await?;
        }
        slot.client.clone().ok_or_else(|| PoolError::ConnectionFailed {
            phone: phone.to_string(),
            reason: "client unavailable after reconnect".to_string(),
        })
    }

    /// Select one usable account for the given purpose.
    ///
    /// Eligible accounts are `active`, below the daily limit (counters are
    /// lazily reset on calendar-day rollover), and the pick is the one idle
    /// longest. Selection increments the winner's usage counter and stamps
    /// its activity time.
    pub async fn get_available(&self, purpose: &str) -> Result<Option<AccountRecord>, PoolError> {
        let slots: Vec<(String, Arc<Mutex<AccountSlot>>)> = {
            let map = self.accounts.lock().await;
            map.iter().map(|(k, v)| (k.clone(), Arc::clone(v))).collect()
        };
        let today = today_string();

        let mut best: Option<(i64, String)> = None;
        for (phone, slot_arc) in &slots {
            let mut slot = slot_arc.lock().await;
            if slot.removed || slot.record.status != AccountStatus::Active {
                continue;
            }
            if slot.record.last_reset_date != today {
                accounts::update_usage(
                    &self.db,
                    phone,
                    0,
                    slot.record.last_activity.as_deref(),
                    &today,
                )
                .await?;
                slot.record.daily_count = 0;
                slot.record.last_reset_date = today.clone();
                debug!(phone = %phone, "daily usage counter reset");
            }
            if slot.record.daily_count >= self.config.daily_limit {
                continue;
            }
            let idle = idle_millis(slot.record.last_activity.as_deref());
            if best.as_ref().is_none_or(|(b, _)| idle > *b) {
                best = Some((idle, phone.clone()));
            }
        }

        let Some((_, phone)) = best else {
            warn!(purpose, "no available accounts");
            return Ok(None);
        };

        let Some(slot_arc) = self.slot(&phone).await else {
            return Ok(None);
        };
        let mut slot = slot_arc.lock().await;
        if slot.removed
            || slot.record.status != AccountStatus::Active
            || slot.record.daily_count >= self.config.daily_limit
        {
            return Ok(None);
        }
        let now = now_string();
        accounts::update_usage(
            &self.db,
            &phone,
            slot.record.daily_count + 1,
            Some(now.as_str()),
            &slot.record.last_reset_date,
        )
        .await?;
        slot.record.daily_count += 1;
        slot.record.last_activity = Some(now);
        info!(
            phone = %phone,
            purpose,
            used = slot.record.daily_count,
            limit = self.config.daily_limit,
            "account selected"
        );
        Ok(Some(slot.record.clone()))
    }

    /// Remove an account: cancel its supervisor, disconnect, delete the
    /// row, and optionally delete the local session artifact.
    pub async fn remove(&self, phone: &str, delete_session: bool) -> Result<(), PoolError> {
        let slot_arc = self.accounts.lock().await.remove(phone);
        match slot_arc {
            Some(slot_arc) => {
                let (supervisor, client) = {
                    let mut slot = slot_arc.lock().await;
                    slot.removed = true;
                    (slot.supervisor.take(), slot.client.take())
                };
                if let Some(supervisor) = supervisor {
                    supervisor.shutdown().await;
                }
                if let Some(client) = client {
                    client.disconnect().await;
                }
            }
            None => {
                if accounts::get_account(&self.db, phone).await?.is_none() {
                    return Err(PoolError::AccountNotFound {
                        phone: phone.to_string(),
                    });
                }
            }
        }

        accounts::delete_account(&self.db, phone).await?;
        if delete_session {
            if let Err(e) = self.connector.remove_session(phone).await {
                warn!(phone, error = %e, "failed to delete session artifact");
            }
        }
        info!(phone, "account removed");
        Ok(())
    }

    /// Load persisted accounts into the pool at boot.
    ///
    /// Registrations that were in flight cannot be resumed after a restart
    /// and are demoted to `offline`. Accounts persisted as `active` get a
    /// connection attempt; failures are isolated per account.
    pub async fn load_persisted(self: &Arc<Self>) -> Result<usize, PoolError> {
        let rows = accounts::list_accounts(&self.db).await?;
        let mut loaded = 0;
        let mut to_connect = Vec::new();

        for mut record in rows {
            let phone = record.phone.clone();
            if self.accounts.lock().await.contains_key(&phone) {
                continue;
            }
            if matches!(
                record.status,
                AccountStatus::PendingCode | AccountStatus::PendingTwoFactor
            ) {
                accounts::update_status(&self.db, &phone, AccountStatus::Offline).await?;
                record.status = AccountStatus::Offline;
            }
            if record.status == AccountStatus::Active {
                to_connect.push(phone.clone());
            }
            let slot = Arc::new(Mutex::new(AccountSlot {
                record,
                client: None,
                supervisor: None,
                removed: false,
            }));
            self.accounts.lock().await.insert(phone, slot);
            loaded += 1;
        }

        for phone in to_connect {
            if let Err(e) = self.connect(&phone).await {
                warn!(phone = %phone, error = %e, "failed to reconnect persisted account");
            }
        }

        info!(loaded, "persisted accounts loaded");
        Ok(loaded)
    }

    /// Start the periodic maintenance task: daily-counter reset on calendar
    /// rollover and a connection check that re-arms supervisors of active
    /// accounts whose handle has dropped. Cancelled by [`Self::shutdown`].
    pub async fn start_maintenance(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let cancel = self.shutdown_token.clone();
        let interval = Duration::from_secs(self.config.maintenance_interval_secs.max(1));

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // interval fires immediately; consume the first tick.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let Some(pool) = weak.upgrade() else { break };
                pool.run_maintenance().await;
            }
            debug!("maintenance task exited");
        });

        *self.maintenance.lock().await = Some(handle);
    }

    /// One maintenance pass. Public so tests and callers can run it on
    /// demand.
    pub async fn run_maintenance(&self) {
        let slots: Vec<(String, Arc<Mutex<AccountSlot>>)> = {
            let map = self.accounts.lock().await;
            map.iter().map(|(k, v)| (k.clone(), Arc::clone(v))).collect()
        };
        let today = today_string();
        let mut needs_reconnect = Vec::new();

        for (phone, slot_arc) in slots {
            let mut slot = slot_arc.lock().await;
            if slot.removed {
                continue;
            }
            if slot.record.last_reset_date != today {
                match accounts::update_usage(
                    &self.db,
                    &phone,
                    0,
                    slot.record.last_activity.as_deref(),
                    &today,
                )
                .await
                {
                    Ok(()) => {
                        slot.record.daily_count = 0;
                        slot.record.last_reset_date = today.clone();
                    }
                    Err(e) => {
                        warn!(phone = %phone, error = %e, "failed to persist daily reset");
                    }
                }
            }
            if slot.record.status == AccountStatus::Active {
                let connected = slot
                    .client
                    .as_ref()
                    .is_some_and(|client| client.is_connected());
                if !connected {
                    match slot.supervisor {
                        Some(ref supervisor) => supervisor.trigger(),
                        None => needs_reconnect.push(phone.clone()),
                    }
                }
            }
        }

        for phone in needs_reconnect {
            if let Err(e) = self.supervised_reconnect(&phone).await {
                warn!(phone = %phone, error = %e, "maintenance reconnect failed");
            }
        }
    }

    /// Aggregate status across all accounts.
    pub async fn status_report(&self) -> PoolStatusReport {
        let slots: Vec<(String, Arc<Mutex<AccountSlot>>)> = {
            let map = self.accounts.lock().await;
            map.iter().map(|(k, v)| (k.clone(), Arc::clone(v))).collect()
        };

        let mut entries = Vec::new();
        let mut by_status = std::collections::BTreeMap::new();
        let mut total_used = 0i64;

        for (_, slot_arc) in slots {
            let slot = slot_arc.lock().await;
            if slot.removed {
                continue;
            }
            let record = &slot.record;
            *by_status.entry(record.status.to_string()).or_insert(0) += 1;
            total_used += record.daily_count;
            entries.push(AccountStatusEntry {
                phone: record.phone.clone(),
                username: record.username.clone(),
                user_id: record.user_id,
                status: record.status,
                connected: slot
                    .client
                    .as_ref()
                    .is_some_and(|client| client.is_connected()),
                daily_count: record.daily_count,
                remaining: (self.config.daily_limit - record.daily_count).max(0),
                error_count: record.error_count,
                last_error: record.last_error.clone(),
                last_activity: record.last_activity.clone(),
            });
        }
        entries.sort_by(|a, b| a.phone.cmp(&b.phone));

        let total_accounts = entries.len();
        let total_capacity = total_accounts as i64 * self.config.daily_limit;
        let capacity_used_percent = if total_capacity > 0 {
            ((total_used * 100 / total_capacity).min(100)) as u8
        } else {
            0
        };

        PoolStatusReport {
            generated_at: now_string(),
            total_accounts,
            by_status,
            daily_limit: self.config.daily_limit,
            total_used_today: total_used,
            total_remaining: (total_capacity - total_used).max(0),
            capacity_used_percent,
            accounts: entries,
        }
    }

    /// Shut the pool down: cancel the maintenance task and every
    /// supervisor, then best-effort disconnect all known handles.
    pub async fn shutdown(&self) {
        self.shutdown_token.cancel();
        if let Some(handle) = self.maintenance.lock().await.take() {
            let _ = handle.await;
        }

        let slots: Vec<Arc<Mutex<AccountSlot>>> = {
            let map = self.accounts.lock().await;
            map.values().cloned().collect()
        };
        for slot_arc in slots {
            let (supervisor, client) = {
                let mut slot = slot_arc.lock().await;
                (slot.supervisor.take(), slot.client.take())
            };
            if let Some(supervisor) = supervisor {
                supervisor.shutdown().await;
            }
            if let Some(client) = client {
                client.disconnect().await;
            }
        }
        info!("account pool shut down");
    }
}

fn now_string() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

fn today_string() -> String {
    Utc::now().date_naive().to_string()
}

/// Milliseconds since the recorded activity; accounts that never acted
/// sort as idle forever.
fn idle_millis(last_activity: Option<&str>) -> i64 {
    match last_activity.and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok()) {
        Some(ts) => (Utc::now() - ts.with_timezone(&Utc)).num_milliseconds(),
        None => i64::MAX,
    }
}
