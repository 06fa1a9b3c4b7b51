// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The forwarding engine: rule CRUD, the activation protocol, session
//! lifecycle, restart-on-boot, and statistics.
//!
//! The engine borrows protocol handles from the account pool and never
//! closes one itself; connection trouble is reported back to the pool.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use courier_config::ForwardingConfig;
use courier_core::{ChatId, RuleStatus};
use courier_pool::AccountPool;
use courier_storage::queries::{accounts, audit, rules};
use courier_storage::{Database, ErrorRecord, ForwardStats, NewRule, RuleRecord};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::ForwardError;
use crate::session::{SessionHandle, SessionKey, SessionWorker};

/// Parameters for creating a forwarding rule.
#[derive(Debug, Clone)]
pub struct CreateRule {
    pub account_phone: String,
    pub source_chat_id: ChatId,
    pub source_chat_name: String,
    /// Destination conversations, in delivery order.
    pub destinations: Vec<ChatId>,
    /// Case-insensitive any-match filter; `None` forwards everything.
    pub keywords: Option<Vec<String>>,
}

/// Event-driven forwarding rule engine.
pub struct ForwardingEngine {
    config: ForwardingConfig,
    db: Arc<Database>,
    pool: Arc<AccountPool>,
    sessions: Mutex<HashMap<SessionKey, SessionHandle>>,
}

impl ForwardingEngine {
    pub fn new(
        config: ForwardingConfig,
        db: Arc<Database>,
        pool: Arc<AccountPool>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            db,
            pool,
            sessions: Mutex::new(HashMap::new()),
        })
    }

    /// Create a rule in status `stopped`.
    ///
    /// The destination list keeps operator order with duplicates removed;
    /// it must not end up empty. The referenced account must exist.
    pub async fn create_rule(&self, params: CreateRule) -> Result<i64, ForwardError> {
        let mut destinations = Vec::new();
        for chat in &params.destinations {
            if !destinations.contains(&chat.0) {
                destinations.push(chat.0);
            }
        }
        if destinations.is_empty() {
            return Err(ForwardError::NoDestinations);
        }

        let keywords = params.keywords.and_then(|kw| {
            let kw: Vec<String> = kw
                .into_iter()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect();
            if kw.is_empty() { None } else { Some(kw) }
        });

        if accounts::get_account(&self.db, &params.account_phone)
            .await?
            .is_none()
        {
            return Err(ForwardError::AccountUnavailable {
                phone: params.account_phone,
                reason: "account is not registered".to_string(),
            });
        }

        let rule_id = rules::insert_rule(
            &self.db,
            &NewRule {
                account_phone: params.account_phone.clone(),
                source_chat_id: params.source_chat_id.0,
                source_chat_name: params.source_chat_name.clone(),
                destination_chat_ids: destinations,
                keywords,
            },
        )
        .await?;

        info!(
            rule_id,
            account = %params.account_phone,
            source = %params.source_chat_id,
            "forwarding rule created"
        );
        Ok(rule_id)
    }

    /// Activate a rule: verify the account handle and source reachability,
    /// persist `running`, subscribe, and spawn the session worker.
    /// Idempotent success when the rule is already running.
    pub async fn start(self: &Arc<Self>, rule_id: i64) -> Result<(), ForwardError> {
        let rule = rules::get_rule(&self.db, rule_id)
            .await?
            .ok_or(ForwardError::RuleNotFound { id: rule_id })?;
        let key = SessionKey {
            phone: rule.account_phone.clone(),
            rule_id,
        };

        {
            let mut sessions = self.sessions.lock().await;
            if let Some(handle) = sessions.get(&key) {
                if handle.running.load(Ordering::SeqCst) {
                    return Ok(());
                }
                // Stale dead session; replace it.
                if let Some(handle) = sessions.remove(&key) {
                    handle.shutdown().await;
                }
            }
        }

        let client = match self.pool.ensure_connected(&rule.account_phone).await {
            Ok(client) => client,
            Err(e) => {
                let reason = e.to_string();
                self.fail_activation(&rule, "start_error", &reason).await?;
                return Err(ForwardError::AccountUnavailable {
                    phone: rule.account_phone.clone(),
                    reason,
                });
            }
        };

        let source = ChatId(rule.source_chat_id);
        if let Err(e) = client.resolve_chat(source).await {
            let reason = e.to_string();
            self.fail_activation(&rule, "source_chat_inaccessible", &reason)
                .await?;
            return Err(ForwardError::SourceUnreachable {
                chat: rule.source_chat_id,
                reason,
            });
        }

        rules::update_status(&self.db, rule_id, RuleStatus::Running).await?;

        let subscription = match client.subscribe(source).await {
            Ok(subscription) => subscription,
            Err(e) => {
                let reason = e.to_string();
                self.fail_activation(&rule, "subscribe_failed", &reason).await?;
                return Err(ForwardError::SourceUnreachable {
                    chat: rule.source_chat_id,
                    reason,
                });
            }
        };

        let running = Arc::new(AtomicBool::new(true));
        let cancel = CancellationToken::new();
        let worker = SessionWorker {
            rule_id,
            phone: rule.account_phone.clone(),
            source,
            destinations: rule.destination_chat_ids.iter().map(|&id| ChatId(id)).collect(),
            keywords: rule.keywords.clone(),
            running: Arc::clone(&running),
            cancel: cancel.clone(),
            pool: Arc::clone(&self.pool),
            db: Arc::clone(&self.db),
            config: self.config.clone(),
        };
        let task = tokio::spawn(worker.run(subscription));

        self.sessions.lock().await.insert(
            key,
            SessionHandle {
                running,
                cancel,
                task,
            },
        );

        info!(
            rule_id,
            account = %rule.account_phone,
            source = rule.source_chat_id,
            "forwarding started"
        );
        Ok(())
    }

    /// Persist `error` status plus the failure reason in the audit log.
    async fn fail_activation(
        &self,
        rule: &RuleRecord,
        kind: &str,
        reason: &str,
    ) -> Result<(), ForwardError> {
        audit::insert_error(
            &self.db,
            Some(rule.id),
            Some(rule.account_phone.as_str()),
            kind,
            reason,
        )
        .await?;
        rules::update_status(&self.db, rule.id, RuleStatus::Error).await?;
        Ok(())
    }

    /// Deactivate a rule. The in-memory guard flips first, so an event
    /// already in flight is dropped even before the subscription is gone.
    /// Idempotent when no session is active.
    pub async fn stop(&self, rule_id: i64) -> Result<(), ForwardError> {
        rules::get_rule(&self.db, rule_id)
            .await?
            .ok_or(ForwardError::RuleNotFound { id: rule_id })?;

        let handle = {
            let mut sessions = self.sessions.lock().await;
            let key = sessions
                .keys()
                .find(|key| key.rule_id == rule_id)
                .cloned();
            key.and_then(|key| sessions.remove(&key))
        };
        if let Some(handle) = handle {
            handle.shutdown().await;
        }

        rules::update_status(&self.db, rule_id, RuleStatus::Stopped).await?;
        info!(rule_id, "forwarding stopped");
        Ok(())
    }

    /// Stop (idempotent) and delete a rule.
    pub async fn delete(&self, rule_id: i64) -> Result<(), ForwardError> {
        self.stop(rule_id).await?;
        rules::delete_rule(&self.db, rule_id).await?;
        info!(rule_id, "forwarding rule deleted");
        Ok(())
    }

    /// Re-activate every rule persisted as `running`.
    ///
    /// Activation failures demote the rule to `error` (done inside
    /// [`Self::start`]) instead of failing startup. Returns the number of
    /// rules brought back up.
    pub async fn restart_persisted_rules(self: &Arc<Self>) -> Result<usize, ForwardError> {
        let all = rules::list_rules(&self.db, None).await?;
        let mut restarted = 0;
        for rule in all {
            if rule.status != RuleStatus::Running {
                continue;
            }
            match self.start(rule.id).await {
                Ok(()) => restarted += 1,
                Err(e) => {
                    warn!(rule_id = rule.id, error = %e, "failed to restart persisted rule");
                }
            }
        }
        info!(restarted, "persisted rules restarted");
        Ok(restarted)
    }

    /// Whether a rule has a live session right now.
    pub async fn is_active(&self, rule_id: i64) -> bool {
        let sessions = self.sessions.lock().await;
        sessions
            .iter()
            .any(|(key, handle)| key.rule_id == rule_id && handle.running.load(Ordering::SeqCst))
    }

    /// One rule by id.
    pub async fn rule(&self, rule_id: i64) -> Result<Option<RuleRecord>, ForwardError> {
        Ok(rules::get_rule(&self.db, rule_id).await?)
    }

    /// All rules, optionally scoped to one account.
    pub async fn list_rules(
        &self,
        account_phone: Option<&str>,
    ) -> Result<Vec<RuleRecord>, ForwardError> {
        Ok(rules::list_rules(&self.db, account_phone).await?)
    }

    /// Aggregate statistics over the audit logs, per rule or global.
    pub async fn statistics(&self, rule_id: Option<i64>) -> Result<ForwardStats, ForwardError> {
        Ok(audit::stats(&self.db, rule_id).await?)
    }

    /// Most recent error records, optionally scoped to one rule.
    pub async fn recent_errors(
        &self,
        rule_id: Option<i64>,
        limit: i64,
    ) -> Result<Vec<ErrorRecord>, ForwardError> {
        Ok(audit::list_errors(&self.db, rule_id, limit).await?)
    }

    /// One-shot manual test of a rule: forward the newest source message to
    /// the first destination. Touches no rule state.
    pub async fn test_rule(self: &Arc<Self>, rule_id: i64) -> Result<i64, ForwardError> {
        let rule = rules::get_rule(&self.db, rule_id)
            .await?
            .ok_or(ForwardError::RuleNotFound { id: rule_id })?;
        let destination = *rule
            .destination_chat_ids
            .first()
            .ok_or(ForwardError::NoDestinations)?;

        let client = self.pool.ensure_connected(&rule.account_phone).await?;
        let source = ChatId(rule.source_chat_id);
        let messages = client
            .recent_messages(source, 1)
            .await
            .map_err(ForwardError::Client)?;
        let newest = messages.first().ok_or(ForwardError::EmptySource)?;

        client
            .forward_message(ChatId(destination), source, newest.id)
            .await
            .map_err(ForwardError::Client)?;

        info!(rule_id, message_id = newest.id, destination, "test forward delivered");
        Ok(newest.id)
    }

    /// Tear down every live session without touching persisted statuses,
    /// so rules persisted as `running` resume on the next boot.
    pub async fn shutdown(&self) {
        let handles: Vec<SessionHandle> = {
            let mut sessions = self.sessions.lock().await;
            sessions.drain().map(|(_, handle)| handle).collect()
        };
        for handle in handles {
            handle.shutdown().await;
        }
        info!("forwarding engine shut down");
    }
}
