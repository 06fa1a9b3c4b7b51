// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-rule forwarding session: the worker task consuming one source
//! subscription and fanning messages out to the destinations.
//!
//! Single-writer discipline: the checkpoint and forwarded counter of a rule
//! are mutated only by its own worker; statistics readers see append-only
//! audit rows plus those single-writer columns.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use courier_config::ForwardingConfig;
use courier_core::{ChatId, ClientError, NewMessage, RuleStatus, Subscription};
use courier_pool::AccountPool;
use courier_storage::queries::{audit, rules};
use courier_storage::{Database, NewForward};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Composite identifier of one active subscription: account plus rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub phone: String,
    pub rule_id: i64,
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.phone, self.rule_id)
    }
}

/// Owning handle to a running session worker.
pub(crate) struct SessionHandle {
    pub running: Arc<AtomicBool>,
    pub cancel: CancellationToken,
    pub task: JoinHandle<()>,
}

impl SessionHandle {
    /// Stop the worker: flip the in-memory guard (authoritative gate for
    /// stale events), sever the subscription, and wait for the task.
    pub async fn shutdown(self) {
        self.running.store(false, Ordering::SeqCst);
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            if !e.is_cancelled() {
                warn!(error = %e, "session task join error");
            }
        }
    }
}

/// `true` when the message passes the rule's keyword filter.
///
/// An empty or absent keyword set forwards unconditionally; otherwise the
/// text must contain at least one keyword, case-insensitively.
pub(crate) fn matches_keywords(text: &str, keywords: Option<&[String]>) -> bool {
    match keywords {
        None => true,
        Some(keywords) if keywords.is_empty() => true,
        Some(keywords) => {
            let text = text.to_lowercase();
            keywords.iter().any(|k| text.contains(&k.to_lowercase()))
        }
    }
}

/// State owned by one session worker task.
pub(crate) struct SessionWorker {
    pub rule_id: i64,
    pub phone: String,
    pub source: ChatId,
    pub destinations: Vec<ChatId>,
    pub keywords: Option<Vec<String>>,
    pub running: Arc<AtomicBool>,
    pub cancel: CancellationToken,
    pub pool: Arc<AccountPool>,
    pub db: Arc<Database>,
    pub config: ForwardingConfig,
}

impl SessionWorker {
    /// Consume the subscription until cancelled or the feed dies beyond
    /// recovery.
    pub async fn run(self, mut subscription: Subscription) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                message = subscription.recv() => match message {
                    Some(message) => self.handle_message(message).await,
                    None => {
                        if self.cancel.is_cancelled() {
                            break;
                        }
                        warn!(
                            rule_id = self.rule_id,
                            phone = %self.phone,
                            "subscription feed ended, attempting to re-subscribe"
                        );
                        self.pool.report_disconnect(&self.phone).await;
                        match self.resubscribe().await {
                            Some(fresh) => subscription = fresh,
                            None => {
                                // Unrecoverable: deactivate the rule.
                                self.running.store(false, Ordering::SeqCst);
                                if let Err(e) =
                                    rules::update_status(&self.db, self.rule_id, RuleStatus::Error)
                                        .await
                                {
                                    warn!(rule_id = self.rule_id, error = %e,
                                          "failed to persist rule error status");
                                }
                                break;
                            }
                        }
                    }
                }
            }
        }
        debug!(rule_id = self.rule_id, "session worker exited");
    }

    async fn resubscribe(&self) -> Option<Subscription> {
        match self.pool.ensure_connected(&self.phone).await {
            Ok(client) => match client.subscribe(self.source).await {
                Ok(subscription) => {
                    info!(rule_id = self.rule_id, source = %self.source, "re-subscribed to source");
                    Some(subscription)
                }
                Err(e) => {
                    self.record_error("resubscribe_failed", &e.to_string()).await;
                    None
                }
            },
            Err(e) => {
                self.record_error("client_disconnected", &e.to_string()).await;
                None
            }
        }
    }

    /// Process one inbound message: filter, fan out with per-destination
    /// isolation, then advance the checkpoint.
    async fn handle_message(&self, message: NewMessage) {
        // Guard against stale subscriptions outliving their rule.
        if !self.running.load(Ordering::SeqCst) {
            debug!(
                rule_id = self.rule_id,
                message_id = message.id,
                "event for stopped session ignored"
            );
            return;
        }

        if !matches_keywords(&message.text, self.keywords.as_deref()) {
            debug!(
                rule_id = self.rule_id,
                message_id = message.id,
                "message filtered out, no keyword match"
            );
            return;
        }

        info!(
            rule_id = self.rule_id,
            message_id = message.id,
            source = %self.source,
            destinations = self.destinations.len(),
            "forwarding message"
        );

        let mut successes: i64 = 0;
        for &destination in &self.destinations {
            if !self
                .pause(Duration::from_millis(self.config.forward_delay_ms))
                .await
            {
                return;
            }

            // The pool owns the handle; re-check and reconnect once per
            // destination, never closing it from here.
            let client = match self.pool.ensure_connected(&self.phone).await {
                Ok(client) => client,
                Err(e) => {
                    self.record_error("client_disconnected", &e.to_string()).await;
                    continue;
                }
            };

            match client
                .forward_message(destination, self.source, message.id)
                .await
            {
                Ok(destination_message_id) => {
                    let excerpt: String = message
                        .text
                        .chars()
                        .take(self.config.text_excerpt_chars)
                        .collect();
                    let record = NewForward {
                        rule_id: self.rule_id,
                        account_phone: self.phone.clone(),
                        source_chat_id: self.source.0,
                        source_message_id: message.id,
                        destination_chat_id: destination.0,
                        destination_message_id: Some(destination_message_id),
                        message_text: Some(excerpt),
                    };
                    if let Err(e) = audit::insert_forward(&self.db, &record).await {
                        warn!(rule_id = self.rule_id, error = %e,
                              "failed to append forward record");
                    }
                    successes += 1;
                    debug!(
                        rule_id = self.rule_id,
                        message_id = message.id,
                        destination = %destination,
                        "message forwarded"
                    );
                }
                Err(ClientError::FloodWait { seconds }) => {
                    self.record_error(
                        "flood_wait",
                        &format!("to {destination}: {seconds}s"),
                    )
                    .await;
                    let wait = seconds.min(self.config.max_flood_wait_secs);
                    warn!(
                        rule_id = self.rule_id,
                        destination = %destination,
                        wait_secs = wait,
                        "flood wait during fan-out"
                    );
                    if !self.pause(Duration::from_secs(wait)).await {
                        return;
                    }
                    // No same-pass retry for this destination.
                }
                Err(e) if e.is_permission() => {
                    self.record_error(e.kind(), &format!("to {destination}: {e}")).await;
                    warn!(
                        rule_id = self.rule_id,
                        destination = %destination,
                        error = %e,
                        "destination rejected forward"
                    );
                }
                Err(e) => {
                    self.record_error(e.kind(), &format!("to {destination}: {e}")).await;
                    warn!(
                        rule_id = self.rule_id,
                        destination = %destination,
                        error = %e,
                        "forward failed"
                    );
                }
            }
        }

        if successes > 0 {
            if let Err(e) = rules::add_forwarded(&self.db, self.rule_id, successes).await {
                warn!(rule_id = self.rule_id, error = %e, "failed to persist forward counter");
            }
        }

        // The checkpoint advances to the triggering message regardless of
        // per-destination outcomes, bounding reprocessing on restart.
        if let Err(e) = rules::update_checkpoint(&self.db, self.rule_id, message.id).await {
            warn!(rule_id = self.rule_id, error = %e, "failed to persist checkpoint");
        }
    }

    /// Cancellation-aware sleep; returns `false` when the session was
    /// stopped mid-wait.
    async fn pause(&self, duration: Duration) -> bool {
        if duration.is_zero() {
            return !self.cancel.is_cancelled();
        }
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    async fn record_error(&self, kind: &str, message: &str) {
        if let Err(e) = audit::insert_error(
            &self.db,
            Some(self.rule_id),
            Some(self.phone.as_str()),
            kind,
            message,
        )
        .await
        {
            warn!(rule_id = self.rule_id, error = %e, "failed to append error record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kw(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn no_keywords_forwards_everything() {
        assert!(matches_keywords("anything at all", None));
        assert!(matches_keywords("", None));
        assert!(matches_keywords("anything", Some(&[])));
    }

    #[test]
    fn keyword_match_is_case_insensitive() {
        let keywords = kw(&["URGENT"]);
        assert!(matches_keywords("urgent: server down", Some(&keywords)));
        assert!(matches_keywords("this is UrGeNt", Some(&keywords)));
        assert!(!matches_keywords("lunch today", Some(&keywords)));
    }

    #[test]
    fn any_keyword_suffices() {
        let keywords = kw(&["alpha", "beta"]);
        assert!(matches_keywords("only beta here", Some(&keywords)));
        assert!(!matches_keywords("gamma delta", Some(&keywords)));
    }

    #[test]
    fn keyword_matches_inside_words() {
        let keywords = kw(&["deploy"]);
        assert!(matches_keywords("redeployment finished", Some(&keywords)));
    }

    #[test]
    fn session_key_display() {
        let key = SessionKey {
            phone: "+15550000001".to_string(),
            rule_id: 7,
        };
        assert_eq!(key.to_string(), "+15550000001_7");
    }
}
