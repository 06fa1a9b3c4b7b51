// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-account reconnect supervisor.
//!
//! One supervisor task per supervised account, owned by the account's slot
//! and cancelled with it. The task is gated on a manual trigger: a
//! disconnect report arms it, it sleeps an exponentially growing delay,
//! attempts a reconnect through the pool, and re-arms itself on failure
//! until the attempt ceiling is reached.

use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::PoolError;
use crate::pool::AccountPool;

/// Backoff parameters for one supervisor, taken from the pool config.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
    pub max_flood_wait: Duration,
}

/// Owning handle to a running supervisor task.
pub(crate) struct SupervisorHandle {
    trigger: Arc<Notify>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SupervisorHandle {
    /// Arm the supervisor: schedule a reconnect attempt.
    ///
    /// A trigger fired while the task is mid-cycle is buffered, so a
    /// disconnect report is never lost.
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }

    /// Cancel the task and wait for it to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        // Wake the task if it is parked on the trigger.
        self.trigger.notify_one();
        if let Err(e) = self.task.await {
            if !e.is_cancelled() {
                warn!(error = %e, "supervisor task join error");
            }
        }
    }
}

/// `min(base * 2^attempt, max)`, saturating.
pub(crate) fn backoff_delay(policy: &ReconnectPolicy, attempt: u32) -> Duration {
    let factor = 1u64 << attempt.min(20);
    let delay = policy
        .base_delay
        .checked_mul(factor as u32)
        .unwrap_or(policy.max_delay);
    delay.min(policy.max_delay)
}

/// Spawn the supervisor task for one account.
///
/// The task holds only a weak pool reference so it can never keep the pool
/// alive; it exits when the pool is dropped, when cancelled, or after
/// `max_attempts` consecutive failures.
pub(crate) fn spawn_supervisor(
    pool: Weak<AccountPool>,
    phone: String,
    policy: ReconnectPolicy,
    parent_cancel: &CancellationToken,
) -> SupervisorHandle {
    let trigger = Arc::new(Notify::new());
    let cancel = parent_cancel.child_token();

    let task_trigger = Arc::clone(&trigger);
    let task_cancel = cancel.clone();

    let task = tokio::spawn(async move {
        let mut attempts: u32 = 0;
        // Flood waits override the backoff curve for the next attempt.
        let mut flood_hint: Option<Duration> = None;

        loop {
            tokio::select! {
                _ = task_cancel.cancelled() => break,
                _ = task_trigger.notified() => {}
            }
            if task_cancel.is_cancelled() {
                break;
            }

            let delay = match flood_hint.take() {
                Some(wait) => wait.max(backoff_delay(&policy, attempts)),
                None => backoff_delay(&policy, attempts),
            };
            debug!(
                phone = %phone,
                attempt = attempts + 1,
                max = policy.max_attempts,
                delay_ms = delay.as_millis() as u64,
                "supervisor waiting before reconnect"
            );
            tokio::select! {
                _ = task_cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }

            let Some(pool) = pool.upgrade() else { break };
            match pool.supervised_reconnect(&phone).await {
                Ok(()) => {
                    info!(phone = %phone, "supervisor reconnected account");
                    attempts = 0;
                }
                Err(e) => {
                    if let PoolError::RateLimited { seconds } = e {
                        flood_hint =
                            Some(Duration::from_secs(seconds).min(policy.max_flood_wait));
                    }
                    attempts += 1;
                    warn!(
                        phone = %phone,
                        attempt = attempts,
                        max = policy.max_attempts,
                        error = %e,
                        "supervisor reconnect attempt failed"
                    );
                    if attempts >= policy.max_attempts {
                        error!(phone = %phone, "supervisor reached attempt ceiling, giving up");
                        break;
                    }
                    // Re-arm for the next attempt.
                    task_trigger.notify_one();
                }
            }
            drop(pool);
        }
        debug!(phone = %phone, "supervisor exited");
    });

    SupervisorHandle {
        trigger,
        cancel,
        task,
    }
}
