// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error type for forwarding engine operations.

use courier_core::{ClientError, CourierError};
use courier_pool::PoolError;
use thiserror::Error;

/// Failures of the public forwarding operations.
///
/// Per-destination delivery failures during fan-out are never surfaced
/// here; they land in the error audit log and processing continues.
#[derive(Debug, Error)]
pub enum ForwardError {
    /// No rule with this id exists.
    #[error("rule {id} not found")]
    RuleNotFound { id: i64 },

    /// A rule needs at least one destination.
    #[error("rule has no destinations")]
    NoDestinations,

    /// The rule's account is missing or cannot provide a live handle.
    #[error("account {phone} unavailable: {reason}")]
    AccountUnavailable { phone: String, reason: String },

    /// The source conversation cannot be reached through the account.
    #[error("source chat {chat} unreachable: {reason}")]
    SourceUnreachable { chat: i64, reason: String },

    /// The source conversation has no messages to test with.
    #[error("no messages in source chat")]
    EmptySource,

    /// Persistence failure; the operation did not advance in-memory state.
    #[error(transparent)]
    Storage(#[from] CourierError),

    /// Pool-level failure surfaced through an engine operation.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// Protocol-collaborator failure outside fan-out isolation.
    #[error("client error: {0}")]
    Client(ClientError),
}
