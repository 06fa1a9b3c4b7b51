// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error type for account pool operations.

use courier_core::{ClientError, CourierError};
use thiserror::Error;

/// Failures of the public pool operations.
///
/// Validation failures are rejected synchronously and never persisted as
/// account state; authentication failures are terminal for the attempt and
/// surfaced to the caller.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The identity does not match the international number pattern.
    #[error("invalid phone number format: {phone}")]
    InvalidPhone { phone: String },

    /// An account with this identity already exists.
    #[error("account {phone} already exists")]
    DuplicateAccount { phone: String },

    /// API credentials (api_id and api_hash) are required.
    #[error("api credentials (api_id and api_hash) are required")]
    MissingCredentials,

    /// The proxy descriptor could not be parsed.
    #[error("invalid proxy configuration: {0}")]
    InvalidProxy(String),

    /// No account with this identity is known to the pool.
    #[error("account {phone} not found")]
    AccountNotFound { phone: String },

    /// `complete_auth` was called without a registration in flight.
    #[error("account {phone} has no pending sign-in")]
    NoPendingSignIn { phone: String },

    /// `complete_auth` needs the verification code at this stage.
    #[error("verification code is required")]
    CodeRequired,

    /// The session behind this identity is already authorized.
    #[error("account {phone} is already authorized as {identity}")]
    AlreadyAuthorized { phone: String, identity: String },

    /// The network has banned this identity. Terminal.
    #[error("account {phone} is banned")]
    Banned { phone: String },

    /// The stored session is no longer authorized; re-register the account.
    #[error("account {phone} is not authorized")]
    NotAuthorized { phone: String },

    /// Transport-level failure while connecting or signing in.
    #[error("connection failed for {phone}: {reason}")]
    ConnectionFailed { phone: String, reason: String },

    /// Server-issued backpressure; retry after the given wait.
    #[error("rate limited, retry in {seconds}s")]
    RateLimited { seconds: u64 },

    /// The submitted verification code was wrong.
    #[error("invalid verification code")]
    InvalidCode,

    /// The verification code is no longer valid.
    #[error("verification code has expired")]
    ExpiredCode,

    /// The submitted two-factor password was wrong.
    #[error("invalid two-factor password")]
    InvalidPassword,

    /// Persistence failure; the operation did not advance in-memory state.
    #[error(transparent)]
    Storage(#[from] CourierError),

    /// Any other protocol-collaborator failure.
    #[error("client error for {phone}: {source}")]
    Client { phone: String, source: ClientError },
}

impl PoolError {
    /// Lift a protocol failure signal into the pool's error vocabulary.
    pub(crate) fn from_client(phone: &str, source: ClientError) -> Self {
        match source {
            ClientError::FloodWait { seconds } => PoolError::RateLimited { seconds },
            ClientError::PhoneInvalid => PoolError::InvalidPhone {
                phone: phone.to_string(),
            },
            ClientError::PhoneBanned => PoolError::Banned {
                phone: phone.to_string(),
            },
            ClientError::CodeInvalid => PoolError::InvalidCode,
            ClientError::CodeExpired => PoolError::ExpiredCode,
            ClientError::PasswordInvalid => PoolError::InvalidPassword,
            ClientError::NotAuthorized => PoolError::NotAuthorized {
                phone: phone.to_string(),
            },
            ClientError::Connection(reason) => PoolError::ConnectionFailed {
                phone: phone.to_string(),
                reason,
            },
            ClientError::Timeout => PoolError::ConnectionFailed {
                phone: phone.to_string(),
                reason: "operation timed out".to_string(),
            },
            other => PoolError::Client {
                phone: phone.to_string(),
                source: other,
            },
        }
    }
}
