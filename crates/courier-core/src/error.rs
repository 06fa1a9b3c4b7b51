// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types shared across the Courier workspace.

use thiserror::Error;

/// The primary error type for storage and configuration plumbing.
///
/// Operation-level failures (registration, activation, fan-out) have their
/// own enums in `courier-pool` and `courier-forward`; those wrap this type
/// for anything that bubbles up from the store.
#[derive(Debug, Error)]
pub enum CourierError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}
