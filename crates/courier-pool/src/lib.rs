// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Account connection pool for the Courier forwarding daemon.
//!
//! The pool owns every live protocol handle, drives the per-account
//! lifecycle state machine, supervises reconnects with exponential
//! backoff, and hands out rate-limited accounts to callers. See
//! [`pool::AccountPool`].

pub mod error;
pub mod pool;
pub mod report;
mod supervisor;

pub use error::PoolError;
pub use pool::{AccountPool, AuthOutcome};
pub use report::{AccountStatusEntry, PoolStatusReport};
