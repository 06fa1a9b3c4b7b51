// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Courier forwarding daemon.
//!
//! A single [`Database`] handle serializes all writes through one
//! background thread; typed query modules cover the accounts table, the
//! forwarding rules table, and the two append-only audit logs.

pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;

pub use database::Database;
pub use models::{
    AccountRecord, ErrorRecord, ForwardRecord, ForwardStats, NewForward, NewRule, RuleRecord,
};
