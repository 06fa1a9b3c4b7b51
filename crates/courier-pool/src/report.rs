// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Aggregate pool status for the presentation layer.

use std::collections::BTreeMap;

use courier_core::AccountStatus;
use serde::Serialize;

/// Per-account line of the status report.
#[derive(Debug, Clone, Serialize)]
pub struct AccountStatusEntry {
    pub phone: String,
    pub username: Option<String>,
    pub user_id: Option<i64>,
    pub status: AccountStatus,
    pub connected: bool,
    pub daily_count: i64,
    pub remaining: i64,
    pub error_count: i64,
    pub last_error: Option<String>,
    pub last_activity: Option<String>,
}

/// Aggregate report over all managed accounts.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStatusReport {
    pub generated_at: String,
    pub total_accounts: usize,
    /// Counts keyed by the status wire string.
    pub by_status: BTreeMap<String, usize>,
    pub daily_limit: i64,
    pub total_used_today: i64,
    pub total_remaining: i64,
    /// Share of today's total capacity already used, 0-100.
    pub capacity_used_percent: u8,
    pub accounts: Vec<AccountStatusEntry>,
}
