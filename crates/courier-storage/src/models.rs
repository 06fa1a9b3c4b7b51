// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed row models for the Courier tables.
//!
//! Timestamps are RFC 3339 strings as stored; JSON columns are decoded into
//! their native shapes when a row is read.

use courier_core::{AccountStatus, RuleStatus};

/// One row of the `accounts` table.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountRecord {
    pub phone: String,
    pub api_id: i64,
    pub api_hash: String,
    /// Raw proxy descriptor (`host:port[:user:pass]`), if any.
    pub proxy: Option<String>,
    pub status: AccountStatus,
    pub user_id: Option<i64>,
    pub username: Option<String>,
    pub error_count: i64,
    pub last_error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub last_activity: Option<String>,
    pub daily_count: i64,
    /// `YYYY-MM-DD` of the last daily-counter reset.
    pub last_reset_date: String,
}

/// One row of the `forwarding_rules` table.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleRecord {
    pub id: i64,
    pub account_phone: String,
    pub source_chat_id: i64,
    pub source_chat_name: String,
    pub destination_chat_ids: Vec<i64>,
    pub keywords: Option<Vec<String>>,
    pub status: RuleStatus,
    /// Resume checkpoint: last processed source message id.
    pub last_message_id: i64,
    pub messages_forwarded: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// Parameters for inserting a new forwarding rule.
#[derive(Debug, Clone)]
pub struct NewRule {
    pub account_phone: String,
    pub source_chat_id: i64,
    pub source_chat_name: String,
    pub destination_chat_ids: Vec<i64>,
    pub keywords: Option<Vec<String>>,
}

/// One row of the append-only `forwarded_messages` audit log.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardRecord {
    pub id: i64,
    pub rule_id: i64,
    pub account_phone: String,
    pub source_chat_id: i64,
    pub source_message_id: i64,
    pub destination_chat_id: i64,
    pub destination_message_id: Option<i64>,
    pub message_text: Option<String>,
    pub forwarded_at: String,
}

/// Parameters for appending a forward audit record.
#[derive(Debug, Clone)]
pub struct NewForward {
    pub rule_id: i64,
    pub account_phone: String,
    pub source_chat_id: i64,
    pub source_message_id: i64,
    pub destination_chat_id: i64,
    pub destination_message_id: Option<i64>,
    pub message_text: Option<String>,
}

/// One row of the append-only `forwarding_errors` audit log.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorRecord {
    pub id: i64,
    pub rule_id: Option<i64>,
    pub account_phone: Option<String>,
    pub error_type: String,
    pub error_message: String,
    pub occurred_at: String,
}

/// Aggregates over the audit logs, per rule or global.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForwardStats {
    pub total_forwarded: i64,
    pub unique_destinations: i64,
    pub first_forward: Option<String>,
    pub last_forward: Option<String>,
    pub total_errors: i64,
}
