// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Courier forwarding daemon.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Courier configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CourierConfig {
    /// Account pool settings.
    #[serde(default)]
    pub pool: PoolConfig,

    /// Forwarding engine settings.
    #[serde(default)]
    pub forwarding: ForwardingConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Account pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PoolConfig {
    /// Per-account daily usage ceiling for `get_available`.
    #[serde(default = "default_daily_limit")]
    pub daily_limit: i64,

    /// Consecutive error count at which an account is demoted to `limited`.
    #[serde(default = "default_error_limit")]
    pub error_limit: i64,

    /// Whether authorized accounts get a reconnect supervisor.
    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,

    /// Base delay for the supervisor's exponential backoff, in milliseconds.
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,

    /// Ceiling for the supervisor's backoff delay, in milliseconds.
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,

    /// Supervisor gives up after this many consecutive failed attempts.
    #[serde(default = "default_reconnect_max_attempts")]
    pub reconnect_max_attempts: u32,

    /// Longest flood wait the pool will honor by sleeping, in seconds.
    #[serde(default = "default_max_flood_wait_secs")]
    pub max_flood_wait_secs: u64,

    /// Interval of the maintenance task (daily-counter reset and
    /// connection check), in seconds.
    #[serde(default = "default_maintenance_interval_secs")]
    pub maintenance_interval_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            daily_limit: default_daily_limit(),
            error_limit: default_error_limit(),
            auto_reconnect: default_auto_reconnect(),
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            reconnect_max_attempts: default_reconnect_max_attempts(),
            max_flood_wait_secs: default_max_flood_wait_secs(),
            maintenance_interval_secs: default_maintenance_interval_secs(),
        }
    }
}

fn default_daily_limit() -> i64 {
    45
}

fn default_error_limit() -> i64 {
    5
}

fn default_auto_reconnect() -> bool {
    true
}

fn default_reconnect_base_delay_ms() -> u64 {
    1_000
}

fn default_reconnect_max_delay_ms() -> u64 {
    60_000
}

fn default_reconnect_max_attempts() -> u32 {
    10
}

fn default_max_flood_wait_secs() -> u64 {
    300
}

fn default_maintenance_interval_secs() -> u64 {
    3_600
}

/// Forwarding engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ForwardingConfig {
    /// Delay between consecutive destinations in one fan-out pass,
    /// in milliseconds.
    #[serde(default = "default_forward_delay_ms")]
    pub forward_delay_ms: u64,

    /// Longest flood wait honored during fan-out, in seconds.
    #[serde(default = "default_forward_max_flood_wait_secs")]
    pub max_flood_wait_secs: u64,

    /// Length of the message-text excerpt kept in the forward audit log.
    #[serde(default = "default_text_excerpt_chars")]
    pub text_excerpt_chars: usize,
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self {
            forward_delay_ms: default_forward_delay_ms(),
            max_flood_wait_secs: default_forward_max_flood_wait_secs(),
            text_excerpt_chars: default_text_excerpt_chars(),
        }
    }
}

fn default_forward_delay_ms() -> u64 {
    1_500
}

fn default_forward_max_flood_wait_secs() -> u64 {
    300
}

fn default_text_excerpt_chars() -> usize {
    250
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    "courier.db".to_string()
}
