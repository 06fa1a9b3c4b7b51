// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared across the Courier workspace.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Identifier of a conversation (group, channel, or private chat) on the
/// messaging network.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ChatId {
    fn from(id: i64) -> Self {
        ChatId(id)
    }
}

/// Lifecycle status of a managed account.
///
/// The status field is the single source of truth for membership queries;
/// there are no separate active/limited/banned collections to keep in sync.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    /// Registration started; waiting for the verification code.
    PendingCode,
    /// Code accepted; waiting for the two-factor password.
    PendingTwoFactor,
    /// Authorized and usable.
    Active,
    /// Manually disconnected.
    Offline,
    /// Serving a server-issued flood wait; connection retained.
    FloodWait,
    /// Last operation failed; eligible for retry.
    Error,
    /// Error ceiling crossed; excluded from selection until reconnected.
    Limited,
    /// Banned by the network. Terminal: no reconnect attempts.
    Banned,
}

impl AccountStatus {
    /// Whether this status may hold a live protocol connection.
    ///
    /// Pending registrations keep their connection open so the sign-in can
    /// be resumed; flood-waited accounts stay connected and wait it out.
    pub fn holds_connection(self) -> bool {
        matches!(
            self,
            AccountStatus::PendingCode
                | AccountStatus::PendingTwoFactor
                | AccountStatus::Active
                | AccountStatus::FloodWait
        )
    }

    /// Terminal statuses admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, AccountStatus::Banned)
    }
}

/// Persisted status of a forwarding rule.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    Stopped,
    Running,
    Error,
}

/// API credential pair for the protocol collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiCredentials {
    pub api_id: i64,
    pub api_hash: String,
}

impl ApiCredentials {
    /// Both halves must be present for a connection attempt.
    pub fn is_complete(&self) -> bool {
        self.api_id != 0 && !self.api_hash.trim().is_empty()
    }
}

/// SOCKS5 proxy descriptor, parsed from `host:port[:username:password]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl FromStr for ProxyConfig {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').map(str::trim).collect();
        if parts.len() < 2 {
            return Err("invalid proxy format, expected host:port[:username:password]".into());
        }
        if parts[0].is_empty() {
            return Err("proxy host cannot be empty".into());
        }
        let port: u16 = parts[1]
            .parse()
            .map_err(|_| format!("invalid proxy port: {}", parts[1]))?;
        Ok(ProxyConfig {
            host: parts[0].to_string(),
            port,
            username: parts.get(2).map(|s| s.to_string()),
            password: parts.get(3).map(|s| s.to_string()),
        })
    }
}

impl fmt::Display for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)?;
        if let Some(ref user) = self.username {
            write!(f, ":{user}")?;
            if let Some(ref pass) = self.password {
                write!(f, ":{pass}")?;
            }
        }
        Ok(())
    }
}

/// Identity metadata of the authorized account, as reported by the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfInfo {
    pub user_id: i64,
    pub username: Option<String>,
}

/// Resolved conversation metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatInfo {
    pub id: ChatId,
    pub title: String,
}

/// One inbound message event surfaced by a source subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    /// Conversation the message arrived in.
    pub chat: ChatId,
    /// Message id within that conversation.
    pub id: i64,
    /// Plain-text content; empty for media-only messages.
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_status_round_trips_wire_strings() {
        for status in [
            AccountStatus::PendingCode,
            AccountStatus::PendingTwoFactor,
            AccountStatus::Active,
            AccountStatus::Offline,
            AccountStatus::FloodWait,
            AccountStatus::Error,
            AccountStatus::Limited,
            AccountStatus::Banned,
        ] {
            let s = status.to_string();
            let parsed = AccountStatus::from_str(&s).expect("should parse back");
            assert_eq!(status, parsed);
        }
        assert_eq!(AccountStatus::PendingCode.to_string(), "pending_code");
        assert_eq!(AccountStatus::FloodWait.to_string(), "flood_wait");
    }

    #[test]
    fn rule_status_round_trips_wire_strings() {
        for status in [RuleStatus::Stopped, RuleStatus::Running, RuleStatus::Error] {
            let s = status.to_string();
            assert_eq!(RuleStatus::from_str(&s).unwrap(), status);
        }
        assert_eq!(RuleStatus::Running.to_string(), "running");
    }

    #[test]
    fn connection_holding_statuses() {
        assert!(AccountStatus::Active.holds_connection());
        assert!(AccountStatus::PendingCode.holds_connection());
        assert!(AccountStatus::PendingTwoFactor.holds_connection());
        assert!(AccountStatus::FloodWait.holds_connection());
        assert!(!AccountStatus::Offline.holds_connection());
        assert!(!AccountStatus::Limited.holds_connection());
        assert!(!AccountStatus::Banned.holds_connection());
    }

    #[test]
    fn banned_is_terminal() {
        assert!(AccountStatus::Banned.is_terminal());
        assert!(!AccountStatus::Error.is_terminal());
    }

    #[test]
    fn proxy_parses_host_and_port() {
        let proxy: ProxyConfig = "127.0.0.1:1080".parse().unwrap();
        assert_eq!(proxy.host, "127.0.0.1");
        assert_eq!(proxy.port, 1080);
        assert!(proxy.username.is_none());
        assert!(proxy.password.is_none());
    }

    #[test]
    fn proxy_parses_credentials() {
        let proxy: ProxyConfig = "proxy.example.com:9050:alice:s3cret".parse().unwrap();
        assert_eq!(proxy.username.as_deref(), Some("alice"));
        assert_eq!(proxy.password.as_deref(), Some("s3cret"));
        assert_eq!(proxy.to_string(), "proxy.example.com:9050:alice:s3cret");
    }

    #[test]
    fn proxy_rejects_bad_input() {
        assert!("localhost".parse::<ProxyConfig>().is_err());
        assert!("host:notaport".parse::<ProxyConfig>().is_err());
        assert!(":1080".parse::<ProxyConfig>().is_err());
    }

    #[test]
    fn api_credentials_completeness() {
        let ok = ApiCredentials {
            api_id: 12345,
            api_hash: "abcdef".into(),
        };
        assert!(ok.is_complete());

        let missing_hash = ApiCredentials {
            api_id: 12345,
            api_hash: "  ".into(),
        };
        assert!(!missing_hash.is_complete());

        let missing_id = ApiCredentials {
            api_id: 0,
            api_hash: "abcdef".into(),
        };
        assert!(!missing_id.is_complete());
    }

    #[test]
    fn chat_id_serde_is_transparent() {
        let id = ChatId(-1001234567890);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "-1001234567890");
        let back: ChatId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
