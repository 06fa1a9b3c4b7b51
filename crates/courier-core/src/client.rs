// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The protocol-client boundary.
//!
//! The wire protocol, cryptography, and session serialization of the
//! messaging network live in an external collaborator. This module defines
//! the exact surface the pool and the forwarding engine consume from it:
//! connection management, the phone/code/password sign-in sequence, peer
//! resolution, message forwarding, and new-message subscriptions, plus the
//! typed failure signals those calls can raise.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::types::{ApiCredentials, ChatId, ChatInfo, NewMessage, ProxyConfig, SelfInfo};

/// Typed failure signals from the protocol collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// Transport-level failure (DNS, TCP, handshake).
    #[error("connection failed: {0}")]
    Connection(String),

    /// The collaborator's bounded timeout elapsed.
    #[error("operation timed out")]
    Timeout,

    /// The network rejected the phone number format.
    #[error("invalid phone number")]
    PhoneInvalid,

    /// The phone number is banned. Terminal for the account.
    #[error("phone number is banned")]
    PhoneBanned,

    /// The submitted verification code was wrong.
    #[error("invalid verification code")]
    CodeInvalid,

    /// The verification code is no longer valid.
    #[error("verification code has expired")]
    CodeExpired,

    /// Sign-in needs the two-factor password to proceed.
    #[error("two-factor password required")]
    PasswordRequired,

    /// The submitted two-factor password was wrong.
    #[error("invalid two-factor password")]
    PasswordInvalid,

    /// The session is not (or no longer) authorized.
    #[error("account is not authorized")]
    NotAuthorized,

    /// Server-issued backpressure with a mandatory wait.
    #[error("flood wait for {seconds}s")]
    FloodWait { seconds: u64 },

    /// The account may not write to this conversation.
    #[error("writing to chat {chat} is forbidden")]
    WriteForbidden { chat: ChatId },

    /// The conversation is private or otherwise inaccessible.
    #[error("chat {chat} is private")]
    ChatPrivate { chat: ChatId },

    /// The conversation id does not resolve to a reachable peer.
    #[error("invalid peer {chat}")]
    PeerInvalid { chat: ChatId },

    /// Any other RPC-level error.
    #[error("rpc error: {0}")]
    Rpc(String),
}

impl ClientError {
    /// Permission/availability failures are isolated to one destination
    /// during fan-out and never escalate to rule-wide failure.
    pub fn is_permission(&self) -> bool {
        matches!(
            self,
            ClientError::WriteForbidden { .. }
                | ClientError::ChatPrivate { .. }
                | ClientError::PeerInvalid { .. }
        )
    }

    /// Stable label used as `error_type` in the error audit log.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientError::Connection(_) => "connection",
            ClientError::Timeout => "timeout",
            ClientError::PhoneInvalid => "phone_invalid",
            ClientError::PhoneBanned => "phone_banned",
            ClientError::CodeInvalid => "code_invalid",
            ClientError::CodeExpired => "code_expired",
            ClientError::PasswordRequired => "password_required",
            ClientError::PasswordInvalid => "password_invalid",
            ClientError::NotAuthorized => "not_authorized",
            ClientError::FloodWait { .. } => "flood_wait",
            ClientError::WriteForbidden { .. } => "permission_error",
            ClientError::ChatPrivate { .. } => "permission_error",
            ClientError::PeerInvalid { .. } => "peer_invalid",
            ClientError::Rpc(_) => "rpc_error",
        }
    }
}

/// A live feed of new messages from one source conversation.
///
/// The handle owns the receiving half of the feed. Dropping it severs the
/// subscription at the source: the client prunes a sender as soon as a
/// delivery fails because the receiver is gone.
pub struct Subscription {
    chat: ChatId,
    receiver: mpsc::Receiver<NewMessage>,
}

impl Subscription {
    pub fn new(chat: ChatId, receiver: mpsc::Receiver<NewMessage>) -> Self {
        Self { chat, receiver }
    }

    /// The conversation this subscription is scoped to.
    pub fn chat(&self) -> ChatId {
        self.chat
    }

    /// Next message event, in transport order. `None` once the client has
    /// dropped the feed (disconnect or client teardown).
    pub async fn recv(&mut self) -> Option<NewMessage> {
        self.receiver.recv().await
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("chat", &self.chat).finish()
    }
}

/// One live connection to the messaging network, bound to a single account.
///
/// Handles are created and exclusively owned by the account pool; other
/// components borrow `Arc` references and must never disconnect one
/// directly — they signal the pool instead.
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    /// Establish the connection. Idempotent when already connected.
    async fn connect(&self) -> Result<(), ClientError>;

    /// Tear the connection down. Never fails; best effort.
    async fn disconnect(&self);

    /// Whether the transport is currently up.
    fn is_connected(&self) -> bool;

    /// Whether the stored session is authorized.
    async fn is_authorized(&self) -> Result<bool, ClientError>;

    /// Ask the network to send a verification code to the bound phone.
    async fn request_login_code(&self) -> Result<(), ClientError>;

    /// Submit the verification code. Fails with
    /// [`ClientError::PasswordRequired`] when two-factor auth is enabled.
    async fn sign_in_code(&self, code: &str) -> Result<SelfInfo, ClientError>;

    /// Submit the two-factor password after [`ClientError::PasswordRequired`].
    async fn sign_in_password(&self, password: &str) -> Result<SelfInfo, ClientError>;

    /// Identity of the authorized account.
    async fn get_self(&self) -> Result<SelfInfo, ClientError>;

    /// Resolve a conversation id, verifying it is reachable.
    async fn resolve_chat(&self, chat: ChatId) -> Result<ChatInfo, ClientError>;

    /// Most recent messages of a conversation, newest first.
    async fn recent_messages(
        &self,
        chat: ChatId,
        limit: usize,
    ) -> Result<Vec<NewMessage>, ClientError>;

    /// Forward one message to a destination; returns the destination
    /// message id.
    async fn forward_message(
        &self,
        destination: ChatId,
        source: ChatId,
        message_id: i64,
    ) -> Result<i64, ClientError>;

    /// Subscribe to new messages in one source conversation.
    async fn subscribe(&self, chat: ChatId) -> Result<Subscription, ClientError>;
}

/// Factory for protocol clients, addressing one opaque session artifact
/// per phone number.
#[async_trait]
pub trait ProtocolConnector: Send + Sync {
    /// Create (or reopen) the client for an account. Does not connect.
    async fn create(
        &self,
        phone: &str,
        credentials: &ApiCredentials,
        proxy: Option<&ProxyConfig>,
    ) -> Result<Arc<dyn ProtocolClient>, ClientError>;

    /// Delete the local session artifact for an account.
    async fn remove_session(&self, phone: &str) -> Result<(), ClientError>;
}
