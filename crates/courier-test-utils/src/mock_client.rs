// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock protocol client and connector for deterministic testing.
//!
//! [`MockClient`] implements [`ProtocolClient`] with scriptable auth
//! outcomes, injectable inbound messages, and per-destination failure
//! queues; forward calls are captured for assertion. [`MockConnector`]
//! hands out one shared client per phone so tests can preset behavior
//! before the pool asks for it.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use courier_core::{
    ApiCredentials, ChatId, ChatInfo, ClientError, NewMessage, ProtocolClient,
    ProtocolConnector, ProxyConfig, SelfInfo, Subscription,
};

/// One captured `forward_message` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardCall {
    pub destination: ChatId,
    pub source: ChatId,
    pub message_id: i64,
}

#[derive(Default)]
struct AuthScript {
    authorized: bool,
    expected_code: Option<String>,
    password: Option<String>,
    code_expired: bool,
    banned: bool,
    code_requested: bool,
    flood_wait_on_code: Option<u64>,
}

/// A mock messaging-network client for testing.
pub struct MockClient {
    connected: AtomicBool,
    auth: Mutex<AuthScript>,
    self_info: Mutex<SelfInfo>,
    chats: Mutex<HashMap<ChatId, ChatInfo>>,
    history: Mutex<HashMap<ChatId, Vec<NewMessage>>>,
    subscriptions: Mutex<HashMap<ChatId, Vec<mpsc::Sender<NewMessage>>>>,
    forwarded: Mutex<Vec<ForwardCall>>,
    forward_failures: Mutex<HashMap<ChatId, VecDeque<ClientError>>>,
    connect_failures: Mutex<VecDeque<ClientError>>,
    next_message_id: AtomicI64,
}

impl MockClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            connected: AtomicBool::new(false),
            auth: Mutex::new(AuthScript::default()),
            self_info: Mutex::new(SelfInfo {
                user_id: 1_000,
                username: Some("mock".to_string()),
            }),
            chats: Mutex::new(HashMap::new()),
            history: Mutex::new(HashMap::new()),
            subscriptions: Mutex::new(HashMap::new()),
            forwarded: Mutex::new(Vec::new()),
            forward_failures: Mutex::new(HashMap::new()),
            connect_failures: Mutex::new(VecDeque::new()),
            next_message_id: AtomicI64::new(10_000),
        })
    }

    // --- Behavior knobs ---

    /// Mark the stored session as (un)authorized.
    pub async fn set_authorized(&self, authorized: bool) {
        self.auth.lock().await.authorized = authorized;
    }

    /// The code `sign_in_code` will accept.
    pub async fn set_expected_code(&self, code: &str) {
        self.auth.lock().await.expected_code = Some(code.to_string());
    }

    /// Enable two-factor auth with the given password.
    pub async fn set_password(&self, password: &str) {
        self.auth.lock().await.password = Some(password.to_string());
    }

    /// Make every submitted code fail as expired.
    pub async fn set_code_expired(&self) {
        self.auth.lock().await.code_expired = true;
    }

    /// Make the phone behave as banned.
    pub async fn set_banned(&self) {
        self.auth.lock().await.banned = true;
    }

    /// Flood-wait the next `request_login_code` call.
    pub async fn set_flood_wait_on_code(&self, seconds: u64) {
        self.auth.lock().await.flood_wait_on_code = Some(seconds);
    }

    /// Whether a verification code was requested.
    pub async fn code_requested(&self) -> bool {
        self.auth.lock().await.code_requested
    }

    /// Set the identity reported after authorization.
    pub async fn set_self_info(&self, user_id: i64, username: Option<&str>) {
        *self.self_info.lock().await = SelfInfo {
            user_id,
            username: username.map(str::to_string),
        };
    }

    /// Make a chat resolvable.
    pub async fn add_chat(&self, id: ChatId, title: &str) {
        self.chats.lock().await.insert(
            id,
            ChatInfo {
                id,
                title: title.to_string(),
            },
        );
    }

    /// Seed a chat's message history (`recent_messages` source).
    pub async fn push_history(&self, message: NewMessage) {
        self.history
            .lock()
            .await
            .entry(message.chat)
            .or_default()
            .push(message);
    }

    /// Queue a failure for the next forward to `destination`.
    pub async fn fail_next_forward(&self, destination: ChatId, error: ClientError) {
        self.forward_failures
            .lock()
            .await
            .entry(destination)
            .or_default()
            .push_back(error);
    }

    /// Queue a failure for the next `connect` call.
    pub async fn fail_next_connect(&self, error: ClientError) {
        self.connect_failures.lock().await.push_back(error);
    }

    /// Deliver a message to every live subscription on its chat.
    pub async fn inject_message(&self, message: NewMessage) {
        let mut subs = self.subscriptions.lock().await;
        if let Some(senders) = subs.get_mut(&message.chat) {
            // Prune feeds whose receiving half was dropped.
            let mut alive = Vec::new();
            for sender in senders.drain(..) {
                if sender.send(message.clone()).await.is_ok() {
                    alive.push(sender);
                }
            }
            *senders = alive;
        }
    }

    /// Simulate an unexpected transport drop.
    pub fn drop_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    // --- Assertions ---

    /// All captured forward calls, in order.
    pub async fn forwarded(&self) -> Vec<ForwardCall> {
        self.forwarded.lock().await.clone()
    }

    pub async fn forwarded_count(&self) -> usize {
        self.forwarded.lock().await.len()
    }

    /// Number of live subscriptions on a chat (pruned on next inject).
    pub async fn subscriber_count(&self, chat: ChatId) -> usize {
        self.subscriptions
            .lock()
            .await
            .get(&chat)
            .map_or(0, |s| s.len())
    }
}

#[async_trait]
impl ProtocolClient for MockClient {
    async fn connect(&self) -> Result<(), ClientError> {
        if let Some(error) = self.connect_failures.lock().await.pop_front() {
            return Err(error);
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn is_authorized(&self) -> Result<bool, ClientError> {
        Ok(self.auth.lock().await.authorized)
    }

    async fn request_login_code(&self) -> Result<(), ClientError> {
        let mut auth = self.auth.lock().await;
        if auth.banned {
            return Err(ClientError::PhoneBanned);
        }
        if let Some(seconds) = auth.flood_wait_on_code.take() {
            return Err(ClientError::FloodWait { seconds });
        }
        auth.code_requested = true;
        Ok(())
    }

    async fn sign_in_code(&self, code: &str) -> Result<SelfInfo, ClientError> {
        let mut auth = self.auth.lock().await;
        if auth.banned {
            return Err(ClientError::PhoneBanned);
        }
        if auth.code_expired {
            return Err(ClientError::CodeExpired);
        }
        match auth.expected_code {
            Some(ref expected) if expected == code => {}
            _ => return Err(ClientError::CodeInvalid),
        }
        if auth.password.is_some() {
            return Err(ClientError::PasswordRequired);
        }
        auth.authorized = true;
        drop(auth);
        Ok(self.self_info.lock().await.clone())
    }

    async fn sign_in_password(&self, password: &str) -> Result<SelfInfo, ClientError> {
        let mut auth = self.auth.lock().await;
        match auth.password {
            Some(ref expected) if expected == password => {}
            _ => return Err(ClientError::PasswordInvalid),
        }
        auth.authorized = true;
        drop(auth);
        Ok(self.self_info.lock().await.clone())
    }

    async fn get_self(&self) -> Result<SelfInfo, ClientError> {
        if !self.auth.lock().await.authorized {
            return Err(ClientError::NotAuthorized);
        }
        Ok(self.self_info.lock().await.clone())
    }

    async fn resolve_chat(&self, chat: ChatId) -> Result<ChatInfo, ClientError> {
        self.chats
            .lock()
            .await
            .get(&chat)
            .cloned()
            .ok_or(ClientError::PeerInvalid { chat })
    }

    async fn recent_messages(
        &self,
        chat: ChatId,
        limit: usize,
    ) -> Result<Vec<NewMessage>, ClientError> {
        let history = self.history.lock().await;
        let mut messages: Vec<NewMessage> =
            history.get(&chat).cloned().unwrap_or_default();
        messages.reverse(); // newest first
        messages.truncate(limit);
        Ok(messages)
    }

    async fn forward_message(
        &self,
        destination: ChatId,
        source: ChatId,
        message_id: i64,
    ) -> Result<i64, ClientError> {
        if !self.is_connected() {
            return Err(ClientError::Connection("not connected".to_string()));
        }
        if let Some(queue) = self.forward_failures.lock().await.get_mut(&destination) {
            if let Some(error) = queue.pop_front() {
                return Err(error);
            }
        }
        self.forwarded.lock().await.push(ForwardCall {
            destination,
            source,
            message_id,
        });
        Ok(self.next_message_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn subscribe(&self, chat: ChatId) -> Result<Subscription, ClientError> {
        let (tx, rx) = mpsc::channel(64);
        self.subscriptions
            .lock()
            .await
            .entry(chat)
            .or_default()
            .push(tx);
        Ok(Subscription::new(chat, rx))
    }
}

/// Connector handing out one shared [`MockClient`] per phone.
#[derive(Default)]
pub struct MockConnector {
    clients: Mutex<HashMap<String, Arc<MockClient>>>,
    removed_sessions: Mutex<Vec<String>>,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Preset the client that `create` will return for a phone.
    pub async fn preset(&self, phone: &str, client: Arc<MockClient>) {
        self.clients.lock().await.insert(phone.to_string(), client);
    }

    /// The client created (or preset) for a phone.
    pub async fn client(&self, phone: &str) -> Option<Arc<MockClient>> {
        self.clients.lock().await.get(phone).cloned()
    }

    /// Session artifacts deleted via `remove_session`.
    pub async fn removed_sessions(&self) -> Vec<String> {
        self.removed_sessions.lock().await.clone()
    }
}

#[async_trait]
impl ProtocolConnector for MockConnector {
    async fn create(
        &self,
        phone: &str,
        _credentials: &ApiCredentials,
        _proxy: Option<&ProxyConfig>,
    ) -> Result<Arc<dyn ProtocolClient>, ClientError> {
        let mut clients = self.clients.lock().await;
        let client = clients
            .entry(phone.to_string())
            .or_insert_with(MockClient::new);
        let client: Arc<dyn ProtocolClient> = client.clone();
        Ok(client)
    }

    async fn remove_session(&self, phone: &str) -> Result<(), ClientError> {
        self.removed_sessions.lock().await.push(phone.to_string());
        self.clients.lock().await.remove(phone);
        Ok(())
    }
}
