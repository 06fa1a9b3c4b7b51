// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Event-driven forwarding rule engine for the Courier forwarding daemon.
//!
//! Rules map one source conversation (plus an optional keyword filter) to
//! an ordered set of destinations, owned by one pooled account. The engine
//! activates rules by subscribing to their source through the account's
//! live handle and fans new messages out with per-destination failure
//! isolation. See [`engine::ForwardingEngine`].

pub mod engine;
pub mod error;
pub mod session;

pub use engine::{CreateRule, ForwardingEngine};
pub use error::ForwardError;
pub use session::SessionKey;
