// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Courier integration tests.
//!
//! Provides deterministic in-memory implementations of the protocol-client
//! boundary with scriptable outcomes and captured calls.

pub mod mock_client;

pub use mock_client::{ForwardCall, MockClient, MockConnector};
