// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the Courier forwarding daemon.
//!
//! Layered TOML configuration with environment overrides, merged via
//! Figment. See [`loader::load_config`] for the merge order.

pub mod loader;
pub mod model;

pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::{CourierConfig, ForwardingConfig, PoolConfig, StorageConfig};
