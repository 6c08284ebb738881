// SPDX-FileCopyrightText: 2026 InKnowing Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loading for the InKnowing dialogue runtime.
//!
//! Layered TOML configuration (system -> user -> local) with environment
//! variable overrides, backed by Figment.

pub mod loader;
pub mod model;

pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::RuntimeConfig;
