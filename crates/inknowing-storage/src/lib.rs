// SPDX-FileCopyrightText: 2026 InKnowing Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence journal for the InKnowing dialogue runtime.
//!
//! Sessions, messages, references, quota rows, cost entries, summaries,
//! dead letters, and the read-side catalog all live here. Writes go through
//! tokio-rusqlite's single background thread; migrations are embedded and
//! run on open.

pub mod database;
pub mod journal;
pub mod migrations;
pub mod models;
pub mod queries;

pub use database::Database;
pub use journal::Journal;
