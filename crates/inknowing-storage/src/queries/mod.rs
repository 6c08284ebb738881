// SPDX-FileCopyrightText: 2026 InKnowing Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQL operations grouped by entity.

pub mod catalog;
pub mod dead_letter;
pub mod messages;
pub mod quota;
pub mod sessions;
