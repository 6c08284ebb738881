// SPDX-FileCopyrightText: 2026 InKnowing Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Context assembly for the InKnowing dialogue runtime.
//!
//! Builds each turn's bounded prompt from trailing history, the cached
//! running summary, retrieved book excerpts, and (for character sessions)
//! the persona preamble and affect block.

pub mod assembler;
pub mod persona;
pub mod summary;
pub mod topics;

pub use assembler::{AssembledPrompt, ContextAssembler};
pub use persona::{affect_block, persona_preamble};
pub use summary::Summarizer;
pub use topics::discussed_topics;
