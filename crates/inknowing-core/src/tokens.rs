// SPDX-FileCopyrightText: 2026 InKnowing Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Token counting for context budgeting.
//!
//! Uses the cl100k_base vocabulary via tiktoken-rs. The encoder is built
//! once per process; counts are approximate for non-OpenAI models but
//! consistent, which is what budget math needs.

use std::sync::OnceLock;

use tiktoken_rs::CoreBPE;

static BPE: OnceLock<CoreBPE> = OnceLock::new();

fn bpe() -> &'static CoreBPE {
    BPE.get_or_init(|| {
        tiktoken_rs::cl100k_base().expect("cl100k_base vocabulary is embedded")
    })
}

/// Count tokens in a text under the cl100k_base vocabulary.
pub fn count_tokens(text: &str) -> usize {
    bpe().encode_with_special_tokens(text).len()
}

/// Count tokens for a message including a small per-message framing overhead.
///
/// Chat protocols spend a few tokens per message on role markers; 4 matches
/// the cl100k chat framing and keeps budget math conservative.
pub fn count_message_tokens(content: &str) -> usize {
    count_tokens(content) + 4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_counts_zero() {
        assert_eq!(count_tokens(""), 0);
    }

    #[test]
    fn counts_scale_with_length() {
        let short = count_tokens("hello");
        let long = count_tokens("hello hello hello hello hello");
        assert!(long > short);
        assert!(short >= 1);
    }

    #[test]
    fn message_overhead_applied() {
        assert_eq!(count_message_tokens(""), 4);
        assert!(count_message_tokens("hi") > count_tokens("hi"));
    }
}
