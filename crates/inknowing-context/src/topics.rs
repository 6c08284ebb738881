// SPDX-FileCopyrightText: 2026 InKnowing Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lightweight topic extraction from user turns.
//!
//! Frequency count over lowercased words, minus a small stopword list.
//! Good enough for the context endpoint and the character affect block;
//! not a substitute for the running summary.

use std::collections::HashMap;

use inknowing_core::types::Message;
use inknowing_core::MessageRole;

const STOPWORDS: &[&str] = &[
    "the", "and", "that", "this", "with", "what", "when", "where", "who", "whom", "why",
    "how", "does", "did", "have", "has", "had", "was", "were", "are", "is", "be", "been",
    "about", "tell", "me", "you", "your", "from", "for", "not", "they", "them", "their",
    "she", "her", "him", "his", "its", "of", "in", "on", "to", "a", "an", "it", "do",
    "can", "could", "would", "will", "there", "here", "then", "than", "more", "most",
    "book", "chapter", "please",
];

/// Most frequent substantive words across the session's user turns.
pub fn discussed_topics(messages: &[Message], max: usize) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for message in messages.iter().filter(|m| m.role == MessageRole::User) {
        for word in message.content.split(|c: char| !c.is_alphanumeric()) {
            let word = word.to_lowercase();
            if word.len() < 4 || STOPWORDS.contains(&word.as_str()) {
                continue;
            }
            *counts.entry(word).or_insert(0) += 1;
        }
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(max).map(|(word, _)| word).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_msg(seq: i64, content: &str) -> Message {
        Message {
            id: format!("m{seq}"),
            session_id: "s1".into(),
            seq,
            role: MessageRole::User,
            content: content.to_string(),
            token_count: 0,
            model_used: None,
            latency_ms: None,
            partial: false,
            error_kind: None,
            created_at: "2026-03-01T10:00:00.000Z".into(),
        }
    }

    #[test]
    fn frequent_words_rank_first() {
        let messages = vec![
            user_msg(0, "Tell me about the lighthouse and the lighthouse keeper"),
            user_msg(2, "Why does the lighthouse matter to Ramsay?"),
        ];
        let topics = discussed_topics(&messages, 3);
        assert_eq!(topics[0], "lighthouse");
        assert!(topics.contains(&"ramsay".to_string()) || topics.contains(&"keeper".to_string()));
    }

    #[test]
    fn assistant_messages_are_ignored() {
        let mut assistant = user_msg(1, "lighthouse lighthouse lighthouse");
        assistant.role = MessageRole::Assistant;
        let topics = discussed_topics(&[assistant], 5);
        assert!(topics.is_empty());
    }

    #[test]
    fn stopwords_and_short_words_excluded() {
        let messages = vec![user_msg(0, "what is the it and to")];
        assert!(discussed_topics(&messages, 5).is_empty());
    }
}
