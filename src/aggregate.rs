//! Folding message sets into ranked statistics.
//!
//! All rankings are descending by count. Sorting is stable, so entries with
//! equal counts stay in the order they were first seen.

use std::collections::HashMap;

use crate::domain::{EmojiCount, Message, MessageReaction, ThreadStats, User, UserStats};

/// Counter that remembers the order in which keys first appeared
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tally {
    index: HashMap<String, usize>,
    entries: Vec<(String, usize)>,
}

impl Tally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: &str, n: usize) {
        match self.index.get(key) {
            Some(&i) => {
                if let Some(entry) = self.entries.get_mut(i) {
                    entry.1 += n;
                }
            }
            None => {
                self.index.insert(key.to_string(), self.entries.len());
                self.entries.push((key.to_string(), n));
            }
        }
    }

    pub fn get(&self, key: &str) -> usize {
        self.index
            .get(key)
            .and_then(|&i| self.entries.get(i))
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.entries.iter().map(|(k, n)| (k.as_str(), *n))
    }

    /// Entries by descending count, ties in first-seen order
    pub fn ranked(&self) -> Vec<(String, usize)> {
        let mut ranked = self.entries.clone();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregation {
    pub emoji_stats: Vec<EmojiCount>,
    pub message_stats: Vec<MessageReaction>,
    pub thread_stats: Vec<ThreadStats>,
    /// Posts per author ID
    pub user_message_count: Tally,
}

/// Single pass over `messages`; bot messages are ignored entirely.
pub fn aggregate(messages: &[Message]) -> Aggregation {
    let mut emoji_count = Tally::new();
    let mut user_message_count = Tally::new();
    let mut message_stats = Vec::new();
    let mut thread_parents: Vec<&Message> = Vec::new();
    let mut thread_replies = Tally::new();

    for msg in messages.iter().filter(|m| !m.is_bot) {
        if !msg.user_id.is_empty() {
            user_message_count.add(&msg.user_id, 1);
        }

        for reaction in &msg.reactions {
            emoji_count.add(&reaction.name, reaction.count);
        }

        let total = msg.total_reaction_count();
        if total > 0 {
            message_stats.push(MessageReaction {
                text: msg.text.clone(),
                reactions: total,
                timestamp: msg.formatted_timestamp(),
            });
        }

        if msg.is_thread_parent() {
            thread_parents.push(msg);
            // registers the thread without resetting replies already counted
            thread_replies.add(&msg.id, 0);
        } else if msg.is_thread_reply() {
            thread_replies.add(&msg.thread_ts, 1);
        }
    }

    let emoji_stats = emoji_count
        .ranked()
        .into_iter()
        .map(|(emoji, count)| EmojiCount { emoji, count })
        .collect();

    message_stats.sort_by(|a, b| b.reactions.cmp(&a.reactions));

    Aggregation {
        emoji_stats,
        message_stats,
        thread_stats: rank_threads(&thread_parents, |parent| thread_replies.get(&parent.id)),
        user_message_count,
    }
}

/// Thread stats for `parents`, dropping threads without replies
pub fn rank_threads<F>(parents: &[&Message], reply_count: F) -> Vec<ThreadStats>
where
    F: Fn(&Message) -> usize,
{
    let mut seen = std::collections::HashSet::new();
    let mut stats: Vec<ThreadStats> = parents
        .iter()
        .filter(|p| seen.insert((p.channel_id.as_str(), p.id.as_str())))
        .filter_map(|parent| {
            let count = reply_count(parent);
            (count > 0).then(|| ThreadStats {
                text: parent.text.clone(),
                reply_count: count,
                timestamp: parent.formatted_timestamp(),
            })
        })
        .collect();

    stats.sort_by(|a, b| b.reply_count.cmp(&a.reply_count));
    stats
}

/// Rank authors by post count, naming them through `users` when possible
pub fn build_user_stats(user_message_count: &Tally, users: &HashMap<String, User>) -> Vec<UserStats> {
    user_message_count
        .ranked()
        .into_iter()
        .map(|(user_id, count)| {
            let user_name = users
                .get(&user_id)
                .map(|u| u.display().to_string())
                .unwrap_or_else(|| user_id.clone());
            UserStats {
                user_id,
                user_name,
                count,
            }
        })
        .collect()
}

/// Summary of one user's own messages
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserAggregation {
    pub total_messages: usize,
    /// Reactions received on the user's messages
    pub total_reactions: usize,
    pub reaction_ranking: Vec<EmojiCount>,
    pub thread_stats: Vec<ThreadStats>,
}

/// Aggregate a user's messages. `reply_counts` maps a thread parent ID to the
/// number of replies counted for it elsewhere.
pub fn aggregate_user(messages: &[Message], reply_counts: &HashMap<String, usize>) -> UserAggregation {
    let mut emoji_count = Tally::new();
    let mut total_reactions = 0;

    for msg in messages {
        for reaction in &msg.reactions {
            emoji_count.add(&reaction.name, reaction.count);
            total_reactions += reaction.count;
        }
    }

    let parents: Vec<&Message> = messages.iter().filter(|m| m.is_thread_parent()).collect();

    UserAggregation {
        total_messages: messages.len(),
        total_reactions,
        reaction_ranking: emoji_count
            .ranked()
            .into_iter()
            .map(|(emoji, count)| EmojiCount { emoji, count })
            .collect(),
        thread_stats: rank_threads(&parents, |p| reply_counts.get(&p.id).copied().unwrap_or(0)),
    }
}
