//! The remote Slack surface the collectors depend on.
//!
//! Records from the conversation endpoints stay as raw JSON so that the
//! conversion rules (bot filtering, timestamp parsing) live in one place,
//! [`Message::from_history`](crate::domain::Message::from_history).

use async_trait::async_trait;

use crate::Result;
use crate::domain::{Channel, DateRange, User};

/// One page of a cursor-paginated collection
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Continuation token; `None` when the platform reports no further pages
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_cursor: None,
        }
    }

    pub fn with_cursor(items: Vec<T>, cursor: impl Into<String>) -> Self {
        let cursor = cursor.into();
        Self {
            items,
            next_cursor: (!cursor.is_empty()).then_some(cursor),
        }
    }
}

/// One numbered page of `search.messages`
#[derive(Debug, Clone)]
pub struct SearchPage {
    pub matches: Vec<serde_json::Value>,
    /// Total number of pages reported by the platform
    pub pages: u32,
}

/// Parameters for `conversations.history`
#[derive(Debug, Clone)]
pub struct HistoryQuery {
    pub channel_id: String,
    pub oldest: Option<String>,
    pub latest: Option<String>,
}

impl HistoryQuery {
    pub fn new(channel_id: &str, range: &DateRange) -> Self {
        Self {
            channel_id: channel_id.to_string(),
            oldest: range.oldest_ts(),
            latest: range.latest_ts(),
        }
    }
}

/// Parameters for `conversations.replies`
#[derive(Debug, Clone)]
pub struct RepliesQuery {
    pub channel_id: String,
    pub thread_ts: String,
    pub oldest: Option<String>,
    pub latest: Option<String>,
}

impl RepliesQuery {
    pub fn new(channel_id: &str, thread_ts: &str, range: &DateRange) -> Self {
        Self {
            channel_id: channel_id.to_string(),
            thread_ts: thread_ts.to_string(),
            oldest: range.oldest_ts(),
            latest: range.latest_ts(),
        }
    }
}

#[async_trait]
pub trait SlackApi: Send + Sync {
    /// `conversations.list`, archived channels excluded
    async fn list_channels(&self, cursor: Option<String>) -> Result<Page<Channel>>;

    async fn conversation_history(
        &self,
        query: &HistoryQuery,
        cursor: Option<String>,
    ) -> Result<Page<serde_json::Value>>;

    /// `conversations.replies`; the first record of the first page is the parent
    async fn conversation_replies(
        &self,
        query: &RepliesQuery,
        cursor: Option<String>,
    ) -> Result<Page<serde_json::Value>>;

    async fn list_users(&self, cursor: Option<String>) -> Result<Page<User>>;

    async fn user_info(&self, user_id: &str) -> Result<User>;

    /// `search.messages`; pages are numbered from 1
    async fn search_messages(&self, query: &str, page: u32) -> Result<SearchPage>;
}
