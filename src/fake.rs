//! Scripted in-memory [`SlackApi`] used by the unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::api::{HistoryQuery, Page, RepliesQuery, SearchPage, SlackApi};
use crate::domain::{Channel, User};
use crate::{AppError, Result};

#[derive(Debug, Clone, Copy)]
pub enum Failure {
    RateLimit(u64),
    NotInChannel,
    Api(&'static str),
}

impl Failure {
    fn to_error(self, channel_id: &str) -> AppError {
        match self {
            Failure::RateLimit(secs) => AppError::SlackRateLimit {
                retry_after_secs: secs,
            },
            Failure::NotInChannel => AppError::NotInChannel {
                channel_id: channel_id.to_string(),
            },
            Failure::Api(code) => AppError::SlackApi(code.to_string()),
        }
    }
}

#[derive(Default)]
pub struct FakeSlack {
    channels: Vec<Channel>,
    history: HashMap<String, Vec<Vec<Value>>>,
    replies: HashMap<(String, String), Vec<Vec<Value>>>,
    users: Vec<User>,
    search_pages: Vec<Vec<Value>>,
    sticky: HashMap<String, Failure>,
    transient: Mutex<HashMap<String, (Failure, usize)>>,
    calls: Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeSlack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel(mut self, id: &str, name: &str) -> Self {
        self.channels.push(Channel {
            id: id.to_string(),
            name: name.to_string(),
        });
        self
    }

    /// History of `channel_id`, one inner vec per page
    pub fn with_history(mut self, channel_id: &str, pages: Vec<Vec<Value>>) -> Self {
        self.history.insert(channel_id.to_string(), pages);
        self
    }

    pub fn with_replies(mut self, channel_id: &str, thread_ts: &str, pages: Vec<Vec<Value>>) -> Self {
        self.replies
            .insert((channel_id.to_string(), thread_ts.to_string()), pages);
        self
    }

    pub fn with_user(mut self, id: &str, name: &str, display_name: &str) -> Self {
        self.users.push(User {
            id: id.to_string(),
            name: name.to_string(),
            display_name: display_name.to_string(),
            real_name: String::new(),
        });
        self
    }

    pub fn with_search_pages(mut self, pages: Vec<Vec<Value>>) -> Self {
        self.search_pages = pages;
        self
    }

    pub fn fail_history(mut self, channel_id: &str, failure: Failure) -> Self {
        self.sticky.insert(format!("history:{channel_id}"), failure);
        self
    }

    /// Fail history requests for `channel_id` from page `page` (0-based) on
    pub fn fail_history_from_page(mut self, channel_id: &str, page: usize, failure: Failure) -> Self {
        self.sticky
            .insert(format!("history:{channel_id}@{page}"), failure);
        self
    }

    pub fn fail_history_times(self, channel_id: &str, failure: Failure, times: usize) -> Self {
        self.fail_times(format!("history:{channel_id}"), failure, times)
    }

    pub fn fail_replies(mut self, channel_id: &str, failure: Failure) -> Self {
        self.sticky.insert(format!("replies:{channel_id}"), failure);
        self
    }

    pub fn fail_search(mut self, failure: Failure) -> Self {
        self.sticky.insert("search".to_string(), failure);
        self
    }

    pub fn fail_channels(mut self, failure: Failure) -> Self {
        self.sticky.insert("channels".to_string(), failure);
        self
    }

    pub fn fail_users_list(mut self, failure: Failure) -> Self {
        self.sticky.insert("users".to_string(), failure);
        self
    }

    pub fn fail_user_info(mut self, user_id: &str, failure: Failure) -> Self {
        self.sticky.insert(format!("user_info:{user_id}"), failure);
        self
    }

    fn fail_times(self, key: String, failure: Failure, times: usize) -> Self {
        if let Ok(mut transient) = self.transient.lock() {
            transient.insert(key, (failure, times));
        }
        self
    }

    pub fn calls(&self, key: &str) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.get(key).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn history_calls(&self, channel_id: &str) -> usize {
        self.calls(&format!("history:{channel_id}"))
    }

    pub fn replies_calls(&self) -> usize {
        self.calls
            .lock()
            .map(|calls| {
                calls
                    .iter()
                    .filter(|(key, _)| key.starts_with("replies:"))
                    .map(|(_, n)| n)
                    .sum()
            })
            .unwrap_or(0)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn check(&self, key: &str, channel_id: &str) -> Result<()> {
        if let Ok(mut calls) = self.calls.lock() {
            *calls.entry(key.to_string()).or_default() += 1;
        }
        if let Some(failure) = self.sticky.get(key) {
            return Err(failure.to_error(channel_id));
        }
        if let Ok(mut transient) = self.transient.lock()
            && let Some((failure, remaining)) = transient.get_mut(key)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(failure.to_error(channel_id));
        }
        Ok(())
    }

    fn page_of<T: Clone>(pages: &[Vec<T>], cursor: Option<String>) -> Page<T> {
        let index: usize = cursor.and_then(|c| c.parse().ok()).unwrap_or(0);
        let items = pages.get(index).cloned().unwrap_or_default();
        if index + 1 < pages.len() {
            Page::with_cursor(items, (index + 1).to_string())
        } else {
            Page::last(items)
        }
    }
}

#[async_trait]
impl SlackApi for FakeSlack {
    async fn list_channels(&self, cursor: Option<String>) -> Result<Page<Channel>> {
        self.check("channels", "")?;
        Ok(Self::page_of(&[self.channels.clone()], cursor))
    }

    async fn conversation_history(
        &self,
        query: &HistoryQuery,
        cursor: Option<String>,
    ) -> Result<Page<Value>> {
        let channel_id = &query.channel_id;
        self.check(&format!("history:{channel_id}"), channel_id)?;

        let index: usize = cursor.as_deref().and_then(|c| c.parse().ok()).unwrap_or(0);
        for page in 0..=index {
            if let Some(failure) = self.sticky.get(&format!("history:{channel_id}@{page}")) {
                return Err(failure.to_error(channel_id));
            }
        }

        let pages = self.history.get(channel_id).cloned().unwrap_or_default();
        Ok(Self::page_of(&pages, cursor))
    }

    async fn conversation_replies(
        &self,
        query: &RepliesQuery,
        cursor: Option<String>,
    ) -> Result<Page<Value>> {
        let channel_id = &query.channel_id;
        self.check(&format!("replies:{channel_id}"), channel_id)?;

        let key = (channel_id.clone(), query.thread_ts.clone());
        let pages = self.replies.get(&key).cloned().unwrap_or_default();
        Ok(Self::page_of(&pages, cursor))
    }

    async fn list_users(&self, cursor: Option<String>) -> Result<Page<User>> {
        self.check("users", "")?;
        Ok(Self::page_of(&[self.users.clone()], cursor))
    }

    async fn user_info(&self, user_id: &str) -> Result<User> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.check(&format!("user_info:{user_id}"), "")?;
        self.users
            .iter()
            .find(|u| u.id == user_id)
            .cloned()
            .ok_or_else(|| AppError::SlackApi("user_not_found".to_string()))
    }

    async fn search_messages(&self, _query: &str, page: u32) -> Result<SearchPage> {
        self.check("search", "")?;
        let index = page.saturating_sub(1) as usize;
        Ok(SearchPage {
            matches: self.search_pages.get(index).cloned().unwrap_or_default(),
            pages: self.search_pages.len() as u32,
        })
    }
}

pub fn raw_message(ts: &str, user: &str, text: &str, reactions: &[(&str, u64)]) -> Value {
    let reactions: Vec<Value> = reactions
        .iter()
        .map(|(name, count)| json!({"name": name, "count": count, "users": []}))
        .collect();
    let mut msg = json!({"ts": ts, "user": user, "text": text});
    if !reactions.is_empty() {
        msg["reactions"] = Value::Array(reactions);
    }
    msg
}

pub fn raw_parent(ts: &str, user: &str, text: &str, reactions: &[(&str, u64)]) -> Value {
    let mut msg = raw_message(ts, user, text, reactions);
    msg["thread_ts"] = json!(ts);
    msg
}

pub fn raw_reply(ts: &str, thread_ts: &str, user: &str, text: &str) -> Value {
    json!({"ts": ts, "thread_ts": thread_ts, "user": user, "text": text})
}

pub fn search_hit(ts: &str, user: &str, channel_id: &str, text: &str) -> Value {
    json!({
        "ts": ts,
        "user": user,
        "text": text,
        "channel": {"id": channel_id, "name": channel_id.to_lowercase()},
        "permalink": format!("https://example.slack.com/archives/{channel_id}/p{}", ts.replace('.', "")),
    })
}

pub fn search_reply_hit(ts: &str, thread_ts: &str, user: &str, channel_id: &str, text: &str) -> Value {
    let mut hit = search_hit(ts, user, channel_id, text);
    hit["permalink"] = json!(format!(
        "https://example.slack.com/archives/{channel_id}/p{}?thread_ts={thread_ts}&cid={channel_id}",
        ts.replace('.', "")
    ));
    hit
}
