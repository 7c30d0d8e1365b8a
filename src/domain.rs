use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{AppError, Result};

/// Display format for message timestamps in reports
pub const REPORT_TS_FORMAT: &str = "%Y%m%d.%H%M%S";

/// A single emoji reaction on a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub name: String,
    pub count: usize,
}

/// A Slack message reduced to the fields the analysis needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Slack timestamp, also the message identifier within its channel
    pub id: String,
    pub text: String,
    pub user_id: String,
    pub channel_id: String,
    pub timestamp: DateTime<Utc>,
    pub reactions: Vec<Reaction>,
    pub is_bot: bool,
    /// Parent timestamp, empty when the message is not part of a thread
    pub thread_ts: String,
}

impl Message {
    pub fn has_reactions(&self) -> bool {
        !self.reactions.is_empty()
    }

    pub fn total_reaction_count(&self) -> usize {
        self.reactions.iter().map(|r| r.count).sum()
    }

    pub fn is_thread_parent(&self) -> bool {
        !self.thread_ts.is_empty() && self.thread_ts == self.id
    }

    pub fn is_thread_reply(&self) -> bool {
        !self.thread_ts.is_empty() && self.thread_ts != self.id
    }

    /// Convert a record from `conversations.history` or `conversations.replies`.
    ///
    /// Bot messages and records with a malformed `ts` yield `None`.
    pub fn from_history(msg: &serde_json::Value, channel_id: &str) -> Option<Message> {
        if is_bot_record(msg) {
            return None;
        }

        let id = str_field(msg, "ts")?;
        let timestamp = parse_slack_ts(&id).ok()?;

        let reactions = msg
            .get("reactions")
            .and_then(|r| r.as_array())
            .map(|reactions| {
                reactions
                    .iter()
                    .filter_map(|r| {
                        let name = r.get("name")?.as_str()?.to_string();
                        let count = r.get("count").and_then(|c| c.as_u64()).unwrap_or(0) as usize;
                        Some(Reaction { name, count })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Some(Message {
            text: str_field(msg, "text").unwrap_or_default(),
            user_id: str_field(msg, "user").unwrap_or_default(),
            channel_id: channel_id.to_string(),
            timestamp,
            reactions,
            is_bot: false,
            thread_ts: str_field(msg, "thread_ts").unwrap_or_default(),
            id,
        })
    }

    /// Convert a `search.messages` match.
    ///
    /// Search results carry no reactions. The thread reference is recovered
    /// from the permalink when Slack includes one.
    pub fn from_search_match(hit: &serde_json::Value) -> Option<Message> {
        let id = str_field(hit, "ts")?;
        let timestamp = parse_slack_ts(&id).ok()?;

        let channel_id = hit
            .get("channel")
            .and_then(|c| c.get("id"))
            .and_then(|c| c.as_str())
            .unwrap_or_default()
            .to_string();

        let thread_ts = hit
            .get("permalink")
            .and_then(|p| p.as_str())
            .and_then(thread_ts_from_permalink)
            .unwrap_or_default();

        Some(Message {
            text: str_field(hit, "text").unwrap_or_default(),
            user_id: str_field(hit, "user").unwrap_or_default(),
            channel_id,
            timestamp,
            reactions: Vec::new(),
            is_bot: false,
            thread_ts,
            id,
        })
    }

    pub fn formatted_timestamp(&self) -> String {
        self.timestamp.format(REPORT_TS_FORMAT).to_string()
    }
}

fn str_field(value: &serde_json::Value, key: &str) -> Option<String> {
    value.get(key).and_then(|v| v.as_str()).map(|s| s.to_string())
}

fn is_bot_record(msg: &serde_json::Value) -> bool {
    let subtype = msg.get("subtype").and_then(|s| s.as_str());
    let bot_id = msg.get("bot_id").and_then(|b| b.as_str()).unwrap_or("");
    subtype == Some("bot_message") || !bot_id.is_empty()
}

fn thread_ts_from_permalink(permalink: &str) -> Option<String> {
    let url = Url::parse(permalink).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == "thread_ts")
        .map(|(_, value)| value.into_owned())
}

/// Parse a Slack timestamp ("1705312800.000123") into a UTC datetime
pub fn parse_slack_ts(ts: &str) -> Result<DateTime<Utc>> {
    let (secs, fraction) = ts.split_once('.').unwrap_or((ts, ""));
    let secs: i64 = secs
        .parse()
        .map_err(|_| AppError::InvalidDate(ts.to_string()))?;
    // the fraction is a decimal part: "1.5" is half a second
    let micros: u32 = if fraction.is_empty() {
        0
    } else {
        fraction
            .get(..fraction.len().min(6))
            .filter(|f| f.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|f| format!("{:0<6}", f).parse().ok())
            .ok_or_else(|| AppError::InvalidDate(ts.to_string()))?
    };

    DateTime::from_timestamp(secs, micros * 1_000).ok_or_else(|| AppError::InvalidDate(ts.to_string()))
}

/// Optional inclusive bounds on message time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    /// Build a range covering whole days: from the start of `from` to the
    /// last microsecond of `to`.
    pub fn from_dates(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Result<Self> {
        let start = from.map(|d| d.and_time(NaiveTime::MIN).and_utc());
        let end = to
            .and_then(|d| d.and_hms_micro_opt(23, 59, 59, 999_999))
            .map(|dt| dt.and_utc());

        let range = Self { start, end };
        if !range.is_valid() {
            return Err(AppError::InvalidDateRange {
                start: from.map(|d| d.to_string()).unwrap_or_default(),
                end: to.map(|d| d.to_string()).unwrap_or_default(),
            });
        }
        Ok(range)
    }

    pub fn is_valid(&self) -> bool {
        match (self.start, self.end) {
            (Some(start), Some(end)) => start <= end,
            _ => true,
        }
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        if let Some(start) = self.start
            && t < start
        {
            return false;
        }
        if let Some(end) = self.end
            && t > end
        {
            return false;
        }
        true
    }

    /// Lower bound for history requests, in Slack timestamp form
    pub fn oldest_ts(&self) -> Option<String> {
        self.start.map(to_slack_ts)
    }

    /// Upper bound for history requests, in Slack timestamp form
    pub fn latest_ts(&self) -> Option<String> {
        self.end.map(to_slack_ts)
    }
}

fn to_slack_ts(t: DateTime<Utc>) -> String {
    format!("{}.{:06}", t.timestamp(), t.timestamp_subsec_micros())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    /// Slack handle
    pub name: String,
    pub display_name: String,
    pub real_name: String,
}

impl User {
    /// A user known only by its identifier
    pub fn unresolved(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            ..Self::default()
        }
    }

    /// Display name, real name, handle, then ID, whichever is set first
    pub fn display(&self) -> &str {
        [&self.display_name, &self.real_name, &self.name]
            .into_iter()
            .find(|s| !s.is_empty())
            .unwrap_or(&self.id)
    }

    pub fn matches_name(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        [&self.name, &self.display_name, &self.real_name]
            .into_iter()
            .any(|candidate| !candidate.is_empty() && candidate.to_lowercase() == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmojiCount {
    pub emoji: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageReaction {
    pub text: String,
    pub reactions: usize,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreadStats {
    pub text: String,
    pub reply_count: usize,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserStats {
    pub user_id: String,
    pub user_name: String,
    pub count: usize,
}
