use std::sync::Arc;

use tracing::info;

use crate::Result;
use crate::api::{HistoryQuery, SlackApi};
use crate::domain::{DateRange, Message};
use crate::fetcher::RetryPolicy;
use crate::pager::{Walk, walk_cursor};

/// Reads the top-level history of one channel.
///
/// Thread replies are not part of `conversations.history`; callers expand
/// threads separately with [`ThreadResolver`](crate::threads::ThreadResolver).
#[derive(Clone)]
pub struct ChannelCollector {
    api: Arc<dyn SlackApi>,
    policy: RetryPolicy,
}

impl ChannelCollector {
    pub fn new(api: Arc<dyn SlackApi>, policy: RetryPolicy) -> Self {
        Self { api, policy }
    }

    /// All non-bot messages of `channel_id` in `range`, in platform order.
    pub async fn find_by_channel(&self, channel_id: &str, range: &DateRange) -> Result<Vec<Message>> {
        self.collect(channel_id, range).await.into_result()
    }

    /// Like [`find_by_channel`](Self::find_by_channel), but keeps the messages
    /// read before a failing page.
    pub async fn collect(&self, channel_id: &str, range: &DateRange) -> Walk<Message> {
        let query = HistoryQuery::new(channel_id, range);
        let api = &self.api;
        let mut page_count = 0;

        let walk = walk_cursor(&self.policy, |cursor| {
            page_count += 1;
            api.conversation_history(&query, cursor)
        })
        .await;

        let walk = Walk {
            records: walk
                .records
                .iter()
                .filter_map(|raw| Message::from_history(raw, channel_id))
                .collect(),
            error: walk.error,
        };

        info!(
            "fetched history of {} ({} requests, {} messages)",
            channel_id,
            page_count,
            walk.records.len()
        );

        walk
    }
}
