use std::sync::Arc;

use crate::Result;
use crate::api::{RepliesQuery, SlackApi};
use crate::domain::{DateRange, Message};
use crate::fetcher::RetryPolicy;
use crate::pager::walk_cursor;

/// Fetches the replies of a single thread
#[derive(Clone)]
pub struct ThreadResolver {
    api: Arc<dyn SlackApi>,
    policy: RetryPolicy,
}

impl ThreadResolver {
    pub fn new(api: Arc<dyn SlackApi>, policy: RetryPolicy) -> Self {
        Self { api, policy }
    }

    /// Replies to `thread_ts` inside `range`, without the parent message.
    ///
    /// Slack echoes the parent as the first record, so it is dropped. Bot
    /// replies and replies with unparseable timestamps are dropped too.
    pub async fn find_replies(
        &self,
        channel_id: &str,
        thread_ts: &str,
        range: &DateRange,
    ) -> Result<Vec<Message>> {
        let query = RepliesQuery::new(channel_id, thread_ts, range);
        let api = &self.api;

        let records = walk_cursor(&self.policy, |cursor| {
            api.conversation_replies(&query, cursor)
        })
        .await
        .into_result()?;

        Ok(records
            .iter()
            .skip(1)
            .filter_map(|raw| Message::from_history(raw, channel_id))
            .filter(|msg| range.contains(msg.timestamp))
            .collect())
    }
}
