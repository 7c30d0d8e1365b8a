use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::{ChannelCollector, UserMessageSource, dedup_messages};
use crate::api::SlackApi;
use crate::{AppError, Result};
use crate::domain::{DateRange, Message};
use crate::fetcher::RetryPolicy;
use crate::pager::walk_numbered;
use crate::threads::ThreadResolver;

type ThreadKey = (String, String);

/// Finds a user's messages through `search.messages`.
///
/// Search hits carry no reactions, so every hit is completed from its
/// channel's history (read once per channel) and, for thread replies, from
/// the thread's reply set (read once per thread).
pub struct SearchCollector {
    api: Arc<dyn SlackApi>,
    policy: RetryPolicy,
    channels: ChannelCollector,
    threads: ThreadResolver,
}

impl SearchCollector {
    pub fn new(api: Arc<dyn SlackApi>, policy: RetryPolicy) -> Self {
        Self {
            channels: ChannelCollector::new(api.clone(), policy),
            threads: ThreadResolver::new(api.clone(), policy),
            api,
            policy,
        }
    }

    async fn search_hits(&self, user_id: &str, range: &DateRange) -> Result<Vec<Message>> {
        let query = search_query(user_id, range);
        let api = &self.api;
        let query_ref = &query;

        let matches = walk_numbered(&self.policy, |page| async move {
            let result = api.search_messages(query_ref, page).await?;
            info!("search page {}/{} ({} matches)", page, result.pages, result.matches.len());
            Ok::<_, AppError>((result.matches, result.pages))
        })
        .await
        .into_result()?;

        Ok(matches
            .iter()
            .filter_map(Message::from_search_match)
            .filter(|m| m.user_id == user_id && range.contains(m.timestamp))
            .collect())
    }

    /// Read each channel's history once, indexed by message ID.
    async fn channel_index(
        &self,
        hits: &[Message],
        range: &DateRange,
    ) -> HashMap<String, HashMap<String, Message>> {
        let mut seen = HashSet::new();
        let channel_ids: Vec<&str> = hits
            .iter()
            .map(|m| m.channel_id.as_str())
            .filter(|id| !id.is_empty() && seen.insert(*id))
            .collect();

        info!("loading reactions from {} channels", channel_ids.len());

        let mut index = HashMap::new();
        for channel_id in channel_ids {
            let walk = self.channels.collect(channel_id, range).await;
            if let Some(e) = &walk.error {
                warn!(
                    "history of {} incomplete, {} messages keep search data only: {}",
                    channel_id,
                    hits.iter().filter(|m| m.channel_id == channel_id).count(),
                    e
                );
            }
            let by_id = walk
                .records
                .into_iter()
                .map(|m| (m.id.clone(), m))
                .collect();
            index.insert(channel_id.to_string(), by_id);
        }
        index
    }

    async fn thread_replies(
        &self,
        memo: &mut HashMap<ThreadKey, Vec<Message>>,
        channel_id: &str,
        thread_ts: &str,
        range: &DateRange,
    ) -> Vec<Message> {
        let key = (channel_id.to_string(), thread_ts.to_string());
        if let Some(replies) = memo.get(&key) {
            return replies.clone();
        }

        let replies = match self.threads.find_replies(channel_id, thread_ts, range).await {
            Ok(replies) => replies,
            Err(e) => {
                warn!("failed to read thread {} in {}: {}", thread_ts, channel_id, e);
                Vec::new()
            }
        };
        memo.insert(key, replies.clone());
        replies
    }
}

#[async_trait]
impl UserMessageSource for SearchCollector {
    async fn find_by_user(&self, user_id: &str, range: &DateRange) -> Result<Vec<Message>> {
        let mut hits = self.search_hits(user_id, range).await?;
        info!("search found {} messages", hits.len());

        let index = self.channel_index(&hits, range).await;
        let mut memo = HashMap::new();
        let mut thread_messages = Vec::new();

        for hit in hits.iter_mut() {
            if let Some(full) = index.get(&hit.channel_id).and_then(|m| m.get(&hit.id)) {
                hit.reactions = full.reactions.clone();
                hit.thread_ts = full.thread_ts.clone();
            } else if hit.is_thread_reply() {
                let replies = self
                    .thread_replies(&mut memo, &hit.channel_id, &hit.thread_ts, range)
                    .await;
                if let Some(full) = replies.iter().find(|r| r.id == hit.id) {
                    hit.reactions = full.reactions.clone();
                }
            }

            if hit.is_thread_parent() {
                let replies = self
                    .thread_replies(&mut memo, &hit.channel_id, &hit.id, range)
                    .await;
                thread_messages.extend(replies.into_iter().filter(|r| r.user_id == user_id));
            }
        }

        hits.extend(thread_messages);
        let messages = dedup_messages(hits);
        info!("collected {} messages after enrichment", messages.len());
        Ok(messages)
    }
}

/// `from:<@USER>` with optional `after:`/`before:` day qualifiers.
///
/// Both qualifiers exclude the day they name, so they point one day outside
/// the range. Hits from those outer days are dropped by `range.contains`.
pub fn search_query(user_id: &str, range: &DateRange) -> String {
    let mut query = format!("from:<@{}>", user_id);
    if let Some(day) = range.start.and_then(|s| s.date_naive().pred_opt()) {
        query.push_str(&format!(" after:{}", day.format("%Y-%m-%d")));
    }
    if let Some(day) = range.end.and_then(|e| e.date_naive().succ_opt()) {
        query.push_str(&format!(" before:{}", day.format("%Y-%m-%d")));
    }
    query
}
