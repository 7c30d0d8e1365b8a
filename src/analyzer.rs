use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::aggregate::{aggregate, aggregate_user, build_user_stats};
use crate::api::SlackApi;
use crate::collector::{
    ChannelCollector, FallbackCollector, ScanCollector, SearchCollector, UserMessageSource,
    dedup_messages,
};
use crate::directory::UserDirectory;
use crate::domain::{DateRange, EmojiCount, MessageReaction, ThreadStats, UserStats};
use crate::fetcher::RetryPolicy;
use crate::threads::ThreadResolver;
use crate::{AppError, Result};

const PROGRESS_EVERY: usize = 10;

/// Ranked statistics of one channel
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub channel_id: String,
    /// Messages analyzed, thread replies included
    pub total_messages: usize,
    pub emoji_stats: Vec<EmojiCount>,
    pub message_stats: Vec<MessageReaction>,
    pub thread_stats: Vec<ThreadStats>,
    pub user_stats: Vec<UserStats>,
}

/// Statistics of one user's messages across channels
#[derive(Debug, Clone, Serialize)]
pub struct UserAnalysisResult {
    pub user_id: String,
    pub user_name: String,
    pub total_messages: usize,
    pub total_reactions: usize,
    pub reaction_ranking: Vec<EmojiCount>,
    pub thread_stats: Vec<ThreadStats>,
}

pub struct Analyzer {
    channels: ChannelCollector,
    threads: ThreadResolver,
    users: UserDirectory,
    user_messages: Box<dyn UserMessageSource>,
}

impl Analyzer {
    /// Analyzer reading through `api`. Per-user collection uses search and
    /// falls back to scanning every channel.
    pub fn new(api: Arc<dyn SlackApi>, policy: RetryPolicy) -> Self {
        let user_messages = FallbackCollector::new(
            SearchCollector::new(api.clone(), policy),
            ScanCollector::new(api.clone(), policy),
        );

        Self {
            channels: ChannelCollector::new(api.clone(), policy),
            threads: ThreadResolver::new(api.clone(), policy),
            users: UserDirectory::new(api, policy),
            user_messages: Box::new(user_messages),
        }
    }

    pub fn with_users(mut self, users: UserDirectory) -> Self {
        self.users = users;
        self
    }

    pub fn with_user_messages(mut self, source: impl UserMessageSource + 'static) -> Self {
        self.user_messages = Box::new(source);
        self
    }

    pub async fn analyze_channel(&self, channel_id: &str, range: &DateRange) -> Result<AnalysisResult> {
        let mut messages = self
            .channels
            .find_by_channel(channel_id, range)
            .await
            .map_err(|e| escalate(channel_id, e))?;
        info!("fetched {} messages", messages.len());

        let parents: Vec<String> = messages
            .iter()
            .filter(|m| m.is_thread_parent())
            .map(|m| m.id.clone())
            .collect();

        for (i, thread_ts) in parents.iter().enumerate() {
            match self.threads.find_replies(channel_id, thread_ts, range).await {
                Ok(replies) => messages.extend(replies),
                Err(e) => warn!("skipping thread {}: {}", thread_ts, e),
            }
            if (i + 1) % PROGRESS_EVERY == 0 || i + 1 == parents.len() {
                info!("threads: {}/{}", i + 1, parents.len());
            }
        }

        let messages = dedup_messages(messages);
        info!("aggregating {} messages", messages.len());
        let aggregation = aggregate(&messages);

        let user_ids: Vec<String> = aggregation
            .user_message_count
            .keys()
            .map(str::to_string)
            .collect();
        info!("resolving {} users", user_ids.len());
        let users = match self.users.find_by_ids(&user_ids).await {
            Ok(users) => users,
            Err(e) => {
                warn!("user lookup failed, showing IDs: {}", e);
                HashMap::new()
            }
        };

        Ok(AnalysisResult {
            channel_id: channel_id.to_string(),
            total_messages: messages.len(),
            user_stats: build_user_stats(&aggregation.user_message_count, &users),
            emoji_stats: aggregation.emoji_stats,
            message_stats: aggregation.message_stats,
            thread_stats: aggregation.thread_stats,
        })
    }

    pub async fn analyze_user(&self, user_name: &str, range: &DateRange) -> Result<UserAnalysisResult> {
        let user = self.users.find_by_name(user_name).await?;
        info!("analyzing {} ({})", user.display(), user.id);

        let messages = self.user_messages.find_by_user(&user.id, range).await?;
        info!("found {} messages", messages.len());

        let parents: Vec<_> = messages.iter().filter(|m| m.is_thread_parent()).collect();
        let mut reply_counts = HashMap::new();

        for (i, parent) in parents.iter().enumerate() {
            match self
                .threads
                .find_replies(&parent.channel_id, &parent.id, range)
                .await
            {
                Ok(replies) => {
                    let count = replies.iter().filter(|r| r.id != parent.id).count();
                    reply_counts.insert(parent.id.clone(), count);
                }
                Err(e) => warn!("skipping thread {} in {}: {}", parent.id, parent.channel_id, e),
            }
            if (i + 1) % PROGRESS_EVERY == 0 {
                info!("threads: {}/{}", i + 1, parents.len());
            }
        }

        let summary = aggregate_user(&messages, &reply_counts);

        Ok(UserAnalysisResult {
            user_name: user.display().to_string(),
            user_id: user.id,
            total_messages: summary.total_messages,
            total_reactions: summary.total_reactions,
            reaction_ranking: summary.reaction_ranking,
            thread_stats: summary.thread_stats,
        })
    }
}

/// Exhausted rate limits on a single channel are reported as a fetch failure
/// of that channel.
fn escalate(channel_id: &str, e: AppError) -> AppError {
    match e {
        AppError::SlackRateLimit { .. } => AppError::MessageFetch {
            channel_id: channel_id.to_string(),
            source: Box::new(e),
        },
        other => other,
    }
}
