use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{ChannelCollector, UserMessageSource, dedup_messages};
use crate::Result;
use crate::api::SlackApi;
use crate::directory::ChannelDirectory;
use crate::domain::{DateRange, Message};
use crate::fetcher::RetryPolicy;
use crate::threads::ThreadResolver;

const PROGRESS_EVERY: usize = 10;

/// Finds a user's messages by reading every channel.
///
/// Slow, but needs no search permission. Channels that cannot be read are
/// skipped: membership errors silently, exhausted rate limits at debug level,
/// anything else with a warning.
pub struct ScanCollector {
    directory: ChannelDirectory,
    channels: ChannelCollector,
    threads: ThreadResolver,
}

impl ScanCollector {
    pub fn new(api: Arc<dyn SlackApi>, policy: RetryPolicy) -> Self {
        Self {
            directory: ChannelDirectory::new(api.clone(), policy),
            channels: ChannelCollector::new(api.clone(), policy),
            threads: ThreadResolver::new(api, policy),
        }
    }

    /// The user's messages in one channel, including their replies in any
    /// thread of that channel.
    async fn scan_channel(
        &self,
        channel_id: &str,
        user_id: &str,
        range: &DateRange,
    ) -> Result<Vec<Message>> {
        let history = self.channels.find_by_channel(channel_id, range).await?;
        let mut found: Vec<Message> = history
            .iter()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect();

        for parent in history.iter().filter(|m| m.is_thread_parent()) {
            match self.threads.find_replies(channel_id, &parent.id, range).await {
                Ok(replies) => {
                    found.extend(replies.into_iter().filter(|r| r.user_id == user_id));
                }
                Err(e) => debug!("skipping thread {} in {}: {}", parent.id, channel_id, e),
            }
        }

        Ok(found)
    }
}

#[async_trait]
impl UserMessageSource for ScanCollector {
    async fn find_by_user(&self, user_id: &str, range: &DateRange) -> Result<Vec<Message>> {
        let channels = self.directory.find_all().await?;
        let total = channels.len();
        info!("scanning {} channels", total);

        let mut messages = Vec::new();
        let mut scanned = 0;
        let mut last_error = None;

        for (i, channel) in channels.iter().enumerate() {
            match self.scan_channel(&channel.id, user_id, range).await {
                Ok(found) => {
                    scanned += 1;
                    messages.extend(found);
                }
                Err(e) if e.is_not_in_channel() => {
                    last_error = Some(e);
                }
                Err(e) if e.is_rate_limit() => {
                    debug!("skipping #{} after repeated rate limits", channel.name);
                    last_error = Some(e);
                }
                Err(e) => {
                    warn!("skipping #{}: {}", channel.name, e);
                    last_error = Some(e);
                }
            }

            if (i + 1) % PROGRESS_EVERY == 0 || i + 1 == total {
                info!(
                    "progress: {}/{} channels ({} messages found)",
                    i + 1,
                    total,
                    messages.len()
                );
            }
        }

        if scanned == 0
            && let Some(e) = last_error
        {
            return Err(e);
        }

        Ok(dedup_messages(messages))
    }
}
