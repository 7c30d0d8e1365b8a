//! Message collection strategies.
//!
//! [`ChannelCollector`] reads one channel. Per-user collection has two
//! interchangeable strategies behind [`UserMessageSource`]: the search index
//! ([`SearchCollector`]) and a scan of every channel ([`ScanCollector`]).
//! [`FallbackCollector`] tries one and falls back to the other.

mod channel;
mod scan;
mod search;

use std::collections::HashSet;

use async_trait::async_trait;
use tracing::info;

use crate::Result;
use crate::domain::{DateRange, Message};

pub use channel::ChannelCollector;
pub use scan::ScanCollector;
pub use search::SearchCollector;

#[async_trait]
pub trait UserMessageSource: Send + Sync {
    /// Messages written by `user_id` in `range`, without duplicates
    async fn find_by_user(&self, user_id: &str, range: &DateRange) -> Result<Vec<Message>>;
}

/// Runs `primary`, and `fallback` if the primary strategy fails
pub struct FallbackCollector<P, F> {
    primary: P,
    fallback: F,
}

impl<P, F> FallbackCollector<P, F> {
    pub fn new(primary: P, fallback: F) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl<P, F> UserMessageSource for FallbackCollector<P, F>
where
    P: UserMessageSource,
    F: UserMessageSource,
{
    async fn find_by_user(&self, user_id: &str, range: &DateRange) -> Result<Vec<Message>> {
        match self.primary.find_by_user(user_id, range).await {
            Ok(messages) => Ok(messages),
            Err(e) => {
                info!("search unavailable, scanning all channels instead ({})", e);
                self.fallback.find_by_user(user_id, range).await
            }
        }
    }
}

/// Drop repeated `(channel, id)` pairs, keeping the first occurrence
pub fn dedup_messages(messages: Vec<Message>) -> Vec<Message> {
    let mut seen = HashSet::new();
    messages
        .into_iter()
        .filter(|m| seen.insert((m.channel_id.clone(), m.id.clone())))
        .collect()
}
