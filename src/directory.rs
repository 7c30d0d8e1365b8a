use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::api::SlackApi;
use crate::domain::{Channel, User};
use crate::fetcher::RetryPolicy;
use crate::pager::walk_cursor;
use crate::{AppError, Result};

/// Default bound on concurrent `users.info` requests
pub const DEFAULT_LOOKUP_CONCURRENCY: usize = 10;

/// Channel listing and name resolution
#[derive(Clone)]
pub struct ChannelDirectory {
    api: Arc<dyn SlackApi>,
    policy: RetryPolicy,
}

impl ChannelDirectory {
    pub fn new(api: Arc<dyn SlackApi>, policy: RetryPolicy) -> Self {
        Self { api, policy }
    }

    /// Every non-archived channel visible to the token
    pub async fn find_all(&self) -> Result<Vec<Channel>> {
        let api = &self.api;
        walk_cursor(&self.policy, |cursor| api.list_channels(cursor))
            .await
            .into_result()
    }

    /// Resolve a channel name, with or without the leading `#`
    pub async fn find_by_name(&self, name: &str) -> Result<Channel> {
        let name = name.trim_start_matches('#');
        self.find_all()
            .await?
            .into_iter()
            .find(|c| c.name == name)
            .ok_or_else(|| AppError::ChannelNotFound(name.to_string()))
    }
}

/// User listing, name resolution and bulk lookups
#[derive(Clone)]
pub struct UserDirectory {
    api: Arc<dyn SlackApi>,
    policy: RetryPolicy,
    max_concurrency: usize,
}

impl UserDirectory {
    pub fn new(api: Arc<dyn SlackApi>, policy: RetryPolicy) -> Self {
        Self {
            api,
            policy,
            max_concurrency: DEFAULT_LOOKUP_CONCURRENCY,
        }
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Every workspace member, keyed by user ID
    pub async fn find_all(&self) -> Result<HashMap<String, User>> {
        let api = &self.api;
        let users = walk_cursor(&self.policy, |cursor| api.list_users(cursor))
            .await
            .into_result()?;

        Ok(users.into_iter().map(|u| (u.id.clone(), u)).collect())
    }

    /// Case-insensitive match on handle, display name or real name
    pub async fn find_by_name(&self, name: &str) -> Result<User> {
        let name = name.trim_start_matches('@');
        let mut users: Vec<User> = self.find_all().await?.into_values().collect();
        users.sort_by(|a, b| a.id.cmp(&b.id));

        users
            .into_iter()
            .find(|u| u.matches_name(name))
            .ok_or_else(|| AppError::UserNotFound(name.to_string()))
    }

    /// Resolve `ids` to users. IDs that cannot be resolved map to a user
    /// carrying only the ID.
    pub async fn find_by_ids(&self, ids: &[String]) -> Result<HashMap<String, User>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        match self.find_all().await {
            Ok(mut all) => Ok(ids
                .iter()
                .map(|id| {
                    let user = all.remove(id).unwrap_or_else(|| User::unresolved(id));
                    (id.clone(), user)
                })
                .collect()),
            Err(e) => {
                warn!("users.list failed, looking up {} users one by one: {}", ids.len(), e);
                Ok(self.find_each(ids).await)
            }
        }
    }

    /// One `users.info` call per ID, at most `max_concurrency` in flight.
    /// Each lookup yields its own entry; the map is built once all are done.
    async fn find_each(&self, ids: &[String]) -> HashMap<String, User> {
        let users: Vec<(String, User)> = stream::iter(ids.iter().cloned())
            .map(|id| async move {
                let api = &self.api;
                let user = match self.policy.call(|| api.user_info(&id)).await {
                    Ok(user) => user,
                    Err(e) => {
                        debug!("users.info failed for {}: {}", id, e);
                        User::unresolved(&id)
                    }
                };
                (id, user)
            })
            .buffer_unordered(self.max_concurrency.max(1))
            .collect()
            .await;

        info!("resolved {} users individually", users.len());
        users.into_iter().collect()
    }
}
