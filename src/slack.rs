use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::RETRY_AFTER;
use serde::Serialize;
use serde_json::Value;
use slack_morphism::errors::SlackClientError;
use slack_morphism::prelude::*;
use tracing::debug;
use url::Url;

use crate::api::{HistoryQuery, Page, RepliesQuery, SearchPage, SlackApi};
use crate::domain::{Channel, User};
use crate::fetcher::parse_retry_after;
use crate::{AppError, Result};

const PAGE_LIMIT: u16 = 200;
const SEARCH_URL: &str = "https://slack.com/api/search.messages";
const SEARCH_PAGE_SIZE: u32 = 100;

/// [`SlackApi`] backed by the Slack Web API.
///
/// Conversation and user endpoints go through `slack-morphism` sessions.
/// `search.messages` needs a user token and is called directly over HTTP.
pub struct SlackApiClient {
    client: SlackClient<SlackClientHyperHttpsConnector>,
    token: SlackApiToken,
    http: reqwest::Client,
    bearer: String,
}

impl SlackApiClient {
    pub fn new(token: &str) -> Result<Self> {
        let connector =
            SlackClientHyperConnector::new().map_err(|e| AppError::SlackApi(e.to_string()))?;

        Ok(Self {
            client: SlackClient::new(connector),
            token: SlackApiToken::new(SlackApiTokenValue(token.to_string())),
            http: reqwest::Client::new(),
            bearer: token.to_string(),
        })
    }
}

#[async_trait]
impl SlackApi for SlackApiClient {
    async fn list_channels(&self, cursor: Option<String>) -> Result<Page<Channel>> {
        let session = self.client.open_session(&self.token);
        let request = SlackApiConversationsListRequest::new()
            .with_limit(PAGE_LIMIT)
            .with_exclude_archived(true)
            .with_types(vec![
                SlackConversationType::Public,
                SlackConversationType::Private,
            ])
            .opt_cursor(cursor.map(SlackCursorId));

        let response = session
            .conversations_list(&request)
            .await
            .map_err(|e| slack_error(e, ""))?;

        let channels = response
            .channels
            .into_iter()
            .map(|channel| Channel {
                id: channel.id.0,
                name: channel.name.unwrap_or_default(),
            })
            .collect();

        Ok(Page {
            items: channels,
            next_cursor: next_cursor(response.response_metadata),
        })
    }

    async fn conversation_history(
        &self,
        query: &HistoryQuery,
        cursor: Option<String>,
    ) -> Result<Page<Value>> {
        let session = self.client.open_session(&self.token);
        let request = SlackApiConversationsHistoryRequest::new()
            .with_channel(SlackChannelId(query.channel_id.clone()))
            .opt_oldest(query.oldest.clone().map(SlackTs))
            .opt_latest(query.latest.clone().map(SlackTs))
            .with_limit(PAGE_LIMIT)
            .opt_cursor(cursor.map(SlackCursorId));

        let response = session
            .conversations_history(&request)
            .await
            .map_err(|e| slack_error(e, &query.channel_id))?;

        Ok(Page {
            items: to_values(&response.messages)?,
            next_cursor: next_cursor(response.response_metadata),
        })
    }

    async fn conversation_replies(
        &self,
        query: &RepliesQuery,
        cursor: Option<String>,
    ) -> Result<Page<Value>> {
        let session = self.client.open_session(&self.token);
        let request = SlackApiConversationsRepliesRequest::new(
            SlackChannelId(query.channel_id.clone()),
            SlackTs(query.thread_ts.clone()),
        )
        .opt_oldest(query.oldest.clone().map(SlackTs))
        .opt_latest(query.latest.clone().map(SlackTs))
        .with_limit(PAGE_LIMIT)
        .opt_cursor(cursor.map(SlackCursorId));

        let response = session
            .conversations_replies(&request)
            .await
            .map_err(|e| slack_error(e, &query.channel_id))?;

        Ok(Page {
            items: to_values(&response.messages)?,
            next_cursor: next_cursor(response.response_metadata),
        })
    }

    async fn list_users(&self, cursor: Option<String>) -> Result<Page<User>> {
        let session = self.client.open_session(&self.token);
        let request = SlackApiUsersListRequest::new()
            .with_limit(PAGE_LIMIT)
            .opt_cursor(cursor.map(SlackCursorId));

        let response = session
            .users_list(&request)
            .await
            .map_err(|e| slack_error(e, ""))?;

        let users = to_values(&response.members)?
            .iter()
            .filter_map(user_from_value)
            .collect();

        Ok(Page {
            items: users,
            next_cursor: next_cursor(response.response_metadata),
        })
    }

    async fn user_info(&self, user_id: &str) -> Result<User> {
        let session = self.client.open_session(&self.token);
        let request = SlackApiUsersInfoRequest::new(SlackUserId(user_id.to_string()));

        let response = session
            .users_info(&request)
            .await
            .map_err(|e| slack_error(e, ""))?;

        let value =
            serde_json::to_value(&response.user).map_err(|e| AppError::SlackApi(e.to_string()))?;
        Ok(user_from_value(&value).unwrap_or_else(|| User::unresolved(user_id)))
    }

    async fn search_messages(&self, query: &str, page: u32) -> Result<SearchPage> {
        let url = Url::parse_with_params(
            SEARCH_URL,
            &[
                ("query", query.to_string()),
                ("count", SEARCH_PAGE_SIZE.to_string()),
                ("page", page.to_string()),
            ],
        )
        .map_err(|e| AppError::Http(e.to_string()))?;

        debug!("search.messages page {}", page);
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.bearer)
            .send()
            .await
            .map_err(|e| AppError::Http(e.to_string()))?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(0);
            return Err(AppError::SlackRateLimit { retry_after_secs });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AppError::Http(e.to_string()))?;

        parse_search_response(&body)
    }
}

fn next_cursor(meta: Option<SlackResponseMetadata>) -> Option<String> {
    meta.and_then(|m| m.next_cursor)
        .map(|cursor| cursor.0)
        .filter(|cursor| !cursor.is_empty())
}

fn to_values<T: Serialize>(records: &[T]) -> Result<Vec<Value>> {
    records
        .iter()
        .map(serde_json::to_value)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| AppError::SlackApi(e.to_string()))
}

/// Map a `slack-morphism` failure onto the error kinds the retry and skip
/// logic distinguish.
fn slack_error(err: SlackClientError, channel_id: &str) -> AppError {
    match err {
        SlackClientError::RateLimitError(e) => AppError::SlackRateLimit {
            retry_after_secs: e.retry_after.map(|d| d.as_secs()).unwrap_or(0),
        },
        SlackClientError::ApiError(e) => api_error(&e.code, channel_id),
        other => {
            let text = other.to_string();
            if text.contains("rate limit") || text.contains("ratelimited") {
                AppError::SlackRateLimit {
                    retry_after_secs: parse_retry_after(&text),
                }
            } else {
                AppError::SlackApi(text)
            }
        }
    }
}

/// Error for an `ok: false` response carrying `code`
fn api_error(code: &str, channel_id: &str) -> AppError {
    match code {
        "not_in_channel" => AppError::NotInChannel {
            channel_id: channel_id.to_string(),
        },
        "ratelimited" => AppError::SlackRateLimit { retry_after_secs: 0 },
        _ => AppError::SlackApi(code.to_string()),
    }
}

fn parse_search_response(body: &Value) -> Result<SearchPage> {
    if !body.get("ok").and_then(|ok| ok.as_bool()).unwrap_or(false) {
        let code = body
            .get("error")
            .and_then(|e| e.as_str())
            .unwrap_or("unknown_error");
        return Err(match code {
            "ratelimited" => AppError::SlackRateLimit { retry_after_secs: 0 },
            _ => AppError::SearchUnavailable(code.to_string()),
        });
    }

    let messages = body.get("messages");
    let matches = messages
        .and_then(|m| m.get("matches"))
        .and_then(|m| m.as_array())
        .cloned()
        .unwrap_or_default();
    let pages = messages
        .and_then(|m| m.get("paging"))
        .and_then(|p| p.get("pages"))
        .and_then(|p| p.as_u64())
        .map(|p| p as u32)
        .unwrap_or(1);

    Ok(SearchPage { matches, pages })
}

/// Read a Slack user object. Names may sit at the top level or in `profile`.
fn user_from_value(value: &Value) -> Option<User> {
    let id = value.get("id")?.as_str()?.to_string();
    let profile = value.get("profile");
    let field = |v: Option<&Value>, key: &str| {
        v.and_then(|v| v.get(key))
            .and_then(|s| s.as_str())
            .unwrap_or_default()
            .to_string()
    };

    let mut real_name = field(Some(value), "real_name");
    if real_name.is_empty() {
        real_name = field(profile, "real_name");
    }

    Some(User {
        name: field(Some(value), "name"),
        display_name: field(profile, "display_name"),
        real_name,
        id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_api_error_not_in_channel() {
        let err = api_error("not_in_channel", "C42");

        assert!(matches!(err, AppError::NotInChannel { ref channel_id } if channel_id == "C42"));
        assert!(err.to_string().contains("join the channel"));
    }

    #[test]
    fn test_api_error_ratelimited() {
        assert!(api_error("ratelimited", "").is_rate_limit());
    }

    #[test]
    fn test_api_error_other() {
        assert!(matches!(api_error("channel_not_found", "C1"), AppError::SlackApi(code) if code == "channel_not_found"));
    }

    #[test]
    fn test_parse_search_response() {
        let body = json!({
            "ok": true,
            "messages": {
                "matches": [
                    {"ts": "1705312800.000100", "user": "U1", "channel": {"id": "C1"}},
                    {"ts": "1705312900.000100", "user": "U1", "channel": {"id": "C2"}}
                ],
                "paging": {"count": 100, "total": 2, "page": 1, "pages": 3}
            }
        });

        let page = parse_search_response(&body).unwrap();

        assert_eq!(page.matches.len(), 2);
        assert_eq!(page.pages, 3);
    }

    #[test]
    fn test_parse_search_response_without_matches() {
        let body = json!({"ok": true, "messages": {"matches": []}});

        let page = parse_search_response(&body).unwrap();

        assert!(page.matches.is_empty());
        assert_eq!(page.pages, 1);
    }

    #[test]
    fn test_parse_search_response_error() {
        let body = json!({"ok": false, "error": "not_allowed_token_type"});

        let result = parse_search_response(&body);

        assert!(matches!(result, Err(AppError::SearchUnavailable(code)) if code == "not_allowed_token_type"));
    }

    #[test]
    fn test_parse_search_response_ratelimited() {
        let body = json!({"ok": false, "error": "ratelimited"});

        assert!(parse_search_response(&body).unwrap_err().is_rate_limit());
    }

    #[test]
    fn test_user_from_value() {
        let value = json!({
            "id": "U1",
            "name": "jdoe",
            "real_name": "Jane Doe",
            "profile": {"display_name": "Jane", "real_name": "Jane Profile"}
        });

        let user = user_from_value(&value).unwrap();

        assert_eq!(user.id, "U1");
        assert_eq!(user.name, "jdoe");
        assert_eq!(user.display_name, "Jane");
        assert_eq!(user.real_name, "Jane Doe");
    }

    #[test]
    fn test_user_from_value_profile_only() {
        let value = json!({"id": "U2", "profile": {"real_name": "Bob"}});

        let user = user_from_value(&value).unwrap();

        assert_eq!(user.display(), "Bob");
        assert!(user_from_value(&json!({"name": "no id"})).is_none());
    }

    #[test]
    fn test_next_cursor_empty_is_none() {
        assert_eq!(next_cursor(None), None);
    }
}
