use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("SLACK_USER_TOKEN environment variable not set")]
    MissingToken,

    #[error("invalid date format: {0}")]
    InvalidDate(String),

    #[error("invalid date range: start {start} is after end {end}")]
    InvalidDateRange { start: String, end: String },

    #[error("Slack API error: {0}")]
    SlackApi(String),

    #[error("Slack rate limit error: retry after {retry_after_secs}s")]
    SlackRateLimit { retry_after_secs: u64 },

    #[error(
        "not a member of channel '{channel_id}'; join the channel in Slack and run the command again"
    )]
    NotInChannel { channel_id: String },

    #[error("Slack search unavailable: {0}")]
    SearchUnavailable(String),

    #[error("channel '{0}' not found")]
    ChannelNotFound(String),

    #[error("user '{0}' not found")]
    UserNotFound(String),

    #[error("failed to fetch messages from channel '{channel_id}': {source}")]
    MessageFetch {
        channel_id: String,
        #[source]
        source: Box<AppError>,
    },

    #[error("failed to read file at {path}: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("TOML parse error: {0}")]
    TomlParse(String),

    #[error("HTTP error: {0}")]
    Http(String),
}

impl AppError {
    /// True for a rate-limit signal, including one wrapped by a fetch error.
    pub fn is_rate_limit(&self) -> bool {
        match self {
            AppError::SlackRateLimit { .. } => true,
            AppError::MessageFetch { source, .. } => source.is_rate_limit(),
            _ => false,
        }
    }

    pub fn is_not_in_channel(&self) -> bool {
        match self {
            AppError::NotInChannel { .. } => true,
            AppError::MessageFetch { source, .. } => source.is_not_in_channel(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
