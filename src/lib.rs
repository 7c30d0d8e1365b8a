use chrono::NaiveDate;

pub mod aggregate;
pub mod analyzer;
pub mod api;
pub mod cli;
pub mod collector;
pub mod commands;
pub mod directory;
pub mod domain;
pub mod error;
pub mod fetcher;
pub mod formatter;
pub mod pager;
pub mod settings;
pub mod slack;
pub mod threads;

#[cfg(test)]
mod fake;

pub use cli::{Cli, Commands};
pub use commands::{run_channel, run_user};
pub use domain::DateRange;
pub use error::{AppError, Result};

/// Slack user token; `search.messages` rejects bot tokens.
pub fn load_token() -> Result<String> {
    std::env::var("SLACK_USER_TOKEN")
        .or_else(|_| std::env::var("SLACK_TOKEN"))
        .ok()
        .filter(|token| !token.is_empty())
        .ok_or(AppError::MissingToken)
}

pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| AppError::InvalidDate(s.to_string()))
}

/// Whole-day range from optional `YYYY-MM-DD` bounds
pub fn parse_range(start: Option<&str>, end: Option<&str>) -> Result<DateRange> {
    let start = start.map(parse_date).transpose()?;
    let end = end.map(parse_date).transpose()?;
    DateRange::from_dates(start, end)
}
