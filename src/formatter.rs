//! Plain-text rendering of analysis results as ranked top-N lists.

use crate::analyzer::{AnalysisResult, UserAnalysisResult};
use crate::domain::{EmojiCount, ThreadStats};
use crate::settings::ReportSettings;

/// Longest message text shown before it gets cut
pub const MAX_TEXT_LEN: usize = 100;
const ELLIPSIS: &str = "...";

pub struct ReportFormatter {
    limits: ReportSettings,
}

impl ReportFormatter {
    pub fn new(limits: ReportSettings) -> Self {
        Self { limits }
    }

    pub fn channel_report(&self, channel_name: &str, result: &AnalysisResult) -> String {
        let mut lines = vec![format!(
            "#{} ({} messages)",
            channel_name, result.total_messages
        )];

        lines.push(String::new());
        lines.push(heading(&format!("top {} emojis", self.limits.top_emojis)));
        lines.extend(emoji_lines(&result.emoji_stats, self.limits.top_emojis));

        lines.push(String::new());
        lines.push(heading(&format!(
            "top {} reacted messages",
            self.limits.top_messages
        )));
        let messages = ranked(
            result.message_stats.iter().map(|m| {
                format!(
                    "{}\n   reactions: {} ({})",
                    truncate_text(&m.text, MAX_TEXT_LEN),
                    m.reactions,
                    m.timestamp
                )
            }),
            self.limits.top_messages,
        );
        lines.extend(messages);

        lines.push(String::new());
        lines.push(heading(&format!("top {} threads", self.limits.top_threads)));
        lines.extend(thread_lines(&result.thread_stats, self.limits.top_threads));

        lines.push(String::new());
        lines.push(heading(&format!("top {} users", self.limits.top_users)));
        lines.extend(ranked(
            result
                .user_stats
                .iter()
                .map(|u| format!("{} - {} posts", u.user_name, u.count)),
            self.limits.top_users,
        ));

        lines.join("\n")
    }

    pub fn user_report(&self, result: &UserAnalysisResult) -> String {
        let mut lines = vec![
            format!("@{} ({})", result.user_name, result.user_id),
            format!("messages: {}", result.total_messages),
            format!("reactions received: {}", result.total_reactions),
        ];

        lines.push(String::new());
        lines.push(heading(&format!("top {} reactions", self.limits.top_emojis)));
        lines.extend(emoji_lines(&result.reaction_ranking, self.limits.top_emojis));

        lines.push(String::new());
        lines.push(heading(&format!("top {} threads", self.limits.top_threads)));
        lines.extend(thread_lines(&result.thread_stats, self.limits.top_threads));

        lines.join("\n")
    }
}

fn heading(title: &str) -> String {
    format!("===== {} =====", title)
}

/// Number the first `limit` entries starting at 1
fn ranked(entries: impl Iterator<Item = String>, limit: usize) -> Vec<String> {
    let lines: Vec<String> = entries
        .take(limit)
        .enumerate()
        .map(|(i, entry)| format!("{}. {}", i + 1, entry))
        .collect();

    if lines.is_empty() {
        vec!["(none)".to_string()]
    } else {
        lines
    }
}

fn emoji_lines(stats: &[EmojiCount], limit: usize) -> Vec<String> {
    ranked(
        stats
            .iter()
            .map(|e| format!("{} - {}", render_emoji(&e.emoji), e.count)),
        limit,
    )
}

fn thread_lines(stats: &[ThreadStats], limit: usize) -> Vec<String> {
    ranked(
        stats.iter().map(|t| {
            format!(
                "{}\n   replies: {} ({})",
                truncate_text(&t.text, MAX_TEXT_LEN),
                t.reply_count,
                t.timestamp
            )
        }),
        limit,
    )
}

/// Cut `text` to `max` characters, ending in "..." when cut
pub fn truncate_text(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(ELLIPSIS.len());
    let mut cut: String = text.chars().take(keep).collect();
    cut.push_str(ELLIPSIS);
    cut
}

/// Reaction name with its glyph in front when it is a standard emoji.
///
/// Custom workspace emojis have no glyph and render as `:name:` only.
pub fn render_emoji(name: &str) -> String {
    let shortcode = format!(":{}:", name);
    let mut parts = name.split("::skin-tone-");
    let Some(emoji) = parts.next().and_then(emojis::get_by_shortcode) else {
        return shortcode;
    };

    let skinned = parts
        .next()
        .and_then(|tone| tone.parse::<usize>().ok())
        .and_then(|tone| emoji.skin_tones()?.nth(tone.checked_sub(1)?));

    match skinned {
        Some(skinned) => format!("{} {}", skinned, shortcode),
        None => format!("{} {}", emoji, shortcode),
    }
}
