use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "slack-reactions")]
#[command(about = "Reaction and activity statistics for Slack channels and users")]
pub struct Cli {
    /// Show debug logs, including rate-limit backoffs
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Rank emojis, reacted messages, threads and posters of a channel
    Channel {
        /// Channel name, with or without the leading '#'
        #[arg(short, long)]
        name: String,

        /// Start date (YYYY-MM-DD), unbounded when omitted
        #[arg(short, long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD), inclusive, unbounded when omitted
        #[arg(short, long)]
        end: Option<String>,
    },

    /// Summarize one user's messages across all channels
    User {
        /// Handle, display name or real name
        #[arg(short, long)]
        name: String,

        /// Start date (YYYY-MM-DD), unbounded when omitted
        #[arg(short, long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD), inclusive, unbounded when omitted
        #[arg(short, long)]
        end: Option<String>,
    },
}
