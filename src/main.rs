use clap::Parser;
use slack_reactions::{Cli, Commands};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("slack_reactions=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("slack_reactions=info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // rustls needs a process-wide crypto provider before any TLS client is built
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let result = match cli.command {
        Commands::Channel { name, start, end } => slack_reactions::run_channel(&name, start, end).await,
        Commands::User { name, start, end } => slack_reactions::run_user(&name, start, end).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
