use std::sync::Arc;

use tracing::info;

use crate::analyzer::Analyzer;
use crate::api::SlackApi;
use crate::directory::{ChannelDirectory, UserDirectory};
use crate::error::Result;
use crate::formatter::ReportFormatter;
use crate::settings::Settings;
use crate::slack::SlackApiClient;
use crate::{load_token, parse_range};

pub async fn run_channel(name: &str, start: Option<String>, end: Option<String>) -> Result<()> {
    let range = parse_range(start.as_deref(), end.as_deref())?;
    let token = load_token()?;
    let settings = Settings::load()?;
    let api = connect(&token)?;

    let channel = ChannelDirectory::new(api.clone(), settings.retry_policy())
        .find_by_name(name)
        .await?;
    info!("analyzing #{} ({})", channel.name, channel.id);

    let result = analyzer(api, &settings)
        .analyze_channel(&channel.id, &range)
        .await?;

    let formatter = ReportFormatter::new(settings.report.clone());
    println!("{}", formatter.channel_report(&channel.name, &result));
    Ok(())
}

pub async fn run_user(name: &str, start: Option<String>, end: Option<String>) -> Result<()> {
    let range = parse_range(start.as_deref(), end.as_deref())?;
    let token = load_token()?;
    let settings = Settings::load()?;
    let api = connect(&token)?;

    let result = analyzer(api, &settings).analyze_user(name, &range).await?;

    let formatter = ReportFormatter::new(settings.report.clone());
    println!("{}", formatter.user_report(&result));
    Ok(())
}

fn connect(token: &str) -> Result<Arc<dyn SlackApi>> {
    Ok(Arc::new(SlackApiClient::new(token)?))
}

fn analyzer(api: Arc<dyn SlackApi>, settings: &Settings) -> Analyzer {
    let policy = settings.retry_policy();
    let users = UserDirectory::new(api.clone(), policy)
        .with_max_concurrency(settings.lookup.max_concurrency);

    Analyzer::new(api, policy).with_users(users)
}
