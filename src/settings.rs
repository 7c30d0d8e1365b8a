use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::directory::DEFAULT_LOOKUP_CONCURRENCY;
use crate::fetcher::RetryPolicy;
use crate::{AppError, Result};

const SETTINGS_FILE: &str = "settings.toml";

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub lookup: LookupSettings,
    #[serde(default)]
    pub report: ReportSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_secs: u64,
    pub step_delay_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            base_delay_secs: policy.base_delay.as_secs(),
            step_delay_secs: policy.step_delay.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LookupSettings {
    /// Concurrent `users.info` requests when the user listing is unavailable
    pub max_concurrency: usize,
}

impl Default for LookupSettings {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_LOOKUP_CONCURRENCY,
        }
    }
}

/// Length of each ranked list in the reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ReportSettings {
    pub top_emojis: usize,
    pub top_messages: usize,
    pub top_threads: usize,
    pub top_users: usize,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            top_emojis: 3,
            top_messages: 3,
            top_threads: 3,
            top_users: 10,
        }
    }
}

impl Settings {
    /// Settings from `settings.toml` in the working directory, defaults when absent
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(SETTINGS_FILE))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| AppError::ReadFile {
            path: path.display().to_string(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| AppError::TomlParse(e.to_string()))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts.max(1),
            base_delay: Duration::from_secs(self.retry.base_delay_secs),
            step_delay: Duration::from_secs(self.retry.step_delay_secs),
        }
    }
}
