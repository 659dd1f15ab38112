use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

use crate::common::IntentId;
use crate::kernel::RunnerConfig;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    /// Enables the `web_search` channel when set.
    pub tavily_api_key: Option<String>,
    pub restate_identity_key: Option<String>,
    /// Kill switch for the discovery runner.
    pub runner_enabled: bool,
    pub channel_timeout_secs: u64,
    pub schedule: Option<ScheduleConfig>,
}

/// Recurring discovery run for one intent.
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    /// Six-field cron expression (seconds first).
    pub cron: String,
    pub intent_id: IntentId,
    pub dry_run: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let schedule = match env::var("DISCOVERY_SCHEDULE").ok().filter(|s| !s.trim().is_empty()) {
            Some(cron) => Some(ScheduleConfig {
                cron,
                intent_id: env::var("DISCOVERY_SCHEDULED_INTENT_ID")
                    .context("DISCOVERY_SCHEDULED_INTENT_ID must be set when DISCOVERY_SCHEDULE is")?
                    .parse()
                    .context("DISCOVERY_SCHEDULED_INTENT_ID must be a UUID")?,
                dry_run: parse_flag(env::var("DISCOVERY_SCHEDULED_DRY_RUN").ok(), false)
                    .context("DISCOVERY_SCHEDULED_DRY_RUN must be true or false")?,
            }),
            None => None,
        };

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "9080".to_string())
                .parse()
                .context("SERVER_PORT must be a valid number")?,
            tavily_api_key: env::var("TAVILY_API_KEY").ok().filter(|k| !k.is_empty()),
            restate_identity_key: env::var("RESTATE_IDENTITY_KEY").ok(),
            runner_enabled: parse_flag(env::var("DISCOVERY_RUNNER_ENABLED").ok(), true)
                .context("DISCOVERY_RUNNER_ENABLED must be true or false")?,
            channel_timeout_secs: env::var("DISCOVERY_CHANNEL_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("DISCOVERY_CHANNEL_TIMEOUT_SECS must be a whole number of seconds")?,
            schedule,
        })
    }

    pub fn runner(&self) -> RunnerConfig {
        RunnerConfig {
            enabled: self.runner_enabled,
            channel_timeout: Duration::from_secs(self.channel_timeout_secs.max(1)),
        }
    }
}

/// `true`/`false`/`1`/`0`, case-insensitive. Unset or empty means `default`.
fn parse_flag(value: Option<String>, default: bool) -> Result<bool> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(default),
        Some(v) if v.eq_ignore_ascii_case("true") || v == "1" => Ok(true),
        Some(v) if v.eq_ignore_ascii_case("false") || v == "0" => Ok(false),
        Some(v) => anyhow::bail!("invalid flag value {:?}", v),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_fall_back_to_default_when_unset() {
        assert!(parse_flag(None, true).unwrap());
        assert!(!parse_flag(Some(String::new()), false).unwrap());
    }

    #[test]
    fn flags_accept_common_spellings() {
        assert!(parse_flag(Some("TRUE".to_string()), false).unwrap());
        assert!(parse_flag(Some("1".to_string()), false).unwrap());
        assert!(!parse_flag(Some(" false ".to_string()), true).unwrap());
        assert!(parse_flag(Some("yes please".to_string()), true).is_err());
    }
}
