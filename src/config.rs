use std::env;
use std::str::FromStr;
use std::time::Duration;
use anyhow::{Context, Result};

use crate::models::subscription::PlanName;

/// Message limits per subscription plan.
#[derive(Clone, Debug)]
pub struct PlanTable {
    /// Monthly message limit of the starter plan.
    pub starter: i64,
    /// Monthly message limit of the professional plan.
    pub professional: i64,
    /// Monthly message limit of the enterprise plan.
    pub enterprise: i64,
}

impl PlanTable {
    /// Returns the message limit for a plan.
    pub fn message_limit(&self, plan: PlanName) -> i64 {
        match plan {
            PlanName::Starter => self.starter,
            PlanName::Professional => self.professional,
            PlanName::Enterprise => self.enterprise,
        }
    }
}

impl Default for PlanTable {
    fn default() -> Self {
        Self {
            starter: 1_000,
            professional: 5_000,
            enterprise: 20_000,
        }
    }
}

/// Settings for the upstream AI responder.
#[derive(Clone, Debug)]
pub struct AiConfig {
    /// Messages-style endpoint the responder posts to.
    pub api_url: String,
    /// Provider key. `None` leaves the responder unconfigured.
    pub api_key: Option<String>,
    /// Model identifier sent with every request.
    pub model: String,
    /// Upper bound on generated tokens per reply.
    pub max_tokens: u32,
    /// Hard deadline for a single reply.
    pub timeout: Duration,
}

/// The application's configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// The URL of the PostgreSQL database.
    pub database_url: String,
    /// The URL of the Redis server.
    pub redis_url: String,
    /// Address the HTTP server binds to.
    pub bind_addr: String,
    /// Public base URL baked into the served widget script.
    pub api_base_url: String,
    /// AI responder settings.
    pub ai: AiConfig,
    /// How many prior messages are sent to the responder.
    pub chat_history_limit: i64,
    /// Widget API requests allowed per IP per minute.
    pub widget_burst_per_minute: i64,
    /// Length of the trial granted to lazily provisioned subscriptions.
    pub trial_days: i64,
    /// Message limits per plan.
    pub plans: PlanTable,
}

impl Config {
    /// Builds a configuration with every optional setting at its default.
    pub fn defaults(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            redis_url: "redis://127.0.0.1:6379".to_string(),
            bind_addr: "127.0.0.1:3000".to_string(),
            api_base_url: "http://localhost:3000".to_string(),
            ai: AiConfig {
                api_url: "https://api.anthropic.com/v1/messages".to_string(),
                api_key: None,
                model: "claude-3-haiku-20240307".to_string(),
                max_tokens: 1024,
                timeout: Duration::from_secs(30),
            },
            chat_history_limit: 20,
            widget_burst_per_minute: 60,
            trial_days: 14,
            plans: PlanTable::default(),
        }
    }

    /// Creates a new `Config` from environment variables.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::defaults(
            env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
        );

        if let Ok(url) = env::var("REDIS_URL") {
            config.redis_url = url;
        }
        if let Ok(addr) = env::var("BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(url) = env::var("API_BASE_URL") {
            config.api_base_url = url.trim_end_matches('/').to_string();
        }
        if let Ok(url) = env::var("AI_API_URL") {
            config.ai.api_url = url;
        }
        config.ai.api_key = env::var("AI_API_KEY").ok().filter(|key| !key.trim().is_empty());
        if let Ok(model) = env::var("AI_MODEL") {
            config.ai.model = model;
        }

        config.ai.max_tokens = parse_var("AI_MAX_TOKENS", config.ai.max_tokens)?;
        config.ai.timeout = Duration::from_secs(parse_var("AI_TIMEOUT_SECS", 30u64)?);
        config.chat_history_limit = parse_var("CHAT_HISTORY_LIMIT", config.chat_history_limit)?;
        config.widget_burst_per_minute =
            parse_var("WIDGET_BURST_PER_MINUTE", config.widget_burst_per_minute)?;
        config.trial_days = parse_var("TRIAL_DAYS", config.trial_days)?;
        config.plans = PlanTable {
            starter: parse_var("PLAN_STARTER_LIMIT", config.plans.starter)?,
            professional: parse_var("PLAN_PROFESSIONAL_LIMIT", config.plans.professional)?,
            enterprise: parse_var("PLAN_ENTERPRISE_LIMIT", config.plans.enterprise)?,
        };

        if config.chat_history_limit < 0 {
            anyhow::bail!("CHAT_HISTORY_LIMIT must not be negative");
        }
        check_trial_days(config.trial_days)?;

        Ok(config)
    }
}

/// Longest trial a lazily provisioned subscription may get.
pub const MAX_TRIAL_DAYS: i64 = 3_650;

fn check_trial_days(days: i64) -> Result<()> {
    if !(0..=MAX_TRIAL_DAYS).contains(&days) {
        anyhow::bail!("TRIAL_DAYS must be between 0 and {}", MAX_TRIAL_DAYS);
    }
    Ok(())
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}", name)),
        Err(_) => Ok(default),
    }
}
