use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};
use chrono::TimeDelta;

/// Ten years.
const MAX_ACCESS_TOKEN_TTL_HOURS: i64 = 87_600;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "secret",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub access_token_ttl: TimeDelta,
    pub top_posts_ttl: Duration,
    pub store_timeout: Duration,
    pub request_timeout: Duration,
    pub cache_sweep_secs: u64,
    /// Empty means any origin.
    pub cors_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let jwt_secret = lookup("AGORA_JWT_SECRET").unwrap_or_default();
        if jwt_secret.trim().is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("AGORA_JWT_SECRET is unset or still a placeholder; set it in your .env file and restart");
        }

        let ttl_hours: i64 = parse(&lookup, "AGORA_ACCESS_TOKEN_TTL_HOURS", 24)?;
        if !(1..=MAX_ACCESS_TOKEN_TTL_HOURS).contains(&ttl_hours) {
            bail!("AGORA_ACCESS_TOKEN_TTL_HOURS must be between 1 and {MAX_ACCESS_TOKEN_TTL_HOURS} hours");
        }
        let access_token_ttl = TimeDelta::try_hours(ttl_hours)
            .context("AGORA_ACCESS_TOKEN_TTL_HOURS is out of range")?;

        let cors_origins = var("AGORA_CORS_ORIGINS", "")
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(String::from)
            .collect();

        Ok(Self {
            host: var("AGORA_HOST", "0.0.0.0"),
            port: parse(&lookup, "AGORA_PORT", 8000)?,
            db_path: var("AGORA_DB_PATH", "agora.db").into(),
            jwt_secret,
            access_token_ttl,
            top_posts_ttl: Duration::from_secs(parse(&lookup, "AGORA_TOP_POSTS_TTL_SECS", 3600)?),
            store_timeout: Duration::from_secs(parse(&lookup, "AGORA_STORE_TIMEOUT_SECS", 3)?),
            request_timeout: Duration::from_secs(parse(&lookup, "AGORA_REQUEST_TIMEOUT_SECS", 30)?),
            cache_sweep_secs: parse(&lookup, "AGORA_CACHE_SWEEP_SECS", 60)?,
            cors_origins,
        })
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        _ => Ok(default),
    }
}
