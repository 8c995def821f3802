//! Service configuration from environment variables.

use anyhow::{anyhow, Context, Result};
use std::env;
use std::path::PathBuf;

const DEFAULT_SPORTS_API_BASE_URL: &str = "https://api.the-odds-api.com";

#[derive(Clone, Debug)]
pub struct Config {
    pub sports_api_key: String,
    pub sports_api_base_url: String,
    pub data_dir: PathBuf,
    /// Archive to Postgres when set, otherwise to JSON files
    pub database_url: Option<String>,
    /// Bearer token for worker and scheduler routes; open when unset
    pub worker_token: Option<String>,
    pub http_port: u16,
    pub scheduler_enabled: bool,
    pub tick_interval_seconds: u64,
    pub selection_max_age_hours: i64,
    pub max_matches_per_cycle: usize,
    pub ticket_price: u64,
    pub raffle_payout_percent: u8,
    /// If true, run one scheduler tick and exit
    pub run_once: bool,
}

impl Config {
    /// Defaults for everything but the API key and data directory
    pub fn new(sports_api_key: impl Into<String>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            sports_api_key: sports_api_key.into(),
            sports_api_base_url: DEFAULT_SPORTS_API_BASE_URL.to_string(),
            data_dir: data_dir.into(),
            database_url: None,
            worker_token: None,
            http_port: 8080,
            scheduler_enabled: true,
            tick_interval_seconds: 60,
            selection_max_age_hours: 30,
            max_matches_per_cycle: 5,
            ticket_price: 10_000,
            raffle_payout_percent: 50,
            run_once: false,
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        // API key: env var first, then the mounted secret file
        let sports_api_key = match lookup("THE_ODDS_API_KEY") {
            Some(v) if !v.trim().is_empty() => v.trim().to_string(),
            Some(_) => return Err(anyhow!("THE_ODDS_API_KEY is set but empty")),
            None => read_secret_file("/run/secrets/odds_api_key", "odds_api_key")?,
        };

        // Prevent accidental use of sample/placeholder keys
        let key_lower = sports_api_key.to_lowercase();
        if key_lower.contains("change_me") || key_lower.contains("your_") || key_lower.starts_with("sample") {
            return Err(anyhow!(
                "THE_ODDS_API_KEY appears to be a placeholder value; replace with your real key"
            ));
        }

        let data_dir = lookup("DATA_DIR")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "./data".to_string());

        let mut config = Self::new(sports_api_key, data_dir);
        let defaults = config.clone();

        if let Some(url) = non_empty(lookup("SPORTS_API_BASE_URL")) {
            config.sports_api_base_url = url;
        }
        config.database_url = non_empty(lookup("DATABASE_URL"));
        config.worker_token = non_empty(lookup("WORKER_TOKEN"));

        config.http_port = parse_or(lookup("HTTP_PORT"), defaults.http_port);
        config.scheduler_enabled = flag_or(lookup("SCHEDULER_ENABLED"), defaults.scheduler_enabled);
        config.tick_interval_seconds =
            parse_or(lookup("SCHEDULER_TICK_SECONDS"), defaults.tick_interval_seconds).max(1);
        config.selection_max_age_hours =
            parse_or(lookup("SELECTION_MAX_AGE_HOURS"), defaults.selection_max_age_hours);
        config.max_matches_per_cycle =
            parse_or(lookup("MAX_MATCHES_PER_CYCLE"), defaults.max_matches_per_cycle);
        config.ticket_price = parse_or(lookup("TICKET_PRICE"), defaults.ticket_price);
        // Parsed wide so that e.g. 300 is rejected below rather than defaulted
        let payout_percent: u64 =
            parse_or(lookup("RAFFLE_PAYOUT_PERCENT"), u64::from(defaults.raffle_payout_percent));
        config.run_once = flag_or(lookup("RUN_ONCE"), defaults.run_once);

        config.raffle_payout_percent = u8::try_from(payout_percent)
            .ok()
            .filter(|p| *p <= 100)
            .ok_or_else(|| anyhow!("RAFFLE_PAYOUT_PERCENT must be between 0 and 100, got {}", payout_percent))?;
        if config.selection_max_age_hours <= 0 {
            return Err(anyhow!("SELECTION_MAX_AGE_HOURS must be positive"));
        }
        if chrono::Duration::try_hours(config.selection_max_age_hours).is_none() {
            return Err(anyhow!(
                "SELECTION_MAX_AGE_HOURS is too large, got {}",
                config.selection_max_age_hours
            ));
        }
        if config.max_matches_per_cycle == 0 {
            return Err(anyhow!("MAX_MATCHES_PER_CYCLE must be at least 1"));
        }

        Ok(config)
    }
}

/// Read a secret from a Docker secret file
fn read_secret_file(file_path: &str, secret_name: &str) -> Result<String> {
    std::fs::read_to_string(file_path)
        .map(|s| s.trim().to_string())
        .context(format!(
            "Secret {} not found in env or at {}",
            secret_name, file_path
        ))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn flag_or(value: Option<String>, default: bool) -> bool {
    match value.map(|v| v.trim().to_lowercase()) {
        Some(v) if v == "true" || v == "1" => true,
        Some(v) if v == "false" || v == "0" => false,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset_or_unparsable() {
        let config = Config::from_lookup(lookup(&[
            ("THE_ODDS_API_KEY", "abc123"),
            ("HTTP_PORT", "not-a-port"),
            ("WORKER_TOKEN", "  "),
        ]))
        .unwrap();

        assert_eq!(config.sports_api_key, "abc123");
        assert_eq!(config.http_port, 8080);
        assert_eq!(config.worker_token, None);
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.selection_max_age_hours, 30);
        assert!(config.scheduler_enabled);
        assert!(!config.run_once);
    }

    #[test]
    fn overrides_are_read() {
        let config = Config::from_lookup(lookup(&[
            ("THE_ODDS_API_KEY", "abc123"),
            ("DATA_DIR", "/var/lib/predictions"),
            ("DATABASE_URL", "postgres://localhost/archive"),
            ("SCHEDULER_ENABLED", "false"),
            ("SCHEDULER_TICK_SECONDS", "0"),
            ("TICKET_PRICE", "25000"),
            ("RAFFLE_PAYOUT_PERCENT", "70"),
            ("RUN_ONCE", "TRUE"),
        ]))
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/var/lib/predictions"));
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/archive"));
        assert!(!config.scheduler_enabled);
        assert_eq!(config.tick_interval_seconds, 1);
        assert_eq!(config.ticket_price, 25_000);
        assert_eq!(config.raffle_payout_percent, 70);
        assert!(config.run_once);
    }

    #[test]
    fn rejects_placeholder_key_and_bad_payout() {
        assert!(Config::from_lookup(lookup(&[("THE_ODDS_API_KEY", "your_key_here")])).is_err());
        assert!(Config::from_lookup(lookup(&[("THE_ODDS_API_KEY", " ")])).is_err());
        assert!(Config::from_lookup(lookup(&[
            ("THE_ODDS_API_KEY", "abc123"),
            ("RAFFLE_PAYOUT_PERCENT", "120"),
        ]))
        .is_err());
        // Beyond u8 range must not fall back to the default
        assert!(Config::from_lookup(lookup(&[
            ("THE_ODDS_API_KEY", "abc123"),
            ("RAFFLE_PAYOUT_PERCENT", "300"),
        ]))
        .is_err());

        let config = Config::from_lookup(lookup(&[
            ("THE_ODDS_API_KEY", "abc123"),
            ("RAFFLE_PAYOUT_PERCENT", "100"),
        ]))
        .unwrap();
        assert_eq!(config.raffle_payout_percent, 100);
    }

    #[test]
    fn rejects_max_age_beyond_duration_range() {
        let err = Config::from_lookup(lookup(&[
            ("THE_ODDS_API_KEY", "abc123"),
            ("SELECTION_MAX_AGE_HOURS", "9223372036854775807"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("SELECTION_MAX_AGE_HOURS"));

        let config = Config::from_lookup(lookup(&[
            ("THE_ODDS_API_KEY", "abc123"),
            ("SELECTION_MAX_AGE_HOURS", "87600"),
        ]))
        .unwrap();
        assert_eq!(config.selection_max_age_hours, 87_600);
    }
}
