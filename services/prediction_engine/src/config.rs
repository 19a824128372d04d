use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

use crate::batch::DEFAULT_CONTAINED_IN_LIMIT;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/bounty".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreConfig {
    pub contained_in_limit: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            contained_in_limit: DEFAULT_CONTAINED_IN_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedConfig {
    pub base_url: String,
    pub api_host: String,
    pub api_key: String,
    pub season: i32,
    pub request_timeout_secs: u64,
    pub requests_per_second: u32,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: "https://v3.football.api-sports.io".to_string(),
            api_host: "v3.football.api-sports.io".to_string(),
            api_key: String::new(),
            season: 2024,
            request_timeout_secs: 10,
            requests_per_second: 2,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PushConfig {
    /// Without a server, notifications are only logged.
    pub server_url: Option<String>,
    pub application_id: String,
    pub master_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduleConfig {
    pub fixture_ingestion_secs: u64,
    pub live_refresh_secs: u64,
    pub result_refresh_secs: u64,
    pub housekeeping_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            fixture_ingestion_secs: 24 * 60 * 60,
            live_refresh_secs: 60,
            result_refresh_secs: 5 * 60,
            housekeeping_secs: 24 * 60 * 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WebConfig {
    pub bind_addr: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineConfig {
    pub database: DatabaseConfig,
    pub store: StoreConfig,
    pub feed: FeedConfig,
    pub push: PushConfig,
    pub schedule: ScheduleConfig,
    pub web: WebConfig,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Layers the values returned by `lookup` over the defaults. Numbers that
    /// fail to parse leave the default in place.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("DATABASE_URL") {
            config.database.url = url;
        }
        set_parsed(&lookup, "DATABASE_MAX_CONNECTIONS", &mut config.database.max_connections);
        set_parsed(&lookup, "STORE_CONTAINED_IN_LIMIT", &mut config.store.contained_in_limit);

        if let Some(base_url) = lookup("FEED_BASE_URL") {
            config.feed.base_url = base_url.trim_end_matches('/').to_string();
        }
        if let Some(host) = lookup("FEED_API_HOST") {
            config.feed.api_host = host;
        }
        if let Some(key) = lookup("FEED_API_KEY") {
            config.feed.api_key = key;
        }
        set_parsed(&lookup, "FEED_SEASON", &mut config.feed.season);
        set_parsed(&lookup, "FEED_TIMEOUT_SECS", &mut config.feed.request_timeout_secs);
        set_parsed(&lookup, "FEED_RATE_LIMIT_RPS", &mut config.feed.requests_per_second);

        config.push.server_url = lookup("PUSH_SERVER_URL").filter(|url| !url.trim().is_empty());
        if let Some(app_id) = lookup("PUSH_APPLICATION_ID") {
            config.push.application_id = app_id;
        }
        if let Some(master_key) = lookup("PUSH_MASTER_KEY") {
            config.push.master_key = master_key;
        }

        set_parsed(&lookup, "SCHEDULE_INGESTION_SECS", &mut config.schedule.fixture_ingestion_secs);
        set_parsed(&lookup, "SCHEDULE_LIVE_SECS", &mut config.schedule.live_refresh_secs);
        set_parsed(&lookup, "SCHEDULE_RESULT_SECS", &mut config.schedule.result_refresh_secs);
        set_parsed(&lookup, "SCHEDULE_HOUSEKEEPING_SECS", &mut config.schedule.housekeeping_secs);

        if let Some(addr) = lookup("WEB_BIND_ADDR") {
            config.web.bind_addr = addr;
        }

        config
    }
}

fn set_parsed<F, T>(lookup: &F, key: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(value) = lookup(key).and_then(|raw| raw.trim().parse::<T>().ok()) {
        *target = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> EngineConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EngineConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.store.contained_in_limit, 20);
        assert_eq!(config.feed.season, 2024);
        assert_eq!(config.push.server_url, None);
        assert_eq!(config.schedule.live_refresh_secs, 60);
    }

    #[test]
    fn test_env_overrides() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://db/test"),
            ("STORE_CONTAINED_IN_LIMIT", "5"),
            ("FEED_BASE_URL", "http://localhost:1234/"),
            ("FEED_SEASON", "2025"),
            ("FEED_RATE_LIMIT_RPS", "10"),
            ("PUSH_SERVER_URL", "http://push.local/parse"),
            ("WEB_BIND_ADDR", "0.0.0.0:8080"),
        ]);
        assert_eq!(config.database.url, "postgres://db/test");
        assert_eq!(config.store.contained_in_limit, 5);
        assert_eq!(config.feed.base_url, "http://localhost:1234");
        assert_eq!(config.feed.season, 2025);
        assert_eq!(config.feed.requests_per_second, 10);
        assert_eq!(config.push.server_url.as_deref(), Some("http://push.local/parse"));
        assert_eq!(config.web.bind_addr, "0.0.0.0:8080");
    }

    #[test]
    fn test_unparseable_numbers_keep_defaults() {
        let config = config_from(&[
            ("DATABASE_MAX_CONNECTIONS", "many"),
            ("FEED_TIMEOUT_SECS", "-3"),
            ("PUSH_SERVER_URL", "  "),
        ]);
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.feed.request_timeout_secs, 10);
        assert_eq!(config.push.server_url, None);
    }
}
