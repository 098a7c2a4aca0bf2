use crate::state::session::{MAX_PLAYERS_LIMIT, ROUND_SIZE_RANGE, TIMER_RANGE};
use crate::types::SessionSettings;
use std::ops::RangeInclusive;
use std::time::Duration;

/// Process-wide configuration, read once at startup
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP/WebSocket server binds to
    pub bind_addr: String,
    /// Endpoint returning the prompt list (None = built-in prompts)
    pub question_repository_url: Option<String>,
    /// Base URL of the optional semantic classifier
    pub semantic_matcher_url: Option<String>,
    /// Classifier confidence (0-100) required to pre-place an answer
    pub semantic_min_confidence: f64,
    /// Timeout for upstream HTTP calls
    pub upstream_timeout: Duration,
    /// Settings applied to newly created sessions
    pub default_settings: SessionSettings,
    /// A connection silent for longer than this is considered dead
    pub heartbeat_timeout: Duration,
    /// How long a dropped participant keeps its roster seat
    pub disconnect_grace: Duration,
    /// Duplicate host-operation suppression window
    pub dedup_window: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            question_repository_url: None,
            semantic_matcher_url: None,
            semantic_min_confidence: 75.0,
            upstream_timeout: Duration::from_secs(5),
            default_settings: SessionSettings::default(),
            heartbeat_timeout: Duration::from_secs(15),
            disconnect_grace: Duration::from_secs(30),
            dedup_window: Duration::from_millis(2000),
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|s| s.parse().ok())
}

/// Session setting from the environment; out-of-range values fall back to the default
fn env_setting(key: &str, range: RangeInclusive<u32>, default: u32) -> u32 {
    match env_parse::<u32>(key) {
        Some(value) if range.contains(&value) => value,
        Some(value) => {
            tracing::warn!(
                "{}={} is outside {}..={}, using {}",
                key,
                value,
                range.start(),
                range.end(),
                default
            );
            default
        }
        None => default,
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let fallback = defaults.default_settings;
        let default_settings = SessionSettings {
            timer_seconds: env_setting(
                "DEFAULT_TIMER_SECONDS",
                TIMER_RANGE,
                fallback.timer_seconds,
            ),
            max_players: env_setting(
                "DEFAULT_MAX_PLAYERS",
                0..=MAX_PLAYERS_LIMIT,
                fallback.max_players,
            ),
            round_size: env_setting("DEFAULT_ROUND_SIZE", ROUND_SIZE_RANGE, fallback.round_size),
        };

        Self {
            bind_addr: env_string("BIND_ADDR").unwrap_or(defaults.bind_addr),
            question_repository_url: env_string("QUESTION_REPOSITORY_URL"),
            semantic_matcher_url: env_string("SEMANTIC_MATCHER_URL"),
            semantic_min_confidence: env_parse("SEMANTIC_MIN_CONFIDENCE")
                .unwrap_or(defaults.semantic_min_confidence),
            upstream_timeout: env_parse("UPSTREAM_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.upstream_timeout),
            default_settings,
            heartbeat_timeout: env_parse("HEARTBEAT_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.heartbeat_timeout),
            disconnect_grace: env_parse("DISCONNECT_GRACE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.disconnect_grace),
            dedup_window: env_parse("DEDUP_WINDOW_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.dedup_window),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const KEYS: &[&str] = &[
        "BIND_ADDR",
        "QUESTION_REPOSITORY_URL",
        "SEMANTIC_MATCHER_URL",
        "DEFAULT_TIMER_SECONDS",
        "DEFAULT_ROUND_SIZE",
        "DEFAULT_MAX_PLAYERS",
        "DISCONNECT_GRACE_SECS",
    ];

    fn clear_env() {
        for key in KEYS {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_defaults_when_unset() {
        clear_env();
        let config = ServerConfig::from_env();
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert!(config.question_repository_url.is_none());
        assert_eq!(config.default_settings.timer_seconds, 180);
        assert_eq!(config.default_settings.round_size, 5);
        assert_eq!(config.default_settings.max_players, 0);
        assert_eq!(config.dedup_window, Duration::from_millis(2000));
    }

    #[test]
    #[serial]
    fn test_reads_and_trims_values() {
        clear_env();
        std::env::set_var("QUESTION_REPOSITORY_URL", "  http://questions.local/prompts  ");
        std::env::set_var("SEMANTIC_MATCHER_URL", "   ");
        std::env::set_var("DEFAULT_TIMER_SECONDS", "45");
        std::env::set_var("DEFAULT_ROUND_SIZE", "not-a-number");
        std::env::set_var("DISCONNECT_GRACE_SECS", "3");

        let config = ServerConfig::from_env();
        assert_eq!(
            config.question_repository_url.as_deref(),
            Some("http://questions.local/prompts")
        );
        assert!(config.semantic_matcher_url.is_none());
        assert_eq!(config.default_settings.timer_seconds, 45);
        assert_eq!(config.default_settings.round_size, 5);
        assert_eq!(config.disconnect_grace, Duration::from_secs(3));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_out_of_range_settings_use_defaults() {
        clear_env();
        std::env::set_var("DEFAULT_TIMER_SECONDS", "0");
        std::env::set_var("DEFAULT_ROUND_SIZE", "500");
        std::env::set_var("DEFAULT_MAX_PLAYERS", "1000000");

        let config = ServerConfig::from_env();
        assert_eq!(config.default_settings.timer_seconds, 180);
        assert_eq!(config.default_settings.round_size, 5);
        assert_eq!(config.default_settings.max_players, 0);

        clear_env();
    }
}
