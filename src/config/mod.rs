//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::game::MatchRules;
use crate::pose::MoveThresholds;
use crate::util::rate_limit::DEFAULT_INPUT_RATE_LIMIT;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS; empty means any
    pub client_origins: Vec<String>,

    /// Round structure for new matches
    pub match_rules: MatchRules,
    /// Classifier reporting thresholds
    pub move_thresholds: MoveThresholds,
    /// Max WebSocket messages per second per connection
    pub input_rate_limit: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup (environment in production)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = match lookup("PORT") {
            Some(port) => format!("0.0.0.0:{}", port),
            None => lookup("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:8000".to_string()),
        };

        let defaults = MatchRules::default();
        let match_rules = MatchRules {
            max_rounds: parse_or(&lookup, "MAX_ROUNDS", defaults.max_rounds)?,
            round_duration_secs: parse_or(
                &lookup,
                "ROUND_DURATION_SECS",
                defaults.round_duration_secs,
            )?,
        };
        if match_rules.max_rounds == 0 {
            return Err(ConfigError::Invalid("MAX_ROUNDS"));
        }

        let move_threshold: f64 =
            parse_or(&lookup, "MOVE_THRESHOLD", crate::pose::classifier::DEFAULT_THRESHOLD)?;
        if !(0.0..=1.0).contains(&move_threshold) {
            return Err(ConfigError::Invalid("MOVE_THRESHOLD"));
        }

        // MOVE_THRESHOLDS picks a preset; "uniform" applies MOVE_THRESHOLD to every kind
        let move_thresholds = match lookup("MOVE_THRESHOLDS")
            .map(|preset| preset.trim().to_ascii_lowercase())
            .as_deref()
        {
            None | Some("") | Some("uniform") => MoveThresholds::uniform(move_threshold),
            Some("strict") => MoveThresholds::strict(),
            Some(_) => return Err(ConfigError::Invalid("MOVE_THRESHOLDS")),
        };

        let client_origins = lookup("CLIENT_ORIGIN")
            .map(|origins| {
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty() && s != "*")
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            client_origins,
            match_rules,
            move_thresholds,
            input_rate_limit: parse_or(&lookup, "INPUT_RATE_LIMIT", DEFAULT_INPUT_RATE_LIMIT)?,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            log_level: "info".to_string(),
            client_origins: Vec::new(),
            match_rules: MatchRules::default(),
            move_thresholds: MoveThresholds::default(),
            input_rate_limit: DEFAULT_INPUT_RATE_LIMIT,
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        None => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
