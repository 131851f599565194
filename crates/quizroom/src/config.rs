//! Environment-driven server configuration.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use quizroom_room::QuizConfig;

pub const DEFAULT_BIND: &str = "0.0.0.0:3000";
pub const DEFAULT_LOG_FILTER: &str = "quizroom=info";

/// Errors from reading the server configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// `QUIZROOM_OPERATOR_SECRET` is unset or empty. Without it nobody
    /// could create a room.
    #[error("QUIZROOM_OPERATOR_SECRET must be set")]
    MissingSecret,

    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

/// Everything the `quizroom` binary reads from its environment.
///
/// | Variable | Default |
/// |---|---|
/// | `QUIZROOM_BIND` (or `PORT`) | `0.0.0.0:3000` |
/// | `QUIZROOM_OPERATOR_SECRET` | required |
/// | `QUIZROOM_STORE_DIR` | unset: no persistence |
/// | `QUIZROOM_LOG` | `quizroom=info` |
/// | `QUIZROOM_QUESTION_WINDOW_SECS` | 15 |
#[derive(Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub operator_secret: String,
    pub store_dir: Option<PathBuf>,
    pub log_filter: String,
    pub question_window: Option<Duration>,
}

impl ServerConfig {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    /// See [`from_lookup`](Self::from_lookup).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable
    /// name to its value.
    ///
    /// # Errors
    /// - [`ConfigError::MissingSecret`] if no operator secret is given.
    /// - [`ConfigError::Invalid`] if `PORT` or the window isn't a positive
    ///   number.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_addr = match (non_empty("QUIZROOM_BIND"), non_empty("PORT")) {
            (Some(addr), _) => addr,
            (None, Some(port)) => {
                let port: u16 = port.trim().parse().map_err(|_| ConfigError::Invalid {
                    key: "PORT",
                    value: port.clone(),
                })?;
                format!("0.0.0.0:{port}")
            }
            (None, None) => DEFAULT_BIND.to_string(),
        };

        let operator_secret = non_empty("QUIZROOM_OPERATOR_SECRET").ok_or(ConfigError::MissingSecret)?;

        let question_window = match non_empty("QUIZROOM_QUESTION_WINDOW_SECS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Some(Duration::from_secs(secs)),
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "QUIZROOM_QUESTION_WINDOW_SECS",
                        value: raw,
                    });
                }
            },
            None => None,
        };

        Ok(Self {
            bind_addr,
            operator_secret,
            store_dir: non_empty("QUIZROOM_STORE_DIR").map(PathBuf::from),
            log_filter: non_empty("QUIZROOM_LOG").unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
            question_window,
        })
    }

    /// The gameplay constants, with the window override applied.
    pub fn quiz_config(&self) -> QuizConfig {
        let mut config = QuizConfig::default();
        if let Some(window) = self.question_window {
            config.question_window = window;
        }
        config
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_addr", &self.bind_addr)
            .field("operator_secret", &"<redacted>")
            .field("store_dir", &self.store_dir)
            .field("log_filter", &self.log_filter)
            .field("question_window", &self.question_window)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_from_lookup_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[("QUIZROOM_OPERATOR_SECRET", "s3cret")])).unwrap();
        assert_eq!(config.bind_addr, DEFAULT_BIND);
        assert_eq!(config.operator_secret, "s3cret");
        assert_eq!(config.store_dir, None);
        assert_eq!(config.log_filter, DEFAULT_LOG_FILTER);
        assert_eq!(config.quiz_config().question_window, Duration::from_secs(15));
    }

    #[test]
    fn test_from_lookup_missing_secret_fails() {
        let result = ServerConfig::from_lookup(lookup(&[]));
        assert!(matches!(result, Err(ConfigError::MissingSecret)));

        let result = ServerConfig::from_lookup(lookup(&[("QUIZROOM_OPERATOR_SECRET", "  ")]));
        assert!(matches!(result, Err(ConfigError::MissingSecret)));
    }

    #[test]
    fn test_from_lookup_port_fallback() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("QUIZROOM_OPERATOR_SECRET", "s"),
            ("PORT", "8081"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:8081");
    }

    #[test]
    fn test_from_lookup_bind_wins_over_port() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("QUIZROOM_OPERATOR_SECRET", "s"),
            ("QUIZROOM_BIND", "127.0.0.1:9000"),
            ("PORT", "8081"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:9000");
    }

    #[test]
    fn test_from_lookup_bad_port_fails() {
        let result = ServerConfig::from_lookup(lookup(&[
            ("QUIZROOM_OPERATOR_SECRET", "s"),
            ("PORT", "eighty"),
        ]));
        assert!(matches!(result, Err(ConfigError::Invalid { key: "PORT", .. })));
    }

    #[test]
    fn test_from_lookup_window_override() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("QUIZROOM_OPERATOR_SECRET", "s"),
            ("QUIZROOM_QUESTION_WINDOW_SECS", "30"),
            ("QUIZROOM_STORE_DIR", "/var/lib/quizroom"),
            ("QUIZROOM_LOG", "quizroom=debug"),
        ]))
        .unwrap();
        assert_eq!(config.quiz_config().question_window, Duration::from_secs(30));
        assert_eq!(config.store_dir, Some(PathBuf::from("/var/lib/quizroom")));
        assert_eq!(config.log_filter, "quizroom=debug");
    }

    #[test]
    fn test_from_lookup_zero_window_fails() {
        let result = ServerConfig::from_lookup(lookup(&[
            ("QUIZROOM_OPERATOR_SECRET", "s"),
            ("QUIZROOM_QUESTION_WINDOW_SECS", "0"),
        ]));
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = ServerConfig::from_lookup(lookup(&[("QUIZROOM_OPERATOR_SECRET", "hunter2")])).unwrap();
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
