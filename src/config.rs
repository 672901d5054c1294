//! Application-level configuration loading, including the game timing constants.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "LIVE_QUIZ_BACK_CONFIG_PATH";

/// Immutable runtime configuration shared across the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Time allotted to answer each question, in seconds.
    pub question_duration_secs: u64,
    /// Latency tolerance past the question duration before a submission is
    /// rejected as time-expired, in seconds.
    pub answer_grace_secs: u64,
    /// Pause between the reveal screen and the next question, in seconds.
    pub reveal_delay_secs: u64,
    /// Delay before a completed session is purged from the store, in seconds.
    pub cleanup_delay_secs: u64,
    /// Window during which a dropped participant may reconnect, in seconds.
    pub disconnect_grace_secs: u64,
    /// Absolute session lifetime from creation, in seconds.
    pub session_ttl_secs: u64,
    /// Length of generated session join codes.
    pub code_length: usize,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to the
    /// baked-in defaults when the file is absent or malformed.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(path = %path.display(), "loaded game timings from config");
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Question duration as a float, used by the scoring formula.
    pub fn question_duration_f64(&self) -> f64 {
        self.question_duration_secs as f64
    }

    /// Hard submission deadline: question duration plus the grace window.
    pub fn submission_deadline_f64(&self) -> f64 {
        (self.question_duration_secs + self.answer_grace_secs) as f64
    }

    /// Reveal-to-advance pause as a [`Duration`].
    pub fn reveal_delay(&self) -> Duration {
        Duration::from_secs(self.reveal_delay_secs)
    }

    /// Completion-to-cleanup pause as a [`Duration`].
    pub fn cleanup_delay(&self) -> Duration {
        Duration::from_secs(self.cleanup_delay_secs)
    }

    /// Disconnect grace window as a [`Duration`].
    pub fn disconnect_grace(&self) -> Duration {
        Duration::from_secs(self.disconnect_grace_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            question_duration_secs: 30,
            answer_grace_secs: 2,
            reveal_delay_secs: 5,
            cleanup_delay_secs: 300,
            disconnect_grace_secs: 60,
            session_ttl_secs: 600,
            code_length: 6,
        }
    }
}

/// JSON representation of the configuration file, all fields optional.
#[derive(Debug, Deserialize)]
struct RawConfig {
    question_duration_secs: Option<u64>,
    answer_grace_secs: Option<u64>,
    reveal_delay_secs: Option<u64>,
    cleanup_delay_secs: Option<u64>,
    disconnect_grace_secs: Option<u64>,
    session_ttl_secs: Option<u64>,
    code_length: Option<usize>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = AppConfig::default();
        Self {
            question_duration_secs: value
                .question_duration_secs
                .unwrap_or(defaults.question_duration_secs),
            answer_grace_secs: value.answer_grace_secs.unwrap_or(defaults.answer_grace_secs),
            reveal_delay_secs: value.reveal_delay_secs.unwrap_or(defaults.reveal_delay_secs),
            cleanup_delay_secs: value
                .cleanup_delay_secs
                .unwrap_or(defaults.cleanup_delay_secs),
            disconnect_grace_secs: value
                .disconnect_grace_secs
                .unwrap_or(defaults.disconnect_grace_secs),
            session_ttl_secs: value.session_ttl_secs.unwrap_or(defaults.session_ttl_secs),
            code_length: value.code_length.unwrap_or(defaults.code_length),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_game_constants() {
        let config = AppConfig::default();
        assert_eq!(config.question_duration_secs, 30);
        assert_eq!(config.answer_grace_secs, 2);
        assert_eq!(config.reveal_delay_secs, 5);
        assert_eq!(config.cleanup_delay_secs, 300);
        assert_eq!(config.disconnect_grace_secs, 60);
        assert_eq!(config.session_ttl_secs, 600);
        assert_eq!(config.code_length, 6);
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let raw: RawConfig =
            serde_json::from_str(r#"{"question_duration_secs": 20}"#).unwrap();
        let config: AppConfig = raw.into();
        assert_eq!(config.question_duration_secs, 20);
        assert_eq!(config.answer_grace_secs, 2);
        assert_eq!(config.code_length, 6);
    }

    #[test]
    fn submission_deadline_includes_grace() {
        let config = AppConfig::default();
        assert_eq!(config.submission_deadline_f64(), 32.0);
    }
}
