//! Application-level configuration loading: scoring tunables and lobby limits.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "COUNTRY_DASH_BACK_CONFIG_PATH";

/// Tunables for the score bonuses applied on top of client-submitted deltas.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Answers faster than this earn a speed bonus.
    pub fast_answer_threshold_ms: u64,
    /// Bonus granted for an instantaneous answer, scaled down linearly to
    /// zero at the threshold.
    pub speed_bonus_max: i32,
    /// Bonus added per consecutive correct answer.
    pub streak_bonus_step: i32,
    /// Upper bound on the streak bonus for a single answer.
    pub streak_bonus_cap: i32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            fast_answer_threshold_ms: 5_000,
            speed_bonus_max: 50,
            streak_bonus_step: 5,
            streak_bonus_cap: 30,
        }
    }
}

/// Bounds applied to lobby settings supplied by hosts.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LobbyLimits {
    /// Hard ceiling on `max_players`, whatever the host asks for.
    pub max_players_ceiling: u32,
    /// `max_players` used when the host does not pick one.
    pub default_max_players: u32,
    /// Round size used when the host does not pick one.
    pub default_question_count: u32,
}

impl Default for LobbyLimits {
    fn default() -> Self {
        Self {
            max_players_ceiling: 16,
            default_max_players: 8,
            default_question_count: 20,
        }
    }
}

/// Immutable runtime configuration shared across the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Score bonus tunables.
    pub scoring: ScoringConfig,
    /// Lobby settings bounds.
    pub limits: LobbyLimits,
    /// Grace period before a dropped socket is treated as a departure.
    pub disconnect_grace_ms: u64,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to the
    /// built-in defaults when the file is absent or malformed.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(path = %path.display(), "loaded configuration from file");
                    app_config
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

    /// Disconnect grace period as a [`Duration`].
    pub fn disconnect_grace(&self) -> Duration {
        Duration::from_millis(self.disconnect_grace_ms)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scoring: ScoringConfig::default(),
            limits: LobbyLimits::default(),
            disconnect_grace_ms: 1_000,
        }
    }
}

/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    scoring: ScoringConfig,
    #[serde(default)]
    limits: LobbyLimits,
    disconnect_grace_ms: Option<u64>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = AppConfig::default();
        Self {
            scoring: value.scoring,
            limits: value.limits,
            disconnect_grace_ms: value
                .disconnect_grace_ms
                .unwrap_or(defaults.disconnect_grace_ms),
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
    fn partial_config_keeps_defaults_for_missing_sections() {
        let raw: RawConfig =
            serde_json::from_str(r#"{"scoring": {"speed_bonus_max": 10}}"#).unwrap();
        let config: AppConfig = raw.into();

        assert_eq!(config.scoring.speed_bonus_max, 10);
        assert_eq!(config.scoring.streak_bonus_step, 5);
        assert_eq!(config.limits.default_max_players, 8);
        assert_eq!(config.disconnect_grace_ms, 1_000);
    }
}
