use std::path::PathBuf;
use std::time::Duration;

use crate::services::calculator::EngineConfig;
use crate::services::gfs::GFS_FILTER_URL;
use crate::services::scheduler::RefreshSchedule;

const SECONDS_PER_HOUR: u64 = 3600;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got {value:?}")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Application configuration, parsed from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    /// Root for `weather/` and `places.json`.
    pub data_dir: PathBuf,
    /// Directory containing the `calculator` engine binary.
    pub bin_dir: PathBuf,
    pub forecast_base_url: String,
    pub weather_refresh_hours: u32,
    /// Forward download window per refresh; cleanup trails now by the same amount.
    pub weather_window_hours: u32,
    pub weather_startup_hours: u32,
    /// Minimum age of the model run used for a target hour.
    pub weather_publication_lag_hours: u32,
    pub weather_auto_download: bool,
    /// Emit JSON log lines instead of the human-readable format.
    pub log_json: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source. Missing variables take their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let hours = |name: &'static str, default: u32| -> Result<u32, ConfigError> {
            match lookup(name) {
                None => Ok(default),
                Some(raw) => raw
                    .trim()
                    .parse::<u32>()
                    .ok()
                    .filter(|h| *h > 0)
                    .ok_or(ConfigError::Invalid {
                        name,
                        expected: "a positive number of hours",
                        value: raw,
                    }),
            }
        };

        let port = match lookup("PORT") {
            None => 8080,
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
                name: "PORT",
                expected: "a valid u16",
                value: raw,
            })?,
        };

        let weather_auto_download = match lookup("WEATHER_AUTO_DOWNLOAD") {
            None => true,
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "WEATHER_AUTO_DOWNLOAD",
                        expected: "a boolean",
                        value: raw,
                    })
                }
            },
        };

        let log_json = match lookup("LOG_FORMAT") {
            None => false,
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "json" => true,
                "text" | "pretty" | "" => false,
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "LOG_FORMAT",
                        expected: "\"json\" or \"text\"",
                        value: raw,
                    })
                }
            },
        };

        Ok(Self {
            port,
            data_dir: lookup("DATA_DIR")
                .unwrap_or_else(|| "./data".to_string())
                .into(),
            bin_dir: lookup("BIN_DIR")
                .unwrap_or_else(|| "./bin".to_string())
                .into(),
            forecast_base_url: lookup("FORECAST_BASE_URL")
                .unwrap_or_else(|| GFS_FILTER_URL.to_string()),
            weather_refresh_hours: hours("WEATHER_REFRESH_HOURS", 2)?,
            weather_window_hours: hours("WEATHER_WINDOW_HOURS", 24)?,
            weather_startup_hours: hours("WEATHER_STARTUP_HOURS", 1)?,
            weather_publication_lag_hours: hours("WEATHER_PUBLICATION_LAG_HOURS", 6)?,
            weather_auto_download,
            log_json,
        })
    }

    pub fn weather_dir(&self) -> PathBuf {
        self.data_dir.join("weather")
    }

    pub fn refresh_schedule(&self) -> RefreshSchedule {
        RefreshSchedule {
            interval: Duration::from_secs(u64::from(self.weather_refresh_hours) * SECONDS_PER_HOUR),
            window: chrono::Duration::hours(i64::from(self.weather_window_hours)),
        }
    }

    pub fn startup_window(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.weather_startup_hours))
    }

    pub fn publication_lag(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.weather_publication_lag_hours))
    }

    pub fn engine(&self) -> EngineConfig {
        EngineConfig::from_bin_dir(&self.bin_dir)
    }
}
