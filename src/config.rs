//! Configuration management module
//!
//! Loads and validates environment-based configuration for the console:
//! backend endpoint, watched devices, display range and demo mode.

use std::env;
use thiserror::Error;

use crate::models::DeviceId;
use crate::range::RangeSpec;
use crate::viewport::{FitConfig, LatLng};

/// Configuration errors
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("invalid value in environment variable {0}")]
    ParseError(&'static str),
}

/// Backend endpoint settings
#[derive(Debug, Clone)]
pub struct BackendSettings {
    /// Base URL of the monitoring backend
    pub base_url: String,
    /// Optional bearer token attached to every request
    pub token: Option<String>,
}

/// View-session settings
#[derive(Debug, Clone)]
pub struct ViewSettings {
    /// Display range applied to watched device views
    pub range: RangeSpec,
    /// Devices to open views for; empty means every listed device
    pub watch: Vec<DeviceId>,
    /// Seconds between full refreshes of the device list and open views
    pub refresh_secs: u64,
}

/// Map fallback settings
#[derive(Debug, Clone)]
pub struct MapSettings {
    pub fallback_lat: f64,
    pub fallback_lng: f64,
}

/// Demo-mode settings
#[derive(Debug, Clone)]
pub struct DemoSettings {
    /// Run against the simulated fleet instead of the backend
    pub enabled: bool,
    /// Milliseconds between simulated readings
    pub interval_ms: u64,
}

/// Root configuration structure
#[derive(Debug, Clone)]
pub struct Settings {
    pub backend: BackendSettings,
    pub view: ViewSettings,
    pub map: MapSettings,
    pub demo: DemoSettings,
}

impl Settings {
    /// Load settings from environment variables
    pub fn from_env() -> Result<Self, SettingsError> {
        let range = env::var("RAINWATCH_RANGE")
            .unwrap_or_else(|_| "24".into())
            .parse::<RangeSpec>()
            .map_err(|_| SettingsError::ParseError("RAINWATCH_RANGE"))?;

        let watch = parse_watch(&env::var("RAINWATCH_WATCH").unwrap_or_default())?;

        let refresh_secs = env::var("RAINWATCH_REFRESH_SECS")
            .unwrap_or_else(|_| "300".into())
            .parse()
            .map_err(|_| SettingsError::ParseError("RAINWATCH_REFRESH_SECS"))?;

        let fallback_lat = env::var("RAINWATCH_FALLBACK_LAT")
            .unwrap_or_else(|_| "13.7563".into())
            .parse()
            .map_err(|_| SettingsError::ParseError("RAINWATCH_FALLBACK_LAT"))?;

        let fallback_lng = env::var("RAINWATCH_FALLBACK_LNG")
            .unwrap_or_else(|_| "100.5018".into())
            .parse()
            .map_err(|_| SettingsError::ParseError("RAINWATCH_FALLBACK_LNG"))?;

        let demo_enabled = env::var("RAINWATCH_DEMO")
            .unwrap_or_else(|_| "false".into())
            .parse()
            .map_err(|_| SettingsError::ParseError("RAINWATCH_DEMO"))?;

        let demo_interval_ms = env::var("RAINWATCH_DEMO_INTERVAL_MS")
            .unwrap_or_else(|_| "2000".into())
            .parse()
            .map_err(|_| SettingsError::ParseError("RAINWATCH_DEMO_INTERVAL_MS"))?;

        Ok(Self {
            backend: BackendSettings {
                base_url: env::var("RAINWATCH_BACKEND_URL")
                    .unwrap_or_else(|_| "http://localhost:3000".into()),
                token: env::var("RAINWATCH_TOKEN").ok(),
            },
            view: ViewSettings {
                range,
                watch,
                refresh_secs,
            },
            map: MapSettings {
                fallback_lat,
                fallback_lng,
            },
            demo: DemoSettings {
                enabled: demo_enabled,
                interval_ms: demo_interval_ms,
            },
        })
    }

    /// Viewport fit tunables derived from the map settings.
    pub fn fit_config(&self) -> FitConfig {
        FitConfig {
            fallback_center: LatLng::new(self.map.fallback_lat, self.map.fallback_lng),
            ..FitConfig::default()
        }
    }
}

fn parse_watch(raw: &str) -> Result<Vec<DeviceId>, SettingsError> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse()
                .map_err(|_| SettingsError::ParseError("RAINWATCH_WATCH"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        env::remove_var("RAINWATCH_BACKEND_URL");
        env::remove_var("RAINWATCH_FALLBACK_LAT");
        env::remove_var("RAINWATCH_FALLBACK_LNG");

        let settings = Settings::from_env().unwrap();

        assert_eq!(settings.backend.base_url, "http://localhost:3000");
        assert_eq!(settings.map.fallback_lat, 13.7563);
        assert_eq!(settings.map.fallback_lng, 100.5018);
        assert_eq!(settings.view.range, RangeSpec::Hours(24));
        assert!(settings.view.watch.is_empty());
    }

    #[test]
    fn test_custom_settings() {
        env::set_var("RAINWATCH_REFRESH_SECS", "60");
        env::set_var("RAINWATCH_DEMO", "true");

        let settings = Settings::from_env().unwrap();

        assert_eq!(settings.view.refresh_secs, 60);
        assert!(settings.demo.enabled);

        env::remove_var("RAINWATCH_REFRESH_SECS");
        env::remove_var("RAINWATCH_DEMO");
    }

    #[test]
    fn test_watch_list_parsing() {
        assert_eq!(parse_watch("").unwrap(), Vec::<DeviceId>::new());
        assert_eq!(parse_watch("1,2, 7").unwrap(), vec![1, 2, 7]);
        assert!(parse_watch("1,x").is_err());
    }

    #[test]
    fn test_fit_config_uses_fallback_center() {
        let mut settings = Settings::from_env().unwrap();
        settings.map.fallback_lat = 15.0;
        settings.map.fallback_lng = 101.0;

        let fit = settings.fit_config();
        assert_eq!(fit.fallback_center.lat, 15.0);
        assert_eq!(fit.fallback_center.lng, 101.0);
    }
}
