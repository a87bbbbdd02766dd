//! Configuration loading and persistence.
//!
//! Handles reading and writing the console configuration file
//! (`<config_dir>/config.json`). A missing file means defaults.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::constants::{
    CAMERA_ENDPOINT_TEMPLATE, DEFAULT_API_URL, DEFAULT_CONTROL_URL, DEFAULT_MOVE_AMOUNT,
    RECONNECT_DELAY,
};
use crate::link::ReconnectPolicy;
use crate::protocol::CameraId;
use crate::ws::endpoint_template;

const CONFIG_FILE: &str = "config.json";

/// Configuration for the rig console.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Base URL of the camera/REST service.
    pub api_url: String,
    /// URL of the control/status service.
    pub control_url: String,
    /// Cameras to open sessions for.
    pub cameras: Vec<CameraId>,
    /// Delay between reconnect attempts, in milliseconds.
    pub reconnect_delay_ms: u64,
    /// When set, reconnect delay doubles per attempt up to this cap.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_reconnect_delay_ms: Option<u64>,
    /// Pattern movement step.
    pub move_amount: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            control_url: DEFAULT_CONTROL_URL.to_string(),
            cameras: vec![CameraId::from("1"), CameraId::from("2")],
            reconnect_delay_ms: RECONNECT_DELAY.as_millis() as u64,
            max_reconnect_delay_ms: None,
            move_amount: DEFAULT_MOVE_AMOUNT,
        }
    }
}

impl Config {
    /// Returns the configuration directory path, creating it if necessary.
    ///
    /// Directory selection priority:
    /// 1. `MOCAP_CONFIG_DIR` env var: explicit override
    /// 2. Default: platform config dir joined with `mocap-console`
    pub fn config_dir() -> Result<PathBuf> {
        let dir = if let Ok(dir) = std::env::var("MOCAP_CONFIG_DIR") {
            PathBuf::from(dir)
        } else {
            dirs::config_dir()
                .context("Could not determine config directory")?
                .join("mocap-console")
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("Could not create config directory {}", dir.display()))?;
        Ok(dir)
    }

    /// Loads configuration from the config directory, with environment
    /// variable overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_dir()?)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads `config.json` from `dir`. Missing file means defaults.
    pub fn load_from(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE);
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Invalid config in {}", path.display()))
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply `MOCAP_*` overrides from `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(api_url) = lookup("MOCAP_API_URL") {
            self.api_url = api_url;
        }

        if let Some(control_url) = lookup("MOCAP_CONTROL_URL") {
            self.control_url = control_url;
        }

        if let Some(cameras) = lookup("MOCAP_CAMERAS") {
            self.cameras = cameras
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(CameraId::from)
                .collect();
        }
    }

    /// Persists the configuration to the config directory.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_dir()?)
    }

    /// Writes `config.json` into `dir` as pretty JSON.
    pub fn save_to(&self, dir: &Path) -> Result<()> {
        let path = dir.join(CONFIG_FILE);
        fs::write(&path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("Could not write {}", path.display()))?;
        Ok(())
    }

    /// Reconnect policy for camera sessions and the control channel.
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        let policy = ReconnectPolicy::fixed(Duration::from_millis(self.reconnect_delay_ms));
        match self.max_reconnect_delay_ms {
            Some(max) => policy.with_max_delay(Duration::from_millis(max)),
            None => policy,
        }
    }

    /// Per-camera WebSocket endpoint template derived from `api_url`.
    pub fn camera_endpoint_template(&self) -> String {
        endpoint_template(&self.api_url, CAMERA_ENDPOINT_TEMPLATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Config::load_from(dir.path()).unwrap(), Config::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            api_url: "http://rig.local:8000".to_string(),
            cameras: vec!["left".into(), "right".into()],
            max_reconnect_delay_ms: Some(30_000),
            ..Config::default()
        };
        config.save_to(dir.path()).unwrap();
        assert_eq!(Config::load_from(dir.path()).unwrap(), config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), r#"{"cameras":["3"]}"#).unwrap();
        let config = Config::load_from(dir.path()).unwrap();
        assert_eq!(config.cameras, vec![CameraId::from("3")]);
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.reconnect_delay_ms, 3000);
    }

    #[test]
    fn test_invalid_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "{ nope").unwrap();
        assert!(Config::load_from(dir.path()).is_err());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("MOCAP_API_URL", "https://rig.example"),
            ("MOCAP_CAMERAS", "1, 2,,4"),
        ]
        .into_iter()
        .collect();
        let mut config = Config::default();
        config.apply_overrides(|key| env.get(key).map(ToString::to_string));

        assert_eq!(config.api_url, "https://rig.example");
        assert_eq!(config.control_url, DEFAULT_CONTROL_URL);
        assert_eq!(
            config.cameras,
            vec![CameraId::from("1"), CameraId::from("2"), CameraId::from("4")]
        );
        assert_eq!(
            config.camera_endpoint_template(),
            "wss://rig.example/ws/camera/{cameraId}"
        );
    }

    #[test]
    fn test_reconnect_policy() {
        let mut config = Config::default();
        assert_eq!(config.reconnect_policy().delay_for(5), Duration::from_secs(3));
        config.max_reconnect_delay_ms = Some(10_000);
        assert_eq!(config.reconnect_policy().delay_for(5), Duration::from_secs(10));
    }
}
