//! Configuration management for the UVC device manager
//!
//! Provides loading, saving and validation of the preview defaults and the
//! permission wait policy.

use crate::errors::UvcError;
use crate::types::Resolution;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound accepted for the permission wait
const MAX_PERMISSION_TIMEOUT_MS: u64 = 10 * 60 * 1000;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UvcConfig {
    #[serde(default)]
    pub preview: PreviewConfig,
    #[serde(default)]
    pub permission: PermissionConfig,
}

/// Preview negotiation defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewConfig {
    /// Resolution [width, height] used at open time and when no drawer picks one
    pub default_resolution: [u32; 2],
    /// Negotiate H.264 ahead of MJPEG when opening
    pub prefer_h264: bool,
}

/// Permission wait policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionConfig {
    /// Bound on one permission wait in milliseconds; 0 waits forever
    pub timeout_ms: u64,
    /// Re-request permission for attached-but-closed devices on resume
    pub request_on_resume: bool,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            default_resolution: [1280, 720],
            prefer_h264: false,
        }
    }
}

impl Default for PermissionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            request_on_resume: true,
        }
    }
}

impl UvcConfig {
    /// Load configuration from a TOML file; a missing file yields defaults
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, UvcError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| UvcError::Config(format!("Failed to read config file: {}", e)))?;

        let config: UvcConfig = toml::from_str(&contents)
            .map_err(|e| UvcError::Config(format!("Failed to parse config file: {}", e)))?;

        config.validate().map_err(UvcError::Config)?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), UvcError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                UvcError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| UvcError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| UvcError::Config(format!("Failed to write config file: {}", e)))?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        PathBuf::from("uvc-manager.toml")
    }

    /// Load from the default location, falling back to defaults on any error
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    pub fn validate(&self) -> Result<(), String> {
        let [w, h] = self.preview.default_resolution;
        if w == 0 || h == 0 {
            return Err("Invalid default resolution".to_string());
        }
        if self.permission.timeout_ms > MAX_PERMISSION_TIMEOUT_MS {
            return Err("Permission timeout must be at most 10 minutes".to_string());
        }
        Ok(())
    }

    /// Default resolution; falls back to 1280x720 if the configured one is zero-sized
    pub fn default_resolution(&self) -> Resolution {
        let [w, h] = self.preview.default_resolution;
        Resolution::new(w, h).unwrap_or(Resolution::hd())
    }

    pub fn permission_timeout(&self) -> Duration {
        Duration::from_millis(self.permission.timeout_ms)
    }
}
