//! Configuration management for tofcam
//!
//! Loads and saves the activation code, recording defaults and logging level as
//! TOML.

use crate::errors::CameraError;
use crate::session::RecordingConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TofCamConfig {
    pub manager: ManagerConfig,
    pub recording: RecordingDefaults,
    pub logging: LoggingConfig,
}

/// Session manager configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Activation code unlocking a higher access level; empty means L1
    pub activation_code: String,
    /// Use case applied right after initialization, if any
    pub default_use_case: Option<String>,
}

/// Defaults for new recordings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingDefaults {
    /// Directory receiving recording files
    pub output_directory: String,
    /// Frames per recording; 0 records until stopped
    pub max_frames: u32,
    /// Frames skipped between recorded frames
    pub frame_skip: u32,
    /// Milliseconds skipped between recorded frames
    pub ms_skip: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Level filter for the `tofcam` target (error, warn, info, debug, trace)
    pub level: String,
}

impl Default for TofCamConfig {
    fn default() -> Self {
        Self {
            manager: ManagerConfig {
                activation_code: String::new(),
                default_use_case: None,
            },
            recording: RecordingDefaults {
                output_directory: "./recordings".to_string(),
                max_frames: 0,
                frame_skip: 0,
                ms_skip: 0,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

impl TofCamConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, CameraError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(|e| {
            CameraError::RuntimeError(format!("Failed to read config file: {}", e))
        })?;

        let config: TofCamConfig = toml::from_str(&contents).map_err(|e| {
            CameraError::InvalidValue(format!("Failed to parse config file: {}", e))
        })?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), CameraError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                CameraError::RuntimeError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self).map_err(|e| {
            CameraError::InvalidValue(format!("Failed to serialize config: {}", e))
        })?;

        fs::write(path, toml_string).map_err(|e| {
            CameraError::RuntimeError(format!("Failed to write config file: {}", e))
        })?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        PathBuf::from("tofcam.toml")
    }

    /// Load from default location or fall back to defaults
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// A recording config writing a timestamped file into the output directory.
    pub fn recording_config(&self) -> RecordingConfig {
        RecordingConfig::in_directory(&self.recording.output_directory)
            .with_max_frames(self.recording.max_frames)
            .with_frame_skip(self.recording.frame_skip)
            .with_ms_skip(self.recording.ms_skip)
    }

    pub fn log_level(&self) -> Option<log::LevelFilter> {
        log::LevelFilter::from_str(&self.logging.level).ok()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.recording.output_directory.trim().is_empty() {
            return Err("Recording output directory must not be empty".to_string());
        }
        if self.recording.frame_skip > 0 && self.recording.ms_skip > 0 {
            return Err("frame_skip and ms_skip cannot both be set".to_string());
        }
        if let Some(use_case) = &self.manager.default_use_case {
            if use_case.trim().is_empty() {
                return Err("Default use case must not be blank".to_string());
            }
        }
        if self.log_level().is_none() {
            return Err(format!("Unknown log level '{}'", self.logging.level));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TofCamConfig::default();
        assert!(config.manager.activation_code.is_empty());
        assert_eq!(config.recording.max_frames, 0);
        assert_eq!(config.log_level(), Some(log::LevelFilter::Info));
    }

    #[test]
    fn test_config_validation() {
        let config = TofCamConfig::default();
        assert!(config.validate().is_ok());

        let mut both_skips = config.clone();
        both_skips.recording.frame_skip = 2;
        both_skips.recording.ms_skip = 50;
        assert!(both_skips.validate().is_err());

        let mut bad_level = TofCamConfig::default();
        bad_level.logging.level = "loud".to_string();
        assert!(bad_level.validate().is_err());
    }

    #[test]
    fn test_config_toml_format() {
        let config = TofCamConfig::default();
        let toml_string = toml::to_string_pretty(&config).unwrap();

        assert!(toml_string.contains("[manager]"));
        assert!(toml_string.contains("[recording]"));
        assert!(toml_string.contains("[logging]"));
        assert!(toml_string.contains("activation_code"));
    }

    #[test]
    fn test_recording_config_from_defaults() {
        let mut config = TofCamConfig::default();
        config.recording.max_frames = 25;
        config.recording.frame_skip = 1;

        let recording = config.recording_config();
        assert_eq!(recording.max_frames, 25);
        assert_eq!(recording.frame_skip, 1);
        assert!(recording.path.starts_with("./recordings"));
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = TofCamConfig::load_from_file("nonexistent_tofcam.toml");
        assert_eq!(result.unwrap(), TofCamConfig::default());
    }
}
