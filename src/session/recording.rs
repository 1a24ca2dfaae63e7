//! Recording configuration

use crate::errors::{CameraError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File extension of recordings written by the native library.
pub const RECORDING_EXTENSION: &str = "rrf";

/// Parameters of one recording.
///
/// `frame_skip` and `ms_skip` are alternatives: at most one of them may be set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingConfig {
    /// Output file
    pub path: PathBuf,
    /// Stop automatically after this many frames; 0 records until stopped
    pub max_frames: u32,
    /// Frames to drop between two recorded frames
    pub frame_skip: u32,
    /// Milliseconds to skip between two recorded frames
    pub ms_skip: u32,
}

impl RecordingConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_frames: 0,
            frame_skip: 0,
            ms_skip: 0,
        }
    }

    /// Config writing to a timestamped file inside `directory`.
    pub fn in_directory(directory: impl AsRef<Path>) -> Self {
        Self::new(directory.as_ref().join(default_file_name()))
    }

    pub fn with_max_frames(mut self, max_frames: u32) -> Self {
        self.max_frames = max_frames;
        self
    }

    pub fn with_frame_skip(mut self, frame_skip: u32) -> Self {
        self.frame_skip = frame_skip;
        self
    }

    pub fn with_ms_skip(mut self, ms_skip: u32) -> Self {
        self.ms_skip = ms_skip;
        self
    }

    pub fn is_bounded(&self) -> bool {
        self.max_frames > 0
    }

    pub fn validate(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(CameraError::InvalidValue(
                "recording path must not be empty".to_string(),
            ));
        }
        if self.frame_skip > 0 && self.ms_skip > 0 {
            return Err(CameraError::InvalidValue(format!(
                "frame_skip ({}) and ms_skip ({}) are mutually exclusive",
                self.frame_skip, self.ms_skip
            )));
        }
        Ok(())
    }
}

/// `tofcam_YYYYMMDD_HHMMSS.rrf`, in local time.
pub fn default_file_name() -> String {
    format!(
        "tofcam_{}.{}",
        chrono::Local::now().format("%Y%m%d_%H%M%S"),
        RECORDING_EXTENSION
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_unbounded() {
        let config = RecordingConfig::new("out.rrf");
        assert_eq!(config.max_frames, 0);
        assert_eq!(config.frame_skip, 0);
        assert_eq!(config.ms_skip, 0);
        assert!(!config.is_bounded());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_both_skips_rejected() {
        let config = RecordingConfig::new("out.rrf")
            .with_frame_skip(2)
            .with_ms_skip(100);
        assert!(matches!(config.validate(), Err(CameraError::InvalidValue(_))));
    }

    #[test]
    fn test_empty_path_rejected() {
        assert!(RecordingConfig::new("").validate().is_err());
    }

    #[test]
    fn test_directory_config_uses_default_name() {
        let config = RecordingConfig::in_directory("/tmp/recordings");
        let name = config.path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("tofcam_"));
        assert!(name.ends_with(".rrf"));
        assert!(config.path.starts_with("/tmp/recordings"));
    }
}
