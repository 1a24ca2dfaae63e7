#[cfg(test)]
mod config_tests {
    use std::fs;
    use std::sync::Arc;
    use tempfile::tempdir;
    use tofcam::testing::MockLibrary;
    use tofcam::{AccessLevel, CameraError, SessionManager, TofCamConfig};

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("tofcam.toml");

        let mut config = TofCamConfig::default();
        config.manager.activation_code = "lab-code".to_string();
        config.manager.default_use_case = Some("MODE_9_10FPS_1000".to_string());
        config.recording.max_frames = 50;
        config.logging.level = "debug".to_string();

        config.save_to_file(&path).unwrap();
        let loaded = TofCamConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
        assert!(loaded.validate().is_ok());
    }

    #[test]
    fn test_malformed_file_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "[manager\nactivation_code = ").unwrap();

        assert!(matches!(
            TofCamConfig::load_from_file(&path),
            Err(CameraError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_manager_uses_configured_activation_code() {
        let library = Arc::new(MockLibrary::new().with_activation_code("lab-code", AccessLevel::L2));
        let mut config = TofCamConfig::default();
        config.manager.activation_code = "lab-code".to_string();

        let manager = SessionManager::from_config(library, &config);
        assert_eq!(manager.access_level(), Ok(AccessLevel::L2));
    }
}
