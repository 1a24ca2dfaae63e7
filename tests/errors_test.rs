#[cfg(test)]
mod error_tests {
    use std::error::Error;
    use tofcam::errors::{CameraError, CameraStatus};

    const FAILURES: [CameraStatus; 23] = [
        CameraStatus::RuntimeError,
        CameraStatus::Disconnected,
        CameraStatus::InvalidValue,
        CameraStatus::Timeout,
        CameraStatus::LogicError,
        CameraStatus::NotImplemented,
        CameraStatus::OutOfBounds,
        CameraStatus::ResourceError,
        CameraStatus::FileNotFound,
        CameraStatus::CouldNotOpen,
        CameraStatus::DataNotFound,
        CameraStatus::DeviceIsBusy,
        CameraStatus::UseCaseNotSupported,
        CameraStatus::FrameRateNotSupported,
        CameraStatus::ExposureTimeNotSupported,
        CameraStatus::DeviceNotInitialized,
        CameraStatus::CalibrationDataError,
        CameraStatus::NoCalibrationData,
        CameraStatus::InsufficientPrivileges,
        CameraStatus::DeviceAlreadyInitialized,
        CameraStatus::ExposureModeInvalid,
        CameraStatus::NoUseCases,
        CameraStatus::Unknown,
    ];

    #[test]
    fn test_every_failure_status_converts() {
        for status in FAILURES {
            assert!(!status.is_success());
            let error = CameraError::from(status);
            assert!(!error.to_string().is_empty());
            assert!(!error.is_creation_error());
        }
    }

    #[test]
    fn test_status_name_carried_in_message() {
        let error = CameraError::from(CameraStatus::FrameRateNotSupported);
        assert_eq!(
            error.to_string(),
            "Frame rate not supported: FRAMERATE_NOT_SUPPORTED"
        );

        let error = CameraError::from(CameraStatus::DeviceIsBusy);
        assert_eq!(error, CameraError::ResourceError("DEVICE_IS_BUSY".to_string()));
    }

    #[test]
    fn test_camera_error_permission_denied() {
        let error = CameraError::PermissionDenied("Access denied".to_string());
        assert!(error.to_string().contains("Permission denied"));
        assert!(error.to_string().contains("Access denied"));
    }

    #[test]
    fn test_camera_error_debug_format() {
        let error = CameraError::RequestError("no device extra".to_string());
        let debug_str = format!("{:?}", error);
        assert!(debug_str.contains("RequestError"));
        assert!(debug_str.contains("no device extra"));
    }

    #[test]
    fn test_camera_error_is_std_error() {
        let error = CameraError::SessionClosed;
        let boxed: Box<dyn Error + Send + Sync> = Box::new(error);
        assert_eq!(boxed.to_string(), "Session is closed");
        assert!(boxed.source().is_none());
    }
}
