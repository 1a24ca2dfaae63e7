//! Error taxonomy for sessions, permissions and the native collaborator
//!
//! Every native call returns a [`CameraStatus`]; anything other than success is
//! translated 1:1 into a [`CameraError`] and handed back to the caller of the
//! operation that triggered it.

use serde::{Deserialize, Serialize};

/// Status codes reported by the native camera library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CameraStatus {
    Success,
    RuntimeError,
    Disconnected,
    InvalidValue,
    Timeout,
    LogicError,
    NotImplemented,
    OutOfBounds,
    ResourceError,
    FileNotFound,
    CouldNotOpen,
    DataNotFound,
    DeviceIsBusy,
    UseCaseNotSupported,
    FrameRateNotSupported,
    ExposureTimeNotSupported,
    DeviceNotInitialized,
    CalibrationDataError,
    NoCalibrationData,
    InsufficientPrivileges,
    DeviceAlreadyInitialized,
    ExposureModeInvalid,
    NoUseCases,
    Unknown,
}

impl CameraStatus {
    pub fn is_success(self) -> bool {
        self == CameraStatus::Success
    }

    /// Upper-case name as printed by the native tooling.
    pub fn as_str(self) -> &'static str {
        match self {
            CameraStatus::Success => "SUCCESS",
            CameraStatus::RuntimeError => "RUNTIME_ERROR",
            CameraStatus::Disconnected => "DISCONNECTED",
            CameraStatus::InvalidValue => "INVALID_VALUE",
            CameraStatus::Timeout => "TIMEOUT",
            CameraStatus::LogicError => "LOGIC_ERROR",
            CameraStatus::NotImplemented => "NOT_IMPLEMENTED",
            CameraStatus::OutOfBounds => "OUT_OF_BOUNDS",
            CameraStatus::ResourceError => "RESOURCE_ERROR",
            CameraStatus::FileNotFound => "FILE_NOT_FOUND",
            CameraStatus::CouldNotOpen => "COULD_NOT_OPEN",
            CameraStatus::DataNotFound => "DATA_NOT_FOUND",
            CameraStatus::DeviceIsBusy => "DEVICE_IS_BUSY",
            CameraStatus::UseCaseNotSupported => "USECASE_NOT_SUPPORTED",
            CameraStatus::FrameRateNotSupported => "FRAMERATE_NOT_SUPPORTED",
            CameraStatus::ExposureTimeNotSupported => "EXPOSURE_TIME_NOT_SUPPORTED",
            CameraStatus::DeviceNotInitialized => "DEVICE_NOT_INITIALIZED",
            CameraStatus::CalibrationDataError => "CALIBRATION_DATA_ERROR",
            CameraStatus::NoCalibrationData => "NO_CALIBRATION_DATA",
            CameraStatus::InsufficientPrivileges => "INSUFFICIENT_PRIVILEGES",
            CameraStatus::DeviceAlreadyInitialized => "DEVICE_ALREADY_INITIALIZED",
            CameraStatus::ExposureModeInvalid => "EXPOSURE_MODE_INVALID",
            CameraStatus::NoUseCases => "NO_USE_CASES",
            CameraStatus::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for CameraStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by every public operation of this crate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CameraError {
    #[error("Calibration data error: {0}")]
    CalibrationDataError(String),
    #[error("Use case not supported: {0}")]
    UseCaseNotSupported(String),
    #[error("Device already initialized")]
    DeviceAlreadyInitialized,
    #[error("Device not initialized")]
    DeviceNotInitialized,
    #[error("File not found: {0}")]
    FileNotFound(String),
    #[error("Exposure mode invalid: {0}")]
    ExposureModeInvalid(String),
    #[error("Logic error: {0}")]
    LogicError(String),
    #[error("Camera not connected")]
    NotConnected,
    #[error("Runtime error: {0}")]
    RuntimeError(String),
    #[error("USB service unavailable")]
    ServiceUnavailable,
    #[error("Permission denied error: {0}")]
    PermissionDenied(String),
    #[error("Permission request error: {0}")]
    RequestError(String),
    #[error("Invalid value: {0}")]
    InvalidValue(String),
    #[error("Value out of bounds: {0}")]
    OutOfBounds(String),
    #[error("Frame rate not supported: {0}")]
    FrameRateNotSupported(String),
    #[error("Insufficient privileges: {0}")]
    InsufficientPrivileges(String),
    #[error("Not implemented: {0}")]
    NotImplemented(String),
    #[error("Could not open: {0}")]
    CouldNotOpen(String),
    #[error("Resource error: {0}")]
    ResourceError(String),
    #[error("No supported camera was found")]
    NoCameraFound,
    #[error("Session is closed")]
    SessionClosed,
}

impl CameraError {
    /// True for errors produced by the asynchronous creation flow rather than by a
    /// call against an open session.
    pub fn is_creation_error(&self) -> bool {
        matches!(
            self,
            CameraError::ServiceUnavailable
                | CameraError::PermissionDenied(_)
                | CameraError::RequestError(_)
                | CameraError::NoCameraFound
        )
    }
}

impl From<CameraStatus> for CameraError {
    fn from(status: CameraStatus) -> Self {
        let name = status.as_str().to_string();
        match status {
            CameraStatus::CalibrationDataError | CameraStatus::NoCalibrationData => {
                CameraError::CalibrationDataError(name)
            }
            CameraStatus::UseCaseNotSupported | CameraStatus::NoUseCases => {
                CameraError::UseCaseNotSupported(name)
            }
            CameraStatus::DeviceAlreadyInitialized => CameraError::DeviceAlreadyInitialized,
            CameraStatus::DeviceNotInitialized => CameraError::DeviceNotInitialized,
            CameraStatus::FileNotFound | CameraStatus::DataNotFound => CameraError::FileNotFound(name),
            CameraStatus::ExposureModeInvalid => CameraError::ExposureModeInvalid(name),
            CameraStatus::LogicError => CameraError::LogicError(name),
            CameraStatus::Disconnected => CameraError::NotConnected,
            CameraStatus::InvalidValue => CameraError::InvalidValue(name),
            CameraStatus::OutOfBounds | CameraStatus::ExposureTimeNotSupported => {
                CameraError::OutOfBounds(name)
            }
            CameraStatus::FrameRateNotSupported => CameraError::FrameRateNotSupported(name),
            CameraStatus::InsufficientPrivileges => CameraError::InsufficientPrivileges(name),
            CameraStatus::NotImplemented => CameraError::NotImplemented(name),
            CameraStatus::CouldNotOpen => CameraError::CouldNotOpen(name),
            CameraStatus::ResourceError | CameraStatus::DeviceIsBusy => CameraError::ResourceError(name),
            // Success never reaches this conversion through the native seam.
            CameraStatus::Success
            | CameraStatus::RuntimeError
            | CameraStatus::Timeout
            | CameraStatus::Unknown => CameraError::RuntimeError(name),
        }
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, CameraError>;
