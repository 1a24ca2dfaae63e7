//! Native collaborator seam
//!
//! The processing library is consumed through two traits. [`NativeLibrary`] is the
//! process-wide entry point that opens cameras; [`NativeCamera`] is one opened
//! device. Every call reports a [`CameraStatus`] on failure.
//!
//! [`NativeHandle`] owns a boxed camera exclusively. Releasing it moves the camera
//! out and destroys it, so the native finalizer runs at most once no matter how
//! many times `release` is called.

use crate::device::DeviceIdentity;
use crate::errors::{CameraError, CameraStatus, Result};
use crate::listeners::DeliverySink;
use crate::session::RecordingConfig;
use crate::types::{AccessLevel, ExposureLimits, ExposureMode, LensParameters, StreamId};
use std::path::Path;

/// Result type of every native primitive.
pub type NativeResult<T> = std::result::Result<T, CameraStatus>;

/// Process-wide entry point of the processing library.
pub trait NativeLibrary: Send + Sync {
    /// Access level unlocked by an activation code. An empty code yields L1.
    fn access_level(&self, activation_code: &str) -> NativeResult<AccessLevel>;

    /// Open a live camera on an already-opened USB transport.
    fn open_usb(&self, identity: DeviceIdentity, level: AccessLevel) -> NativeResult<Box<dyn NativeCamera>>;

    /// Open a recording file for playback.
    fn open_file(&self, path: &Path, level: AccessLevel) -> NativeResult<Box<dyn NativeCamera>>;
}

/// One opened device (or playback file).
pub trait NativeCamera: Send {
    fn initialize(&mut self) -> NativeResult<()>;
    fn set_external_trigger(&mut self, enabled: bool) -> NativeResult<()>;

    fn id(&self) -> NativeResult<String>;
    fn camera_name(&self) -> NativeResult<String>;
    fn camera_info(&self) -> NativeResult<Vec<(String, String)>>;

    fn use_cases(&self) -> NativeResult<Vec<String>>;
    fn set_use_case(&mut self, name: &str) -> NativeResult<()>;
    fn current_use_case(&self) -> NativeResult<String>;
    fn streams(&self) -> NativeResult<Vec<StreamId>>;
    fn number_of_streams(&self, use_case: &str) -> NativeResult<u32>;

    fn set_exposure_time(&mut self, exposure_micros: u32, stream: StreamId) -> NativeResult<()>;
    fn set_exposure_mode(&mut self, mode: ExposureMode, stream: StreamId) -> NativeResult<()>;
    fn exposure_mode(&self, stream: StreamId) -> NativeResult<ExposureMode>;
    fn exposure_limits(&self, stream: StreamId) -> NativeResult<ExposureLimits>;

    fn set_frame_rate(&mut self, fps: u16) -> NativeResult<()>;
    fn frame_rate(&self) -> NativeResult<u16>;
    fn max_frame_rate(&self) -> NativeResult<u16>;

    fn start_capture(&mut self) -> NativeResult<()>;
    fn stop_capture(&mut self) -> NativeResult<()>;

    fn start_recording(&mut self, config: &RecordingConfig) -> NativeResult<()>;
    /// Returns the number of frames written.
    fn stop_recording(&mut self) -> NativeResult<u32>;

    fn max_sensor_width(&self) -> NativeResult<u16>;
    fn max_sensor_height(&self) -> NativeResult<u16>;
    fn lens_parameters(&self) -> NativeResult<LensParameters>;
    fn is_calibrated(&self) -> NativeResult<bool>;
    fn is_connected(&self) -> NativeResult<bool>;

    /// Playback only.
    fn seek(&mut self, frame: u32) -> NativeResult<()>;
    /// Playback only.
    fn frame_count(&self) -> NativeResult<u32>;

    /// Route every delivery of this camera through `sink` from now on.
    fn attach(&mut self, sink: DeliverySink);

    /// Tear down the native object. Must not return before every delivery thread
    /// owned by the camera has been joined.
    fn destroy(self: Box<Self>);
}

/// Exclusive owner of an opened native camera.
pub struct NativeHandle {
    camera: Option<Box<dyn NativeCamera>>,
}

impl NativeHandle {
    pub fn new(camera: Box<dyn NativeCamera>) -> Self {
        Self {
            camera: Some(camera),
        }
    }

    pub fn is_released(&self) -> bool {
        self.camera.is_none()
    }

    pub fn get(&self) -> Result<&dyn NativeCamera> {
        self.camera.as_deref().ok_or(CameraError::SessionClosed)
    }

    pub fn get_mut(&mut self) -> Result<&mut (dyn NativeCamera + 'static)> {
        self.camera.as_deref_mut().ok_or(CameraError::SessionClosed)
    }

    /// Move ownership of the camera into a new handle, leaving this one released.
    pub fn take(&mut self) -> NativeHandle {
        NativeHandle {
            camera: self.camera.take(),
        }
    }

    /// Destroy the native camera. Later calls do nothing.
    pub fn release(&mut self) {
        if let Some(camera) = self.camera.take() {
            log::debug!("Destroying native camera");
            camera.destroy();
        }
    }
}

impl Drop for NativeHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeHandle")
            .field("released", &self.is_released())
            .finish()
    }
}
