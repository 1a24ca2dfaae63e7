use super::recording::RecordingConfig;
use super::state::{SessionLink, SessionState};
use crate::errors::{CameraError, CameraStatus, Result};
use crate::listeners::{DeliverySink, ListenerKind, ListenerRegistry};
use crate::native::{NativeCamera, NativeHandle, NativeResult};
use crate::types::{
    AccessLevel, CameraEvent, DepthData, DepthImage, ExposureLimits, ExposureMode, ExposureUpdate,
    IrImage, LensParameters, SparsePointCloud, StreamId,
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// Where a session's frames come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionSource {
    Usb,
    Playback(PathBuf),
}

impl SessionSource {
    pub fn is_playback(&self) -> bool {
        matches!(self, SessionSource::Playback(_))
    }
}

#[derive(Debug, Clone, Copy)]
struct Status {
    state: SessionState,
    capturing: bool,
}

/// One opened camera.
///
/// All operations take `&self`; the session can be shared behind an `Arc`.
/// Operations are meant for one control thread. Listener bodies run on the
/// camera's delivery threads and must not call back into their own session: such
/// calls fail with [`CameraError::LogicError`]. Calls into other sessions are fine.
///
/// [`CameraSession::close`] is the normal end of a session. Dropping an open
/// session closes it as well; when the last owner is dropped inside one of the
/// session's own listeners, the native camera is destroyed on a separate thread.
pub struct CameraSession {
    id: Uuid,
    access_level: AccessLevel,
    source: SessionSource,
    control: Mutex<NativeHandle>,
    // Held only briefly, so listeners may read it while `close` waits on them.
    status: Mutex<Status>,
    registry: Arc<ListenerRegistry>,
    link: Arc<SessionLink>,
    sink: DeliverySink,
}

impl CameraSession {
    pub(crate) fn open(
        mut camera: Box<dyn NativeCamera>,
        access_level: AccessLevel,
        source: SessionSource,
    ) -> Self {
        let registry = Arc::new(ListenerRegistry::new());
        let link = Arc::new(SessionLink::new());
        let sink = DeliverySink::new(registry.clone(), link.clone());
        camera.attach(sink.clone());

        let id = Uuid::new_v4();
        log::info!(
            "Opened camera session {} ({:?}, access level {})",
            id,
            source,
            access_level
        );

        Self {
            id,
            access_level,
            source,
            control: Mutex::new(NativeHandle::new(camera)),
            status: Mutex::new(Status {
                state: SessionState::Created,
                capturing: false,
            }),
            registry,
            link,
            sink,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.id
    }

    pub fn access_level(&self) -> AccessLevel {
        self.access_level
    }

    pub fn source(&self) -> &SessionSource {
        &self.source
    }

    pub fn state(&self) -> SessionState {
        self.status().state
    }

    pub fn is_capturing(&self) -> bool {
        self.status().capturing
    }

    pub fn is_recording(&self) -> bool {
        self.link.recording().is_active()
    }

    pub fn is_closed(&self) -> bool {
        self.state() == SessionState::Closed
    }

    fn lock(&self) -> MutexGuard<'_, NativeHandle> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn status(&self) -> Status {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update(&self, change: impl FnOnce(&mut Status)) {
        change(&mut self.status.lock().unwrap_or_else(PoisonError::into_inner));
    }

    fn reject_reentrant(&self) -> Result<()> {
        if self.registry.is_dispatching() {
            return Err(CameraError::LogicError(
                "session operations are not allowed inside a listener".to_string(),
            ));
        }
        Ok(())
    }

    /// Lock for an operation that needs an open session.
    fn open_control(&self, require_connected: bool) -> Result<MutexGuard<'_, NativeHandle>> {
        self.reject_reentrant()?;
        let handle = self.lock();
        if self.status().state == SessionState::Closed {
            return Err(CameraError::SessionClosed);
        }
        if require_connected && !self.link.is_connected() {
            return Err(CameraError::NotConnected);
        }
        Ok(handle)
    }

    fn initialized_control(&self) -> Result<MutexGuard<'_, NativeHandle>> {
        let handle = self.open_control(true)?;
        if self.status().state == SessionState::Created {
            return Err(CameraError::DeviceNotInitialized);
        }
        Ok(handle)
    }

    fn live_only(&self, operation: &str) -> Result<()> {
        if self.source.is_playback() {
            return Err(CameraError::LogicError(format!(
                "{} is not available during playback",
                operation
            )));
        }
        Ok(())
    }

    fn playback_only(&self, operation: &str) -> Result<()> {
        if !self.source.is_playback() {
            return Err(CameraError::LogicError(format!(
                "{} is only available during playback",
                operation
            )));
        }
        Ok(())
    }

    fn check<T>(&self, result: NativeResult<T>, operation: &str) -> Result<T> {
        result.map_err(|status| {
            if status == CameraStatus::Disconnected {
                self.link.mark_disconnected();
            }
            log::error!("{} failed on session {}: {}", operation, self.id, status);
            CameraError::from(status)
        })
    }

    fn query<T>(
        &self,
        operation: &str,
        call: impl FnOnce(&dyn NativeCamera) -> NativeResult<T>,
    ) -> Result<T> {
        let handle = self.open_control(true)?;
        self.check(call(handle.get()?), operation)
    }

    // Lifecycle

    pub fn initialize(&self) -> Result<()> {
        let mut handle = self.open_control(true)?;
        if self.status().state == SessionState::Initialized {
            return Err(CameraError::DeviceAlreadyInitialized);
        }

        let result = handle.get_mut()?.initialize();
        self.check(result, "initialize")?;
        self.update(|status| status.state = SessionState::Initialized);
        log::info!("Camera session {} initialized", self.id);
        Ok(())
    }

    /// Only valid before [`CameraSession::initialize`].
    pub fn set_external_trigger(&self, enabled: bool) -> Result<()> {
        self.live_only("set_external_trigger")?;
        let mut handle = self.open_control(true)?;
        if self.status().state != SessionState::Created {
            return Err(CameraError::DeviceAlreadyInitialized);
        }

        let result = handle.get_mut()?.set_external_trigger(enabled);
        self.check(result, "set_external_trigger")
    }

    /// Stop capture and recording, wait for running callbacks, then destroy the
    /// native camera. Calling it again does nothing.
    pub fn close(&self) -> Result<()> {
        self.reject_reentrant()?;
        let mut handle = self.lock();
        if self.wind_down(&mut *handle) {
            handle.release();
            log::info!("Camera session {} closed", self.id);
        }
        Ok(())
    }

    /// Everything `close` does short of destroying the native camera. Returns
    /// false if the session was already closed.
    fn wind_down(&self, handle: &mut NativeHandle) -> bool {
        let status = self.status();
        if status.state == SessionState::Closed {
            return false;
        }

        if self.link.recording().is_active() {
            match handle.get_mut().map(|camera| camera.stop_recording()) {
                Ok(Ok(frames)) => {
                    self.sink.recording_stopped(frames);
                }
                Ok(Err(status)) => log::warn!("Failed to stop recording on close: {}", status),
                Err(e) => log::warn!("Failed to stop recording on close: {}", e),
            }
        }

        if status.capturing {
            if let Ok(camera) = handle.get_mut() {
                if let Err(status) = camera.stop_capture() {
                    log::warn!("Failed to stop capture on close: {}", status);
                }
            }
        }

        self.registry.shutdown();
        self.update(|status| {
            status.state = SessionState::Closed;
            status.capturing = false;
        });
        true
    }

    // Configuration

    pub fn set_use_case(&self, name: &str) -> Result<()> {
        let mut handle = self.initialized_control()?;
        let result = handle.get_mut()?.set_use_case(name);
        self.check(result, "set_use_case")?;
        log::info!("Session {} switched to use case {}", self.id, name);
        Ok(())
    }

    /// Values outside the stream's current exposure limits are rejected, not
    /// clamped.
    pub fn set_exposure_time(&self, exposure_micros: u32, stream: StreamId) -> Result<()> {
        self.live_only("set_exposure_time")?;
        let mut handle = self.initialized_control()?;

        let limits = self.check(
            handle.get()?.exposure_limits(stream),
            "exposure_limits",
        )?;
        if !limits.contains(exposure_micros) {
            return Err(CameraError::OutOfBounds(format!(
                "exposure time {} outside [{}, {}] for stream {}",
                exposure_micros, limits.min, limits.max, stream
            )));
        }

        let result = handle
            .get_mut()?
            .set_exposure_time(exposure_micros, stream);
        self.check(result, "set_exposure_time")
    }

    pub fn set_exposure_mode(&self, mode: ExposureMode, stream: StreamId) -> Result<()> {
        self.live_only("set_exposure_mode")?;
        let mut handle = self.initialized_control()?;
        let result = handle.get_mut()?.set_exposure_mode(mode, stream);
        self.check(result, "set_exposure_mode")
    }

    pub fn set_frame_rate(&self, fps: u16) -> Result<()> {
        self.live_only("set_frame_rate")?;
        let mut handle = self.initialized_control()?;
        let result = handle.get_mut()?.set_frame_rate(fps);
        self.check(result, "set_frame_rate")
    }

    // Capture

    /// Requires at least one data listener. Starting an already running capture
    /// succeeds without touching the camera.
    pub fn start_capture(&self) -> Result<()> {
        let mut handle = self.initialized_control()?;
        if !self.registry.has_data_listener() {
            return Err(CameraError::LogicError(
                "no data listener registered".to_string(),
            ));
        }
        if self.status().capturing {
            return Ok(());
        }

        let result = handle.get_mut()?.start_capture();
        self.check(result, "start_capture")?;
        self.update(|status| status.capturing = true);
        log::info!("Capture started on session {}", self.id);
        Ok(())
    }

    pub fn stop_capture(&self) -> Result<()> {
        let mut handle = self.open_control(true)?;
        if !self.status().capturing {
            return Ok(());
        }

        let result = handle.get_mut()?.stop_capture();
        self.check(result, "stop_capture")?;
        self.update(|status| status.capturing = false);
        log::info!("Capture stopped on session {}", self.id);
        Ok(())
    }

    // Recording

    pub fn start_recording(&self, config: &RecordingConfig) -> Result<()> {
        self.live_only("start_recording")?;
        let mut handle = self.initialized_control()?;
        if !self.access_level.allows_recording() {
            return Err(CameraError::NotImplemented(format!(
                "recording is not available at access level {}",
                self.access_level
            )));
        }
        config.validate()?;

        if !self.link.recording().begin() {
            return Err(CameraError::LogicError(
                "a recording is already running".to_string(),
            ));
        }

        let result = handle
            .get_mut()
            .map(|camera| camera.start_recording(config));
        match result {
            Ok(Ok(())) => {
                log::info!(
                    "Recording started on session {} to {}",
                    self.id,
                    config.path.display()
                );
                Ok(())
            }
            Ok(Err(status)) => {
                self.link.recording().finish();
                self.check(Err(status), "start_recording")
            }
            Err(e) => {
                self.link.recording().finish();
                Err(e)
            }
        }
    }

    /// Stopping when no recording runs (e.g. it already hit its frame limit)
    /// succeeds without touching the camera.
    pub fn stop_recording(&self) -> Result<()> {
        self.live_only("stop_recording")?;
        let mut handle = self.open_control(true)?;
        if !self.link.recording().is_active() {
            return Ok(());
        }

        let result = handle.get_mut()?.stop_recording();
        let frames = self.check(result, "stop_recording")?;
        self.sink.recording_stopped(frames);
        Ok(())
    }

    // Playback

    pub fn seek(&self, frame: u32) -> Result<()> {
        self.playback_only("seek")?;
        let mut handle = self.open_control(true)?;
        let result = handle.get_mut()?.seek(frame);
        self.check(result, "seek")
    }

    pub fn frame_count(&self) -> Result<u32> {
        self.playback_only("frame_count")?;
        self.query("frame_count", |camera| camera.frame_count())
    }

    // Queries

    pub fn camera_id(&self) -> Result<String> {
        self.query("id", |camera| camera.id())
    }

    pub fn camera_name(&self) -> Result<String> {
        self.query("camera_name", |camera| camera.camera_name())
    }

    pub fn camera_info(&self) -> Result<Vec<(String, String)>> {
        self.query("camera_info", |camera| camera.camera_info())
    }

    pub fn use_cases(&self) -> Result<Vec<String>> {
        self.query("use_cases", |camera| camera.use_cases())
    }

    pub fn current_use_case(&self) -> Result<String> {
        self.query("current_use_case", |camera| camera.current_use_case())
    }

    pub fn streams(&self) -> Result<Vec<StreamId>> {
        self.query("streams", |camera| camera.streams())
    }

    pub fn number_of_streams(&self, use_case: &str) -> Result<u32> {
        self.query("number_of_streams", |camera| camera.number_of_streams(use_case))
    }

    pub fn exposure_mode(&self, stream: StreamId) -> Result<ExposureMode> {
        self.query("exposure_mode", |camera| camera.exposure_mode(stream))
    }

    pub fn exposure_limits(&self, stream: StreamId) -> Result<ExposureLimits> {
        self.query("exposure_limits", |camera| camera.exposure_limits(stream))
    }

    pub fn frame_rate(&self) -> Result<u16> {
        self.query("frame_rate", |camera| camera.frame_rate())
    }

    pub fn max_frame_rate(&self) -> Result<u16> {
        self.query("max_frame_rate", |camera| camera.max_frame_rate())
    }

    pub fn max_sensor_width(&self) -> Result<u16> {
        self.query("max_sensor_width", |camera| camera.max_sensor_width())
    }

    pub fn max_sensor_height(&self) -> Result<u16> {
        self.query("max_sensor_height", |camera| camera.max_sensor_height())
    }

    pub fn lens_parameters(&self) -> Result<LensParameters> {
        self.query("lens_parameters", |camera| camera.lens_parameters())
    }

    pub fn is_calibrated(&self) -> Result<bool> {
        self.query("is_calibrated", |camera| camera.is_calibrated())
    }

    /// False once the transport dropped or the session was closed.
    pub fn is_connected(&self) -> Result<bool> {
        let handle = self.open_control(false)?;
        if !self.link.is_connected() {
            return Ok(false);
        }
        let connected = self.check(handle.get()?.is_connected(), "is_connected")?;
        if !connected {
            self.link.mark_disconnected();
        }
        Ok(connected)
    }

    // Listeners


    pub fn register_depth_data_listener<F>(&self, listener: F) -> Result<()>
    where
        F: Fn(&DepthData) + Send + Sync + 'static,
    {
        self.reject_reentrant()?;
        self.registry.set_depth_data_listener(Arc::new(listener))
    }

    pub fn register_depth_image_listener<F>(&self, listener: F) -> Result<()>
    where
        F: Fn(&DepthImage) + Send + Sync + 'static,
    {
        self.reject_reentrant()?;
        self.registry.set_depth_image_listener(Arc::new(listener))
    }

    pub fn register_sparse_point_cloud_listener<F>(&self, listener: F) -> Result<()>
    where
        F: Fn(&SparsePointCloud) + Send + Sync + 'static,
    {
        self.reject_reentrant()?;
        self.registry
            .set_sparse_point_cloud_listener(Arc::new(listener))
    }

    pub fn register_ir_image_listener<F>(&self, listener: F) -> Result<()>
    where
        F: Fn(&IrImage) + Send + Sync + 'static,
    {
        self.reject_reentrant()?;
        self.registry.set_ir_image_listener(Arc::new(listener))
    }

    pub fn register_event_listener<F>(&self, listener: F) -> Result<()>
    where
        F: Fn(&CameraEvent) + Send + Sync + 'static,
    {
        self.reject_reentrant()?;
        self.registry.set_event_listener(Arc::new(listener))
    }

    pub fn register_exposure_listener<F>(&self, listener: F) -> Result<()>
    where
        F: Fn(&ExposureUpdate) + Send + Sync + 'static,
    {
        self.reject_reentrant()?;
        self.registry.set_exposure_listener(Arc::new(listener))
    }

    /// The listener receives the number of recorded frames.
    pub fn register_record_stop_listener<F>(&self, listener: F) -> Result<()>
    where
        F: Fn(&u32) + Send + Sync + 'static,
    {
        self.reject_reentrant()?;
        self.registry.set_record_stop_listener(Arc::new(listener))
    }

    /// Unregistering an empty slot is a no-op.
    pub fn unregister_listener(&self, kind: ListenerKind) -> Result<()> {
        self.reject_reentrant()?;
        self.registry.clear(kind);
        Ok(())
    }

    pub fn unregister_depth_data_listener(&self) -> Result<()> {
        self.unregister_listener(ListenerKind::DepthData)
    }

    pub fn unregister_depth_image_listener(&self) -> Result<()> {
        self.unregister_listener(ListenerKind::DepthImage)
    }

    pub fn unregister_sparse_point_cloud_listener(&self) -> Result<()> {
        self.unregister_listener(ListenerKind::SparsePointCloud)
    }

    pub fn unregister_ir_image_listener(&self) -> Result<()> {
        self.unregister_listener(ListenerKind::IrImage)
    }

    pub fn unregister_event_listener(&self) -> Result<()> {
        self.unregister_listener(ListenerKind::Event)
    }

    pub fn unregister_exposure_listener(&self) -> Result<()> {
        self.unregister_listener(ListenerKind::Exposure)
    }

    pub fn unregister_record_stop_listener(&self) -> Result<()> {
        self.unregister_listener(ListenerKind::RecordStop)
    }
}

impl std::fmt::Debug for CameraSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraSession")
            .field("id", &self.id)
            .field("access_level", &self.access_level)
            .field("source", &self.source)
            .finish()
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        if !self.registry.is_dispatching() {
            if let Err(e) = self.close() {
                log::warn!("Failed to close camera session {} on drop: {}", self.id, e);
            }
            return;
        }

        // The last owner went away inside one of this session's listeners.
        // Destroying the camera joins its delivery threads, this one included.
        let mut handle = self
            .control
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if !self.wind_down(&mut handle) {
            return;
        }

        let id = self.id;
        let reaper = std::thread::Builder::new()
            .name("tofcam-session-reaper".to_string())
            .spawn(move || {
                handle.release();
                log::info!("Camera session {} closed", id);
            });
        if let Err(e) = reaper {
            log::error!("Failed to spawn reaper for camera session {}: {}", id, e);
        }
    }
}
