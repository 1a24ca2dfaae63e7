//! In-process stand-ins for the native library and the platform USB host
//!
//! [`MockCamera`] behaves like a small live camera or a playback file. Deliveries
//! are queued through a channel and dispatched by a dedicated thread, the same
//! way the native library calls back from its own threads. A [`MockControl`]
//! handle drives the deliveries and exposes call counters.

use super::synthetic_data::SensorCharacteristics;
use crate::device::{DeviceIdentity, UsbDevice};
use crate::errors::{CameraError, CameraStatus, Result};
use crate::listeners::DeliverySink;
use crate::native::{NativeCamera, NativeLibrary, NativeResult};
use crate::permissions::{PermissionEvent, PermissionResponder, PlatformContext, UsbHost};
use crate::session::RecordingConfig;
use crate::types::{
    AccessLevel, CameraEvent, DepthData, DepthImage, ExposureLimits, ExposureMode, ExposureUpdate,
    IrImage, LensParameters, SparsePointCloud, StreamId,
};
use crossbeam_channel::{Receiver, Sender};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

enum Delivery {
    DepthData(DepthData),
    DepthImage(DepthImage),
    SparsePointCloud(SparsePointCloud),
    IrImage(IrImage),
    Event(CameraEvent),
    Exposure(ExposureUpdate),
    Flush(Sender<()>),
}

#[derive(Default)]
struct Shared {
    sender: Mutex<Option<Sender<Delivery>>>,
    capturing: AtomicBool,
    connected: AtomicBool,
    recording: AtomicBool,
    max_frames: AtomicU32,
    frames_recorded: AtomicU32,
    delivered: AtomicUsize,
    finalize_count: AtomicUsize,
    start_capture_calls: AtomicUsize,
    stop_capture_calls: AtomicUsize,
    fail_next: Mutex<Option<CameraStatus>>,
}

impl Shared {
    fn new() -> Arc<Self> {
        let shared = Shared::default();
        shared.connected.store(true, Ordering::SeqCst);
        Arc::new(shared)
    }

    fn send(&self, delivery: Delivery) -> bool {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        match sender.as_ref() {
            Some(sender) => sender.send(delivery).is_ok(),
            None => false,
        }
    }
}

/// Test-side handle of a [`MockCamera`].
#[derive(Clone)]
pub struct MockControl {
    shared: Arc<Shared>,
}

impl MockControl {
    /// Queue a depth frame. It reaches listeners only while capture is running.
    pub fn deliver_depth_data(&self, frame: DepthData) -> bool {
        self.shared.send(Delivery::DepthData(frame))
    }

    pub fn deliver_depth_image(&self, image: DepthImage) -> bool {
        self.shared.send(Delivery::DepthImage(image))
    }

    pub fn deliver_sparse_point_cloud(&self, cloud: SparsePointCloud) -> bool {
        self.shared.send(Delivery::SparsePointCloud(cloud))
    }

    pub fn deliver_ir_image(&self, image: IrImage) -> bool {
        self.shared.send(Delivery::IrImage(image))
    }

    pub fn deliver_event(&self, event: CameraEvent) -> bool {
        self.shared.send(Delivery::Event(event))
    }

    pub fn deliver_exposure(&self, update: ExposureUpdate) -> bool {
        self.shared.send(Delivery::Exposure(update))
    }

    /// Block until every delivery queued so far was dispatched. Returns `false`
    /// when the camera is gone or not attached.
    pub fn flush(&self) -> bool {
        let (ack_tx, ack_rx) = crossbeam_channel::bounded(1);
        if !self.shared.send(Delivery::Flush(ack_tx)) {
            return false;
        }
        ack_rx.recv_timeout(FLUSH_TIMEOUT).is_ok()
    }

    /// Pull the cable: every later native call fails with `Disconnected` and a
    /// fatal disconnect event is queued.
    pub fn disconnect(&self) -> bool {
        self.shared.connected.store(false, Ordering::SeqCst);
        self.deliver_event(CameraEvent::disconnected("USB transport lost"))
    }

    /// The next native call fails with `status`.
    pub fn fail_next(&self, status: CameraStatus) {
        *self
            .shared
            .fail_next
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(status);
    }

    pub fn finalize_count(&self) -> usize {
        self.shared.finalize_count.load(Ordering::SeqCst)
    }

    pub fn start_capture_calls(&self) -> usize {
        self.shared.start_capture_calls.load(Ordering::SeqCst)
    }

    pub fn stop_capture_calls(&self) -> usize {
        self.shared.stop_capture_calls.load(Ordering::SeqCst)
    }

    pub fn is_capturing(&self) -> bool {
        self.shared.capturing.load(Ordering::SeqCst)
    }

    /// Frame deliveries that reached a listener.
    pub fn delivered(&self) -> usize {
        self.shared.delivered.load(Ordering::SeqCst)
    }

    pub fn frames_recorded(&self) -> u32 {
        self.shared.frames_recorded.load(Ordering::SeqCst)
    }
}

fn run_delivery(receiver: Receiver<Delivery>, sink: DeliverySink, shared: Arc<Shared>) {
    for delivery in receiver {
        let capturing = shared.capturing.load(Ordering::SeqCst);
        let dispatched = match delivery {
            Delivery::DepthData(frame) if capturing => {
                let dispatched = sink.depth_data(&frame);
                record_frame(&sink, &shared);
                dispatched
            }
            Delivery::DepthImage(image) if capturing => sink.depth_image(&image),
            Delivery::SparsePointCloud(cloud) if capturing => sink.sparse_point_cloud(&cloud),
            Delivery::IrImage(image) if capturing => sink.ir_image(&image),
            Delivery::Event(event) => {
                sink.event(&event);
                false
            }
            Delivery::Exposure(update) => {
                sink.exposure(&update);
                false
            }
            Delivery::Flush(ack) => {
                ack.send(()).ok();
                false
            }
            _ => false,
        };
        if dispatched {
            shared.delivered.fetch_add(1, Ordering::SeqCst);
        }
    }
    log::debug!("Mock delivery thread finished");
}

fn record_frame(sink: &DeliverySink, shared: &Shared) {
    if !shared.recording.load(Ordering::SeqCst) {
        return;
    }
    let recorded = shared.frames_recorded.fetch_add(1, Ordering::SeqCst) + 1;
    let max_frames = shared.max_frames.load(Ordering::SeqCst);
    if max_frames > 0
        && recorded >= max_frames
        && shared.recording.swap(false, Ordering::SeqCst)
    {
        sink.recording_stopped(recorded);
    }
}

/// Simulated native camera.
pub struct MockCamera {
    shared: Arc<Shared>,
    receiver: Option<Receiver<Delivery>>,
    worker: Option<JoinHandle<()>>,
    sensor: SensorCharacteristics,
    playback_frames: Option<u32>,
    position: u32,
    initialized: bool,
    external_trigger: bool,
    use_case: String,
    exposure_time: u32,
    exposure_mode: ExposureMode,
    frame_rate: u16,
}

impl MockCamera {
    fn with_source(playback_frames: Option<u32>) -> (Self, MockControl) {
        let shared = Shared::new();
        let (sender, receiver) = crossbeam_channel::unbounded();
        *shared.sender.lock().unwrap_or_else(PoisonError::into_inner) = Some(sender);

        let sensor = SensorCharacteristics::pico_flexx();
        let camera = Self {
            shared: shared.clone(),
            receiver: Some(receiver),
            worker: None,
            use_case: String::new(),
            exposure_time: sensor.exposure_limits.max,
            exposure_mode: ExposureMode::Manual,
            frame_rate: 5,
            sensor,
            playback_frames,
            position: 0,
            initialized: false,
            external_trigger: false,
        };
        (camera, MockControl { shared })
    }

    pub fn live() -> (Self, MockControl) {
        Self::with_source(None)
    }

    pub fn playback(frame_count: u32) -> (Self, MockControl) {
        Self::with_source(Some(frame_count))
    }

    fn guard(&self) -> NativeResult<()> {
        if let Some(status) = self
            .shared
            .fail_next
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            return Err(status);
        }
        if !self.shared.connected.load(Ordering::SeqCst) {
            return Err(CameraStatus::Disconnected);
        }
        Ok(())
    }

    fn require_initialized(&self) -> NativeResult<()> {
        self.guard()?;
        if !self.initialized {
            return Err(CameraStatus::DeviceNotInitialized);
        }
        Ok(())
    }

    fn check_stream(&self, stream: StreamId) -> NativeResult<()> {
        if stream != StreamId::DEFAULT {
            return Err(CameraStatus::InvalidValue);
        }
        Ok(())
    }
}

impl NativeCamera for MockCamera {
    fn initialize(&mut self) -> NativeResult<()> {
        self.guard()?;
        if self.initialized {
            return Err(CameraStatus::DeviceAlreadyInitialized);
        }
        self.initialized = true;
        self.use_case = self.sensor.use_cases[0].to_string();
        Ok(())
    }

    fn set_external_trigger(&mut self, enabled: bool) -> NativeResult<()> {
        self.guard()?;
        if self.initialized {
            return Err(CameraStatus::DeviceAlreadyInitialized);
        }
        self.external_trigger = enabled;
        Ok(())
    }

    fn id(&self) -> NativeResult<String> {
        self.guard()?;
        Ok("0005-4804-0050-1517".to_string())
    }

    fn camera_name(&self) -> NativeResult<String> {
        self.guard()?;
        Ok(self.sensor.camera_name.to_string())
    }

    fn camera_info(&self) -> NativeResult<Vec<(String, String)>> {
        self.guard()?;
        Ok(vec![
            ("BRIDGE_TYPE".to_string(), "UVC".to_string()),
            ("EXTERNAL_TRIGGER".to_string(), self.external_trigger.to_string()),
        ])
    }

    fn use_cases(&self) -> NativeResult<Vec<String>> {
        self.guard()?;
        Ok(self.sensor.use_cases.iter().map(|s| s.to_string()).collect())
    }

    fn set_use_case(&mut self, name: &str) -> NativeResult<()> {
        self.require_initialized()?;
        if !self.sensor.use_cases.contains(&name) {
            return Err(CameraStatus::UseCaseNotSupported);
        }
        self.use_case = name.to_string();
        Ok(())
    }

    fn current_use_case(&self) -> NativeResult<String> {
        self.require_initialized()?;
        Ok(self.use_case.clone())
    }

    fn streams(&self) -> NativeResult<Vec<StreamId>> {
        self.require_initialized()?;
        Ok(vec![StreamId::DEFAULT])
    }

    fn number_of_streams(&self, use_case: &str) -> NativeResult<u32> {
        self.guard()?;
        if !self.sensor.use_cases.contains(&use_case) {
            return Err(CameraStatus::UseCaseNotSupported);
        }
        Ok(1)
    }

    fn set_exposure_time(&mut self, exposure_micros: u32, stream: StreamId) -> NativeResult<()> {
        self.require_initialized()?;
        self.check_stream(stream)?;
        if self.exposure_mode == ExposureMode::Automatic {
            return Err(CameraStatus::ExposureModeInvalid);
        }
        if !self.sensor.exposure_limits.contains(exposure_micros) {
            return Err(CameraStatus::ExposureTimeNotSupported);
        }
        self.exposure_time = exposure_micros;
        self.shared.send(Delivery::Exposure(ExposureUpdate {
            exposure_time: exposure_micros,
            stream_id: stream,
        }));
        Ok(())
    }

    fn set_exposure_mode(&mut self, mode: ExposureMode, stream: StreamId) -> NativeResult<()> {
        self.require_initialized()?;
        self.check_stream(stream)?;
        self.exposure_mode = mode;
        Ok(())
    }

    fn exposure_mode(&self, stream: StreamId) -> NativeResult<ExposureMode> {
        self.guard()?;
        self.check_stream(stream)?;
        Ok(self.exposure_mode)
    }

    fn exposure_limits(&self, stream: StreamId) -> NativeResult<ExposureLimits> {
        self.guard()?;
        self.check_stream(stream)?;
        Ok(self.sensor.exposure_limits)
    }

    fn set_frame_rate(&mut self, fps: u16) -> NativeResult<()> {
        self.require_initialized()?;
        if fps == 0 || fps > self.sensor.max_frame_rate {
            return Err(CameraStatus::FrameRateNotSupported);
        }
        self.frame_rate = fps;
        Ok(())
    }

    fn frame_rate(&self) -> NativeResult<u16> {
        self.guard()?;
        Ok(self.frame_rate)
    }

    fn max_frame_rate(&self) -> NativeResult<u16> {
        self.guard()?;
        Ok(self.sensor.max_frame_rate)
    }

    fn start_capture(&mut self) -> NativeResult<()> {
        self.require_initialized()?;
        self.shared.start_capture_calls.fetch_add(1, Ordering::SeqCst);
        self.shared.capturing.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop_capture(&mut self) -> NativeResult<()> {
        self.guard()?;
        self.shared.stop_capture_calls.fetch_add(1, Ordering::SeqCst);
        self.shared.capturing.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn start_recording(&mut self, config: &RecordingConfig) -> NativeResult<()> {
        self.require_initialized()?;
        if self.playback_frames.is_some() {
            return Err(CameraStatus::NotImplemented);
        }
        self.shared.frames_recorded.store(0, Ordering::SeqCst);
        self.shared.max_frames.store(config.max_frames, Ordering::SeqCst);
        self.shared.recording.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop_recording(&mut self) -> NativeResult<u32> {
        self.guard()?;
        self.shared.recording.store(false, Ordering::SeqCst);
        Ok(self.shared.frames_recorded.load(Ordering::SeqCst))
    }

    fn max_sensor_width(&self) -> NativeResult<u16> {
        self.guard()?;
        Ok(self.sensor.width)
    }

    fn max_sensor_height(&self) -> NativeResult<u16> {
        self.guard()?;
        Ok(self.sensor.height)
    }

    fn lens_parameters(&self) -> NativeResult<LensParameters> {
        self.guard()?;
        Ok(LensParameters {
            principal_point: (111.2, 86.4),
            focal_length: (210.9, 210.9),
            distortion_tangential: (0.0, 0.0),
            distortion_radial: [0.26, -4.73, 8.64],
        })
    }

    fn is_calibrated(&self) -> NativeResult<bool> {
        self.guard()?;
        Ok(true)
    }

    fn is_connected(&self) -> NativeResult<bool> {
        Ok(self.shared.connected.load(Ordering::SeqCst))
    }

    fn seek(&mut self, frame: u32) -> NativeResult<()> {
        self.guard()?;
        match self.playback_frames {
            None => Err(CameraStatus::NotImplemented),
            Some(count) if frame >= count => Err(CameraStatus::OutOfBounds),
            Some(_) => {
                self.position = frame;
                Ok(())
            }
        }
    }

    fn frame_count(&self) -> NativeResult<u32> {
        self.guard()?;
        self.playback_frames.ok_or(CameraStatus::NotImplemented)
    }

    fn attach(&mut self, sink: DeliverySink) {
        let Some(receiver) = self.receiver.take() else {
            log::warn!("Mock camera attached twice; keeping the first sink");
            return;
        };
        let shared = self.shared.clone();
        let spawned = std::thread::Builder::new()
            .name("tofcam-mock-delivery".to_string())
            .spawn(move || run_delivery(receiver, sink, shared));
        match spawned {
            Ok(handle) => self.worker = Some(handle),
            Err(e) => log::error!("Failed to spawn mock delivery thread: {}", e),
        }
    }

    fn destroy(mut self: Box<Self>) {
        self.shared.capturing.store(false, Ordering::SeqCst);
        self.shared
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::warn!("Mock delivery thread panicked");
            }
        }
        self.shared.finalize_count.fetch_add(1, Ordering::SeqCst);
    }
}

/// Simulated native library.
#[derive(Default)]
pub struct MockLibrary {
    codes: Mutex<HashMap<String, AccessLevel>>,
    recordings: Mutex<HashMap<PathBuf, u32>>,
    opened: Mutex<Vec<MockControl>>,
    fail_open: AtomicBool,
}

impl MockLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `code` unlock `level`. Unknown codes yield L1.
    pub fn with_activation_code(self, code: &str, level: AccessLevel) -> Self {
        self.codes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(code.to_string(), level);
        self
    }

    /// Make `path` openable as a playback file with `frames` frames.
    pub fn with_recording(self, path: impl Into<PathBuf>, frames: u32) -> Self {
        self.recordings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.into(), frames);
        self
    }

    pub fn fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    pub fn opened_count(&self) -> usize {
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Control handle of the most recently opened camera.
    pub fn last_opened(&self) -> Option<MockControl> {
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    fn track(&self, camera: MockCamera, control: MockControl) -> Box<dyn NativeCamera> {
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(control);
        Box::new(camera)
    }
}

impl NativeLibrary for MockLibrary {
    fn access_level(&self, activation_code: &str) -> NativeResult<AccessLevel> {
        let codes = self.codes.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(codes.get(activation_code).copied().unwrap_or(AccessLevel::L1))
    }

    fn open_usb(&self, identity: DeviceIdentity, _level: AccessLevel) -> NativeResult<Box<dyn NativeCamera>> {
        if self.fail_open.load(Ordering::SeqCst) || identity.file_descriptor < 0 {
            return Err(CameraStatus::CouldNotOpen);
        }
        let (camera, control) = MockCamera::live();
        Ok(self.track(camera, control))
    }

    fn open_file(&self, path: &Path, _level: AccessLevel) -> NativeResult<Box<dyn NativeCamera>> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(CameraStatus::CouldNotOpen);
        }
        let frames = self
            .recordings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .copied()
            .ok_or(CameraStatus::FileNotFound)?;
        let (camera, control) = MockCamera::playback(frames);
        Ok(self.track(camera, control))
    }
}

/// How [`MockUsbHost`] answers permission requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionScript {
    /// Keep the responder for the test to answer via [`MockUsbHost::take_responder`].
    Manual,
    Grant,
    Deny,
    /// Answer twice: granted, then denied.
    GrantTwice,
    /// Answer without a device reference.
    Malformed,
}

/// Simulated platform USB service.
pub struct MockUsbHost {
    devices: Mutex<Vec<UsbDevice>>,
    pre_granted: AtomicBool,
    script: Mutex<PermissionScript>,
    pending: Mutex<Option<PermissionResponder>>,
    requests: AtomicUsize,
    next_fd: AtomicI32,
    fail_open: AtomicBool,
}

impl MockUsbHost {
    pub fn new() -> Self {
        Self {
            devices: Mutex::new(Vec::new()),
            pre_granted: AtomicBool::new(false),
            script: Mutex::new(PermissionScript::Manual),
            pending: Mutex::new(None),
            requests: AtomicUsize::new(0),
            next_fd: AtomicI32::new(40),
            fail_open: AtomicBool::new(false),
        }
    }

    pub fn with_device(self, device: UsbDevice) -> Self {
        self.devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(device);
        self
    }

    pub fn with_script(self, script: PermissionScript) -> Self {
        *self.script.lock().unwrap_or_else(PoisonError::into_inner) = script;
        self
    }

    pub fn pre_granted(self) -> Self {
        self.pre_granted.store(true, Ordering::SeqCst);
        self
    }

    pub fn fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    pub fn permission_requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn take_responder(&self) -> Option<PermissionResponder> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl Default for MockUsbHost {
    fn default() -> Self {
        Self::new()
    }
}

impl UsbHost for MockUsbHost {
    fn devices(&self) -> Vec<UsbDevice> {
        self.devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn has_permission(&self, _device: &UsbDevice) -> bool {
        self.pre_granted.load(Ordering::SeqCst)
    }

    fn request_permission(&self, device: &UsbDevice, responder: PermissionResponder) {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let script = *self.script.lock().unwrap_or_else(PoisonError::into_inner);

        let events = match script {
            PermissionScript::Manual => {
                *self.pending.lock().unwrap_or_else(PoisonError::into_inner) = Some(responder);
                return;
            }
            PermissionScript::Grant => vec![PermissionEvent::granted(device.clone())],
            PermissionScript::Deny => vec![PermissionEvent::denied(device.clone())],
            PermissionScript::GrantTwice => vec![
                PermissionEvent::granted(device.clone()),
                PermissionEvent::denied(device.clone()),
            ],
            PermissionScript::Malformed => vec![PermissionEvent::without_device()],
        };

        // Platform answers arrive on their own thread.
        let spawned = std::thread::Builder::new()
            .name("mock-usb-permission".to_string())
            .spawn(move || {
                for event in events {
                    responder.deliver(event);
                }
            });
        if let Err(e) = spawned {
            log::error!("Failed to spawn mock permission thread: {}", e);
        }
    }

    fn open(&self, device: &UsbDevice) -> Result<DeviceIdentity> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(CameraError::RuntimeError(format!(
                "could not open {}",
                device
            )));
        }
        Ok(DeviceIdentity::new(
            device.vendor_id,
            device.product_id,
            self.next_fd.fetch_add(1, Ordering::SeqCst),
        ))
    }
}

/// Platform context backed by an optional [`MockUsbHost`].
pub struct MockPlatform {
    host: Option<Arc<MockUsbHost>>,
}

impl MockPlatform {
    pub fn new(host: Arc<MockUsbHost>) -> Self {
        Self { host: Some(host) }
    }

    pub fn without_usb() -> Self {
        Self { host: None }
    }
}

impl PlatformContext for MockPlatform {
    fn usb_host(&self) -> Option<Arc<dyn UsbHost>> {
        self.host.clone().map(|host| host as Arc<dyn UsbHost>)
    }
}
