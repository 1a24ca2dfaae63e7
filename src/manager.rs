//! Session creation
//!
//! [`SessionManager`] opens camera sessions either directly, from an already
//! opened USB transport or a recording file, or through the full platform flow:
//! enumerate devices, keep the first supported one, obtain USB permission if
//! needed, open the transport and hand it to the native library.
//!
//! The platform flow reports its result exactly once: either a session through
//! `on_open` or an error through `on_error`. Nothing is retried.

use crate::config::TofCamConfig;
use crate::device::{DeviceFilter, DeviceIdentity, UsbDevice};
use crate::errors::{CameraError, Result};
use crate::native::NativeLibrary;
use crate::permissions::{
    PermissionBroker, PermissionOutcome, PermissionRequest, PlatformContext, UsbHost,
};
use crate::session::{CameraSession, SessionSource};
use crate::types::AccessLevel;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

type OpenCallback = Box<dyn FnOnce(CameraSession) + Send>;
type ErrorCallback = Box<dyn FnOnce(CameraError) + Send>;

/// First step of the platform flow.
enum Discovery {
    Permitted(Arc<dyn UsbHost>, UsbDevice),
    Pending(Arc<dyn UsbHost>, PermissionRequest),
}

/// Permission wait handed to the `tofcam-permission` worker.
struct PermissionJob {
    manager: SessionManager,
    host: Arc<dyn UsbHost>,
    request: PermissionRequest,
    on_open: OpenCallback,
    on_error: ErrorCallback,
}

impl PermissionJob {
    fn run(self) {
        let outcome = self.request.blocking_wait();
        let result = granted_device(outcome)
            .and_then(|device| self.manager.open_device(self.host.as_ref(), &device));
        report(result, self.on_open, self.on_error);
    }
}

fn report(result: Result<CameraSession>, on_open: OpenCallback, on_error: ErrorCallback) {
    match result {
        Ok(session) => on_open(session),
        Err(e) => {
            log::warn!("Camera session creation failed: {}", e);
            on_error(e)
        }
    }
}

fn granted_device(outcome: PermissionOutcome) -> Result<UsbDevice> {
    match outcome {
        PermissionOutcome::Granted(device) => Ok(device),
        PermissionOutcome::Denied(device) => Err(CameraError::PermissionDenied(format!(
            "USB permission denied for {}",
            device
        ))),
        PermissionOutcome::MalformedRequest => Err(CameraError::RequestError(
            "permission answer did not identify a device".to_string(),
        )),
    }
}

/// Opens camera sessions against a native library.
#[derive(Clone)]
pub struct SessionManager {
    library: Arc<dyn NativeLibrary>,
    activation_code: String,
}

impl SessionManager {
    pub fn new(library: Arc<dyn NativeLibrary>, activation_code: impl Into<String>) -> Self {
        Self {
            library,
            activation_code: activation_code.into(),
        }
    }

    pub fn from_config(library: Arc<dyn NativeLibrary>, config: &TofCamConfig) -> Self {
        Self::new(library, config.manager.activation_code.clone())
    }

    /// Access level unlocked by this manager's activation code.
    pub fn access_level(&self) -> Result<AccessLevel> {
        self.library
            .access_level(&self.activation_code)
            .map_err(CameraError::from)
    }

    /// Open a live session on an already opened USB transport.
    pub fn create_session_from_identity(&self, identity: DeviceIdentity) -> Result<CameraSession> {
        let level = self.access_level()?;
        let camera = self
            .library
            .open_usb(identity, level)
            .map_err(|status| CameraError::RuntimeError(format!("failed to open camera: {}", status)))?;
        Ok(CameraSession::open(camera, level, SessionSource::Usb))
    }

    /// Open a playback session on a recording file.
    pub fn create_session_from_file(&self, path: impl AsRef<Path>) -> Result<CameraSession> {
        let path = path.as_ref();
        let level = self.access_level()?;
        let camera = self.library.open_file(path, level).map_err(|status| {
            log::error!("Failed to open recording {}: {}", path.display(), status);
            CameraError::from(status)
        })?;
        Ok(CameraSession::open(
            camera,
            level,
            SessionSource::Playback(path.to_path_buf()),
        ))
    }

    /// Run the platform flow and report the outcome through exactly one of the
    /// callbacks.
    ///
    /// When permission must be requested the wait happens on a worker thread and
    /// the callbacks run there; otherwise they run before this call returns.
    pub fn create_session<F, E>(&self, ctx: &dyn PlatformContext, on_open: F, on_error: E)
    where
        F: FnOnce(CameraSession) + Send + 'static,
        E: FnOnce(CameraError) + Send + 'static,
    {
        let on_open: OpenCallback = Box::new(on_open);
        let on_error: ErrorCallback = Box::new(on_error);

        match self.discover(ctx) {
            Err(e) => report(Err(e), on_open, on_error),
            Ok(Discovery::Permitted(host, device)) => {
                report(self.open_device(host.as_ref(), &device), on_open, on_error)
            }
            Ok(Discovery::Pending(host, request)) => self.spawn_permission_wait(PermissionJob {
                manager: self.clone(),
                host,
                request,
                on_open,
                on_error,
            }),
        }
    }

    /// Async form of [`SessionManager::create_session`].
    pub async fn open_first_device(&self, ctx: &dyn PlatformContext) -> Result<CameraSession> {
        match self.discover(ctx)? {
            Discovery::Permitted(host, device) => self.open_device(host.as_ref(), &device),
            Discovery::Pending(host, request) => {
                let device = granted_device(request.await)?;
                self.open_device(host.as_ref(), &device)
            }
        }
    }

    fn discover(&self, ctx: &dyn PlatformContext) -> Result<Discovery> {
        let host = ctx.usb_host().ok_or(CameraError::ServiceUnavailable)?;

        let candidates = DeviceFilter::select(host.devices());
        let device = candidates
            .into_iter()
            .next()
            .ok_or(CameraError::NoCameraFound)?;
        log::info!("Found supported camera {}", device);

        let broker = PermissionBroker::new(host.clone());
        if broker.has_permission(&device) {
            return Ok(Discovery::Permitted(host, device));
        }
        let request = broker.request_permission(&device);
        Ok(Discovery::Pending(host, request))
    }

    fn open_device(&self, host: &dyn UsbHost, device: &UsbDevice) -> Result<CameraSession> {
        let identity = host
            .open(device)
            .map_err(|e| CameraError::RuntimeError(format!("failed to open {}: {}", device, e)))?;
        log::info!(
            "Opened USB transport for {} (fd {})",
            device,
            identity.file_descriptor
        );
        self.create_session_from_identity(identity)
            .map_err(|e| match e {
                CameraError::RuntimeError(_) => e,
                other => CameraError::RuntimeError(other.to_string()),
            })
    }

    fn spawn_permission_wait(&self, job: PermissionJob) {
        // Shared so the job can still be reported if the worker never starts.
        let pending = Arc::new(Mutex::new(Some(job)));
        let worker_pending = pending.clone();
        let spawned = std::thread::Builder::new()
            .name("tofcam-permission".to_string())
            .spawn(move || {
                if let Some(job) = take_job(&worker_pending) {
                    job.run();
                }
            });

        if let Err(e) = spawned {
            if let Some(job) = take_job(&pending) {
                report(
                    Err(CameraError::RuntimeError(format!(
                        "failed to spawn permission worker: {}",
                        e
                    ))),
                    job.on_open,
                    job.on_error,
                );
            }
        }
    }
}

fn take_job(pending: &Mutex<Option<PermissionJob>>) -> Option<PermissionJob> {
    pending.lock().unwrap_or_else(PoisonError::into_inner).take()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockLibrary, MockPlatform, MockUsbHost, PermissionScript};

    fn tof_device() -> UsbDevice {
        UsbDevice::new("/dev/bus/usb/001/004", 0x1C28, 0xC012)
    }

    #[test]
    fn test_access_level_from_code() {
        let library = Arc::new(MockLibrary::new().with_activation_code("level3", AccessLevel::L3));
        assert_eq!(
            SessionManager::new(library.clone(), "level3").access_level(),
            Ok(AccessLevel::L3)
        );
        assert_eq!(
            SessionManager::new(library, "").access_level(),
            Ok(AccessLevel::L1)
        );
    }

    #[test]
    fn test_missing_recording_file() {
        let manager = SessionManager::new(Arc::new(MockLibrary::new()), "");
        assert!(matches!(
            manager.create_session_from_file("missing.rrf"),
            Err(CameraError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_granted_device_mapping() {
        assert!(matches!(
            granted_device(PermissionOutcome::Denied(tof_device())),
            Err(CameraError::PermissionDenied(_))
        ));
        assert!(matches!(
            granted_device(PermissionOutcome::MalformedRequest),
            Err(CameraError::RequestError(_))
        ));
    }

    #[test]
    fn test_discover_picks_first_supported_device() {
        let host = Arc::new(
            MockUsbHost::new()
                .with_device(UsbDevice::new("webcam", 0x046D, 0x0825))
                .with_device(tof_device())
                .with_script(PermissionScript::Grant)
                .pre_granted(),
        );
        let manager = SessionManager::new(Arc::new(MockLibrary::new()), "");

        match manager.discover(&MockPlatform::new(host.clone())) {
            Ok(Discovery::Permitted(_, device)) => assert_eq!(device, tof_device()),
            _ => panic!("expected a permitted device"),
        }
        assert_eq!(host.permission_requests(), 0);
    }
}
