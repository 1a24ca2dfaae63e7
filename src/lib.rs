//! tofcam: permissioned sessions and callback dispatch for USB time-of-flight
//! cameras
//!
//! This crate sits between an application and a native depth-processing library.
//! It finds a supported camera on the USB bus, obtains the user's permission,
//! opens the device and exposes it as a [`CameraSession`]. Frames, events and
//! exposure updates produced on the library's own threads are routed to
//! listeners registered on the session.
//!
//! # Features
//! - Vendor filtering of attached USB devices
//! - Single-shot USB permission requests, usable from threads or async code
//! - Session state machine with fail-fast errors for every native status
//! - Seven listener kinds with ordered, race-free delivery
//! - Recording and playback sessions
//!
//! # Usage
//! ```rust,ignore
//! use tofcam::{SessionManager, StreamId};
//!
//! let library = tofcam::runtime::initialize(load_native_library)?;
//! let manager = SessionManager::new(library, "");
//! manager.create_session(
//!     &platform,
//!     |session| {
//!         session.initialize().unwrap();
//!         session.register_depth_data_listener(|frame| println!("{}", frame.timestamp)).unwrap();
//!         session.start_capture().unwrap();
//!     },
//!     |error| eprintln!("could not open camera: {}", error),
//! );
//! ```

pub mod config;
pub mod device;
pub mod errors;
pub mod listeners;
pub mod manager;
pub mod native;
pub mod permissions;
pub mod runtime;
pub mod session;
pub mod types;

// Testing utilities - mock native library and synthetic frames
pub mod testing;

pub use config::TofCamConfig;
pub use device::{DeviceFilter, DeviceIdentity, UsbDevice, SUPPORTED_VENDOR_IDS};
pub use errors::{CameraError, CameraStatus};
pub use listeners::{DeliverySink, ListenerKind, ListenerRegistry};
pub use manager::SessionManager;
pub use native::{NativeCamera, NativeHandle, NativeLibrary};
pub use permissions::{
    PermissionBroker, PermissionEvent, PermissionOutcome, PermissionRequest, PermissionResponder,
    PlatformContext, UsbHost,
};
pub use session::{CameraSession, RecordingConfig, SessionSource, SessionState};
pub use types::{
    AccessLevel, CameraEvent, DepthData, DepthImage, DepthPoint, EventKind, EventSeverity,
    ExposureLimits, ExposureMode, ExposureUpdate, IrImage, LensParameters, SparsePointCloud,
    StreamId,
};

/// Initialize logging for the camera layer
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "tofcam=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
        supported_vendor_ids: SUPPORTED_VENDOR_IDS.to_vec(),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub supported_vendor_ids: Vec<u16>,
}

#[cfg(test)]
mod lib_tests {
    use super::*;

    #[test]
    fn test_crate_info() {
        let info = get_info();
        assert_eq!(info.name, "tofcam");
        assert!(!info.version.is_empty());
        assert!(!info.description.is_empty());
        assert_eq!(info.supported_vendor_ids.len(), 3);
    }
}
