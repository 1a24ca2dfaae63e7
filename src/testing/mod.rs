//! Testing utilities
//!
//! Synthetic depth payloads plus mock implementations of the native library and
//! the platform USB host, so sessions can be driven end to end without hardware.

pub mod mock;
pub mod synthetic_data;

pub use mock::{
    MockCamera, MockControl, MockLibrary, MockPlatform, MockUsbHost, PermissionScript,
};
pub use synthetic_data::{
    synthetic_depth_data, synthetic_depth_image, synthetic_ir_image, synthetic_sparse_point_cloud,
    SensorCharacteristics,
};
