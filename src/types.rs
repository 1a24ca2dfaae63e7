//! Shared value types: access levels, stream ids, exposure settings and the
//! payloads pushed to listeners.

use serde::{Deserialize, Serialize};

/// Capability tier granted by an activation code.
///
/// Ordered: `L1 < L2 < L3 < L4`. Fixed for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AccessLevel {
    L1,
    L2,
    L3,
    L4,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::L1 => "L1",
            AccessLevel::L2 => "L2",
            AccessLevel::L3 => "L3",
            AccessLevel::L4 => "L4",
        }
    }

    /// Recording is only guaranteed to work up to level 3.
    pub fn allows_recording(&self) -> bool {
        *self <= AccessLevel::L3
    }
}

impl Default for AccessLevel {
    fn default() -> Self {
        AccessLevel::L1
    }
}

impl std::fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one processing stream within a use case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StreamId(pub u16);

impl StreamId {
    /// "The single stream" of a use case that is not mixed-mode.
    pub const DEFAULT: StreamId = StreamId(0);
}

impl Default for StreamId {
    fn default() -> Self {
        StreamId::DEFAULT
    }
}

impl From<u16> for StreamId {
    fn from(value: u16) -> Self {
        StreamId(value)
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExposureMode {
    Manual,
    Automatic,
}

/// Inclusive exposure window in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExposureLimits {
    pub min: u32,
    pub max: u32,
}

impl ExposureLimits {
    pub fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, exposure_micros: u32) -> bool {
        (self.min..=self.max).contains(&exposure_micros)
    }
}

/// Intrinsic lens calibration.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LensParameters {
    /// (cx, cy)
    pub principal_point: (f32, f32),
    /// (fx, fy)
    pub focal_length: (f32, f32),
    /// (p1, p2)
    pub distortion_tangential: (f32, f32),
    /// [k1, k2, k3]
    pub distortion_radial: [f32; 3],
}

/// One measured point of a depth frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DepthPoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub noise: f32,
    pub gray_value: u16,
    /// 0 means the point is invalid, 255 is full confidence.
    pub depth_confidence: u8,
}

/// Full processed depth frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DepthData {
    pub version: i32,
    /// Microseconds since the epoch of the capture clock.
    pub timestamp: i64,
    pub stream_id: StreamId,
    pub width: u16,
    pub height: u16,
    pub exposure_times: Vec<u32>,
    pub points: Vec<DepthPoint>,
}

/// Depth image with packed depth/confidence per pixel.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DepthImage {
    pub timestamp: i64,
    pub stream_id: StreamId,
    pub width: u16,
    pub height: u16,
    pub data: Vec<u16>,
}

/// Valid points only, as x/y/z/confidence quadruples.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SparsePointCloud {
    pub timestamp: i64,
    pub stream_id: StreamId,
    pub num_points: u32,
    pub xyzc_points: Vec<f32>,
}

/// Infrared amplitude image.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IrImage {
    pub timestamp: i64,
    pub stream_id: StreamId,
    pub width: u16,
    pub height: u16,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventSeverity {
    Info,
    Warning,
    Error,
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    CaptureStream,
    DeviceDisconnected,
    OverTemperature,
    RawFrameStats,
}

/// Asynchronous notification raised by the device or the processing pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraEvent {
    pub severity: EventSeverity,
    pub kind: EventKind,
    pub description: String,
}

impl CameraEvent {
    pub fn new(severity: EventSeverity, kind: EventKind, description: impl Into<String>) -> Self {
        Self {
            severity,
            kind,
            description: description.into(),
        }
    }

    pub fn disconnected(description: impl Into<String>) -> Self {
        Self::new(EventSeverity::Fatal, EventKind::DeviceDisconnected, description)
    }
}

impl std::fmt::Display for CameraEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CameraEvent{{severity=[{:?}], description=[{}], kind=[{:?}]}}",
            self.severity, self.description, self.kind
        )
    }
}

/// New exposure time chosen by auto exposure (or applied manually).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExposureUpdate {
    pub exposure_time: u32,
    pub stream_id: StreamId,
}
