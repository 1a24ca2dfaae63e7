//! Synthetic depth frames
//!
//! Generators for every payload kind, shaped like the output of a small
//! time-of-flight module, so the session and dispatch paths can be exercised
//! without hardware.

use crate::types::{
    DepthData, DepthImage, DepthPoint, ExposureLimits, IrImage, SparsePointCloud, StreamId,
};

/// Characteristics of the simulated sensor.
pub struct SensorCharacteristics {
    pub width: u16,
    pub height: u16,
    pub camera_name: &'static str,
    pub use_cases: &'static [&'static str],
    pub exposure_limits: ExposureLimits,
    pub max_frame_rate: u16,
}

impl SensorCharacteristics {
    pub fn pico_flexx() -> Self {
        Self {
            width: 224,
            height: 172,
            camera_name: "PICOFLEXX",
            use_cases: &["MODE_9_5FPS_2000", "MODE_9_10FPS_1000", "MODE_5_45FPS_500"],
            exposure_limits: ExposureLimits::new(50, 2000),
            max_frame_rate: 45,
        }
    }
}

fn timestamp(frame_number: u64) -> i64 {
    // 5 fps in microseconds
    (frame_number as i64) * 200_000
}

/// Depth frame whose distance ramps across the image and advances per frame.
/// Every 16th point is flagged invalid.
pub fn synthetic_depth_data(frame_number: u64, width: u16, height: u16) -> DepthData {
    let base = (frame_number % 100) as f32 * 0.01;
    let mut points = Vec::with_capacity(width as usize * height as usize);

    for y in 0..height {
        for x in 0..width {
            let index = y as usize * width as usize + x as usize;
            let z = 0.5 + base + x as f32 * 0.001;
            points.push(DepthPoint {
                x: (x as f32 - width as f32 / 2.0) * 0.002 * z,
                y: (y as f32 - height as f32 / 2.0) * 0.002 * z,
                z,
                noise: 0.005,
                gray_value: ((x as u32 + y as u32 + frame_number as u32) % 2048) as u16,
                depth_confidence: if index % 16 == 15 { 0 } else { 255 },
            });
        }
    }

    DepthData {
        version: 1,
        timestamp: timestamp(frame_number),
        stream_id: StreamId::DEFAULT,
        width,
        height,
        exposure_times: vec![1000, 1000, 200],
        points,
    }
}

/// Depth image derived from [`synthetic_depth_data`]: millimetres in the low 13
/// bits, confidence class in the high 3 bits.
pub fn synthetic_depth_image(frame_number: u64, width: u16, height: u16) -> DepthImage {
    let depth = synthetic_depth_data(frame_number, width, height);
    let data = depth
        .points
        .iter()
        .map(|p| {
            let millis = ((p.z * 1000.0) as u16) & 0x1FFF;
            let confidence = (p.depth_confidence as u16 >> 5) << 13;
            millis | confidence
        })
        .collect();

    DepthImage {
        timestamp: depth.timestamp,
        stream_id: depth.stream_id,
        width,
        height,
        data,
    }
}

/// Valid points of [`synthetic_depth_data`] as xyzc quadruples.
pub fn synthetic_sparse_point_cloud(frame_number: u64, width: u16, height: u16) -> SparsePointCloud {
    let depth = synthetic_depth_data(frame_number, width, height);
    let xyzc_points: Vec<f32> = depth
        .points
        .iter()
        .filter(|p| p.depth_confidence > 0)
        .flat_map(|p| [p.x, p.y, p.z, p.depth_confidence as f32 / 255.0])
        .collect();

    SparsePointCloud {
        timestamp: depth.timestamp,
        stream_id: depth.stream_id,
        num_points: (xyzc_points.len() / 4) as u32,
        xyzc_points,
    }
}

pub fn synthetic_ir_image(frame_number: u64, width: u16, height: u16) -> IrImage {
    let base = (frame_number % 256) as u8;
    let mut data = Vec::with_capacity(width as usize * height as usize);
    for y in 0..height {
        for x in 0..width {
            data.push(base.wrapping_add((x ^ y) as u8));
        }
    }

    IrImage {
        timestamp: timestamp(frame_number),
        stream_id: StreamId::DEFAULT,
        width,
        height,
        data,
    }
}
