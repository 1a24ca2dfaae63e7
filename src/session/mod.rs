//! Camera sessions
//!
//! A [`CameraSession`] wraps one opened native camera. It owns the native handle,
//! tracks the lifecycle state and carries the listener registry shared with the
//! camera's delivery threads.

mod camera;
mod recording;
mod state;

pub use camera::{CameraSession, SessionSource};
pub use recording::{default_file_name, RecordingConfig, RECORDING_EXTENSION};
pub use state::{RecordingTracker, SessionLink, SessionState};
