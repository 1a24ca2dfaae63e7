use std::sync::atomic::{AtomicBool, Ordering};

/// Lifecycle of a session. Capturing and recording are tracked separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Initialized,
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Created => "created",
            SessionState::Initialized => "initialized",
            SessionState::Closed => "closed",
        }
    }
}

/// Whether a recording is running. Finishing is a single-shot transition so the
/// record-stop notification fires once per recording.
#[derive(Debug, Default)]
pub struct RecordingTracker {
    active: AtomicBool,
}

impl RecordingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if a recording was already running.
    pub fn begin(&self) -> bool {
        self.active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Returns `true` only for the call that actually ended the recording.
    pub fn finish(&self) -> bool {
        self.active.swap(false, Ordering::AcqRel)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

/// State shared between a session and the delivery threads of its camera.
#[derive(Debug)]
pub struct SessionLink {
    connected: AtomicBool,
    recording: RecordingTracker,
}

impl SessionLink {
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            recording: RecordingTracker::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::Release);
    }

    pub fn recording(&self) -> &RecordingTracker {
        &self.recording
    }
}

impl Default for SessionLink {
    fn default() -> Self {
        Self::new()
    }
}
