//! Process-wide native library slot
//!
//! The native library is loaded once per process and kept until exit.
//! [`initialize`] installs it; later calls return the installed instance without
//! running their loader.

use crate::errors::{CameraError, Result};
use crate::manager::SessionManager;
use crate::native::NativeLibrary;
use std::sync::{Arc, Mutex, PoisonError};

lazy_static::lazy_static! {
    static ref LIBRARY: Mutex<Option<Arc<dyn NativeLibrary>>> = Mutex::new(None);
}

/// Install the native library, running `loader` only if none is installed yet.
pub fn initialize<F>(loader: F) -> Result<Arc<dyn NativeLibrary>>
where
    F: FnOnce() -> Result<Arc<dyn NativeLibrary>>,
{
    let mut slot = LIBRARY.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(library) = slot.as_ref() {
        log::debug!("Native library already loaded");
        return Ok(library.clone());
    }

    let library = loader()?;
    *slot = Some(library.clone());
    log::info!("Native library loaded");
    Ok(library)
}

pub fn is_initialized() -> bool {
    LIBRARY
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .is_some()
}

/// The installed library, or `ServiceUnavailable` before [`initialize`].
pub fn library() -> Result<Arc<dyn NativeLibrary>> {
    LIBRARY
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
        .ok_or(CameraError::ServiceUnavailable)
}

/// Session manager backed by the installed library.
pub fn session_manager(activation_code: &str) -> Result<SessionManager> {
    Ok(SessionManager::new(library()?, activation_code))
}
