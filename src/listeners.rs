//! Listener registry and callback dispatch
//!
//! A session keeps one slot per listener kind. Frames and events arrive on threads
//! owned by the native camera and are routed through a [`DeliverySink`], which
//! looks up the current listener of the matching slot and invokes it.
//!
//! Rules:
//! - Registration replaces a slot atomically with respect to dispatch. A dispatch
//!   that already took its snapshot finishes with the old listener.
//! - After an unregister call returns, no new dispatch reaches the old listener.
//! - Deliveries of one kind never overlap and keep their order. Different kinds
//!   are independent.
//! - Listener bodies must not call back into their own session. Each thread keeps
//!   a stack of the registries it is dispatching for, so such calls are detected
//!   and rejected while calls into other sessions stay allowed.

use crate::errors::{CameraError, Result};
use crate::session::SessionLink;
use crate::types::{
    CameraEvent, DepthData, DepthImage, EventKind, ExposureUpdate, IrImage, SparsePointCloud,
};
use std::cell::RefCell;
use std::sync::{Arc, Condvar, Mutex, PoisonError, RwLock};

/// Stored form of every listener.
pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

thread_local! {
    // Addresses of the registries whose listeners run on this thread, innermost last.
    static DISPATCHING: RefCell<Vec<usize>> = RefCell::new(Vec::new());
}

/// True while the current thread is running any listener body.
pub fn in_dispatch() -> bool {
    DISPATCHING.with(|stack| !stack.borrow().is_empty())
}

struct DispatchScope;

impl DispatchScope {
    fn enter(registry: usize) -> Self {
        DISPATCHING.with(|stack| stack.borrow_mut().push(registry));
        DispatchScope
    }
}

impl Drop for DispatchScope {
    fn drop(&mut self) {
        DISPATCHING.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// The seven listener kinds of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerKind {
    DepthData,
    DepthImage,
    SparsePointCloud,
    IrImage,
    Event,
    Exposure,
    RecordStop,
}

impl ListenerKind {
    pub const ALL: [ListenerKind; 7] = [
        ListenerKind::DepthData,
        ListenerKind::DepthImage,
        ListenerKind::SparsePointCloud,
        ListenerKind::IrImage,
        ListenerKind::Event,
        ListenerKind::Exposure,
        ListenerKind::RecordStop,
    ];

    /// Kinds that carry frame data and therefore justify starting capture.
    pub fn is_data(&self) -> bool {
        matches!(
            self,
            ListenerKind::DepthData
                | ListenerKind::DepthImage
                | ListenerKind::SparsePointCloud
                | ListenerKind::IrImage
        )
    }
}

struct Slot<T> {
    listener: RwLock<Option<Listener<T>>>,
    // Serializes deliveries of this kind.
    order: Mutex<()>,
}

impl<T> Slot<T> {
    fn new() -> Self {
        Self {
            listener: RwLock::new(None),
            order: Mutex::new(()),
        }
    }

    fn replace(&self, listener: Option<Listener<T>>) -> bool {
        let mut slot = self.listener.write().unwrap_or_else(PoisonError::into_inner);
        let previous = std::mem::replace(&mut *slot, listener);
        previous.is_some()
    }

    fn is_set(&self) -> bool {
        self.listener
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn dispatch(&self, registry: usize, payload: &T) -> bool {
        let _order = self.order.lock().unwrap_or_else(PoisonError::into_inner);
        let listener = self
            .listener
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        match listener {
            Some(listener) => {
                let _scope = DispatchScope::enter(registry);
                listener(payload);
                true
            }
            None => false,
        }
    }
}

/// Per-session listener slots plus the bookkeeping `close()` waits on.
pub struct ListenerRegistry {
    depth_data: Slot<DepthData>,
    depth_image: Slot<DepthImage>,
    sparse_point_cloud: Slot<SparsePointCloud>,
    ir_image: Slot<IrImage>,
    event: Slot<CameraEvent>,
    exposure: Slot<ExposureUpdate>,
    record_stop: Slot<u32>,
    gate: Mutex<Gate>,
    idle: Condvar,
}

#[derive(Default)]
struct Gate {
    closed: bool,
    in_flight: usize,
}

struct InFlight<'a> {
    registry: &'a ListenerRegistry,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut gate = self.registry.lock_gate();
        gate.in_flight = gate.in_flight.saturating_sub(1);
        if gate.in_flight == 0 {
            self.registry.idle.notify_all();
        }
    }
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self {
            depth_data: Slot::new(),
            depth_image: Slot::new(),
            sparse_point_cloud: Slot::new(),
            ir_image: Slot::new(),
            event: Slot::new(),
            exposure: Slot::new(),
            record_stop: Slot::new(),
            gate: Mutex::new(Gate::default()),
            idle: Condvar::new(),
        }
    }

    fn lock_gate(&self) -> std::sync::MutexGuard<'_, Gate> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enter(&self) -> Option<InFlight<'_>> {
        let mut gate = self.lock_gate();
        if gate.closed {
            return None;
        }
        gate.in_flight += 1;
        Some(InFlight { registry: self })
    }

    fn address(&self) -> usize {
        self as *const Self as usize
    }

    /// True while one of this registry's listeners runs on the current thread.
    pub fn is_dispatching(&self) -> bool {
        let address = self.address();
        DISPATCHING.with(|stack| stack.borrow().contains(&address))
    }

    fn deliver<T>(&self, slot: &Slot<T>, payload: &T) -> bool {
        match self.enter() {
            Some(_in_flight) => slot.dispatch(self.address(), payload),
            None => false,
        }
    }

    // Checked under the gate so a store cannot slip in after `shutdown` cleared
    // the slots.
    fn store<T>(&self, slot: &Slot<T>, listener: Listener<T>) -> Result<()> {
        let gate = self.lock_gate();
        if gate.closed {
            return Err(CameraError::SessionClosed);
        }
        slot.replace(Some(listener));
        Ok(())
    }

    pub fn set_depth_data_listener(&self, listener: Listener<DepthData>) -> Result<()> {
        self.store(&self.depth_data, listener)
    }

    pub fn set_depth_image_listener(&self, listener: Listener<DepthImage>) -> Result<()> {
        self.store(&self.depth_image, listener)
    }

    pub fn set_sparse_point_cloud_listener(
        &self,
        listener: Listener<SparsePointCloud>,
    ) -> Result<()> {
        self.store(&self.sparse_point_cloud, listener)
    }

    pub fn set_ir_image_listener(&self, listener: Listener<IrImage>) -> Result<()> {
        self.store(&self.ir_image, listener)
    }

    pub fn set_event_listener(&self, listener: Listener<CameraEvent>) -> Result<()> {
        self.store(&self.event, listener)
    }

    pub fn set_exposure_listener(&self, listener: Listener<ExposureUpdate>) -> Result<()> {
        self.store(&self.exposure, listener)
    }

    pub fn set_record_stop_listener(&self, listener: Listener<u32>) -> Result<()> {
        self.store(&self.record_stop, listener)
    }

    /// Empty one slot. Returns whether a listener was present.
    pub fn clear(&self, kind: ListenerKind) -> bool {
        match kind {
            ListenerKind::DepthData => self.depth_data.replace(None),
            ListenerKind::DepthImage => self.depth_image.replace(None),
            ListenerKind::SparsePointCloud => self.sparse_point_cloud.replace(None),
            ListenerKind::IrImage => self.ir_image.replace(None),
            ListenerKind::Event => self.event.replace(None),
            ListenerKind::Exposure => self.exposure.replace(None),
            ListenerKind::RecordStop => self.record_stop.replace(None),
        }
    }

    pub fn is_registered(&self, kind: ListenerKind) -> bool {
        match kind {
            ListenerKind::DepthData => self.depth_data.is_set(),
            ListenerKind::DepthImage => self.depth_image.is_set(),
            ListenerKind::SparsePointCloud => self.sparse_point_cloud.is_set(),
            ListenerKind::IrImage => self.ir_image.is_set(),
            ListenerKind::Event => self.event.is_set(),
            ListenerKind::Exposure => self.exposure.is_set(),
            ListenerKind::RecordStop => self.record_stop.is_set(),
        }
    }

    pub fn has_data_listener(&self) -> bool {
        ListenerKind::ALL
            .iter()
            .filter(|kind| kind.is_data())
            .any(|kind| self.is_registered(*kind))
    }

    pub fn dispatch_depth_data(&self, payload: &DepthData) -> bool {
        self.deliver(&self.depth_data, payload)
    }

    pub fn dispatch_depth_image(&self, payload: &DepthImage) -> bool {
        self.deliver(&self.depth_image, payload)
    }

    pub fn dispatch_sparse_point_cloud(&self, payload: &SparsePointCloud) -> bool {
        self.deliver(&self.sparse_point_cloud, payload)
    }

    pub fn dispatch_ir_image(&self, payload: &IrImage) -> bool {
        self.deliver(&self.ir_image, payload)
    }

    pub fn dispatch_event(&self, payload: &CameraEvent) -> bool {
        self.deliver(&self.event, payload)
    }

    pub fn dispatch_exposure(&self, payload: &ExposureUpdate) -> bool {
        self.deliver(&self.exposure, payload)
    }

    pub fn dispatch_record_stop(&self, frames: u32) -> bool {
        self.deliver(&self.record_stop, &frames)
    }

    pub fn is_closed(&self) -> bool {
        self.lock_gate().closed
    }

    /// Refuse new dispatches and registrations, wait for in-flight dispatches and
    /// empty every slot.
    ///
    /// When called from inside one of this registry's listeners the wait is
    /// skipped, since the calling dispatch itself is in flight.
    pub fn shutdown(&self) {
        {
            let mut gate = self.lock_gate();
            gate.closed = true;
            if !self.is_dispatching() {
                while gate.in_flight > 0 {
                    gate = self
                        .idle
                        .wait(gate)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }

        for kind in ListenerKind::ALL {
            self.clear(kind);
        }
        log::debug!("Listener registry shut down");
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Delivery entry point handed to the native camera.
///
/// Cloneable so the camera can move copies into its delivery threads.
#[derive(Clone)]
pub struct DeliverySink {
    registry: Arc<ListenerRegistry>,
    link: Arc<SessionLink>,
}

impl DeliverySink {
    pub(crate) fn new(registry: Arc<ListenerRegistry>, link: Arc<SessionLink>) -> Self {
        Self { registry, link }
    }

    /// A sink wired to nothing but a fresh registry; useful to drive a native
    /// camera outside of a session.
    pub fn detached(registry: Arc<ListenerRegistry>) -> Self {
        Self::new(registry, Arc::new(SessionLink::new()))
    }

    pub fn is_open(&self) -> bool {
        !self.registry.is_closed()
    }

    pub fn depth_data(&self, payload: &DepthData) -> bool {
        self.registry.dispatch_depth_data(payload)
    }

    pub fn depth_image(&self, payload: &DepthImage) -> bool {
        self.registry.dispatch_depth_image(payload)
    }

    pub fn sparse_point_cloud(&self, payload: &SparsePointCloud) -> bool {
        self.registry.dispatch_sparse_point_cloud(payload)
    }

    pub fn ir_image(&self, payload: &IrImage) -> bool {
        self.registry.dispatch_ir_image(payload)
    }

    pub fn exposure(&self, payload: &ExposureUpdate) -> bool {
        self.registry.dispatch_exposure(payload)
    }

    /// A `DeviceDisconnected` event also marks the session as disconnected,
    /// before the listener sees it.
    pub fn event(&self, payload: &CameraEvent) -> bool {
        if payload.kind == EventKind::DeviceDisconnected {
            log::warn!("Camera disconnected: {}", payload.description);
            self.link.mark_disconnected();
        }
        self.registry.dispatch_event(payload)
    }

    /// Recording finished, either on request or because a frame limit was hit.
    ///
    /// Only the first report of a recording reaches the listener.
    pub fn recording_stopped(&self, frames: u32) -> bool {
        if !self.link.recording().finish() {
            log::debug!("Ignoring repeated record-stop ({} frames)", frames);
            return false;
        }
        log::info!("Recording stopped after {} frames", frames);
        self.registry.dispatch_record_stop(frames)
    }
}
