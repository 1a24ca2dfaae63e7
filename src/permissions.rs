//! USB permission handshake
//!
//! The platform answers permission requests asynchronously, on a thread of its
//! choosing, and may deliver the same answer more than once. [`PermissionBroker`]
//! turns that into a single-shot result: every request owns a oneshot channel, and
//! the first platform answer consumes the sending half. Later answers find the
//! slot empty and are dropped.
//!
//! No timeout is applied here. A platform that never answers leaves the request
//! pending forever; callers that need a bound should wrap
//! [`PermissionRequest`] in their own timeout.

use crate::device::{DeviceIdentity, UsbDevice};
use crate::errors::Result;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Final answer to one permission request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionOutcome {
    Granted(UsbDevice),
    Denied(UsbDevice),
    /// The platform answer did not carry a device reference, or the platform
    /// abandoned the request without answering.
    MalformedRequest,
}

impl std::fmt::Display for PermissionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PermissionOutcome::Granted(device) => write!(f, "granted for {}", device),
            PermissionOutcome::Denied(device) => write!(f, "denied for {}", device),
            PermissionOutcome::MalformedRequest => write!(f, "malformed request"),
        }
    }
}

/// Raw answer as the platform reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionEvent {
    pub device: Option<UsbDevice>,
    pub granted: bool,
}

impl PermissionEvent {
    pub fn granted(device: UsbDevice) -> Self {
        Self {
            device: Some(device),
            granted: true,
        }
    }

    pub fn denied(device: UsbDevice) -> Self {
        Self {
            device: Some(device),
            granted: false,
        }
    }

    /// An answer missing its device extra.
    pub fn without_device() -> Self {
        Self {
            device: None,
            granted: false,
        }
    }

    fn into_outcome(self) -> PermissionOutcome {
        match self.device {
            None => PermissionOutcome::MalformedRequest,
            Some(device) if self.granted => PermissionOutcome::Granted(device),
            Some(device) => PermissionOutcome::Denied(device),
        }
    }
}

/// Handle given to the platform to answer exactly one request.
///
/// Cheap to clone; all clones share the same single-shot slot.
#[derive(Clone)]
pub struct PermissionResponder {
    requested: UsbDevice,
    sender: Arc<Mutex<Option<oneshot::Sender<PermissionOutcome>>>>,
}

impl PermissionResponder {
    /// Deliver the platform's answer.
    ///
    /// Returns `false` when an answer was already delivered (or the requester went
    /// away); the event is then ignored.
    pub fn deliver(&self, event: PermissionEvent) -> bool {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let Some(sender) = sender else {
            log::debug!(
                "Ignoring duplicate permission answer for {}",
                self.requested
            );
            return false;
        };

        let outcome = event.into_outcome();
        log::info!("USB permission {}", outcome);
        sender.send(outcome).is_ok()
    }

    /// Whether an answer can still be delivered.
    pub fn is_pending(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn requested_device(&self) -> &UsbDevice {
        &self.requested
    }
}

impl std::fmt::Debug for PermissionResponder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionResponder")
            .field("requested", &self.requested)
            .field("pending", &self.is_pending())
            .finish()
    }
}

/// Pending result of a permission request.
///
/// Await it from async code, or call [`PermissionRequest::blocking_wait`] from a
/// plain thread.
#[derive(Debug)]
pub struct PermissionRequest {
    receiver: oneshot::Receiver<PermissionOutcome>,
}

impl PermissionRequest {
    /// Block the current thread until the platform answers.
    ///
    /// Must not be called from inside an async runtime.
    pub fn blocking_wait(self) -> PermissionOutcome {
        self.receiver.blocking_recv().unwrap_or_else(|_| abandoned())
    }

    /// Non-blocking poll; `None` while no answer has arrived.
    pub fn try_outcome(&mut self) -> Option<PermissionOutcome> {
        match self.receiver.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(abandoned()),
        }
    }
}

impl Future for PermissionRequest {
    type Output = PermissionOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|result| result.unwrap_or_else(|_| abandoned()))
    }
}

fn abandoned() -> PermissionOutcome {
    log::warn!("Permission request abandoned by the platform without an answer");
    PermissionOutcome::MalformedRequest
}

/// Platform USB facility.
pub trait UsbHost: Send + Sync {
    /// Currently attached devices.
    fn devices(&self) -> Vec<UsbDevice>;

    fn has_permission(&self, device: &UsbDevice) -> bool;

    /// Ask the user/system for access. The answer must be delivered through
    /// `responder`, from any thread, at any later time.
    fn request_permission(&self, device: &UsbDevice, responder: PermissionResponder);

    /// Open the transport of a permitted device.
    fn open(&self, device: &UsbDevice) -> Result<DeviceIdentity>;
}

/// Source of platform services, e.g. an application context.
pub trait PlatformContext: Send + Sync {
    /// `None` when the USB service cannot be resolved.
    fn usb_host(&self) -> Option<Arc<dyn UsbHost>>;
}

/// Issues permission requests against a [`UsbHost`].
#[derive(Clone)]
pub struct PermissionBroker {
    host: Arc<dyn UsbHost>,
}

impl PermissionBroker {
    pub fn new(host: Arc<dyn UsbHost>) -> Self {
        Self { host }
    }

    pub fn has_permission(&self, device: &UsbDevice) -> bool {
        self.host.has_permission(device)
    }

    /// Start a request. The returned handle resolves exactly once.
    pub fn request_permission(&self, device: &UsbDevice) -> PermissionRequest {
        let (sender, receiver) = oneshot::channel();
        let responder = PermissionResponder {
            requested: device.clone(),
            sender: Arc::new(Mutex::new(Some(sender))),
        };

        log::info!("Requesting USB permission for {}", device);
        self.host.request_permission(device, responder);

        PermissionRequest { receiver }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockUsbHost;

    fn camera() -> UsbDevice {
        UsbDevice::new("tof", 0x1C28, 0xC012)
    }

    #[test]
    fn test_event_outcomes() {
        assert_eq!(
            PermissionEvent::granted(camera()).into_outcome(),
            PermissionOutcome::Granted(camera())
        );
        assert_eq!(
            PermissionEvent::denied(camera()).into_outcome(),
            PermissionOutcome::Denied(camera())
        );
        assert_eq!(
            PermissionEvent::without_device().into_outcome(),
            PermissionOutcome::MalformedRequest
        );
    }

    #[test]
    fn test_duplicate_answer_is_ignored() {
        let host = Arc::new(MockUsbHost::new());
        let broker = PermissionBroker::new(host.clone());

        let request = broker.request_permission(&camera());
        let responder = host.take_responder().expect("request reached the host");

        assert!(responder.deliver(PermissionEvent::granted(camera())));
        assert!(!responder.deliver(PermissionEvent::denied(camera())));
        assert!(!responder.is_pending());

        assert_eq!(request.blocking_wait(), PermissionOutcome::Granted(camera()));
    }

    #[test]
    fn test_dropped_responder_resolves_malformed() {
        let host = Arc::new(MockUsbHost::new());
        let broker = PermissionBroker::new(host.clone());

        let mut request = broker.request_permission(&camera());
        assert_eq!(request.try_outcome(), None);

        drop(host.take_responder());
        assert_eq!(request.try_outcome(), Some(PermissionOutcome::MalformedRequest));
    }
}
