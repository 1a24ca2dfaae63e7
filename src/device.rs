//! USB device descriptions and the supported-family filter

use serde::{Deserialize, Serialize};

/// Vendor ids of the supported time-of-flight camera family.
///
/// The values are defined by the camera hardware.
pub const SUPPORTED_VENDOR_IDS: [u16; 3] = [0x1C28, 0x058B, 0x1F46];

/// A device as reported by the platform's USB enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UsbDevice {
    /// Platform-specific device name, e.g. `/dev/bus/usb/001/004`.
    pub name: String,
    pub vendor_id: u16,
    pub product_id: u16,
}

impl UsbDevice {
    pub fn new(name: impl Into<String>, vendor_id: u16, product_id: u16) -> Self {
        Self {
            name: name.into(),
            vendor_id,
            product_id,
        }
    }
}

impl std::fmt::Display for UsbDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{:04x}:{:04x}]", self.name, self.vendor_id, self.product_id)
    }
}

/// An opened USB transport, ready to be handed to the native library.
///
/// Deliberately not `Clone`: opening a session consumes it.
#[derive(Debug, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub vendor_id: u16,
    pub product_id: u16,
    pub file_descriptor: i32,
}

impl DeviceIdentity {
    pub fn new(vendor_id: u16, product_id: u16, file_descriptor: i32) -> Self {
        Self {
            vendor_id,
            product_id,
            file_descriptor,
        }
    }
}

/// Decides whether a device belongs to the supported camera family.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceFilter;

impl DeviceFilter {
    /// Product ids are not inspected: every product of a supported vendor is a
    /// candidate and the native library rejects what it cannot drive.
    pub fn accepts(vendor_id: u16, _product_id: u16) -> bool {
        SUPPORTED_VENDOR_IDS.contains(&vendor_id)
    }

    pub fn accepts_device(device: &UsbDevice) -> bool {
        Self::accepts(device.vendor_id, device.product_id)
    }

    /// Keep only supported devices, preserving enumeration order.
    pub fn select(devices: Vec<UsbDevice>) -> Vec<UsbDevice> {
        devices.into_iter().filter(Self::accepts_device).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vendors_accepted() {
        assert!(DeviceFilter::accepts(0x1C28, 0xC012));
        assert!(DeviceFilter::accepts(0x058B, 0x00A0));
        assert!(DeviceFilter::accepts(0x1F46, 0x0001));
    }

    #[test]
    fn test_unknown_vendor_rejected() {
        assert!(!DeviceFilter::accepts(0x0000, 0x0000));
        assert!(!DeviceFilter::accepts(0x046D, 0x0825));
    }

    #[test]
    fn test_select_preserves_order() {
        let devices = vec![
            UsbDevice::new("webcam", 0x046D, 0x0825),
            UsbDevice::new("tof-a", 0x1C28, 0xC012),
            UsbDevice::new("tof-b", 0x058B, 0x00A0),
        ];
        let selected = DeviceFilter::select(devices);
        let names: Vec<&str> = selected.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["tof-a", "tof-b"]);
    }

    #[test]
    fn test_device_display() {
        let device = UsbDevice::new("bus1", 0x1C28, 0xC012);
        assert_eq!(device.to_string(), "bus1 [1c28:c012]");
    }
}
