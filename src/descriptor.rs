//! Identity record for an attached UVC device

use crate::errors::{Result, UvcError};
use crate::types::validate_device_id;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

const VENDOR_RICOH: u16 = 1482;
const PRODUCT_THETA_S: u16 = 10001;
const PRODUCT_THETA_V: u16 = 10002;

/// Immutable device identity. Two descriptors are equal when their
/// transport-level `device_id` matches, whatever the other fields say.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceDescriptor {
    device_id: String,
    vendor_id: u16,
    product_id: u16,
    display_name: Option<String>,
}

#[derive(Deserialize)]
struct RawDescriptor {
    vid: u16,
    pid: u16,
    #[serde(default)]
    name: Option<String>,
}

impl DeviceDescriptor {
    pub fn new(
        device_id: impl Into<String>,
        vendor_id: u16,
        product_id: u16,
        display_name: Option<String>,
    ) -> Result<Self> {
        let device_id = device_id.into();
        validate_device_id(&device_id)?;
        Ok(Self {
            device_id,
            vendor_id,
            product_id,
            display_name,
        })
    }

    /// Decode the `getInfo` payload, e.g. `{"vid":1482,"pid":872}`
    pub fn parse(device_id: &str, payload: &str) -> Result<Self> {
        validate_device_id(device_id)?;
        let raw: RawDescriptor =
            serde_json::from_str(payload).map_err(|e| UvcError::MalformedDescriptor {
                device_id: device_id.to_string(),
                reason: e.to_string(),
            })?;
        let display_name = raw.name.filter(|n| !n.trim().is_empty());
        Self::new(device_id, raw.vid, raw.pid, display_name)
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn vendor_id(&self) -> u16 {
        self.vendor_id
    }

    pub fn product_id(&self) -> u16 {
        self.product_id
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn is_ricoh(&self) -> bool {
        self.vendor_id == VENDOR_RICOH
    }

    pub fn is_theta_s(&self) -> bool {
        self.is_ricoh() && self.product_id == PRODUCT_THETA_S
    }

    // THETA V also enumerates as pid 872, which does not stream.
    pub fn is_theta_v(&self) -> bool {
        self.is_ricoh() && self.product_id == PRODUCT_THETA_V
    }
}

impl PartialEq for DeviceDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.device_id == other.device_id
    }
}

impl Eq for DeviceDescriptor {}

impl Hash for DeviceDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.device_id.hash(state);
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (vid={:04x}, pid={:04x}",
            self.device_id, self.vendor_id, self.product_id
        )?;
        if let Some(name) = &self.display_name {
            write!(f, ", name={}", name)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_theta_payload() {
        let desc = DeviceDescriptor::parse("/dev/bus/usb/001/004", r#"{"vid":1482,"pid":10002}"#)
            .unwrap();
        assert_eq!(desc.vendor_id(), 1482);
        assert!(desc.is_ricoh());
        assert!(desc.is_theta_v());
        assert!(!desc.is_theta_s());
        assert_eq!(desc.display_name(), None);
    }

    #[test]
    fn test_parse_keeps_name() {
        let desc =
            DeviceDescriptor::parse("cam0", r#"{"vid":1133,"pid":2085,"name":"HD Webcam"}"#)
                .unwrap();
        assert_eq!(desc.display_name(), Some("HD Webcam"));
        assert!(desc.to_string().contains("HD Webcam"));
    }

    #[test]
    fn test_parse_malformed_payload() {
        let err = DeviceDescriptor::parse("cam0", r#"{"vid":"x"}"#).unwrap_err();
        assert!(matches!(err, UvcError::MalformedDescriptor { .. }));

        let err = DeviceDescriptor::parse("cam0", "not json").unwrap_err();
        assert!(matches!(err, UvcError::MalformedDescriptor { .. }));
    }

    #[test]
    fn test_parse_rejects_empty_id() {
        let err = DeviceDescriptor::parse("", r#"{"vid":1,"pid":2}"#).unwrap_err();
        assert!(err.is_contract_violation());
    }

    #[test]
    fn test_equality_by_device_id() {
        let a = DeviceDescriptor::new("cam0", 1, 2, None).unwrap();
        let b = DeviceDescriptor::new("cam0", 3, 4, Some("other".into())).unwrap();
        let c = DeviceDescriptor::new("cam1", 1, 2, None).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
