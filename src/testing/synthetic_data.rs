//! Synthetic device presets modelled on real UVC hardware
//!
//! Each preset produces the exact `getInfo` and `getSupportedVideoSize`
//! payloads the native bridge would hand back, so the whole pipeline can be
//! exercised offline.

use crate::descriptor::DeviceDescriptor;
use crate::errors::Result;
use serde_json::{json, Value};

/// UVC format subtype for MJPEG
pub const SUBTYPE_MJPEG: u8 = 0x06;
/// UVC format subtype for frame-based (H.264) streams
pub const SUBTYPE_FRAME_BASED: u8 = 0x10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticSize {
    pub width: u32,
    pub height: u32,
    pub fps: Option<(f32, f32)>,
}

/// Hardware characteristics of a camera as seen through the bridge
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticCamera {
    pub vendor_id: u16,
    pub product_id: u16,
    pub name: Option<&'static str>,
    pub format_subtype: u8,
    pub sizes: Vec<SyntheticSize>,
}

const fn size(width: u32, height: u32, min_fps: f32, max_fps: f32) -> SyntheticSize {
    SyntheticSize {
        width,
        height,
        fps: Some((min_fps, max_fps)),
    }
}

impl SyntheticCamera {
    /// A plain MJPEG webcam: 640x480 at 15-30 fps and 1280x720 at 30 fps
    pub fn generic_webcam() -> Self {
        Self {
            vendor_id: 0x046d,
            product_id: 0x0825,
            name: Some("HD Webcam C270"),
            format_subtype: SUBTYPE_MJPEG,
            sizes: vec![size(640, 480, 15.0, 30.0), size(1280, 720, 30.0, 30.0)],
        }
    }

    /// A camera that only streams 640x480
    pub fn vga_only() -> Self {
        Self {
            vendor_id: 0x0c45,
            product_id: 0x6366,
            name: None,
            format_subtype: SUBTYPE_MJPEG,
            sizes: vec![size(640, 480, 30.0, 30.0)],
        }
    }

    /// RICOH THETA S in live-streaming mode
    pub fn theta_s() -> Self {
        Self {
            vendor_id: 1482,
            product_id: 10001,
            name: Some("RICOH THETA S"),
            format_subtype: SUBTYPE_MJPEG,
            sizes: vec![size(1280, 720, 15.0, 15.0), size(1920, 1080, 15.0, 15.0)],
        }
    }

    /// RICOH THETA V in live-streaming mode (H.264 only)
    pub fn theta_v() -> Self {
        Self {
            vendor_id: 1482,
            product_id: 10002,
            name: Some("RICOH THETA V"),
            format_subtype: SUBTYPE_FRAME_BASED,
            sizes: vec![size(1920, 960, 30.0, 30.0), size(3840, 1920, 30.0, 30.0)],
        }
    }

    /// `getInfo` payload
    pub fn info_payload(&self) -> String {
        let mut info = json!({ "vid": self.vendor_id, "pid": self.product_id });
        if let (Some(name), Value::Object(map)) = (self.name, &mut info) {
            map.insert("name".to_string(), Value::from(name));
        }
        info.to_string()
    }

    /// `getSupportedVideoSize` payload
    pub fn catalog_payload(&self) -> String {
        let sizes: Vec<Value> = self
            .sizes
            .iter()
            .map(|s| match s.fps {
                Some((min, max)) => json!({ "width": s.width, "height": s.height, "fps": [min, max] }),
                None => json!({ "width": s.width, "height": s.height }),
            })
            .collect();
        json!({ "formats": [{ "type": self.format_subtype, "sizes": sizes }] }).to_string()
    }

    pub fn descriptor(&self, device_id: &str) -> Result<DeviceDescriptor> {
        DeviceDescriptor::parse(device_id, &self.info_payload())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{FormatCatalog, FormatKind};

    #[test]
    fn test_info_payload_round_trips_through_descriptor() {
        let theta = SyntheticCamera::theta_v().descriptor("dev/1").unwrap();
        assert!(theta.is_theta_v());
        assert_eq!(theta.display_name(), Some("RICOH THETA V"));

        let anon = SyntheticCamera::vga_only().descriptor("dev/2").unwrap();
        assert_eq!(anon.display_name(), None);
    }

    #[test]
    fn test_catalog_payload_parses() {
        let catalog =
            FormatCatalog::parse("dev/1", &SyntheticCamera::generic_webcam().catalog_payload())
                .unwrap();
        assert_eq!(catalog.len(), 2);
        let vga = catalog.find(640, 480).unwrap();
        assert_eq!(vga.kind, FormatKind::Mjpeg);
        assert!(vga.frame_rate.unwrap().contains(20.0));

        let theta =
            FormatCatalog::parse("dev/2", &SyntheticCamera::theta_v().catalog_payload()).unwrap();
        assert_eq!(theta.entries()[0].kind, FormatKind::FrameBased);
    }
}
