use crate::errors::{Result, UvcError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroI32;

/// Frame size in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// Build a resolution, rejecting zero-sized dimensions
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(UvcError::invalid_argument(format!(
                "resolution must be non-zero, got {}x{}",
                width, height
            )));
        }
        Ok(Self { width, height })
    }

    /// 1280x720, the fallback used when no drawer picks a size
    pub const fn hd() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }

    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Frame-rate range attached to a catalog entry
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameRateRange {
    pub min_fps: f32,
    pub max_fps: f32,
}

impl FrameRateRange {
    pub fn new(min_fps: f32, max_fps: f32) -> Result<Self> {
        if !min_fps.is_finite() || !max_fps.is_finite() || min_fps < 0.0 || min_fps > max_fps {
            return Err(UvcError::invalid_argument(format!(
                "invalid frame-rate range [{}, {}]",
                min_fps, max_fps
            )));
        }
        Ok(Self { min_fps, max_fps })
    }

    pub fn contains(&self, fps: f32) -> bool {
        fps >= self.min_fps && fps <= self.max_fps
    }
}

/// Identifier of an open native device instance. Zero is never a valid handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeHandle(NonZeroI32);

impl NativeHandle {
    /// Wrap the raw value returned by `openDevice`; `None` for the 0 failure marker
    pub fn from_raw(raw: i32) -> Option<Self> {
        NonZeroI32::new(raw).map(NativeHandle)
    }

    pub fn get(&self) -> i32 {
        self.0.get()
    }
}

impl fmt::Display for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl Serialize for NativeHandle {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.get())
    }
}

/// Opaque handle of a host render target (GPU texture)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextureHandle(pub u64);

/// A render target bound to a previewing session.
///
/// Deliberately not `Clone`: exactly one owner at a time, handed back to the
/// render backend when preview stops.
#[derive(Debug, PartialEq, Eq)]
pub struct BoundTexture {
    handle: TextureHandle,
    resolution: Resolution,
}

impl BoundTexture {
    pub fn new(handle: TextureHandle, resolution: Resolution) -> Self {
        Self { handle, resolution }
    }

    pub fn handle(&self) -> TextureHandle {
        self.handle
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }
}

/// Preview mode hint passed to `setPreviewTexture`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PreviewMode {
    /// Let the native layer choose, honouring the open-time codec preference
    #[default]
    Auto,
    Explicit(i32),
}

impl PreviewMode {
    pub fn wire_value(&self) -> i32 {
        match self {
            PreviewMode::Auto => -1,
            PreviewMode::Explicit(mode) => *mode,
        }
    }
}

/// Reject empty or blank device identifiers
pub fn validate_device_id(device_id: &str) -> Result<()> {
    if device_id.trim().is_empty() {
        return Err(UvcError::invalid_argument("device identifier is empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_rejects_zero() {
        assert!(Resolution::new(0, 480).is_err());
        assert!(Resolution::new(640, 0).is_err());
        assert_eq!(Resolution::new(640, 480).unwrap().to_string(), "640x480");
    }

    #[test]
    fn test_frame_rate_range_validation() {
        assert!(FrameRateRange::new(30.0, 15.0).is_err());
        assert!(FrameRateRange::new(f32::NAN, 30.0).is_err());
        let range = FrameRateRange::new(15.0, 30.0).unwrap();
        assert!(range.contains(30.0));
        assert!(!range.contains(60.0));
    }

    #[test]
    fn test_native_handle_zero_is_failure() {
        assert!(NativeHandle::from_raw(0).is_none());
        assert_eq!(NativeHandle::from_raw(42).map(|h| h.get()), Some(42));
    }

    #[test]
    fn test_preview_mode_wire_value() {
        assert_eq!(PreviewMode::Auto.wire_value(), -1);
        assert_eq!(PreviewMode::Explicit(2).wire_value(), 2);
    }

    #[test]
    fn test_validate_device_id() {
        assert!(validate_device_id("").is_err());
        assert!(validate_device_id("   ").is_err());
        assert!(validate_device_id("/dev/bus/usb/001/002").is_ok());
    }
}
