//! Typed seams to the native device bridge and the host render runtime
//!
//! Implementations wrap whatever FFI the host provides. Every call is
//! fallible; the manager aborts only the transition in progress when one
//! fails. Implementations should report failures as
//! [`UvcError::NativeCallFailed`](crate::errors::UvcError::NativeCallFailed)
//! (bridge) or
//! [`UvcError::RenderTargetFailed`](crate::errors::UvcError::RenderTargetFailed)
//! (render backend).

use crate::errors::Result;
use crate::session::FrameTicker;
use crate::types::{BoundTexture, PreviewMode, Resolution, TextureHandle};

/// Native USB/UVC bridge: enumeration, permission, open/close and pixel
/// delivery into a host texture.
pub trait UvcBridge {
    /// Start the device detector; transport events flow after this
    fn init_detector(&mut self) -> Result<()>;

    fn has_permission(&mut self, device_id: &str) -> Result<bool>;

    /// Ask for permission. The answer arrives later as a permission event.
    fn request_permission(&mut self, device_id: &str) -> Result<()>;

    /// Open the device. Returns the raw native handle, 0 on failure.
    fn open_device(
        &mut self,
        device_id: &str,
        width: u32,
        height: u32,
        prefer_h264: bool,
    ) -> Result<i32>;

    fn close_device(&mut self, device_id: &str) -> Result<()>;

    fn set_preview_texture(
        &mut self,
        device_id: &str,
        texture: TextureHandle,
        mode: PreviewMode,
        width: u32,
        height: u32,
    ) -> Result<()>;

    fn stop_preview(&mut self, device_id: &str) -> Result<()>;

    /// Descriptor payload, e.g. `{"vid":1482,"pid":872}`
    fn get_info(&mut self, device_id: &str) -> Result<String>;

    /// Format catalog payload
    fn get_supported_video_size(&mut self, device_id: &str) -> Result<String>;
}

/// Host graphics runtime: owns render targets and the per-frame copy.
pub trait RenderBackend {
    /// Allocate a texture sized for `resolution`
    fn allocate_texture(&mut self, resolution: Resolution) -> Result<BoundTexture>;

    /// Take a texture back once no session holds it
    fn release_texture(&mut self, texture: BoundTexture);

    /// Begin issuing the per-frame plugin event for `ticker` until it goes inactive
    fn start_frame_ticks(&mut self, ticker: FrameTicker);
}
