//! In-process stand-ins for the native bridge, the render backend and a drawer
//!
//! Every bridge call is recorded. Failures can be injected per call name,
//! globally, for a single device or for the next invocation only.

use super::synthetic_data::SyntheticCamera;
use crate::catalog::FormatCatalog;
use crate::descriptor::DeviceDescriptor;
use crate::drawer::Drawer;
use crate::errors::{Result, UvcError};
use crate::platform::bridge::{RenderBackend, UvcBridge};
use crate::session::{CancellationToken, FrameTicker};
use crate::types::{BoundTexture, NativeHandle, PreviewMode, Resolution, TextureHandle};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// One recorded bridge invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeCall {
    InitDetector,
    HasPermission(String),
    RequestPermission(String),
    OpenDevice {
        device_id: String,
        width: u32,
        height: u32,
        prefer_h264: bool,
    },
    CloseDevice(String),
    SetPreviewTexture {
        device_id: String,
        texture: TextureHandle,
        mode: i32,
        width: u32,
        height: u32,
    },
    StopPreview(String),
    GetInfo(String),
    GetSupportedVideoSize(String),
}

impl BridgeCall {
    pub fn name(&self) -> &'static str {
        match self {
            BridgeCall::InitDetector => "init_detector",
            BridgeCall::HasPermission(_) => "has_permission",
            BridgeCall::RequestPermission(_) => "request_permission",
            BridgeCall::OpenDevice { .. } => "open_device",
            BridgeCall::CloseDevice(_) => "close_device",
            BridgeCall::SetPreviewTexture { .. } => "set_preview_texture",
            BridgeCall::StopPreview(_) => "stop_preview",
            BridgeCall::GetInfo(_) => "get_info",
            BridgeCall::GetSupportedVideoSize(_) => "get_supported_video_size",
        }
    }

    pub fn device_id(&self) -> Option<&str> {
        match self {
            BridgeCall::InitDetector => None,
            BridgeCall::HasPermission(id)
            | BridgeCall::RequestPermission(id)
            | BridgeCall::CloseDevice(id)
            | BridgeCall::StopPreview(id)
            | BridgeCall::GetInfo(id)
            | BridgeCall::GetSupportedVideoSize(id) => Some(id),
            BridgeCall::OpenDevice { device_id, .. }
            | BridgeCall::SetPreviewTexture { device_id, .. } => Some(device_id),
        }
    }
}

/// What the bridge answers for one device
#[derive(Debug, Clone, PartialEq)]
pub struct LoopbackDevice {
    pub info: String,
    pub catalog: String,
    pub open_handle: i32,
    pub has_permission: bool,
}

impl LoopbackDevice {
    pub fn from_camera(camera: &SyntheticCamera, open_handle: i32) -> Self {
        Self {
            info: camera.info_payload(),
            catalog: camera.catalog_payload(),
            open_handle,
            has_permission: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct LoopbackBridge {
    devices: HashMap<String, LoopbackDevice>,
    calls: Vec<BridgeCall>,
    failing: HashSet<&'static str>,
    failing_for_device: HashSet<(String, &'static str)>,
    failing_once: Vec<&'static str>,
    cancel_on: Vec<(&'static str, CancellationToken)>,
    watched_ticker: Option<FrameTicker>,
    ticks_live_at_stop: Vec<bool>,
    fallback: Option<SyntheticCamera>,
    next_handle: i32,
}

impl LoopbackBridge {
    pub fn new() -> Self {
        Self {
            next_handle: 100,
            ..Self::default()
        }
    }

    /// Answer for device ids that were never added, using `camera` and fresh handles
    pub fn with_fallback(mut self, camera: SyntheticCamera) -> Self {
        self.fallback = Some(camera);
        self
    }

    pub fn add_camera(&mut self, device_id: &str, camera: &SyntheticCamera, open_handle: i32) {
        self.devices
            .insert(device_id.to_string(), LoopbackDevice::from_camera(camera, open_handle));
    }

    pub fn add_raw_device(&mut self, device_id: &str, info: &str, catalog: &str, open_handle: i32) {
        self.devices.insert(
            device_id.to_string(),
            LoopbackDevice {
                info: info.to_string(),
                catalog: catalog.to_string(),
                open_handle,
                has_permission: false,
            },
        );
    }

    pub fn set_open_handle(&mut self, device_id: &str, raw: i32) {
        if let Some(device) = self.devices.get_mut(device_id) {
            device.open_handle = raw;
        }
    }

    pub fn set_has_permission(&mut self, device_id: &str, granted: bool) {
        if let Some(device) = self.devices.get_mut(device_id) {
            device.has_permission = granted;
        }
    }

    pub fn set_catalog(&mut self, device_id: &str, catalog: &str) {
        if let Some(device) = self.devices.get_mut(device_id) {
            device.catalog = catalog.to_string();
        }
    }

    /// Make every `call` fail until cleared
    pub fn fail_call(&mut self, call: &'static str) {
        self.failing.insert(call);
    }

    /// Make `call` fail for one device only
    pub fn fail_device_call(&mut self, device_id: &str, call: &'static str) {
        self.failing_for_device.insert((device_id.to_string(), call));
    }

    /// Make only the next `call` fail
    pub fn fail_call_once(&mut self, call: &'static str) {
        self.failing_once.push(call);
    }

    pub fn clear_failures(&mut self) {
        self.failing.clear();
        self.failing_for_device.clear();
        self.failing_once.clear();
    }

    /// Cancel `token` when `call` is next made, as a detach racing that call would
    pub(crate) fn cancel_on_call(&mut self, call: &'static str, token: CancellationToken) {
        self.cancel_on.push((call, token));
    }

    /// Record whether `ticker` is still live each time `stop_preview` is called
    pub fn watch_ticker(&mut self, ticker: FrameTicker) {
        self.watched_ticker = Some(ticker);
    }

    pub fn ticks_live_at_stop(&self) -> &[bool] {
        &self.ticks_live_at_stop
    }

    pub fn calls(&self) -> &[BridgeCall] {
        &self.calls
    }

    pub fn count_calls(&self, name: &str) -> usize {
        self.calls.iter().filter(|c| c.name() == name).count()
    }

    pub fn count_device_calls(&self, device_id: &str, name: &str) -> usize {
        self.calls
            .iter()
            .filter(|c| c.name() == name && c.device_id() == Some(device_id))
            .count()
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    fn record(&mut self, call: BridgeCall) -> Result<()> {
        let name = call.name();
        let device_id = call.device_id().unwrap_or("").to_string();
        self.calls.push(call);

        self.cancel_on.retain(|(on, token)| {
            if *on == name {
                token.cancel();
                false
            } else {
                true
            }
        });

        if let Some(pos) = self.failing_once.iter().position(|c| *c == name) {
            self.failing_once.remove(pos);
            return Err(UvcError::native(name, &device_id, "injected failure"));
        }
        if self.failing.contains(name)
            || self
                .failing_for_device
                .contains(&(device_id.clone(), name))
        {
            return Err(UvcError::native(name, &device_id, "injected failure"));
        }
        Ok(())
    }

    fn device(&mut self, call: &'static str, device_id: &str) -> Result<&mut LoopbackDevice> {
        if !self.devices.contains_key(device_id) {
            let Some(camera) = &self.fallback else {
                return Err(UvcError::native(call, device_id, "no such device"));
            };
            self.next_handle += 1;
            let device = LoopbackDevice::from_camera(camera, self.next_handle);
            self.devices.insert(device_id.to_string(), device);
        }
        self.devices
            .get_mut(device_id)
            .ok_or_else(|| UvcError::native(call, device_id, "no such device"))
    }
}

impl UvcBridge for LoopbackBridge {
    fn init_detector(&mut self) -> Result<()> {
        self.record(BridgeCall::InitDetector)
    }

    fn has_permission(&mut self, device_id: &str) -> Result<bool> {
        self.record(BridgeCall::HasPermission(device_id.to_string()))?;
        Ok(self.device("has_permission", device_id)?.has_permission)
    }

    fn request_permission(&mut self, device_id: &str) -> Result<()> {
        self.record(BridgeCall::RequestPermission(device_id.to_string()))?;
        self.device("request_permission", device_id).map(|_| ())
    }

    fn open_device(
        &mut self,
        device_id: &str,
        width: u32,
        height: u32,
        prefer_h264: bool,
    ) -> Result<i32> {
        self.record(BridgeCall::OpenDevice {
            device_id: device_id.to_string(),
            width,
            height,
            prefer_h264,
        })?;
        Ok(self.device("open_device", device_id)?.open_handle)
    }

    fn close_device(&mut self, device_id: &str) -> Result<()> {
        self.record(BridgeCall::CloseDevice(device_id.to_string()))
    }

    fn set_preview_texture(
        &mut self,
        device_id: &str,
        texture: TextureHandle,
        mode: PreviewMode,
        width: u32,
        height: u32,
    ) -> Result<()> {
        self.record(BridgeCall::SetPreviewTexture {
            device_id: device_id.to_string(),
            texture,
            mode: mode.wire_value(),
            width,
            height,
        })
    }

    fn stop_preview(&mut self, device_id: &str) -> Result<()> {
        if let Some(ticker) = &self.watched_ticker {
            self.ticks_live_at_stop.push(ticker.is_active());
        }
        self.record(BridgeCall::StopPreview(device_id.to_string()))
    }

    fn get_info(&mut self, device_id: &str) -> Result<String> {
        self.record(BridgeCall::GetInfo(device_id.to_string()))?;
        Ok(self.device("get_info", device_id)?.info.clone())
    }

    fn get_supported_video_size(&mut self, device_id: &str) -> Result<String> {
        self.record(BridgeCall::GetSupportedVideoSize(device_id.to_string()))?;
        Ok(self.device("get_supported_video_size", device_id)?.catalog.clone())
    }
}

/// Render backend that hands out sequential texture handles
#[derive(Debug, Default)]
pub struct LoopbackRenderer {
    next_texture: u64,
    live: HashMap<TextureHandle, Resolution>,
    released: Vec<TextureHandle>,
    tickers: Vec<FrameTicker>,
    fail_allocation: bool,
    frames_rendered: u64,
}

impl LoopbackRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_allocation(&mut self, fail: bool) {
        self.fail_allocation = fail;
    }

    pub fn live_textures(&self) -> usize {
        self.live.len()
    }

    pub fn texture_size(&self, texture: TextureHandle) -> Option<Resolution> {
        self.live.get(&texture).copied()
    }

    pub fn released(&self) -> &[TextureHandle] {
        &self.released
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Run one render frame: issue a tick for every live ticker and drop
    /// the ones that went inactive.
    pub fn render_frame(&mut self) -> Vec<NativeHandle> {
        self.frames_rendered += 1;
        let issued: Vec<NativeHandle> = self.tickers.iter().filter_map(FrameTicker::issue).collect();
        self.tickers.retain(FrameTicker::is_active);
        issued
    }

    pub fn active_tickers(&self) -> usize {
        self.tickers.iter().filter(|t| t.is_active()).count()
    }
}

impl RenderBackend for LoopbackRenderer {
    fn allocate_texture(&mut self, resolution: Resolution) -> Result<BoundTexture> {
        if self.fail_allocation {
            return Err(UvcError::RenderTargetFailed(format!(
                "allocation of {} refused",
                resolution
            )));
        }
        self.next_texture += 1;
        let handle = TextureHandle(self.next_texture);
        self.live.insert(handle, resolution);
        Ok(BoundTexture::new(handle, resolution))
    }

    fn release_texture(&mut self, texture: BoundTexture) {
        let handle = texture.handle();
        if self.live.remove(&handle).is_none() {
            log::error!("Release of unknown texture {:?}", handle);
        }
        self.released.push(handle);
    }

    fn start_frame_ticks(&mut self, ticker: FrameTicker) {
        self.tickers.push(ticker);
    }
}

/// Callback seen by a [`RecordingDrawer`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrawerCall {
    AttachDecision(String),
    PreviewStarted(String, TextureHandle),
    PreviewStopped(String),
    Detached(String),
}

/// Drawer that claims devices by vendor (or all of them) and records its callbacks
#[derive(Debug)]
pub struct RecordingDrawer {
    vendor: Option<u16>,
    accept: bool,
    resolution: Option<Resolution>,
    calls: Mutex<Vec<DrawerCall>>,
}

impl RecordingDrawer {
    pub fn claiming_all() -> Self {
        Self {
            vendor: None,
            accept: true,
            resolution: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn for_vendor(vendor_id: u16) -> Self {
        Self {
            vendor: Some(vendor_id),
            ..Self::claiming_all()
        }
    }

    /// Votes against every device at attach time
    pub fn rejecting() -> Self {
        Self {
            accept: false,
            ..Self::claiming_all()
        }
    }

    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = Some(resolution);
        self
    }

    pub fn calls(&self) -> Vec<DrawerCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn push(&self, call: DrawerCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

impl Drawer for RecordingDrawer {
    fn can_handle(&self, device: &DeviceDescriptor) -> bool {
        self.vendor.map_or(true, |v| v == device.vendor_id())
    }

    fn select_resolution(
        &self,
        _device: &DeviceDescriptor,
        _catalog: &FormatCatalog,
    ) -> Option<Resolution> {
        self.resolution
    }

    fn on_attach_decision(&self, device: &DeviceDescriptor) -> bool {
        self.push(DrawerCall::AttachDecision(device.device_id().to_string()));
        self.accept && self.can_handle(device)
    }

    fn on_preview_started(&self, device: &DeviceDescriptor, texture: TextureHandle) {
        self.push(DrawerCall::PreviewStarted(device.device_id().to_string(), texture));
    }

    fn on_preview_stopped(&self, device: &DeviceDescriptor) {
        self.push(DrawerCall::PreviewStopped(device.device_id().to_string()));
    }

    fn on_detached(&self, device: &DeviceDescriptor) {
        self.push(DrawerCall::Detached(device.device_id().to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_records_and_injects() {
        let mut bridge = LoopbackBridge::new();
        bridge.add_camera("camA", &SyntheticCamera::generic_webcam(), 42);
        assert_eq!(bridge.open_device("camA", 1280, 720, false).unwrap(), 42);

        bridge.fail_device_call("camA", "close_device");
        assert!(bridge.close_device("camA").is_err());
        assert!(bridge.close_device("camB").is_ok());
        assert_eq!(bridge.count_calls("close_device"), 2);
        assert_eq!(bridge.count_device_calls("camA", "close_device"), 1);
    }

    #[test]
    fn test_one_shot_failure_and_cancellation() {
        let mut bridge = LoopbackBridge::new();
        bridge.add_camera("camA", &SyntheticCamera::generic_webcam(), 42);
        let token = CancellationToken::new();
        bridge.fail_call_once("stop_preview");
        bridge.cancel_on_call("open_device", token.clone());

        assert!(bridge.stop_preview("camA").is_err());
        assert!(bridge.stop_preview("camA").is_ok());
        assert!(!token.is_cancelled());
        bridge.open_device("camA", 640, 480, false).unwrap();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_unknown_device_without_fallback() {
        let mut bridge = LoopbackBridge::new();
        assert!(bridge.get_info("ghost").is_err());
    }

    #[test]
    fn test_fallback_provisions_unique_handles() {
        let mut bridge = LoopbackBridge::new().with_fallback(SyntheticCamera::generic_webcam());
        let a = bridge.open_device("a", 640, 480, false).unwrap();
        let b = bridge.open_device("b", 640, 480, false).unwrap();
        assert_ne!(a, b);
        assert!(bridge.get_info("a").unwrap().contains("\"vid\""));
    }

    #[test]
    fn test_renderer_tracks_textures_and_ticks() {
        let mut renderer = LoopbackRenderer::new();
        let texture = renderer.allocate_texture(Resolution::hd()).unwrap();
        assert_eq!(renderer.live_textures(), 1);

        let ticker = FrameTicker::new(NativeHandle::from_raw(9).unwrap());
        renderer.start_frame_ticks(ticker.clone());
        assert_eq!(renderer.render_frame(), vec![NativeHandle::from_raw(9).unwrap()]);

        ticker.cancel();
        assert!(renderer.render_frame().is_empty());
        assert_eq!(renderer.active_tickers(), 0);

        renderer.release_texture(texture);
        assert_eq!(renderer.live_textures(), 0);
    }

    #[test]
    fn test_renderer_allocation_failure() {
        let mut renderer = LoopbackRenderer::new();
        renderer.set_fail_allocation(true);
        assert!(matches!(
            renderer.allocate_texture(Resolution::hd()),
            Err(UvcError::RenderTargetFailed(_))
        ));
    }
}
