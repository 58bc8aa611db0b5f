//! Per-device camera session and its lifecycle state machine
//!
//! A session only records state; native calls are made by the
//! [`DeviceManager`](crate::manager::DeviceManager), which commits a
//! transition here after the call it depends on has succeeded.

use crate::assert_invariant;
use crate::descriptor::DeviceDescriptor;
use crate::types::{BoundTexture, NativeHandle, Resolution, TextureHandle};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const INV_TEXTURE_IFF_PREVIEWING: &str = "bound texture present iff previewing";
pub const INV_HANDLE_IFF_OPEN: &str = "native handle present iff open or previewing";
pub const INV_RESOLUTION_IFF_PREVIEWING: &str = "current resolution present iff previewing";
pub const INV_TICKER_IFF_PREVIEWING: &str = "active frame ticker present iff previewing";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LifecycleState {
    Attached,
    PermissionRequested,
    Open,
    Previewing,
    Closed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Attached => write!(f, "attached"),
            LifecycleState::PermissionRequested => write!(f, "permission_requested"),
            LifecycleState::Open => write!(f, "open"),
            LifecycleState::Previewing => write!(f, "previewing"),
            LifecycleState::Closed => write!(f, "closed"),
        }
    }
}

/// Cooperative cancellation flag shared with in-flight work for one device
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Per-frame render tick bound to one native handle.
///
/// The render backend keeps a clone and calls [`FrameTicker::issue`] once per
/// rendered frame. Once the session leaves `Previewing` the ticker is
/// cancelled and `issue` returns `None` forever.
#[derive(Debug, Clone)]
pub struct FrameTicker {
    handle: NativeHandle,
    active: Arc<AtomicBool>,
}

impl FrameTicker {
    pub fn new(handle: NativeHandle) -> Self {
        Self {
            handle,
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Handle to pass to the plugin render event, or `None` once stopped
    pub fn issue(&self) -> Option<NativeHandle> {
        if self.active.load(Ordering::Acquire) {
            Some(self.handle)
        } else {
            None
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn handle(&self) -> NativeHandle {
        self.handle
    }

    pub(crate) fn cancel(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// Undo a `cancel` made ahead of a native stop that then failed
    pub(crate) fn rearm(&self) {
        self.active.store(true, Ordering::Release);
    }
}

/// Resources detached from a session by `close`, to be released by the caller
#[derive(Debug, Default)]
pub struct ClosedResources {
    pub native_handle: Option<NativeHandle>,
    pub texture: Option<BoundTexture>,
}

/// Serializable view of a session, for listing attached devices
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub device_id: String,
    pub vendor_id: u16,
    pub product_id: u16,
    pub display_name: Option<String>,
    pub state: LifecycleState,
    pub native_handle: Option<NativeHandle>,
    pub current_resolution: Option<Resolution>,
    pub attached_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct CameraSession {
    descriptor: DeviceDescriptor,
    state: LifecycleState,
    native_handle: Option<NativeHandle>,
    current_resolution: Option<Resolution>,
    bound_texture: Option<BoundTexture>,
    ticker: Option<FrameTicker>,
    cancellation: CancellationToken,
    attached_at: DateTime<Utc>,
}

impl CameraSession {
    pub fn new(descriptor: DeviceDescriptor) -> Self {
        Self {
            descriptor,
            state: LifecycleState::Attached,
            native_handle: None,
            current_resolution: None,
            bound_texture: None,
            ticker: None,
            cancellation: CancellationToken::new(),
            attached_at: Utc::now(),
        }
    }

    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    pub fn device_id(&self) -> &str {
        self.descriptor.device_id()
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn native_handle(&self) -> Option<NativeHandle> {
        self.native_handle
    }

    pub fn current_resolution(&self) -> Option<Resolution> {
        self.current_resolution
    }

    pub fn bound_texture(&self) -> Option<TextureHandle> {
        self.bound_texture.as_ref().map(BoundTexture::handle)
    }

    pub fn frame_ticker(&self) -> Option<&FrameTicker> {
        self.ticker.as_ref()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn attached_at(&self) -> DateTime<Utc> {
        self.attached_at
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, LifecycleState::Open | LifecycleState::Previewing)
    }

    pub fn is_previewing(&self) -> bool {
        self.state == LifecycleState::Previewing
    }

    /// Attached or Closed: eligible for a (new) permission request
    pub fn awaits_open(&self) -> bool {
        matches!(self.state, LifecycleState::Attached | LifecycleState::Closed)
    }

    pub(crate) fn mark_permission_requested(&mut self) -> bool {
        match self.state {
            LifecycleState::Attached
            | LifecycleState::PermissionRequested
            | LifecycleState::Closed => {
                self.state = LifecycleState::PermissionRequested;
                true
            }
            _ => false,
        }
    }

    /// Back to `Attached` after a failed request or open
    pub(crate) fn reset_to_attached(&mut self) {
        if self.state == LifecycleState::PermissionRequested {
            self.state = LifecycleState::Attached;
        }
    }

    pub(crate) fn mark_open(&mut self, handle: NativeHandle) -> bool {
        match self.state {
            LifecycleState::Attached | LifecycleState::PermissionRequested => {
                self.native_handle = Some(handle);
                self.state = LifecycleState::Open;
                true
            }
            _ => false,
        }
    }

    /// Commit `Open -> Previewing`. Hands the texture back if the session is
    /// not in a state that can take it.
    pub(crate) fn begin_preview(
        &mut self,
        resolution: Resolution,
        texture: BoundTexture,
        ticker: FrameTicker,
    ) -> Result<(), BoundTexture> {
        if self.state != LifecycleState::Open {
            ticker.cancel();
            return Err(texture);
        }
        self.current_resolution = Some(resolution);
        self.bound_texture = Some(texture);
        self.ticker = Some(ticker);
        self.state = LifecycleState::Previewing;
        Ok(())
    }

    /// Commit `Previewing -> Open`. The frame ticker is cancelled before the
    /// texture is handed back.
    pub(crate) fn end_preview(&mut self) -> Option<BoundTexture> {
        if self.state != LifecycleState::Previewing {
            return None;
        }
        if let Some(ticker) = self.ticker.take() {
            ticker.cancel();
        }
        self.current_resolution = None;
        self.state = LifecycleState::Open;
        self.bound_texture.take()
    }

    /// Drive any state to `Closed`, detaching the handle and texture.
    pub(crate) fn close(&mut self) -> ClosedResources {
        if let Some(ticker) = self.ticker.take() {
            ticker.cancel();
        }
        let resources = ClosedResources {
            native_handle: self.native_handle.take(),
            texture: self.bound_texture.take(),
        };
        self.current_resolution = None;
        self.state = LifecycleState::Closed;
        resources
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            device_id: self.descriptor.device_id().to_string(),
            vendor_id: self.descriptor.vendor_id(),
            product_id: self.descriptor.product_id(),
            display_name: self.descriptor.display_name().map(str::to_string),
            state: self.state,
            native_handle: self.native_handle,
            current_resolution: self.current_resolution,
            attached_at: self.attached_at,
        }
    }

    /// Assert the data-model invariants; panics on violation
    pub fn check_invariants(&self) {
        let previewing = self.is_previewing();
        let ctx = self.descriptor.device_id();
        assert_invariant!(
            self.bound_texture.is_some() == previewing,
            INV_TEXTURE_IFF_PREVIEWING,
            ctx
        );
        assert_invariant!(
            self.native_handle.is_some() == self.is_open(),
            INV_HANDLE_IFF_OPEN,
            ctx
        );
        assert_invariant!(
            self.current_resolution.is_some() == previewing,
            INV_RESOLUTION_IFF_PREVIEWING,
            ctx
        );
        assert_invariant!(
            self.ticker.as_ref().is_some_and(FrameTicker::is_active) == previewing,
            INV_TICKER_IFF_PREVIEWING,
            ctx
        );
    }
}
