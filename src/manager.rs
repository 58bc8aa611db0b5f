//! Device manager: the registry of camera sessions and the event dispatcher
//!
//! All operations run on one logical timeline (`&mut self`). Wrap the manager
//! in a [`DeviceMonitor`](crate::platform::DeviceMonitor) when events arrive
//! from several threads.

use crate::assert_invariant;
use crate::catalog::FormatCatalog;
use crate::config::UvcConfig;
use crate::descriptor::DeviceDescriptor;
use crate::drawer::{Drawer, DrawerRegistry};
use crate::errors::{Result, UvcError};
use crate::events::DeviceEvent;
use crate::permissions::{PermissionTicket, PermissionTracker};
use crate::platform::bridge::{RenderBackend, UvcBridge};
use crate::session::{CameraSession, CancellationToken, FrameTicker, LifecycleState, SessionSnapshot};
use crate::types::{validate_device_id, NativeHandle, PreviewMode, Resolution};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Instant;

pub const INV_WAIT_IFF_REQUESTED: &str = "permission wait in flight iff permission requested";

/// Result of [`DeviceManager::close_all`]
#[derive(Debug, Default)]
pub struct CloseAllReport {
    /// Sessions that held a native handle and were closed
    pub closed: Vec<String>,
    /// Sessions whose native close failed; they are closed on our side anyway
    pub failures: Vec<(String, UvcError)>,
}

impl CloseAllReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

enum CloseOutcome {
    NotOpen,
    Closed,
    Failed(UvcError),
}

pub struct DeviceManager<B: UvcBridge, R: RenderBackend> {
    config: UvcConfig,
    bridge: B,
    renderer: R,
    drawers: DrawerRegistry,
    sessions: HashMap<String, CameraSession>,
    permissions: PermissionTracker,
}

impl<B: UvcBridge, R: RenderBackend> DeviceManager<B, R> {
    pub fn new(config: UvcConfig, bridge: B, renderer: R) -> Self {
        let permissions = PermissionTracker::new(config.permission_timeout());
        Self {
            config,
            bridge,
            renderer,
            drawers: DrawerRegistry::new(),
            sessions: HashMap::new(),
            permissions,
        }
    }

    /// Start the native device detector
    pub fn initialize(&mut self) -> Result<()> {
        log::info!(
            "Initializing UVC manager (default {}, prefer_h264={})",
            self.config.default_resolution(),
            self.config.preview.prefer_h264
        );
        self.bridge.init_detector()
    }

    pub fn register_drawer(&mut self, drawer: &Arc<dyn Drawer>) -> Result<()> {
        self.drawers.register(drawer)
    }

    pub fn unregister_drawer(&mut self, drawer: &Arc<dyn Drawer>) -> bool {
        self.drawers.unregister(drawer)
    }

    pub fn config(&self) -> &UvcConfig {
        &self.config
    }

    pub fn bridge(&self) -> &B {
        &self.bridge
    }

    pub fn bridge_mut(&mut self) -> &mut B {
        &mut self.bridge
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    pub fn session(&self, device_id: &str) -> Option<&CameraSession> {
        self.sessions.get(device_id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_permission_pending(&self, device_id: &str) -> bool {
        self.permissions.is_pending(device_id)
    }

    /// Snapshots of every registered session, ordered by device id
    pub fn attached_devices(&self) -> Vec<SessionSnapshot> {
        let mut out: Vec<SessionSnapshot> =
            self.sessions.values().map(CameraSession::snapshot).collect();
        out.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        out
    }

    /// Native handles that should receive a render tick this frame
    pub fn frame_tick_targets(&self) -> Vec<NativeHandle> {
        self.sessions
            .values()
            .filter(|s| s.is_previewing())
            .filter_map(|s| s.frame_ticker().and_then(FrameTicker::issue))
            .collect()
    }

    /// Ticket of the permission wait in flight for `device_id`.
    ///
    /// A host that runs its own timer hands it back through
    /// [`DeviceEvent::PermissionTimeout`]; a ticket from an earlier wait is ignored.
    pub fn permission_ticket(&self, device_id: &str) -> Option<PermissionTicket> {
        self.permissions.ticket(device_id)
    }

    pub fn next_permission_deadline(&self) -> Option<Instant> {
        self.permissions.next_deadline()
    }

    /// Single entry point for transport and lifecycle events
    pub fn handle_event(&mut self, event: DeviceEvent) -> Result<()> {
        log::debug!("Handling {} event", event.name());
        match event {
            DeviceEvent::Attach(id) => self.on_attach(&id),
            DeviceEvent::Detach(id) => self.on_detach(&id),
            DeviceEvent::PermissionGranted(id) => self.on_permission_granted(&id),
            DeviceEvent::PermissionDenied(id) => self.on_permission_denied(&id),
            DeviceEvent::PermissionTimeout { device_id, ticket } => {
                self.on_permission_timeout(&device_id, ticket)
            }
            DeviceEvent::Connect(id) => {
                validate_device_id(&id)?;
                log::info!("Native layer opened {}", id);
                Ok(())
            }
            DeviceEvent::Disconnect(id) => self.on_disconnect(&id),
            DeviceEvent::Ready(id) => self.on_ready(&id),
            DeviceEvent::StartPreviewAck(id) => self.on_start_preview_ack(&id),
            DeviceEvent::StopPreviewAck(id) => self.on_stop_preview_ack(&id),
            DeviceEvent::ReceiveStatus(args) => {
                log::info!("Status event: {}", args);
                Ok(())
            }
            DeviceEvent::ButtonEvent(args) => {
                log::info!("Button event: {}", args);
                Ok(())
            }
            DeviceEvent::Resume => self.on_resume(),
            DeviceEvent::Pause => self.on_pause(),
        }
    }

    /// A device appeared (or the transport re-announced it)
    pub fn on_attach(&mut self, device_id: &str) -> Result<()> {
        self.checked(|m| m.attach(device_id))
    }

    pub fn on_permission_granted(&mut self, device_id: &str) -> Result<()> {
        self.checked(|m| m.permission_granted(device_id))
    }

    /// The user refused; the session is discarded and `PermissionDenied` returned
    pub fn on_permission_denied(&mut self, device_id: &str) -> Result<()> {
        self.checked(|m| m.permission_refused(device_id, None))
    }

    /// Timer expiry for a specific wait. Stale tickets are ignored.
    pub fn on_permission_timeout(&mut self, device_id: &str, ticket: PermissionTicket) -> Result<()> {
        self.checked(|m| m.permission_refused(device_id, Some(ticket)))
    }

    /// Discard every session whose permission wait expired by `now`
    pub fn expire_permissions(&mut self, now: Instant) -> Vec<String> {
        let expired = self.permissions.take_expired(now);
        let mut discarded = Vec::with_capacity(expired.len());
        for (device_id, ticket) in expired {
            log::warn!("Permission wait {} for {} timed out", ticket, device_id);
            if self.discard(&device_id) {
                discarded.push(device_id);
            }
        }
        self.verify_invariants();
        discarded
    }

    /// The device can deliver frames: negotiate a resolution and start preview
    pub fn on_ready(&mut self, device_id: &str) -> Result<()> {
        self.checked(|m| m.start(device_id, None))
    }

    /// Start preview at `resolution`, or negotiate one when `None`
    pub fn start_preview(&mut self, device_id: &str, resolution: Option<Resolution>) -> Result<()> {
        self.checked(|m| m.start(device_id, resolution))
    }

    pub fn stop_preview(&mut self, device_id: &str) -> Result<()> {
        self.checked(|m| m.stop(device_id))
    }

    /// Close the device. Native failures are logged; the session ends up closed.
    pub fn close(&mut self, device_id: &str) -> Result<()> {
        self.checked(|m| {
            validate_device_id(device_id)?;
            if let CloseOutcome::Failed(e) = m.close_session(device_id) {
                log::warn!("Native close failed for {}: {}", device_id, e);
            }
            Ok(())
        })
    }

    /// The native layer closed the device, possibly on its own
    pub fn on_disconnect(&mut self, device_id: &str) -> Result<()> {
        log::info!("Device disconnected: {}", device_id);
        self.close(device_id)
    }

    /// The device is gone: close it whatever its state and forget it
    pub fn on_detach(&mut self, device_id: &str) -> Result<()> {
        self.checked(|m| m.detach(device_id))
    }

    pub fn on_start_preview_ack(&mut self, device_id: &str) -> Result<()> {
        validate_device_id(device_id)?;
        match self.sessions.get(device_id).map(CameraSession::state) {
            Some(LifecycleState::Previewing) => {
                log::debug!("Native preview started for {}", device_id)
            }
            state => log::debug!(
                "Ignoring start-preview ack for {} in state {:?}",
                device_id,
                state
            ),
        }
        Ok(())
    }

    pub fn on_stop_preview_ack(&mut self, device_id: &str) -> Result<()> {
        validate_device_id(device_id)?;
        match self.sessions.get(device_id).map(CameraSession::state) {
            Some(LifecycleState::Previewing) => log::debug!(
                "Native layer reported preview stop for {} while previewing; keeping own state",
                device_id
            ),
            state => log::debug!("Stop-preview ack for {} in state {:?}", device_id, state),
        }
        Ok(())
    }

    /// Host resumed: retry permission for devices that are attached but not open
    pub fn on_resume(&mut self) -> Result<()> {
        self.checked(|m| m.resume())
    }

    /// Host paused: close everything
    pub fn on_pause(&mut self) -> Result<()> {
        let report = self.close_all();
        for (device_id, e) in &report.failures {
            log::warn!("Close on pause failed for {}: {}", device_id, e);
        }
        Ok(())
    }

    /// Change the preview size of a previewing device.
    ///
    /// `None` means the configured default. Returns whether a restart happened.
    pub fn request_change_resolution(
        &mut self,
        device_id: &str,
        resolution: Option<Resolution>,
    ) -> Result<bool> {
        self.checked(|m| m.change_resolution(device_id, resolution))
    }

    /// Catalog of an open device, `None` when the device is unknown or not open
    pub fn supported_formats(&mut self, device_id: &str) -> Result<Option<FormatCatalog>> {
        validate_device_id(device_id)?;
        match self.sessions.get(device_id) {
            Some(session) if session.is_open() => self.fetch_catalog(device_id).map(Some),
            _ => Ok(None),
        }
    }

    /// Close every session, continuing past individual failures
    pub fn close_all(&mut self) -> CloseAllReport {
        let mut ids: Vec<String> = self.sessions.keys().cloned().collect();
        ids.sort();

        let mut report = CloseAllReport::default();
        for device_id in ids {
            match self.close_session(&device_id) {
                CloseOutcome::NotOpen => {}
                CloseOutcome::Closed => report.closed.push(device_id),
                CloseOutcome::Failed(e) => {
                    log::warn!("Failed to close {}: {}", device_id, e);
                    report.failures.push((device_id, e));
                }
            }
        }
        log::info!(
            "Closed {} device(s), {} failure(s)",
            report.closed.len() + report.failures.len(),
            report.failures.len()
        );
        self.verify_invariants();
        report
    }

    fn checked<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let result = op(self);
        self.verify_invariants();
        result
    }

    fn verify_invariants(&self) {
        for session in self.sessions.values() {
            session.check_invariants();
            assert_invariant!(
                (session.state() == LifecycleState::PermissionRequested)
                    == self.permissions.is_pending(session.device_id()),
                INV_WAIT_IFF_REQUESTED,
                session.device_id()
            );
        }
    }

    fn attach(&mut self, device_id: &str) -> Result<()> {
        validate_device_id(device_id)?;

        let descriptor = match self.sessions.get(device_id) {
            Some(session) if session.is_open() => {
                log::debug!("Attach re-notification for open device {}", device_id);
                return Ok(());
            }
            Some(session) => session.descriptor().clone(),
            None => {
                let payload = self.bridge.get_info(device_id)?;
                let descriptor = DeviceDescriptor::parse(device_id, &payload)?;
                log::info!("Device attached: {}", descriptor);
                self.sessions
                    .insert(device_id.to_string(), CameraSession::new(descriptor.clone()));
                descriptor
            }
        };

        if !self.drawers.accepts(&descriptor) {
            log::info!("No drawer accepted {}, discarding", device_id);
            self.discard(device_id);
            return Ok(());
        }

        self.request_permission(device_id)
    }

    fn request_permission(&mut self, device_id: &str) -> Result<()> {
        self.bridge.request_permission(device_id)?;
        let ticket = self.permissions.begin(device_id, Instant::now());
        if let Some(session) = self.sessions.get_mut(device_id) {
            session.mark_permission_requested();
        }
        log::info!("Requested permission for {} (wait {})", device_id, ticket);
        Ok(())
    }

    fn permission_granted(&mut self, device_id: &str) -> Result<()> {
        validate_device_id(device_id)?;

        let token = match self.sessions.get(device_id) {
            None => {
                log::debug!("Permission granted for unknown device {}", device_id);
                self.permissions.resolve(device_id);
                return Ok(());
            }
            Some(session) => match session.state() {
                LifecycleState::Attached | LifecycleState::PermissionRequested => {
                    session.cancellation().clone()
                }
                state => {
                    log::debug!("Ignoring permission grant for {} in state {}", device_id, state);
                    return Ok(());
                }
            },
        };

        self.permissions.resolve(device_id);
        self.open(device_id, &token)
    }

    fn open(&mut self, device_id: &str, token: &CancellationToken) -> Result<()> {
        let resolution = self.config.default_resolution();
        let opened = self.bridge.open_device(
            device_id,
            resolution.width,
            resolution.height,
            self.config.preview.prefer_h264,
        );

        let handle = match opened.map(NativeHandle::from_raw) {
            Ok(Some(handle)) => handle,
            Ok(None) => {
                self.reset_to_attached(device_id);
                log::warn!("Open of {} returned an empty handle", device_id);
                return Err(UvcError::OpenFailed(device_id.to_string()));
            }
            Err(e) => {
                self.reset_to_attached(device_id);
                return Err(e);
            }
        };

        let session = match self.sessions.get_mut(device_id) {
            Some(session) if !token.is_cancelled() => session,
            _ => {
                log::warn!("{} went away while opening, releasing handle {}", device_id, handle);
                if let Err(e) = self.bridge.close_device(device_id) {
                    log::warn!("Failed to release orphaned handle for {}: {}", device_id, e);
                }
                self.discard(device_id);
                return Ok(());
            }
        };

        session.mark_open(handle);
        log::info!("Opened {} with handle {}", device_id, handle);
        Ok(())
    }

    fn reset_to_attached(&mut self, device_id: &str) {
        if let Some(session) = self.sessions.get_mut(device_id) {
            session.reset_to_attached();
        }
    }

    fn permission_refused(&mut self, device_id: &str, ticket: Option<PermissionTicket>) -> Result<()> {
        validate_device_id(device_id)?;

        let awaiting = self.sessions.get(device_id).is_some_and(|s| {
            matches!(
                s.state(),
                LifecycleState::Attached | LifecycleState::PermissionRequested
            )
        });

        match ticket {
            Some(ticket) => {
                if self.permissions.resolve_ticket(device_id, ticket).is_none() {
                    log::debug!("Stale permission timeout for {}", device_id);
                    return Ok(());
                }
            }
            None => {
                if !awaiting {
                    log::debug!("Ignoring permission denial for {}", device_id);
                    return Ok(());
                }
                self.permissions.resolve(device_id);
            }
        }

        self.discard(device_id);
        match ticket {
            Some(_) => {
                log::warn!("Permission timed out for {}", device_id);
                Err(UvcError::PermissionTimeout(device_id.to_string()))
            }
            None => {
                log::warn!("Permission denied for {}", device_id);
                Err(UvcError::PermissionDenied(device_id.to_string()))
            }
        }
    }

    fn start(&mut self, device_id: &str, requested: Option<Resolution>) -> Result<()> {
        validate_device_id(device_id)?;

        let (descriptor, token) = match self.sessions.get(device_id) {
            Some(session) if session.state() == LifecycleState::Open => {
                (session.descriptor().clone(), session.cancellation().clone())
            }
            Some(session) if session.is_previewing() => {
                log::debug!("{} is already previewing, start rejected", device_id);
                return Ok(());
            }
            Some(session) => {
                log::debug!("Cannot start preview of {} in state {}", device_id, session.state());
                return Ok(());
            }
            None => {
                log::debug!("Start preview for unknown device {}", device_id);
                return Ok(());
            }
        };

        let catalog = self.fetch_catalog(device_id)?;
        let resolution = requested
            .or_else(|| self.drawers.select_resolution(&descriptor, &catalog))
            .unwrap_or_else(|| self.config.default_resolution());

        self.start_with(device_id, resolution, &catalog, &token)
    }

    fn fetch_catalog(&mut self, device_id: &str) -> Result<FormatCatalog> {
        let payload = self.bridge.get_supported_video_size(device_id)?;
        FormatCatalog::parse(device_id, &payload)
    }

    fn start_with(
        &mut self,
        device_id: &str,
        resolution: Resolution,
        catalog: &FormatCatalog,
        token: &CancellationToken,
    ) -> Result<()> {
        if !catalog.supports(resolution) {
            log::warn!("{} does not support {}", device_id, resolution);
            return Err(UvcError::UnsupportedResolution {
                device_id: device_id.to_string(),
                width: resolution.width,
                height: resolution.height,
            });
        }

        let native = match self.sessions.get(device_id) {
            Some(session) if session.state() == LifecycleState::Open => session.native_handle(),
            _ => None,
        };
        let Some(native) = native.filter(|_| !token.is_cancelled()) else {
            log::debug!("{} is no longer open, abandoning preview start", device_id);
            return Ok(());
        };

        let texture = self.renderer.allocate_texture(resolution)?;
        let texture_handle = texture.handle();
        if let Err(e) = self.bridge.set_preview_texture(
            device_id,
            texture_handle,
            PreviewMode::Auto,
            resolution.width,
            resolution.height,
        ) {
            self.renderer.release_texture(texture);
            return Err(e);
        }

        let ticker = FrameTicker::new(native);
        let committed = match self.sessions.get_mut(device_id) {
            Some(session) if !token.is_cancelled() => session
                .begin_preview(resolution, texture, ticker.clone())
                .map(|()| session.descriptor().clone()),
            _ => Err(texture),
        };

        match committed {
            Ok(descriptor) => {
                self.renderer.start_frame_ticks(ticker);
                log::info!("Previewing {} at {} into {:?}", device_id, resolution, texture_handle);
                self.drawers.notify_preview_started(&descriptor, texture_handle);
                Ok(())
            }
            Err(texture) => {
                log::warn!("{} changed state during preview start, rolling back", device_id);
                self.renderer.release_texture(texture);
                if let Err(e) = self.bridge.stop_preview(device_id) {
                    log::warn!("Rollback stop_preview failed for {}: {}", device_id, e);
                }
                if token.is_cancelled() {
                    self.discard(device_id);
                }
                Ok(())
            }
        }
    }

    fn stop(&mut self, device_id: &str) -> Result<()> {
        validate_device_id(device_id)?;

        let ticker = match self.sessions.get(device_id) {
            Some(session) if session.is_previewing() => session.frame_ticker().cloned(),
            _ => {
                log::debug!("Stop preview for {}: not previewing", device_id);
                return Ok(());
            }
        };

        // No render tick may reach the native layer once the stop is issued.
        if let Some(ticker) = &ticker {
            ticker.cancel();
        }
        if let Err(e) = self.bridge.stop_preview(device_id) {
            if let Some(ticker) = &ticker {
                ticker.rearm();
            }
            return Err(e);
        }

        let Some(session) = self.sessions.get_mut(device_id) else {
            return Ok(());
        };
        let texture = session.end_preview();
        let descriptor = session.descriptor().clone();
        if let Some(texture) = texture {
            self.renderer.release_texture(texture);
        }
        log::info!("Stopped preview of {}", device_id);
        self.drawers.notify_preview_stopped(&descriptor);
        Ok(())
    }

    fn change_resolution(&mut self, device_id: &str, resolution: Option<Resolution>) -> Result<bool> {
        validate_device_id(device_id)?;
        let target = resolution.unwrap_or_else(|| self.config.default_resolution());

        let (token, previous) = match self.sessions.get(device_id) {
            Some(session)
                if session.is_previewing() && session.current_resolution() != Some(target) =>
            {
                (session.cancellation().clone(), session.current_resolution())
            }
            _ => return Ok(false),
        };

        // Validate before tearing anything down so an unsupported size keeps the preview.
        let catalog = self.fetch_catalog(device_id)?;
        if !catalog.supports(target) {
            return Err(UvcError::UnsupportedResolution {
                device_id: device_id.to_string(),
                width: target.width,
                height: target.height,
            });
        }

        log::info!("Changing resolution of {} to {}", device_id, target);
        self.stop(device_id)?;
        if let Err(e) = self.start_with(device_id, target, &catalog, &token) {
            if let Some(previous) = previous {
                log::warn!("Restart of {} at {} failed, restoring {}", device_id, target, previous);
                if let Err(restore) = self.start_with(device_id, previous, &catalog, &token) {
                    log::warn!("Could not restore preview of {}: {}", device_id, restore);
                }
            }
            return Err(e);
        }
        Ok(true)
    }

    fn close_session(&mut self, device_id: &str) -> CloseOutcome {
        let Some(session) = self.sessions.get_mut(device_id) else {
            return CloseOutcome::NotOpen;
        };
        if !session.is_open() {
            return CloseOutcome::NotOpen;
        }

        let was_previewing = session.is_previewing();
        let descriptor = session.descriptor().clone();
        let resources = session.close();

        if let Some(texture) = resources.texture {
            self.renderer.release_texture(texture);
        }
        if was_previewing {
            self.drawers.notify_preview_stopped(&descriptor);
        }

        match self.bridge.close_device(device_id) {
            Ok(()) => {
                log::info!("Closed {}", device_id);
                CloseOutcome::Closed
            }
            Err(e) => CloseOutcome::Failed(e),
        }
    }

    fn detach(&mut self, device_id: &str) -> Result<()> {
        validate_device_id(device_id)?;

        let descriptor = match self.sessions.get(device_id) {
            Some(session) => {
                session.cancellation().cancel();
                session.descriptor().clone()
            }
            None => {
                log::debug!("Detach for unknown device {}", device_id);
                return Ok(());
            }
        };

        self.drawers.notify_detached(&descriptor);
        self.discard(device_id);
        log::info!("Device detached: {}", device_id);
        Ok(())
    }

    /// Force-close and forget a session; returns whether one existed
    fn discard(&mut self, device_id: &str) -> bool {
        self.permissions.resolve(device_id);
        if let Some(session) = self.sessions.get(device_id) {
            session.cancellation().cancel();
        }
        if let CloseOutcome::Failed(e) = self.close_session(device_id) {
            log::warn!("Native close failed while discarding {}: {}", device_id, e);
        }
        match self.sessions.remove(device_id) {
            Some(mut session) => {
                session.close();
                true
            }
            None => false,
        }
    }

    fn resume(&mut self) -> Result<()> {
        if !self.config.permission.request_on_resume {
            log::debug!("Resume: permission retry disabled");
            return Ok(());
        }

        let mut candidates: Vec<(String, LifecycleState)> = self
            .sessions
            .values()
            .filter(|s| !s.is_open())
            .map(|s| (s.device_id().to_string(), s.state()))
            .collect();
        candidates.sort_by(|a, b| a.0.cmp(&b.0));

        let mut first_error = None;
        for (device_id, state) in candidates {
            let result = if state == LifecycleState::PermissionRequested {
                match self.bridge.has_permission(&device_id) {
                    Ok(true) => {
                        log::info!("Permission for {} arrived while paused", device_id);
                        self.permission_granted(&device_id)
                    }
                    Ok(false) => Ok(()),
                    Err(e) => Err(e),
                }
            } else {
                self.request_permission(&device_id)
            };

            if let Err(e) = result {
                log::warn!("Resume handling failed for {}: {}", device_id, e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
