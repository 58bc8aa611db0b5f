//! Device monitoring actor
//!
//! Owns a [`DeviceManager`] on a tokio task and serializes every bridge
//! callback, host lifecycle event and application request through one
//! channel. Permission deadlines are driven from the same loop, so a timeout
//! can never race a grant for the same device.

use crate::drawer::Drawer;
use crate::errors::{Result, UvcError};
use crate::events::DeviceEvent;
use crate::manager::{CloseAllReport, DeviceManager};
use crate::platform::bridge::{RenderBackend, UvcBridge};
use crate::session::SessionSnapshot;
use crate::types::{NativeHandle, Resolution};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

/// Requests processed by the monitor task, in arrival order
pub enum MonitorCommand {
    Event {
        event: DeviceEvent,
        reply: Option<oneshot::Sender<Result<()>>>,
    },
    ChangeResolution {
        device_id: String,
        resolution: Option<Resolution>,
        reply: oneshot::Sender<Result<bool>>,
    },
    CloseAll {
        reply: oneshot::Sender<CloseAllReport>,
    },
    Snapshot {
        reply: oneshot::Sender<Vec<SessionSnapshot>>,
    },
    FrameTargets {
        reply: oneshot::Sender<Vec<NativeHandle>>,
    },
    RegisterDrawer {
        drawer: Arc<dyn Drawer>,
        reply: oneshot::Sender<Result<()>>,
    },
    Shutdown {
        reply: oneshot::Sender<CloseAllReport>,
    },
}

/// Cloneable handle for pushing bridge callbacks into the monitor
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<MonitorCommand>,
}

impl EventSender {
    /// Queue an event; its outcome is only logged
    pub fn send(&self, event: DeviceEvent) -> Result<()> {
        self.tx
            .send(MonitorCommand::Event { event, reply: None })
            .map_err(|_| UvcError::MonitorClosed)
    }

    /// Translate a raw bridge callback and queue it
    pub fn send_callback(&self, name: &str, args: &str) -> Result<()> {
        self.send(DeviceEvent::from_callback(name, args)?)
    }

    /// Queue an event and wait for the manager's verdict on it
    pub async fn dispatch(&self, event: DeviceEvent) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(MonitorCommand::Event {
                event,
                reply: Some(reply),
            })
            .map_err(|_| UvcError::MonitorClosed)?;
        rx.await.map_err(|_| UvcError::MonitorClosed)?
    }
}

pub struct DeviceMonitor {
    events: EventSender,
    task: JoinHandle<()>,
}

impl DeviceMonitor {
    /// Move `manager` onto a new task. Must be called inside a tokio runtime.
    pub fn spawn<B, R>(manager: DeviceManager<B, R>) -> Self
    where
        B: UvcBridge + Send + 'static,
        R: RenderBackend + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(manager, rx));
        log::info!("Device monitor started");
        Self {
            events: EventSender { tx },
            task,
        }
    }

    pub fn event_sender(&self) -> EventSender {
        self.events.clone()
    }

    pub fn send(&self, event: DeviceEvent) -> Result<()> {
        self.events.send(event)
    }

    pub async fn dispatch(&self, event: DeviceEvent) -> Result<()> {
        self.events.dispatch(event).await
    }

    pub async fn request_change_resolution(
        &self,
        device_id: &str,
        resolution: Option<Resolution>,
    ) -> Result<bool> {
        let device_id = device_id.to_string();
        self.request(|reply| MonitorCommand::ChangeResolution {
            device_id,
            resolution,
            reply,
        })
        .await?
    }

    pub async fn close_all(&self) -> Result<CloseAllReport> {
        self.request(|reply| MonitorCommand::CloseAll { reply }).await
    }

    pub async fn attached_devices(&self) -> Result<Vec<SessionSnapshot>> {
        self.request(|reply| MonitorCommand::Snapshot { reply }).await
    }

    pub async fn frame_tick_targets(&self) -> Result<Vec<NativeHandle>> {
        self.request(|reply| MonitorCommand::FrameTargets { reply }).await
    }

    pub async fn register_drawer(&self, drawer: Arc<dyn Drawer>) -> Result<()> {
        self.request(|reply| MonitorCommand::RegisterDrawer { drawer, reply })
            .await?
    }

    /// Close every device and stop the task
    pub async fn shutdown(self) -> Result<CloseAllReport> {
        let report = self
            .request(|reply| MonitorCommand::Shutdown { reply })
            .await?;
        if let Err(e) = self.task.await {
            log::error!("Device monitor task ended abnormally: {}", e);
        }
        Ok(report)
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> MonitorCommand,
    ) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.events
            .tx
            .send(make(reply))
            .map_err(|_| UvcError::MonitorClosed)?;
        rx.await.map_err(|_| UvcError::MonitorClosed)
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn run<B, R>(mut manager: DeviceManager<B, R>, mut rx: mpsc::UnboundedReceiver<MonitorCommand>)
where
    B: UvcBridge,
    R: RenderBackend,
{
    loop {
        let deadline = manager.next_permission_deadline();
        let command = tokio::select! {
            biased;
            _ = sleep_until_deadline(deadline) => {
                let expired = manager.expire_permissions(Instant::now());
                if !expired.is_empty() {
                    log::warn!("Permission timed out for: {:?}", expired);
                }
                continue;
            }
            command = rx.recv() => command,
        };

        match command {
            Some(MonitorCommand::Event { event, reply }) => {
                let name = event.name();
                let device = event.device_id().map(str::to_string);
                let result = manager.handle_event(event);
                if let Err(e) = &result {
                    log::warn!("{} event for {:?} failed: {}", name, device, e);
                }
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
            Some(MonitorCommand::ChangeResolution {
                device_id,
                resolution,
                reply,
            }) => {
                let _ = reply.send(manager.request_change_resolution(&device_id, resolution));
            }
            Some(MonitorCommand::CloseAll { reply }) => {
                let _ = reply.send(manager.close_all());
            }
            Some(MonitorCommand::Snapshot { reply }) => {
                let _ = reply.send(manager.attached_devices());
            }
            Some(MonitorCommand::FrameTargets { reply }) => {
                let _ = reply.send(manager.frame_tick_targets());
            }
            Some(MonitorCommand::RegisterDrawer { drawer, reply }) => {
                let _ = reply.send(manager.register_drawer(&drawer));
            }
            Some(MonitorCommand::Shutdown { reply }) => {
                log::info!("Device monitor shutting down");
                let _ = reply.send(manager.close_all());
                break;
            }
            None => {
                log::info!("All monitor handles dropped, closing devices");
                let report = manager.close_all();
                if !report.is_clean() {
                    log::warn!("{} device(s) failed to close", report.failures.len());
                }
                break;
            }
        }
    }
}
