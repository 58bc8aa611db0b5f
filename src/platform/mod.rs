//! Seams to the host platform and the event-serializing monitor

pub mod bridge;
pub mod device_monitor;

pub use bridge::{RenderBackend, UvcBridge};
pub use device_monitor::{DeviceMonitor, EventSender};
