//! uvc-manager: multi-device session management for UVC cameras
//!
//! This crate sits between a native USB/UVC bridge and a graphics host. It
//! tracks every attached camera through permission, open, preview and close,
//! negotiates the preview resolution with application-supplied drawers, and
//! keeps the bound render texture and per-frame ticks in lockstep with the
//! device state.
//!
//! # Features
//! - One session per device, keyed by the transport-level identifier
//! - Permission waits with a configurable timeout
//! - Resolution negotiation against the device's format catalog
//! - Ordered, idempotent preview teardown on stop, close, pause and detach
//! - A tokio actor ([`DeviceMonitor`]) that serializes events from any thread
//!
//! # Usage
//! ```rust,ignore
//! use uvc_manager::{DeviceManager, DeviceMonitor, UvcConfig};
//!
//! let manager = DeviceManager::new(UvcConfig::load_or_default(), bridge, renderer);
//! let monitor = DeviceMonitor::spawn(manager);
//! let events = monitor.event_sender();
//! // from the bridge callback thread:
//! events.send_callback("OnEventAttach", "/dev/bus/usb/001/004")?;
//! ```
pub mod catalog;
pub mod config;
pub mod descriptor;
pub mod drawer;
pub mod errors;
pub mod events;
pub mod invariant_ppt;
pub mod manager;
pub mod permissions;
pub mod platform;
pub mod session;
pub mod types;

// Testing utilities - loopback bridge and synthetic devices for offline testing
pub mod testing;

// Re-exports for convenience
pub use catalog::{FormatCatalog, FormatEntry, FormatKind};
pub use config::UvcConfig;
pub use descriptor::DeviceDescriptor;
pub use drawer::Drawer;
pub use errors::{ErrorKind, UvcError};
pub use events::DeviceEvent;
pub use manager::{CloseAllReport, DeviceManager};
pub use permissions::{PermissionStatus, PermissionTicket};
pub use platform::{DeviceMonitor, EventSender, RenderBackend, UvcBridge};
pub use session::{LifecycleState, SessionSnapshot};
pub use types::{BoundTexture, NativeHandle, PreviewMode, Resolution, TextureHandle};

/// Initialize logging for the device manager
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "uvc_manager=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
}

#[cfg(test)]
mod lib_tests {
    use super::*;

    #[test]
    fn test_crate_info() {
        let info = get_info();
        assert_eq!(info.name, "uvc-manager");
        assert!(!info.version.is_empty());
        assert!(!info.description.is_empty());
    }

    #[test]
    fn test_init_logging_is_repeatable() {
        init_logging();
        init_logging();
    }
}
