//! Inbound transport and host-lifecycle events

use crate::errors::{Result, UvcError};
use crate::permissions::PermissionTicket;
use crate::types::validate_device_id;

/// Every event the manager reacts to. Device events carry the
/// transport-stable device identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    Attach(String),
    Detach(String),
    PermissionGranted(String),
    PermissionDenied(String),
    Connect(String),
    Disconnect(String),
    Ready(String),
    StartPreviewAck(String),
    StopPreviewAck(String),
    /// Raw argument string: device identifier plus status payload
    ReceiveStatus(String),
    /// Raw argument string: device identifier plus button payload
    ButtonEvent(String),
    Resume,
    Pause,
    /// Raised by a host-side timer holding the ticket from
    /// [`DeviceManager::permission_ticket`](crate::manager::DeviceManager::permission_ticket),
    /// never by the bridge
    PermissionTimeout {
        device_id: String,
        ticket: PermissionTicket,
    },
}

impl DeviceEvent {
    /// Map a bridge callback (`"OnEventAttach"`, `"Attach"`, ...) to an event.
    ///
    /// Both the plugin's method names and the bare event names are accepted.
    pub fn from_callback(name: &str, args: &str) -> Result<Self> {
        let bare = name
            .strip_prefix("OnEvent")
            .or_else(|| name.strip_prefix("On"))
            .unwrap_or(name);

        let device = || -> Result<String> {
            validate_device_id(args)?;
            Ok(args.to_string())
        };

        let event = match bare {
            "Attach" => DeviceEvent::Attach(device()?),
            "Detach" => DeviceEvent::Detach(device()?),
            "Permission" | "PermissionGranted" => DeviceEvent::PermissionGranted(device()?),
            "PermissionDenied" => DeviceEvent::PermissionDenied(device()?),
            "Connect" => DeviceEvent::Connect(device()?),
            "Disconnect" => DeviceEvent::Disconnect(device()?),
            "Ready" => DeviceEvent::Ready(device()?),
            "StartPreview" | "StartPreviewAck" => DeviceEvent::StartPreviewAck(device()?),
            "StopPreview" | "StopPreviewAck" => DeviceEvent::StopPreviewAck(device()?),
            "ReceiveStatus" => DeviceEvent::ReceiveStatus(args.to_string()),
            "ButtonEvent" => DeviceEvent::ButtonEvent(args.to_string()),
            "Resume" | "ResumeEvent" => DeviceEvent::Resume,
            "Pause" | "PauseEvent" => DeviceEvent::Pause,
            _ => {
                return Err(UvcError::invalid_argument(format!(
                    "unknown callback name: {}",
                    name
                )))
            }
        };
        Ok(event)
    }

    /// Device the event is about, when it names exactly one
    pub fn device_id(&self) -> Option<&str> {
        match self {
            DeviceEvent::Attach(id)
            | DeviceEvent::Detach(id)
            | DeviceEvent::PermissionGranted(id)
            | DeviceEvent::PermissionDenied(id)
            | DeviceEvent::Connect(id)
            | DeviceEvent::Disconnect(id)
            | DeviceEvent::Ready(id)
            | DeviceEvent::StartPreviewAck(id)
            | DeviceEvent::StopPreviewAck(id) => Some(id),
            DeviceEvent::PermissionTimeout { device_id, .. } => Some(device_id),
            DeviceEvent::ReceiveStatus(_)
            | DeviceEvent::ButtonEvent(_)
            | DeviceEvent::Resume
            | DeviceEvent::Pause => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DeviceEvent::Attach(_) => "attach",
            DeviceEvent::Detach(_) => "detach",
            DeviceEvent::PermissionGranted(_) => "permission_granted",
            DeviceEvent::PermissionDenied(_) => "permission_denied",
            DeviceEvent::Connect(_) => "connect",
            DeviceEvent::Disconnect(_) => "disconnect",
            DeviceEvent::Ready(_) => "ready",
            DeviceEvent::StartPreviewAck(_) => "start_preview_ack",
            DeviceEvent::StopPreviewAck(_) => "stop_preview_ack",
            DeviceEvent::ReceiveStatus(_) => "receive_status",
            DeviceEvent::ButtonEvent(_) => "button_event",
            DeviceEvent::Resume => "resume",
            DeviceEvent::Pause => "pause",
            DeviceEvent::PermissionTimeout { .. } => "permission_timeout",
        }
    }
}
