//! Error taxonomy for the UVC device manager
//!
//! Contract violations (`InvalidArgument`) are kept apart from runtime and
//! environment failures so callers can fail fast on the former and log or
//! retry the latter.

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, UvcError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UvcError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Malformed device descriptor for {device_id}: {reason}")]
    MalformedDescriptor { device_id: String, reason: String },
    #[error("Malformed format catalog for {device_id}: {reason}")]
    MalformedCatalog { device_id: String, reason: String },
    #[error("Failed to open device {0}: native layer returned an empty handle")]
    OpenFailed(String),
    #[error("Resolution {width}x{height} is not supported by device {device_id}")]
    UnsupportedResolution {
        device_id: String,
        width: u32,
        height: u32,
    },
    #[error("Permission denied for device {0}")]
    PermissionDenied(String),
    #[error("Permission request timed out for device {0}")]
    PermissionTimeout(String),
    #[error("Native call {call} failed for device {device_id}: {reason}")]
    NativeCallFailed {
        call: &'static str,
        device_id: String,
        reason: String,
    },
    #[error("Render target error: {0}")]
    RenderTargetFailed(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Device monitor is not running")]
    MonitorClosed,
}

/// Flat discriminant of [`UvcError`], handy in assertions and logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    MalformedDescriptor,
    MalformedCatalog,
    OpenFailed,
    UnsupportedResolution,
    PermissionDenied,
    PermissionTimeout,
    NativeCallFailed,
    RenderTargetFailed,
    Config,
    MonitorClosed,
}

impl UvcError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        UvcError::InvalidArgument(message.into())
    }

    pub fn native(call: &'static str, device_id: &str, reason: impl std::fmt::Display) -> Self {
        UvcError::NativeCallFailed {
            call,
            device_id: device_id.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            UvcError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            UvcError::MalformedDescriptor { .. } => ErrorKind::MalformedDescriptor,
            UvcError::MalformedCatalog { .. } => ErrorKind::MalformedCatalog,
            UvcError::OpenFailed(_) => ErrorKind::OpenFailed,
            UvcError::UnsupportedResolution { .. } => ErrorKind::UnsupportedResolution,
            UvcError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            UvcError::PermissionTimeout(_) => ErrorKind::PermissionTimeout,
            UvcError::NativeCallFailed { .. } => ErrorKind::NativeCallFailed,
            UvcError::RenderTargetFailed(_) => ErrorKind::RenderTargetFailed,
            UvcError::Config(_) => ErrorKind::Config,
            UvcError::MonitorClosed => ErrorKind::MonitorClosed,
        }
    }

    /// Programmer errors: the call itself was wrong, not the environment
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, UvcError::InvalidArgument(_))
    }
}
