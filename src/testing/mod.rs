//! Testing utilities for the UVC manager
//!
//! Provides synthetic device presets modelled on real hardware and loopback
//! implementations of the bridge and render seams, so the manager can be
//! driven end to end without a USB host.

pub mod loopback;
pub mod synthetic_data;

pub use loopback::{
    BridgeCall, DrawerCall, LoopbackBridge, LoopbackDevice, LoopbackRenderer, RecordingDrawer,
};
pub use synthetic_data::{SyntheticCamera, SyntheticSize};
