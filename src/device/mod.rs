//! Physical controller side
//!
//! - [`locator`] - Finds the hidraw node by USB identity and port path
//! - [`hidraw`] - Async report source over that node
//! - [`hiding`] - udev rule hiding the controller's own joystick nodes

pub mod hiding;
pub mod hidraw;
pub mod locator;

pub use hiding::{HideError, UdevHider};
pub use hidraw::HidrawSource;
pub use locator::{DeviceTarget, LocatorError, PhysSignature, SysfsLocator};
