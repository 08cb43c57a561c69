//! Bridge between the hidraw report stream and the virtual joystick
//!
//! # Architecture
//!
//! ```text
//! SysfsLocator ──► HidrawSource ──► decode ──► emit ──► VirtualJoystick
//!                  (64-byte reads)                      (events + SYN)
//! ```
//!
//! - [`machine`] - Typestate loop owning both handles
//! - [`error`] - Fatal conditions and their exit codes
//! - [`launch`] - Startup order and teardown

pub mod error;
pub mod launch;
pub mod machine;

pub use error::BridgeError;
pub use launch::launch;
pub use machine::{Bridge, BridgeSettings, BridgeStats, LoopExit, ReportStream};
