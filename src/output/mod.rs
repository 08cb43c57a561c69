//! Virtual device output
//!
//! ```text
//! ControllerSnapshot ──► emit() ──► EventSink ──► uinput
//!                        (full state + sync per report)
//! ```

pub mod emitter;
pub mod sink;
pub mod uinput;

pub use emitter::emit;
pub use sink::{EventSink, SinkError};
pub use uinput::VirtualJoystick;
