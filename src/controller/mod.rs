//! Controller protocol: report layout and decoding
//!
//! 1. [`layout`] - Button map variants, axis table and declared capabilities
//! 2. [`report`] - Pure decoding of one 64-byte report into a snapshot
//!
//! # Report layout
//!
//! ```text
//! offset  7      8      9          10          17  19  21  22  23  24
//!         back   mode   dpad+face  shoulders   X   Y   RX  RY  Z   RZ
//! ```

pub mod layout;
pub mod report;

pub use layout::{AxisId, ButtonMapVariant, Capabilities, VirtualButton};
pub use report::{decode, ControllerSnapshot, Report, REPORT_LEN};
