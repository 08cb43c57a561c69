use crate::controller::{AxisId, VirtualButton};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Failed to create virtual device: {0}")]
    Create(#[source] std::io::Error),

    #[error("Failed to emit events: {0}")]
    Emit(#[source] std::io::Error),

    #[error("Button {0} was not declared on the virtual device")]
    Undeclared(VirtualButton),
}

/// Output side of the bridge: a device that accepts one batch of events per
/// report, closed by [`EventSink::sync`].
pub trait EventSink {
    fn button(&mut self, button: VirtualButton, pressed: bool) -> Result<(), SinkError>;

    fn axis(&mut self, axis: AxisId, value: i32) -> Result<(), SinkError>;

    /// Marks the events since the previous sync as one consistent state.
    fn sync(&mut self) -> Result<(), SinkError>;
}
