use crate::controller::{AxisId, ControllerSnapshot};
use crate::output::sink::{EventSink, SinkError};
use tracing::trace;

/// Writes the full state of `snapshot` to the sink and closes the batch.
///
/// Every button and axis is re-emitted on each report whether or not it
/// changed, so a missed read can never leave the virtual device out of step.
/// `previous` only feeds trace logging.
pub fn emit(
    snapshot: &ControllerSnapshot,
    previous: Option<&ControllerSnapshot>,
    sink: &mut dyn EventSink,
) -> Result<(), SinkError> {
    for (i, &(button, pressed)) in snapshot.buttons.iter().enumerate() {
        if let Some(prev) = previous.and_then(|p| p.buttons.get(i)) {
            if prev.1 != pressed {
                trace!(
                    "{} -> {}",
                    button,
                    if pressed { "pressed" } else { "released" }
                );
            }
        }
        sink.button(button, pressed)?;
    }

    for axis in AxisId::ALL {
        sink.axis(axis, snapshot.axis(axis))?;
    }

    sink.sync()
}
