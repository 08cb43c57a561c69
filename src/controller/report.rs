use crate::controller::layout::{AxisId, ButtonMapVariant, VirtualButton};

/// Size of one complete input report read from the hidraw node.
pub const REPORT_LEN: usize = 64;

pub type Report = [u8; REPORT_LEN];

/// Decoded state of one report. Nothing carries over between reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSnapshot {
    /// Every button of the active variant, in table order
    pub buttons: Vec<(VirtualButton, bool)>,
    /// Indexed by [`AxisId::index`]
    pub axes: [i32; 6],
}

impl ControllerSnapshot {
    pub fn is_pressed(&self, button: VirtualButton) -> bool {
        self.buttons
            .iter()
            .any(|&(candidate, pressed)| candidate == button && pressed)
    }

    pub fn axis(&self, axis: AxisId) -> i32 {
        self.axes[axis.index()]
    }

    pub fn pressed_buttons(&self) -> impl Iterator<Item = VirtualButton> + '_ {
        self.buttons
            .iter()
            .filter(|&&(_, pressed)| pressed)
            .map(|&(button, _)| button)
    }
}

/// Decodes a complete report against the given button map.
///
/// Pure and total: the fixed array type already guarantees the length the
/// read loop checked.
pub fn decode(report: &Report, variant: ButtonMapVariant) -> ControllerSnapshot {
    let buttons = variant
        .fields()
        .iter()
        .flat_map(|field| {
            let byte = report[field.offset];
            field
                .masks
                .iter()
                .map(move |&(mask, button)| (button, byte & mask != 0))
        })
        .collect();

    let mut axes = [0; 6];
    for axis in AxisId::ALL {
        axes[axis.index()] = axis.transform().apply(report[axis.offset()]);
    }

    ControllerSnapshot { buttons, axes }
}
