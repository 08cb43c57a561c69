//! Fixed report layout of the Vader 4 Pro in DInput mode.
//!
//! Button fields live at report offsets 7..=10 and are decoded through a
//! per-firmware mask table ([`ButtonMapVariant`]). The six analog axes sit at
//! fixed offsets and are never remapped.

use serde::{Deserialize, Serialize};
use std::fmt;
use VirtualButton::*;

/// Output buttons exposed on the virtual joystick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VirtualButton {
    South,
    East,
    North,
    West,
    TL,
    TR,
    TL2,
    TR2,
    Select,
    Start,
    Mode,
    ThumbL,
    ThumbR,
    DPadUp,
    DPadDown,
    DPadLeft,
    DPadRight,
    /// `BTN_TRIGGER_HAPPY<n>`, `n` in `1..=10`
    TriggerHappy(u8),
}

impl fmt::Display for VirtualButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VirtualButton::South => write!(f, "BTN_SOUTH"),
            VirtualButton::East => write!(f, "BTN_EAST"),
            VirtualButton::North => write!(f, "BTN_NORTH"),
            VirtualButton::West => write!(f, "BTN_WEST"),
            VirtualButton::TL => write!(f, "BTN_TL"),
            VirtualButton::TR => write!(f, "BTN_TR"),
            VirtualButton::TL2 => write!(f, "BTN_TL2"),
            VirtualButton::TR2 => write!(f, "BTN_TR2"),
            VirtualButton::Select => write!(f, "BTN_SELECT"),
            VirtualButton::Start => write!(f, "BTN_START"),
            VirtualButton::Mode => write!(f, "BTN_MODE"),
            VirtualButton::ThumbL => write!(f, "BTN_THUMBL"),
            VirtualButton::ThumbR => write!(f, "BTN_THUMBR"),
            VirtualButton::DPadUp => write!(f, "BTN_DPAD_UP"),
            VirtualButton::DPadDown => write!(f, "BTN_DPAD_DOWN"),
            VirtualButton::DPadLeft => write!(f, "BTN_DPAD_LEFT"),
            VirtualButton::DPadRight => write!(f, "BTN_DPAD_RIGHT"),
            VirtualButton::TriggerHappy(n) => write!(f, "BTN_TRIGGER_HAPPY{}", n),
        }
    }
}

/// Analog axes, in emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AxisId {
    X,
    Y,
    RX,
    RY,
    Z,
    RZ,
}

impl AxisId {
    pub const ALL: [AxisId; 6] = [
        AxisId::X,
        AxisId::Y,
        AxisId::RX,
        AxisId::RY,
        AxisId::Z,
        AxisId::RZ,
    ];

    /// Position of this axis in [`AxisId::ALL`] and in snapshot storage.
    pub fn index(self) -> usize {
        match self {
            AxisId::X => 0,
            AxisId::Y => 1,
            AxisId::RX => 2,
            AxisId::RY => 3,
            AxisId::Z => 4,
            AxisId::RZ => 5,
        }
    }

    pub fn offset(self) -> usize {
        match self {
            AxisId::X => 17,
            AxisId::Y => 19,
            AxisId::RX => 21,
            AxisId::RY => 22,
            AxisId::Z => 23,
            AxisId::RZ => 24,
        }
    }

    pub fn transform(self) -> AxisTransform {
        match self {
            AxisId::X | AxisId::Y | AxisId::RX | AxisId::RY => AxisTransform::Centered,
            AxisId::Z | AxisId::RZ => AxisTransform::Unsigned,
        }
    }
}

impl fmt::Display for AxisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AxisId::X => write!(f, "ABS_X"),
            AxisId::Y => write!(f, "ABS_Y"),
            AxisId::RX => write!(f, "ABS_RX"),
            AxisId::RY => write!(f, "ABS_RY"),
            AxisId::Z => write!(f, "ABS_Z"),
            AxisId::RZ => write!(f, "ABS_RZ"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisTransform {
    /// `raw - 127`, no clamping
    Centered,
    /// `raw` unchanged
    Unsigned,
}

impl AxisTransform {
    pub fn apply(self, raw: u8) -> i32 {
        match self {
            AxisTransform::Centered => i32::from(raw) - 127,
            AxisTransform::Unsigned => i32::from(raw),
        }
    }

    /// Range, fuzz and flat declared to the input subsystem.
    pub fn range(self) -> AxisRange {
        match self {
            AxisTransform::Centered => AxisRange {
                min: -127,
                max: 127,
                fuzz: 0,
                flat: 127,
            },
            AxisTransform::Unsigned => AxisRange {
                min: 0,
                max: 255,
                fuzz: 0,
                flat: 0,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisRange {
    pub min: i32,
    pub max: i32,
    pub fuzz: i32,
    pub flat: i32,
}

/// Masks registered at one byte offset of the report.
#[derive(Debug)]
pub struct ButtonField {
    pub offset: usize,
    pub masks: &'static [(u8, VirtualButton)],
}

const DPAD_AND_FACE: ButtonField = ButtonField {
    offset: 9,
    masks: &[
        (1, DPadUp),
        (2, DPadRight),
        (4, DPadDown),
        (8, DPadLeft),
        (16, South),
        (32, East),
        (64, Select),
        (128, West),
    ],
};

const SHOULDERS: ButtonField = ButtonField {
    offset: 10,
    masks: &[
        (1, North),
        (2, Start),
        (4, TL),
        (8, TR),
        (16, TL2),
        (32, TR2),
        (64, ThumbL),
        (128, ThumbR),
    ],
};

static STANDARD_FIELDS: [ButtonField; 4] = [
    ButtonField {
        offset: 7,
        masks: &[
            (1, TriggerHappy(5)),
            (2, TriggerHappy(6)),
            (4, TriggerHappy(3)),
            (8, TriggerHappy(1)),
            (16, TriggerHappy(4)),
            (32, TriggerHappy(2)),
        ],
    },
    ButtonField {
        offset: 8,
        masks: &[(1, TriggerHappy(7)), (8, Mode)],
    },
    DPAD_AND_FACE,
    SHOULDERS,
];

static EXTENDED_FIELDS: [ButtonField; 4] = [
    ButtonField {
        offset: 7,
        masks: &[
            (1, TriggerHappy(1)),
            (2, TriggerHappy(2)),
            (4, TriggerHappy(3)),
            (8, TriggerHappy(4)),
            (16, TriggerHappy(5)),
            (32, TriggerHappy(6)),
        ],
    },
    ButtonField {
        offset: 8,
        masks: &[
            (1, TriggerHappy(7)),
            (2, TriggerHappy(8)),
            (4, TriggerHappy(9)),
            (8, Mode),
            (16, TriggerHappy(10)),
        ],
    },
    DPAD_AND_FACE,
    SHOULDERS,
];

/// Firmware-specific assignment of the offset 7/8 masks.
///
/// The two layouts conflict on the same masks, so they are kept apart rather
/// than merged into one table.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum ButtonMapVariant {
    /// Trigger-happy numbering observed on the shipping firmware.
    #[default]
    Standard,
    /// Sequential trigger-happy numbering plus three extra back buttons.
    Extended,
}

impl ButtonMapVariant {
    pub fn fields(self) -> &'static [ButtonField] {
        match self {
            ButtonMapVariant::Standard => &STANDARD_FIELDS,
            ButtonMapVariant::Extended => &EXTENDED_FIELDS,
        }
    }

    /// Every button of this variant in table order.
    pub fn buttons(self) -> impl Iterator<Item = VirtualButton> {
        self.fields()
            .iter()
            .flat_map(|field| field.masks.iter().map(|&(_, button)| button))
    }
}

impl fmt::Display for ButtonMapVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ButtonMapVariant::Standard => write!(f, "standard"),
            ButtonMapVariant::Extended => write!(f, "extended"),
        }
    }
}

/// What the virtual device declares at creation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    pub buttons: Vec<VirtualButton>,
    pub axes: Vec<(AxisId, AxisRange)>,
}

impl Capabilities {
    pub fn for_variant(variant: ButtonMapVariant) -> Self {
        Self {
            buttons: variant.buttons().collect(),
            axes: AxisId::ALL
                .iter()
                .map(|&axis| (axis, axis.transform().range()))
                .collect(),
        }
    }
}
