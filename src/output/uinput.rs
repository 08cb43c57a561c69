//! Virtual joystick backed by `/dev/uinput`
//!
//! Generally requires root or membership in the group owning `/dev/uinput`.

use crate::controller::{AxisId, Capabilities, VirtualButton};
use crate::output::sink::{EventSink, SinkError};
use evdev::{
    uinput::{VirtualDevice, VirtualDeviceBuilder},
    AbsInfo, AbsoluteAxisType, AttributeSet, EventType, InputEvent, Key, UinputAbsSetup,
};
use tracing::{debug, info};

pub struct VirtualJoystick {
    device: VirtualDevice,
    declared: AttributeSet<Key>,
    /// Events of the report currently being emitted
    pending: Vec<InputEvent>,
}

impl VirtualJoystick {
    /// Creates the device with every button and axis of `caps` declared.
    pub fn create(name: &str, caps: &Capabilities) -> Result<Self, SinkError> {
        info!(
            "Creating virtual joystick '{}' with {} buttons and {} axes",
            name,
            caps.buttons.len(),
            caps.axes.len()
        );

        let mut keys = AttributeSet::<Key>::new();
        for &button in &caps.buttons {
            keys.insert(button_to_key(button));
        }

        let mut builder = VirtualDeviceBuilder::new()
            .map_err(SinkError::Create)?
            .name(name)
            .with_keys(&keys)
            .map_err(SinkError::Create)?;

        for &(axis, range) in &caps.axes {
            let setup = UinputAbsSetup::new(
                axis_to_code(axis),
                AbsInfo::new(0, range.min, range.max, range.fuzz, range.flat, 0),
            );
            builder = builder
                .with_absolute_axis(&setup)
                .map_err(SinkError::Create)?;
        }

        let mut device = builder.build().map_err(SinkError::Create)?;

        if let Ok(mut nodes) = device.enumerate_dev_nodes_blocking() {
            if let Some(Ok(path)) = nodes.next() {
                info!("Virtual joystick available as {}", path.display());
            }
        }

        let capacity = caps.buttons.len() + caps.axes.len();
        Ok(Self {
            device,
            declared: keys,
            pending: Vec::with_capacity(capacity),
        })
    }
}

impl EventSink for VirtualJoystick {
    fn button(&mut self, button: VirtualButton, pressed: bool) -> Result<(), SinkError> {
        let key = button_to_key(button);
        if !self.declared.contains(key) {
            return Err(SinkError::Undeclared(button));
        }
        self.pending.push(InputEvent::new(
            EventType::KEY,
            key.code(),
            i32::from(pressed),
        ));
        Ok(())
    }

    fn axis(&mut self, axis: AxisId, value: i32) -> Result<(), SinkError> {
        self.pending.push(InputEvent::new(
            EventType::ABSOLUTE,
            axis_to_code(axis).0,
            value,
        ));
        Ok(())
    }

    fn sync(&mut self) -> Result<(), SinkError> {
        // emit() terminates the batch with SYN_REPORT
        let result = self.device.emit(&self.pending).map_err(SinkError::Emit);
        self.pending.clear();
        result
    }
}

impl Drop for VirtualJoystick {
    fn drop(&mut self) {
        debug!("Releasing virtual joystick");
    }
}

fn button_to_key(button: VirtualButton) -> Key {
    match button {
        VirtualButton::South => Key::BTN_SOUTH,
        VirtualButton::East => Key::BTN_EAST,
        VirtualButton::North => Key::BTN_NORTH,
        VirtualButton::West => Key::BTN_WEST,
        VirtualButton::TL => Key::BTN_TL,
        VirtualButton::TR => Key::BTN_TR,
        VirtualButton::TL2 => Key::BTN_TL2,
        VirtualButton::TR2 => Key::BTN_TR2,
        VirtualButton::Select => Key::BTN_SELECT,
        VirtualButton::Start => Key::BTN_START,
        VirtualButton::Mode => Key::BTN_MODE,
        VirtualButton::ThumbL => Key::BTN_THUMBL,
        VirtualButton::ThumbR => Key::BTN_THUMBR,
        VirtualButton::DPadUp => Key::BTN_DPAD_UP,
        VirtualButton::DPadDown => Key::BTN_DPAD_DOWN,
        VirtualButton::DPadLeft => Key::BTN_DPAD_LEFT,
        VirtualButton::DPadRight => Key::BTN_DPAD_RIGHT,
        // BTN_TRIGGER_HAPPY1..40 are contiguous
        VirtualButton::TriggerHappy(n) => {
            Key::new(Key::BTN_TRIGGER_HAPPY1.code() + u16::from(n.saturating_sub(1)))
        }
    }
}

fn axis_to_code(axis: AxisId) -> AbsoluteAxisType {
    match axis {
        AxisId::X => AbsoluteAxisType::ABS_X,
        AxisId::Y => AbsoluteAxisType::ABS_Y,
        AxisId::RX => AbsoluteAxisType::ABS_RX,
        AxisId::RY => AbsoluteAxisType::ABS_RY,
        AxisId::Z => AbsoluteAxisType::ABS_Z,
        AxisId::RZ => AbsoluteAxisType::ABS_RZ,
    }
}
