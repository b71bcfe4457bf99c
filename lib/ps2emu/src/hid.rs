// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! USB HID boot-protocol reports, as delivered by the host stack.

use thiserror::Error;

pub const KBD_REPORT_LEN: usize = 8;
pub const MOUSE_REPORT_LEN: usize = 4;

/// Number of concurrent (non-modifier) keys in a boot keyboard report
pub const KBD_KEY_SLOTS: usize = 6;

bitflags! {
    /// Modifier byte of a boot keyboard report
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Modifiers: u8 {
        const LEFT_CTRL = 1 << 0;
        const LEFT_SHIFT = 1 << 1;
        const LEFT_ALT = 1 << 2;
        const LEFT_GUI = 1 << 3;
        const RIGHT_CTRL = 1 << 4;
        const RIGHT_SHIFT = 1 << 5;
        const RIGHT_ALT = 1 << 6;
        const RIGHT_GUI = 1 << 7;

        const ANY_CTRL = (1 << 0) | (1 << 4);
    }
}

bitflags! {
    /// Button byte of a boot mouse report
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct MouseButtons: u8 {
        const LEFT = 1 << 0;
        const RIGHT = 1 << 1;
        const MIDDLE = 1 << 2;
        const BACK = 1 << 3;
        const FORWARD = 1 << 4;

        const PRIMARY = 0b111;
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ReportError {
    #[error("short {kind} report: {len} bytes, expected at least {need}")]
    Short { kind: &'static str, len: usize, need: usize },
}

/// Snapshot of a boot-protocol keyboard.  Each report replaces the previous
/// one entirely.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KeyboardReport {
    pub modifiers: Modifiers,
    pub reserved: u8,
    /// Usage codes of pressed keys.  Unordered; 0 marks an empty slot and
    /// duplicates are possible.
    pub keys: [u8; KBD_KEY_SLOTS],
}
impl KeyboardReport {
    pub fn from_bytes(buf: &[u8]) -> Result<Self, ReportError> {
        if buf.len() < KBD_REPORT_LEN {
            return Err(ReportError::Short {
                kind: "keyboard",
                len: buf.len(),
                need: KBD_REPORT_LEN,
            });
        }
        let mut keys = [0u8; KBD_KEY_SLOTS];
        keys.copy_from_slice(&buf[2..KBD_REPORT_LEN]);
        Ok(Self {
            modifiers: Modifiers::from_bits_retain(buf[0]),
            reserved: buf[1],
            keys,
        })
    }

    pub fn to_bytes(&self) -> [u8; KBD_REPORT_LEN] {
        let mut buf = [0u8; KBD_REPORT_LEN];
        buf[0] = self.modifiers.bits();
        buf[1] = self.reserved;
        buf[2..].copy_from_slice(&self.keys);
        buf
    }

    /// Is `usage` held in any slot?  The empty-slot marker never is.
    pub fn contains(&self, usage: u8) -> bool {
        usage != 0 && self.keys.contains(&usage)
    }

    /// Held usages in slot order, each reported once.
    pub fn pressed(&self) -> impl Iterator<Item = u8> + '_ {
        self.keys.iter().enumerate().filter_map(move |(i, &k)| {
            (k != 0 && !self.keys[..i].contains(&k)).then_some(k)
        })
    }
}

/// Boot-protocol relative mouse report
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MouseReport {
    pub buttons: MouseButtons,
    pub dx: i8,
    /// HID convention: positive is down
    pub dy: i8,
    pub wheel: i8,
}
impl MouseReport {
    pub fn from_bytes(buf: &[u8]) -> Result<Self, ReportError> {
        if buf.len() < MOUSE_REPORT_LEN {
            return Err(ReportError::Short {
                kind: "mouse",
                len: buf.len(),
                need: MOUSE_REPORT_LEN,
            });
        }
        Ok(Self {
            buttons: MouseButtons::from_bits_retain(buf[0]),
            dx: buf[1] as i8,
            dy: buf[2] as i8,
            wheel: buf[3] as i8,
        })
    }
}

/// Receiver for keyboard LED output reports, on the USB side.
pub trait LedSink: Send + Sync + 'static {
    /// Write a HID LED output report (bit 0 NumLock, 1 CapsLock,
    /// 2 ScrollLock).
    fn set_led_report(&self, mask: u8);
}

/// No USB keyboard to light up.
pub struct NoLeds;
impl LedSink for NoLeds {
    fn set_led_report(&self, _mask: u8) {}
}
