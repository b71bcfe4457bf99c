// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::time::Duration;

use super::scan_code::ScanCode;

const PS2K_TYPEMATIC_INTERVAL_MASK: u8 = 0x1f;
const PS2K_TYPEMATIC_DELAY_MASK: u8 = 0x60;

const TYPEMATIC_INTERVAL_BASE_US: u64 = 35_000;
const TYPEMATIC_INTERVAL_STEP_US: u64 = 15_000;

/// Auto-repeat timing: first repeat after `delay`, then every `interval`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Typematic {
    pub delay: Duration,
    pub interval: Duration,
}
impl Typematic {
    /// Decode the argument of a Set-Typematic command.  Bits 0-4 select the
    /// interval, bits 5-6 the delay; bit 7 is ignored.
    pub fn from_byte(v: u8) -> Self {
        let steps = (v & PS2K_TYPEMATIC_INTERVAL_MASK) as u64;
        let interval = Duration::from_micros(
            TYPEMATIC_INTERVAL_BASE_US + steps * TYPEMATIC_INTERVAL_STEP_US,
        );
        let delay = match v & PS2K_TYPEMATIC_DELAY_MASK {
            0x20 => 500,
            0x40 => 750,
            0x60 => 1000,
            _ => 250,
        };
        Self { delay: Duration::from_millis(delay), interval }
    }
}
impl Default for Typematic {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(250),
            interval: Duration::from_micros(TYPEMATIC_INTERVAL_BASE_US),
        }
    }
}

/// The one key (or modifier) currently subject to auto-repeat
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RepeatTarget {
    #[default]
    None,
    /// HID keyboard usage
    Key(u8),
    /// Bit index (0-7) within the HID modifier byte
    Modifier(u8),
}
impl RepeatTarget {
    pub fn scan_code(&self) -> Option<ScanCode> {
        match self {
            RepeatTarget::None => None,
            RepeatTarget::Key(usage) => ScanCode::for_usage(*usage),
            RepeatTarget::Modifier(bit) => Some(ScanCode::for_modifier(*bit)),
        }
    }
}
