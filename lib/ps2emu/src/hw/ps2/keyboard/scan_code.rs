// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Scan Code Set 2 codes

pub const SC2_RELEASE_CODE: u8 = 0xf0;
pub const SC2_EXTENDED_PREFIX_0: u8 = 0xe0;

/// Pause has no break code; the release is folded into its make sequence.
pub const SC2_PAUSE: [u8; 8] =
    [0xe1, 0x14, 0x77, 0xe1, 0xf0, 0x14, 0xf0, 0x77];
/// Ctrl+Pause is reported as Break, again with no separate release.
pub const SC2_CTRL_BREAK: [u8; 5] = [0xe0, 0x7e, 0xe0, 0xf0, 0x7e];

pub const HID_USAGE_PAUSE: u8 = 0x48;

/// HID keyboard usage -> Set 2 base value.  Usages at or beyond the end of
/// the table have no PS/2 equivalent.
///
/// 0x31 (backslash) and 0x32 (non-US hash) both land on 0x5d, as do several
/// keypad/navigation pairs; hosts expect exactly these values.
const HID_TO_SC2: [u8; 116] = [
    0x00, 0x00, 0xfc, 0x00, 0x1c, 0x32, 0x21, 0x23, 0x24, 0x2b, 0x34, 0x33,
    0x43, 0x3b, 0x42, 0x4b, 0x3a, 0x31, 0x44, 0x4d, 0x15, 0x2d, 0x1b, 0x2c,
    0x3c, 0x2a, 0x1d, 0x22, 0x35, 0x1a, 0x16, 0x1e, 0x26, 0x25, 0x2e, 0x36,
    0x3d, 0x3e, 0x46, 0x45, 0x5a, 0x76, 0x66, 0x0d, 0x29, 0x4e, 0x55, 0x54,
    0x5b, 0x5d, 0x5d, 0x4c, 0x52, 0x0e, 0x41, 0x49, 0x4a, 0x58, 0x05, 0x06,
    0x04, 0x0c, 0x03, 0x0b, 0x83, 0x0a, 0x01, 0x09, 0x78, 0x07, 0x7c, 0x7e,
    0x7e, 0x70, 0x6c, 0x7d, 0x71, 0x69, 0x7a, 0x74, 0x6b, 0x72, 0x75, 0x77,
    0x4a, 0x7c, 0x7b, 0x79, 0x5a, 0x69, 0x72, 0x7a, 0x6b, 0x73, 0x74, 0x6c,
    0x75, 0x7d, 0x70, 0x71, 0x61, 0x2f, 0x37, 0x0f, 0x08, 0x10, 0x18, 0x20,
    0x28, 0x30, 0x38, 0x40, 0x48, 0x50, 0x57, 0x5f,
];

/// HID modifier bit -> Set 2 base value
/// (LCtrl, LShift, LAlt, LGui, RCtrl, RShift, RAlt, RGui)
const MODIFIER_TO_SC2: [u8; 8] =
    [0x14, 0x12, 0x11, 0x1f, 0x14, 0x59, 0x11, 0x27];

/// PS/2 LED mask (ScrollLock, NumLock, CapsLock) -> HID LED output report
/// (NumLock, CapsLock, ScrollLock)
const PS2_LEDS_TO_HID: [u8; 8] = [0, 4, 1, 5, 2, 6, 3, 7];

/// Does this HID usage live in the extended (E0-prefixed) set?
fn usage_is_extended(usage: u8) -> bool {
    matches!(
        usage,
        0x46 | 0x49..=0x52 | 0x54 | 0x58 | 0x65 | 0x66 | 0x81..=0xff
    )
}

/// Left GUI and all right-hand modifiers except Shift are extended.
fn modifier_is_extended(bit: u8) -> bool {
    bit > 2 && bit != 5
}

/// Translate a PS/2 LED mask to a HID LED output report.  Masks with unknown
/// bits set turn everything off.
pub fn ps2_leds_to_hid(mask: u8) -> u8 {
    PS2_LEDS_TO_HID.get(mask as usize).copied().unwrap_or(0)
}

/// A single-key Set 2 scan code: an optional extended prefix plus the base
/// value.  The make code is `[prefix] base`; the break code is
/// `[prefix] F0 base`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScanCode {
    base_val: u8,
    extended: bool,
}
impl ScanCode {
    /// Scan code for a HID keyboard usage.  The empty-slot marker and
    /// usages with no PS/2 equivalent yield `None`.
    pub fn for_usage(usage: u8) -> Option<Self> {
        if usage == 0 {
            return None;
        }
        let base_val = *HID_TO_SC2.get(usage as usize)?;
        Some(Self { base_val, extended: usage_is_extended(usage) })
    }

    /// Scan code for bit `bit` (0-7) of the HID modifier byte
    pub fn for_modifier(bit: u8) -> Self {
        Self {
            base_val: MODIFIER_TO_SC2[bit as usize & 0x7],
            extended: modifier_is_extended(bit),
        }
    }

    pub fn base_val(&self) -> u8 {
        self.base_val
    }

    pub fn is_extended(&self) -> bool {
        self.extended
    }

    pub fn to_bytes(&self, is_pressed: bool) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(3);
        if self.extended {
            bytes.push(SC2_EXTENDED_PREFIX_0);
        }
        if !is_pressed {
            bytes.push(SC2_RELEASE_CODE);
        }
        bytes.push(self.base_val);
        bytes
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn letters_and_bounds() {
        // 'a'
        assert_eq!(
            ScanCode::for_usage(0x04).unwrap().to_bytes(true),
            [0x1c]
        );
        assert_eq!(
            ScanCode::for_usage(0x04).unwrap().to_bytes(false),
            [0xf0, 0x1c]
        );
        // empty slot and beyond-the-table usages
        assert_eq!(ScanCode::for_usage(0), None);
        assert_eq!(ScanCode::for_usage(0x74), None);
        assert_eq!(ScanCode::for_usage(0xe0), None);
        // last mapped usage (F24)
        assert_eq!(ScanCode::for_usage(0x73).unwrap().base_val(), 0x5f);
    }

    #[test]
    fn extended_navigation_keys() {
        // Insert, Delete, Right Arrow, keypad slash, Application
        for usage in [0x49, 0x4c, 0x4f, 0x54, 0x65] {
            let sc = ScanCode::for_usage(usage).unwrap();
            assert!(sc.is_extended(), "usage {usage:#x}");
            assert_eq!(sc.to_bytes(true)[0], SC2_EXTENDED_PREFIX_0);
        }
        // Right arrow release
        assert_eq!(
            ScanCode::for_usage(0x4f).unwrap().to_bytes(false),
            [0xe0, 0xf0, 0x74]
        );
        // keypad 6 shares the base value but is not extended
        let kp6 = ScanCode::for_usage(0x5e).unwrap();
        assert_eq!(kp6.base_val(), 0x74);
        assert!(!kp6.is_extended());
    }

    #[test]
    fn duplicated_backslash_mapping() {
        assert_eq!(
            ScanCode::for_usage(0x31).unwrap(),
            ScanCode::for_usage(0x32).unwrap()
        );
    }

    #[test]
    fn modifiers() {
        let expect: [(u8, &[u8]); 8] = [
            (0, &[0x14]),
            (1, &[0x12]),
            (2, &[0x11]),
            (3, &[0xe0, 0x1f]),
            (4, &[0xe0, 0x14]),
            (5, &[0x59]),
            (6, &[0xe0, 0x11]),
            (7, &[0xe0, 0x27]),
        ];
        for (bit, bytes) in expect {
            assert_eq!(ScanCode::for_modifier(bit).to_bytes(true), bytes);
        }
        assert_eq!(
            ScanCode::for_modifier(6).to_bytes(false),
            [0xe0, 0xf0, 0x11]
        );
    }

    #[test]
    fn led_translation() {
        assert_eq!(ps2_leds_to_hid(0b001), 0b100); // scroll
        assert_eq!(ps2_leds_to_hid(0b010), 0b001); // num
        assert_eq!(ps2_leds_to_hid(0b100), 0b010); // caps
        assert_eq!(ps2_leds_to_hid(0b111), 0b111);
        assert_eq!(ps2_leds_to_hid(0x08), 0);
    }
}
