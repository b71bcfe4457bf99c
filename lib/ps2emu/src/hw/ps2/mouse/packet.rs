// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::hid::{MouseButtons, MouseReport};

use super::WheelType;

bitflags! {
    /// First byte of a movement data packet
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct PacketStatus: u8 {
        const B_LEFT = 1 << 0;
        const B_RIGHT = 1 << 1;
        const B_MID = 1 << 2;
        const ALWAYS_ONE = 1 << 3;
        const X_SIGN = 1 << 4;
        const Y_SIGN = 1 << 5;
        const X_OVERFLOW = 1 << 6;
        const Y_OVERFLOW = 1 << 7;
    }
}

// 5-button mice report buttons 4 and 5 alongside the wheel movement
const WHEEL_B4: u8 = 1 << 4;
const WHEEL_B5: u8 = 1 << 5;

/// A movement data packet, ready for the wire
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MotionPacket {
    bytes: [u8; 4],
    len: usize,
}
impl MotionPacket {
    /// Re-encode a HID relative report for a mouse of the given type.
    ///
    /// HID counts Y positive downward and PS/2 upward, so the vertical delta
    /// is negated on the way through.  Overflow is never reported: an 8-bit
    /// HID delta always fits in the 9-bit PS/2 displacement.
    pub fn encode(rep: &MouseReport, wheel_type: WheelType) -> Self {
        let buttons = rep.buttons.bits() & MouseButtons::PRIMARY.bits();
        let mut status =
            PacketStatus::from_bits_retain(buttons) | PacketStatus::ALWAYS_ONE;

        // Low 8 bits of the 9-bit displacement are the HID byte itself
        let x = rep.dx as u8;
        status.set(PacketStatus::X_SIGN, rep.dx < 0);

        let mut y = (rep.dy as u8) & 0x7f;
        if rep.dy < 0 {
            y = 0x80 - y;
        } else if y != 0 {
            status.insert(PacketStatus::Y_SIGN);
            y = y.wrapping_neg();
        }

        let mut bytes = [status.bits(), x, y, 0];
        let len = match wheel_type {
            WheelType::Standard => 3,
            WheelType::Wheel3Button | WheelType::Wheel5Button => {
                let mut z = (rep.wheel as u8) & 0x7;
                if rep.wheel < 0 {
                    z = 0x8 - z;
                } else if z != 0 {
                    z = 0x10 - z;
                }
                if wheel_type == WheelType::Wheel5Button {
                    if rep.buttons.contains(MouseButtons::BACK) {
                        z += WHEEL_B4;
                    }
                    if rep.buttons.contains(MouseButtons::FORWARD) {
                        z += WHEEL_B5;
                    }
                }
                bytes[3] = z;
                4
            }
        };
        Self { bytes, len }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    pub fn status(&self) -> PacketStatus {
        PacketStatus::from_bits_retain(self.bytes[0])
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn encode(buf: [u8; 4], wt: WheelType) -> MotionPacket {
        MotionPacket::encode(&MouseReport::from_bytes(&buf).unwrap(), wt)
    }

    #[test]
    fn standard_left_click_and_move_right() {
        let pkt = encode([0x01, 0x05, 0x00, 0x00], WheelType::Standard);
        assert_eq!(pkt.as_bytes(), [0x09, 0x05, 0x00]);
        let st = pkt.status();
        assert!(st.contains(PacketStatus::B_LEFT | PacketStatus::ALWAYS_ONE));
        assert!(!st.intersects(PacketStatus::X_SIGN | PacketStatus::Y_SIGN));
    }

    #[test]
    fn horizontal_passes_through() {
        let pkt = encode([0, 0xfb, 0, 0], WheelType::Standard);
        assert_eq!(pkt.as_bytes(), [0x18, 0xfb, 0x00]);

        let pkt = encode([0, 0x80, 0, 0], WheelType::Standard);
        assert_eq!(pkt.as_bytes(), [0x18, 0x80, 0x00]);
    }

    #[test]
    fn vertical_is_inverted() {
        // HID down 5 -> PS/2 -5
        let pkt = encode([0, 0, 0x05, 0], WheelType::Standard);
        assert_eq!(pkt.as_bytes(), [0x28, 0x00, 0xfb]);
        // HID up 5 -> PS/2 +5
        let pkt = encode([0, 0, 0xfb, 0], WheelType::Standard);
        assert_eq!(pkt.as_bytes(), [0x08, 0x00, 0x05]);
        // HID up 128 -> PS/2 +128 fits in the low byte, sign clear
        let pkt = encode([0, 0, 0x80, 0], WheelType::Standard);
        assert_eq!(pkt.as_bytes(), [0x08, 0x00, 0x80]);
        // HID down 127 -> PS/2 -127
        let pkt = encode([0, 0, 0x7f, 0], WheelType::Standard);
        assert_eq!(pkt.as_bytes(), [0x28, 0x00, 0x81]);
    }

    #[test]
    fn wheel_byte() {
        // extra buttons are not reported without a 5-button handshake
        let pkt = encode([0x1f, 0, 0, 0], WheelType::Standard);
        assert_eq!(pkt.as_bytes(), [0x0f, 0x00, 0x00]);

        let pkt = encode([0, 0, 0, 0x01], WheelType::Wheel3Button);
        assert_eq!(pkt.as_bytes(), [0x08, 0x00, 0x00, 0x0f]);
        let pkt = encode([0, 0, 0, 0xff], WheelType::Wheel3Button);
        assert_eq!(pkt.as_bytes(), [0x08, 0x00, 0x00, 0x01]);
        let pkt = encode([0x18, 0, 0, 0], WheelType::Wheel3Button);
        assert_eq!(pkt.as_bytes(), [0x08, 0x00, 0x00, 0x00]);

        let pkt = encode([0x18, 0, 0, 0x01], WheelType::Wheel5Button);
        assert_eq!(pkt.as_bytes(), [0x08, 0x00, 0x00, 0x3f]);
        let pkt = encode([0x08, 0, 0, 0xff], WheelType::Wheel5Button);
        assert_eq!(pkt.as_bytes(), [0x08, 0x00, 0x00, 0x11]);
    }
}
