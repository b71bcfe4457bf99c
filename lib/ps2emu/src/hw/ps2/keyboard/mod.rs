// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! PS/2 keyboard (Scan Code Set 2) driven by a USB boot keyboard.
//!
//! Each HID report is a complete snapshot of what is held down.  The
//! emulator diffs it against the previous snapshot and sends make codes for
//! keys which appeared and break codes for keys which went away.  The most
//! recently pressed key becomes the typematic repeat target.
//!
//! Host commands arrive one byte at a time.  Set-LEDs and Set-Typematic take
//! an argument in the following byte; there is no timeout on waiting for it.

use std::sync::Arc;
use std::time::Duration;

use slog::{debug, info, o, trace, warn};

use crate::chardev::Ps2Line;
use crate::hid::{KeyboardReport, LedSink, Modifiers, NoLeds, KBD_KEY_SLOTS};
use crate::timer::{Timer, TimerFactory};

mod scan_code;
mod typematic;

use scan_code::*;
pub use scan_code::{ps2_leds_to_hid, ScanCode};
pub use typematic::{RepeatTarget, Typematic};

#[usdt::provider(provider = "ps2emu")]
mod probes {
    // host commands
    fn ps2kbd_cmd(v: u8, parity_ok: u8) {}
    fn ps2kbd_unknown_cmd(v: u8) {}
    fn ps2kbd_parity_err(v: u8) {}

    // report diffing
    fn ps2kbd_report_dropped(modifiers: u8, reserved: u8) {}
    fn ps2kbd_make(usage: u8) {}
    fn ps2kbd_break(usage: u8) {}
    fn ps2kbd_unmapped(usage: u8) {}
    fn ps2kbd_modifier(bit: u8, is_pressed: u8) {}

    // timer servicing
    fn ps2kbd_repeat(base_val: u8, extended: u8) {}
    fn ps2kbd_flash(leds_on: u8) {}
}

// Set LEDs: bit 0 is ScrollLock, bit 1 is NumberLock, bit 2 is CapsLock
const PS2K_CMD_SET_LEDS: u8 = 0xed;
const PS2K_CMD_TYPEMATIC: u8 = 0xf3;

const PS2K_CMD_ECHO: u8 = 0xee;
const PS2K_CMD_IDENT: u8 = 0xf2;
const PS2K_CMD_SCAN_EN: u8 = 0xf4;
const PS2K_CMD_SCAN_DIS: u8 = 0xf5;
const PS2K_CMD_SET_DEFAULT: u8 = 0xf6;
const PS2K_CMD_RESEND: u8 = 0xfe;
const PS2K_CMD_RESET: u8 = 0xff;
// Line noise, not a command.  Gets no reply at all.
const PS2K_CMD_NOISE: u8 = 0x00;

const PS2K_R_ACK: u8 = 0xfa;
const PS2K_R_RESEND: u8 = 0xfe;
const PS2K_R_ECHO: u8 = 0xee;
const PS2K_R_SELF_TEST_PASS: u8 = 0xaa;
// MF2 keyboard
const PS2K_R_IDENT: [u8; 2] = [0xab, 0x83];

const PS2K_LEDS_ALL: u8 = 0b111;

const FLASH_DELAY_RESET: Duration = Duration::from_millis(20);
const FLASH_DELAY_MOUNT: Duration = Duration::from_millis(1);
const FLASH_DURATION: Duration = Duration::from_millis(500);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PendingCmd {
    #[default]
    None,
    AwaitingLedMask,
    AwaitingTypematicByte,
}

/// Progress of the LED flash which precedes the self-test result
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum FlashStage {
    #[default]
    Idle,
    PendingOn,
    PendingOff,
}

pub struct PS2Kbd {
    line: Arc<dyn Ps2Line>,
    leds: Arc<dyn LedSink>,
    /// A USB keyboard is mounted
    attached: bool,

    repeat_timer: Box<dyn Timer>,
    flash_timer: Box<dyn Timer>,

    scanning_enabled: bool,
    pending: PendingCmd,
    typematic: Typematic,
    led_status: u8,
    prev_report: KeyboardReport,
    repeat: RepeatTarget,
    flash: FlashStage,
    /// Most recent byte sent by the command protocol, for Resend
    last_reply: u8,

    log: slog::Logger,
}
impl PS2Kbd {
    pub fn new(
        line: Arc<dyn Ps2Line>,
        timers: &dyn TimerFactory,
        log: &slog::Logger,
    ) -> Self {
        Self {
            line,
            leds: Arc::new(NoLeds),
            attached: false,
            repeat_timer: timers.timer(),
            flash_timer: timers.timer(),
            scanning_enabled: true,
            pending: PendingCmd::None,
            typematic: Typematic::default(),
            led_status: 0,
            prev_report: KeyboardReport::default(),
            repeat: RepeatTarget::None,
            flash: FlashStage::Idle,
            last_reply: PS2K_R_ACK,
            log: log.new(o!("dev" => "ps2-kbd")),
        }
    }

    /// A USB keyboard was mounted.  Its LEDs flash shortly afterwards, and
    /// the host then sees a self-test pass.
    pub fn mount(&mut self, leds: Arc<dyn LedSink>) {
        info!(self.log, "keyboard mounted");
        self.leds = leds;
        self.attached = true;
        self.clear_repeat();
        self.start_flash(FLASH_DELAY_MOUNT);
    }

    pub fn unmount(&mut self) {
        info!(self.log, "keyboard unmounted");
        self.leds = Arc::new(NoLeds);
        self.attached = false;
    }

    /// Accept a raw boot-protocol report from the USB side.
    pub fn recv_report(&mut self, buf: &[u8]) {
        match KeyboardReport::from_bytes(buf) {
            Ok(rep) => self.handle_report(&rep),
            Err(e) => {
                warn!(self.log, "dropped keyboard report"; "error" => %e)
            }
        }
    }

    pub fn handle_report(&mut self, rep: &KeyboardReport) {
        if !self.scanning_enabled || rep.reserved != 0 {
            // The snapshot is not retained either: the next accepted report
            // is diffed against the last one we acted on.
            probes::ps2kbd_report_dropped!(|| (
                rep.modifiers.bits(),
                rep.reserved
            ));
            return;
        }
        let prev = self.prev_report;

        let changed = prev.modifiers ^ rep.modifiers;
        for bit in 0..8u8 {
            let flag = Modifiers::from_bits_retain(1 << bit);
            if !changed.contains(flag) {
                continue;
            }
            let is_pressed = rep.modifiers.contains(flag);
            probes::ps2kbd_modifier!(|| (bit, is_pressed as u8));
            if is_pressed {
                self.set_repeat(RepeatTarget::Modifier(bit));
            } else if self.repeat == RepeatTarget::Modifier(bit) {
                self.clear_repeat();
            }
            self.line.enqueue_many(
                &ScanCode::for_modifier(bit).to_bytes(is_pressed),
            );
        }

        for slot in 0..KBD_KEY_SLOTS {
            let old = prev.keys[slot];
            if old != 0
                && !rep.contains(old)
                && !prev.keys[..slot].contains(&old)
            {
                self.key_break(old);
            }

            let new = rep.keys[slot];
            if new != 0
                && !prev.contains(new)
                && !rep.keys[..slot].contains(&new)
            {
                self.key_make(new, rep.modifiers);
            }
        }

        self.prev_report = *rep;
    }

    fn key_make(&mut self, usage: u8, modifiers: Modifiers) {
        let Some(sc) = ScanCode::for_usage(usage) else {
            probes::ps2kbd_unmapped!(|| usage);
            return;
        };
        probes::ps2kbd_make!(|| usage);

        if usage == HID_USAGE_PAUSE {
            self.clear_repeat();
            if modifiers.intersects(Modifiers::ANY_CTRL) {
                self.line.enqueue_many(&SC2_CTRL_BREAK);
            } else {
                self.line.enqueue_many(&SC2_PAUSE);
            }
            return;
        }

        self.set_repeat(RepeatTarget::Key(usage));
        self.line.enqueue_many(&sc.to_bytes(true));
    }

    fn key_break(&mut self, usage: u8) {
        if usage == HID_USAGE_PAUSE {
            return;
        }
        let Some(sc) = ScanCode::for_usage(usage) else {
            probes::ps2kbd_unmapped!(|| usage);
            return;
        };
        probes::ps2kbd_break!(|| usage);

        if self.repeat == RepeatTarget::Key(usage) {
            self.clear_repeat();
        }
        self.line.enqueue_many(&sc.to_bytes(false));
    }

    fn set_repeat(&mut self, target: RepeatTarget) {
        self.repeat = target;
        self.repeat_timer
            .arm(self.typematic.delay, Some(self.typematic.interval));
    }

    fn clear_repeat(&mut self) {
        self.repeat = RepeatTarget::None;
        self.repeat_timer.disarm();
    }

    /// Accept a byte from the host, along with the transceiver's verdict on
    /// its parity.
    pub fn cmd_input(&mut self, v: u8, parity_ok: bool) {
        probes::ps2kbd_cmd!(|| (v, parity_ok as u8));
        trace!(self.log, "host byte"; "val" => v, "parity_ok" => parity_ok);

        if !parity_ok {
            probes::ps2kbd_parity_err!(|| v);
            self.line.enqueue(PS2K_R_RESEND);
            return;
        }

        match std::mem::take(&mut self.pending) {
            PendingCmd::AwaitingLedMask => {
                self.set_leds(v);
            }
            PendingCmd::AwaitingTypematicByte => {
                self.typematic = Typematic::from_byte(v);
                debug!(self.log, "typematic updated";
                    "delay" => ?self.typematic.delay,
                    "interval" => ?self.typematic.interval,
                );
            }
            PendingCmd::None => match v {
                PS2K_CMD_RESET => {
                    self.reset();
                    return;
                }
                PS2K_CMD_RESEND => {
                    self.reply(self.last_reply);
                    return;
                }
                PS2K_CMD_ECHO => {
                    self.reply(PS2K_R_ECHO);
                    return;
                }
                PS2K_CMD_IDENT => {
                    self.reply(PS2K_R_ACK);
                    for b in PS2K_R_IDENT {
                        self.reply(b);
                    }
                    return;
                }
                PS2K_CMD_SET_LEDS => {
                    // multi-part command, wait for next byte
                    self.pending = PendingCmd::AwaitingLedMask;
                }
                PS2K_CMD_TYPEMATIC => {
                    self.pending = PendingCmd::AwaitingTypematicByte;
                }
                PS2K_CMD_SCAN_EN => {
                    self.scanning_enabled = true;
                }
                PS2K_CMD_SCAN_DIS | PS2K_CMD_SET_DEFAULT => {
                    self.scanning_enabled = v == PS2K_CMD_SET_DEFAULT;
                    self.typematic = Typematic::default();
                    self.set_leds(0);
                }
                PS2K_CMD_NOISE => {
                    return;
                }
                _ => {
                    // acknowledged as though it were understood
                    probes::ps2kbd_unknown_cmd!(|| v);
                }
            },
        }

        self.reply(PS2K_R_ACK);
        self.line.resume();
    }

    fn reply(&mut self, v: u8) {
        self.last_reply = v;
        self.line.enqueue(v);
    }

    fn reset(&mut self) {
        debug!(self.log, "reset");
        self.reply(PS2K_R_ACK);

        self.scanning_enabled = true;
        self.pending = PendingCmd::None;
        self.typematic = Typematic::default();
        self.clear_repeat();
        self.start_flash(FLASH_DELAY_RESET);

        self.line.clear_pending();
        // Even after clearing, the ack is expected.  The self-test result
        // follows once the LED flash completes.
        self.reply(PS2K_R_ACK);
    }

    /// Apply a PS/2 LED mask, pushing it to the USB keyboard.  Masks with
    /// undefined bits turn every LED off.
    fn set_leds(&mut self, mask: u8) {
        let mask = if mask > PS2K_LEDS_ALL { 0 } else { mask };
        debug!(self.log, "leds updated"; "mask" => mask);
        self.led_status = mask;
        self.leds.set_led_report(ps2_leds_to_hid(mask));
    }

    fn start_flash(&mut self, delay: Duration) {
        self.flash = FlashStage::PendingOn;
        self.flash_timer.arm(delay, None);
    }

    fn flash_step(&mut self) {
        let stage = std::mem::take(&mut self.flash);
        if !self.attached {
            return;
        }
        match stage {
            FlashStage::Idle => {}
            FlashStage::PendingOn => {
                probes::ps2kbd_flash!(|| 1);
                self.set_leds(PS2K_LEDS_ALL);
                self.flash = FlashStage::PendingOff;
                self.flash_timer.arm(FLASH_DURATION, None);
            }
            FlashStage::PendingOff => {
                probes::ps2kbd_flash!(|| 0);
                self.set_leds(0);
                self.reply(PS2K_R_SELF_TEST_PASS);
            }
        }
    }

    /// Act on timer expiries.  Called once per polling cycle.
    pub fn service_timers(&mut self) {
        if self.repeat_timer.take_expired() {
            match self.repeat.scan_code() {
                Some(sc) => {
                    probes::ps2kbd_repeat!(|| (
                        sc.base_val(),
                        sc.is_extended() as u8
                    ));
                    self.line.enqueue_many(&sc.to_bytes(true));
                }
                None => self.repeat_timer.disarm(),
            }
        }
        if self.flash_timer.take_expired() {
            self.flash_step();
        }
    }

    pub fn scanning_enabled(&self) -> bool {
        self.scanning_enabled
    }
    pub fn pending(&self) -> PendingCmd {
        self.pending
    }
    pub fn typematic(&self) -> Typematic {
        self.typematic
    }
    /// Current PS/2 LED mask (bit 0 Scroll, 1 Num, 2 Caps)
    pub fn led_status(&self) -> u8 {
        self.led_status
    }
    pub fn repeat_target(&self) -> RepeatTarget {
        self.repeat
    }
    pub fn is_attached(&self) -> bool {
        self.attached
    }
}
