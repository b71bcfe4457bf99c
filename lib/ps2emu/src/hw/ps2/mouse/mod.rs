// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! PS/2 mouse driven by a USB boot mouse.
//!
//! The mouse starts out as a plain 3-button device.  Hosts which know about
//! wheel mice probe for them with magic runs of Set-Sample-Rate commands,
//! and a matching run promotes the device to the next wheel type.

use std::sync::Arc;

use slog::{debug, info, o, trace, warn};

use crate::chardev::Ps2Line;
use crate::hid::MouseReport;

mod packet;

pub use packet::{MotionPacket, PacketStatus};

#[usdt::provider(provider = "ps2emu")]
mod probes {
    fn ps2mouse_cmd(v: u8, parity_ok: u8) {}
    fn ps2mouse_unknown_cmd(v: u8) {}
    fn ps2mouse_parity_err(v: u8) {}
    fn ps2mouse_wheel_promote(id_seq: u32, device_id: u8) {}
    fn ps2mouse_packet(status: u8, x: u8, y: u8) {}
    fn ps2mouse_report_dropped(buttons: u8) {}
}

// Mouse-specific commands
const PS2M_CMD_RESET: u8 = 0xff;
const PS2M_CMD_SET_DEFAULTS: u8 = 0xf6;
const PS2M_CMD_DATA_REP_DIS: u8 = 0xf5;
const PS2M_CMD_DATA_REP_ENA: u8 = 0xf4;
const PS2M_CMD_SET_SAMP_RATE: u8 = 0xf3;
const PS2M_CMD_GET_DEVID: u8 = 0xf2;
const PS2M_CMD_STREAM_MODE_SET: u8 = 0xea;
const PS2M_CMD_STATUS_REQ: u8 = 0xe9;

const PS2M_R_ACK: u8 = 0xfa;
const PS2M_R_RESEND: u8 = 0xfe;
const PS2M_R_SELF_TEST_PASS: u8 = 0xaa;
// Status request: no button, mode, or scaling bits are tracked
const PS2M_R_STATUS: u8 = 0x00;
// 4 counts/mm
const PS2M_RESOLUTION: u8 = 0x02;

const PS2M_DEFAULT_SAMPLE_RATE: u8 = 100;

// Sample rates 200, 100, 80
const PS2M_ID_SEQ_WHEEL3: u32 = 0xc8_64_50;
// Sample rates 200, 200, 80
const PS2M_ID_SEQ_WHEEL5: u32 = 0xc8_c8_50;
const PS2M_ID_SEQ_MASK: u32 = 0xff_ff_ff;

/// Mouse flavor, as negotiated by the host.  Ordered: negotiation only ever
/// moves forward.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum WheelType {
    #[default]
    Standard,
    /// IntelliMouse: scroll wheel
    Wheel3Button,
    /// IntelliMouse Explorer: scroll wheel plus buttons 4 and 5
    Wheel5Button,
}
impl WheelType {
    pub fn device_id(&self) -> u8 {
        match self {
            WheelType::Standard => 0x00,
            WheelType::Wheel3Button => 0x03,
            WheelType::Wheel5Button => 0x04,
        }
    }

    /// The type reached from `self` once the last three sample rates were
    /// `id_seq`, if that completes a handshake.
    fn promoted(&self, id_seq: u32) -> Option<WheelType> {
        match (self, id_seq) {
            (WheelType::Standard, PS2M_ID_SEQ_WHEEL3) => {
                Some(WheelType::Wheel3Button)
            }
            (WheelType::Wheel3Button, PS2M_ID_SEQ_WHEEL5) => {
                Some(WheelType::Wheel5Button)
            }
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReportingMode {
    #[default]
    Idle,
    Streaming,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InputMode {
    #[default]
    AwaitingCommand,
    AwaitingSampleRateByte,
}

pub struct PS2Mouse {
    line: Arc<dyn Ps2Line>,
    wheel_type: WheelType,
    mode: ReportingMode,
    input: InputMode,
    sample_rate: u8,
    /// Last three sample rates, oldest in the top byte
    id_seq: u32,
    log: slog::Logger,
}
impl PS2Mouse {
    pub fn new(line: Arc<dyn Ps2Line>, log: &slog::Logger) -> Self {
        Self {
            line,
            wheel_type: WheelType::Standard,
            mode: ReportingMode::Idle,
            input: InputMode::AwaitingCommand,
            sample_rate: PS2M_DEFAULT_SAMPLE_RATE,
            id_seq: 0,
            log: log.new(o!("dev" => "ps2-mouse")),
        }
    }

    /// A USB mouse was mounted: announce a self-test pass to the host.
    pub fn mount(&mut self) {
        info!(self.log, "mouse mounted");
        self.line.enqueue(PS2M_R_SELF_TEST_PASS);
    }

    pub fn unmount(&mut self) {
        info!(self.log, "mouse unmounted");
    }

    /// Accept a byte from the host, along with the transceiver's verdict on
    /// its parity.
    pub fn cmd_input(&mut self, v: u8, parity_ok: bool) {
        probes::ps2mouse_cmd!(|| (v, parity_ok as u8));
        trace!(self.log, "host byte"; "val" => v, "parity_ok" => parity_ok);

        if !parity_ok {
            probes::ps2mouse_parity_err!(|| v);
            self.line.enqueue(PS2M_R_RESEND);
            return;
        }

        if self.input == InputMode::AwaitingSampleRateByte {
            self.input = InputMode::AwaitingCommand;
            self.sample_rate = v;
            self.line.enqueue(PS2M_R_ACK);

            self.id_seq = ((self.id_seq << 8) | v as u32) & PS2M_ID_SEQ_MASK;
            if let Some(wt) = self.wheel_type.promoted(self.id_seq) {
                self.wheel_type = wt;
                probes::ps2mouse_wheel_promote!(|| (
                    self.id_seq,
                    wt.device_id()
                ));
            }
            debug!(self.log, "sample rate set";
                "rate" => v,
                "id_seq" => format!("{:06x}", self.id_seq),
                "wheel_type" => ?self.wheel_type,
            );
            return;
        }

        // The handshake only counts uninterrupted Set-Sample-Rate runs
        if v != PS2M_CMD_SET_SAMP_RATE {
            self.id_seq = 0;
        }

        match v {
            PS2M_CMD_RESET => {
                debug!(self.log, "reset");
                self.reset();
                self.line.clear_pending();
                self.line.enqueue_many(&[
                    PS2M_R_ACK,
                    PS2M_R_SELF_TEST_PASS,
                    self.wheel_type.device_id(),
                ]);
            }
            PS2M_CMD_SET_DEFAULTS => {
                self.wheel_type = WheelType::Standard;
                self.sample_rate = PS2M_DEFAULT_SAMPLE_RATE;
                self.mode = ReportingMode::Idle;
                self.line.enqueue(PS2M_R_ACK);
            }
            PS2M_CMD_DATA_REP_DIS | PS2M_CMD_STREAM_MODE_SET => {
                self.mode = ReportingMode::Idle;
                self.line.enqueue(PS2M_R_ACK);
            }
            PS2M_CMD_DATA_REP_ENA => {
                self.mode = ReportingMode::Streaming;
                self.line.enqueue(PS2M_R_ACK);
            }
            PS2M_CMD_SET_SAMP_RATE => {
                // multi-part command, wait for next byte
                self.input = InputMode::AwaitingSampleRateByte;
                self.line.enqueue(PS2M_R_ACK);
            }
            PS2M_CMD_GET_DEVID => {
                self.line
                    .enqueue_many(&[PS2M_R_ACK, self.wheel_type.device_id()]);
            }
            PS2M_CMD_STATUS_REQ => {
                // status, resolution, sample rate
                self.line.enqueue_many(&[
                    PS2M_R_ACK,
                    PS2M_R_STATUS,
                    PS2M_RESOLUTION,
                    self.sample_rate,
                ]);
            }
            _ => {
                // acknowledged as though it were understood
                probes::ps2mouse_unknown_cmd!(|| v);
                self.line.enqueue(PS2M_R_ACK);
                self.line.resume();
            }
        }
    }

    fn reset(&mut self) {
        self.wheel_type = WheelType::Standard;
        self.mode = ReportingMode::Idle;
        self.input = InputMode::AwaitingCommand;
        self.sample_rate = PS2M_DEFAULT_SAMPLE_RATE;
        self.id_seq = 0;
    }

    /// Accept a raw boot-protocol report from the USB side.
    pub fn recv_report(&mut self, buf: &[u8]) {
        match MouseReport::from_bytes(buf) {
            Ok(rep) => self.handle_report(&rep),
            Err(e) => warn!(self.log, "dropped mouse report"; "error" => %e),
        }
    }

    pub fn handle_report(&mut self, rep: &MouseReport) {
        if self.mode != ReportingMode::Streaming {
            probes::ps2mouse_report_dropped!(|| rep.buttons.bits());
            return;
        }
        let pkt = MotionPacket::encode(rep, self.wheel_type);
        probes::ps2mouse_packet!(|| {
            let b = pkt.as_bytes();
            (b[0], b[1], b[2])
        });
        self.line.enqueue_many(pkt.as_bytes());
    }

    pub fn wheel_type(&self) -> WheelType {
        self.wheel_type
    }
    pub fn reporting_mode(&self) -> ReportingMode {
        self.mode
    }
    pub fn input_mode(&self) -> InputMode {
        self.input
    }
    pub fn sample_rate(&self) -> u8 {
        self.sample_rate
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::chardev::QueueLine;

    fn setup() -> (PS2Mouse, Arc<QueueLine>) {
        let log = slog::Logger::root(slog::Discard, o!());
        let line = Arc::new(QueueLine::new());
        (PS2Mouse::new(line.clone(), &log), line)
    }

    fn cmd(mouse: &mut PS2Mouse, line: &QueueLine, v: u8) -> Vec<u8> {
        mouse.cmd_input(v, true);
        line.drain()
    }

    fn set_rates(mouse: &mut PS2Mouse, line: &QueueLine, rates: &[u8]) {
        for r in rates {
            assert_eq!(cmd(mouse, line, PS2M_CMD_SET_SAMP_RATE), [PS2M_R_ACK]);
            assert_eq!(cmd(mouse, line, *r), [PS2M_R_ACK]);
        }
    }

    #[test]
    fn defaults() {
        let (mouse, _line) = setup();
        assert_eq!(mouse.wheel_type(), WheelType::Standard);
        assert_eq!(mouse.reporting_mode(), ReportingMode::Idle);
        assert_eq!(mouse.input_mode(), InputMode::AwaitingCommand);
        assert_eq!(mouse.sample_rate(), 100);
    }

    #[test]
    fn wheel_handshake() {
        let (mut mouse, line) = setup();
        set_rates(&mut mouse, &line, &[200, 100, 80]);
        assert_eq!(mouse.wheel_type(), WheelType::Wheel3Button);
        assert_eq!(cmd(&mut mouse, &line, PS2M_CMD_GET_DEVID), [0xfa, 0x03]);

        set_rates(&mut mouse, &line, &[200, 200, 80]);
        assert_eq!(mouse.wheel_type(), WheelType::Wheel5Button);
        assert_eq!(cmd(&mut mouse, &line, PS2M_CMD_GET_DEVID), [0xfa, 0x04]);
        assert_eq!(mouse.sample_rate(), 80);

        // never regresses
        set_rates(&mut mouse, &line, &[200, 100, 80]);
        assert_eq!(mouse.wheel_type(), WheelType::Wheel5Button);
    }

    #[test]
    fn wheel5_needs_wheel3_first() {
        let (mut mouse, line) = setup();
        set_rates(&mut mouse, &line, &[200, 200, 80]);
        assert_eq!(mouse.wheel_type(), WheelType::Standard);
    }

    #[test]
    fn handshake_tail_counts() {
        let (mut mouse, line) = setup();
        // only the last three rates matter
        set_rates(&mut mouse, &line, &[10, 40, 200, 100, 80]);
        assert_eq!(mouse.wheel_type(), WheelType::Wheel3Button);
    }

    #[test]
    fn interrupted_handshake() {
        let (mut mouse, line) = setup();
        set_rates(&mut mouse, &line, &[200, 100]);
        assert_eq!(cmd(&mut mouse, &line, PS2M_CMD_GET_DEVID), [0xfa, 0x00]);
        set_rates(&mut mouse, &line, &[80]);
        assert_eq!(mouse.wheel_type(), WheelType::Standard);

        set_rates(&mut mouse, &line, &[200, 100]);
        // a parity error is not a command and does not break the run
        mouse.cmd_input(PS2M_CMD_SET_SAMP_RATE, false);
        assert_eq!(line.drain(), [PS2M_R_RESEND]);
        set_rates(&mut mouse, &line, &[80]);
        assert_eq!(mouse.wheel_type(), WheelType::Wheel3Button);
    }

    #[test]
    fn reset_restores_defaults() {
        let (mut mouse, line) = setup();
        set_rates(&mut mouse, &line, &[200, 100, 80]);
        assert_eq!(cmd(&mut mouse, &line, PS2M_CMD_DATA_REP_ENA), [0xfa]);

        // queued-but-unsent output is dropped
        mouse.recv_report(&[0x01, 0x05, 0x00, 0x00]);
        assert_eq!(line.pending(), 4);
        mouse.cmd_input(PS2M_CMD_RESET, true);
        // reply carries the type in effect after the reset
        assert_eq!(line.drain(), [0xfa, 0xaa, 0x00]);

        assert_eq!(mouse.wheel_type(), WheelType::Standard);
        assert_eq!(mouse.reporting_mode(), ReportingMode::Idle);
        assert_eq!(mouse.sample_rate(), 100);
    }

    #[test]
    fn set_defaults_and_stream_mode() {
        let (mut mouse, line) = setup();
        set_rates(&mut mouse, &line, &[200, 100, 80]);
        cmd(&mut mouse, &line, PS2M_CMD_DATA_REP_ENA);

        assert_eq!(cmd(&mut mouse, &line, PS2M_CMD_SET_DEFAULTS), [0xfa]);
        assert_eq!(mouse.wheel_type(), WheelType::Standard);
        assert_eq!(mouse.reporting_mode(), ReportingMode::Idle);
        assert_eq!(mouse.sample_rate(), 100);

        cmd(&mut mouse, &line, PS2M_CMD_DATA_REP_ENA);
        assert_eq!(cmd(&mut mouse, &line, PS2M_CMD_STREAM_MODE_SET), [0xfa]);
        assert_eq!(mouse.reporting_mode(), ReportingMode::Idle);
    }

    #[test]
    fn status_request() {
        let (mut mouse, line) = setup();
        set_rates(&mut mouse, &line, &[40]);
        assert_eq!(
            cmd(&mut mouse, &line, PS2M_CMD_STATUS_REQ),
            [0xfa, 0x00, 0x02, 40]
        );
    }

    #[test]
    fn parity_error_requests_resend() {
        let (mut mouse, line) = setup();
        mouse.cmd_input(PS2M_CMD_DATA_REP_ENA, false);
        assert_eq!(line.drain(), [PS2M_R_RESEND]);
        assert_eq!(mouse.reporting_mode(), ReportingMode::Idle);

        // a garbled rate byte leaves the rate pending
        cmd(&mut mouse, &line, PS2M_CMD_SET_SAMP_RATE);
        mouse.cmd_input(20, false);
        assert_eq!(line.drain(), [PS2M_R_RESEND]);
        assert_eq!(mouse.input_mode(), InputMode::AwaitingSampleRateByte);
        assert_eq!(cmd(&mut mouse, &line, 20), [0xfa]);
        assert_eq!(mouse.sample_rate(), 20);
    }

    #[test]
    fn unknown_commands_acked() {
        let (mut mouse, line) = setup();
        // resend, set remote mode, set resolution
        for v in [0xfe, 0xf0, 0xe8] {
            assert_eq!(cmd(&mut mouse, &line, v), [0xfa]);
        }
    }

    #[test]
    fn reports_only_while_streaming() {
        let (mut mouse, line) = setup();
        mouse.recv_report(&[0x01, 0x05, 0x00, 0x00]);
        assert!(line.drain().is_empty());

        cmd(&mut mouse, &line, PS2M_CMD_DATA_REP_ENA);
        mouse.recv_report(&[0x01, 0x05, 0x00, 0x00]);
        assert_eq!(line.drain(), [0x09, 0x05, 0x00]);

        // short reports are dropped
        mouse.recv_report(&[0x01, 0x05]);
        assert!(line.drain().is_empty());

        cmd(&mut mouse, &line, PS2M_CMD_DATA_REP_DIS);
        mouse.recv_report(&[0x01, 0x05, 0x00, 0x00]);
        assert!(line.drain().is_empty());
    }

    #[test]
    fn wheel_packets_after_handshake() {
        let (mut mouse, line) = setup();
        set_rates(&mut mouse, &line, &[200, 100, 80]);
        cmd(&mut mouse, &line, PS2M_CMD_DATA_REP_ENA);
        mouse.recv_report(&[0x00, 0x00, 0x00, 0x01]);
        assert_eq!(line.drain(), [0x08, 0x00, 0x00, 0x0f]);
    }

    #[test]
    fn mount_announces_self_test() {
        let (mut mouse, line) = setup();
        mouse.mount();
        assert_eq!(line.drain(), [PS2M_R_SELF_TEST_PASS]);
        mouse.unmount();
        assert!(line.drain().is_empty());
    }
}
