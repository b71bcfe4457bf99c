// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The polling cycle tying both emulated devices to their event sources.
//!
//! The USB stack and the transceiver receive paths run on their own and
//! post [`Event`]s through cloned senders.  All emulator state is owned by
//! the [`Bridge`] and only touched from [`Bridge::poll`].

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use slog::{o, trace};

use crate::chardev::Ps2Line;
use crate::hid::LedSink;
use crate::hw::ps2::{PS2Kbd, PS2Mouse};
use crate::timer::TimerFactory;

pub enum Event {
    /// Raw boot-protocol report from the USB keyboard
    KeyboardReport(Vec<u8>),
    /// Raw boot-protocol report from the USB mouse
    MouseReport(Vec<u8>),
    /// Byte received from the host on the keyboard line
    KeyboardHostByte { val: u8, parity_ok: bool },
    /// Byte received from the host on the mouse line
    MouseHostByte { val: u8, parity_ok: bool },
    KeyboardMounted(Arc<dyn LedSink>),
    KeyboardUnmounted,
    MouseMounted,
    MouseUnmounted,
}
impl Event {
    fn kind(&self) -> &'static str {
        match self {
            Event::KeyboardReport(_) => "kbd-report",
            Event::MouseReport(_) => "mouse-report",
            Event::KeyboardHostByte { .. } => "kbd-host",
            Event::MouseHostByte { .. } => "mouse-host",
            Event::KeyboardMounted(_) => "kbd-mount",
            Event::KeyboardUnmounted => "kbd-unmount",
            Event::MouseMounted => "mouse-mount",
            Event::MouseUnmounted => "mouse-unmount",
        }
    }
}

pub struct Bridge {
    kbd: PS2Kbd,
    mouse: PS2Mouse,
    tx: Sender<Event>,
    rx: Receiver<Event>,
    log: slog::Logger,
}
impl Bridge {
    pub fn new(
        kbd_line: Arc<dyn Ps2Line>,
        mouse_line: Arc<dyn Ps2Line>,
        timers: &dyn TimerFactory,
        log: &slog::Logger,
    ) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            kbd: PS2Kbd::new(kbd_line, timers, log),
            mouse: PS2Mouse::new(mouse_line, log),
            tx,
            rx,
            log: log.new(o!("component" => "bridge")),
        }
    }

    /// Handle for an event source to post through
    pub fn sender(&self) -> Sender<Event> {
        self.tx.clone()
    }

    /// Run one polling cycle: handle every queued event in arrival order,
    /// then act on any keyboard timer expiry.  Returns the number of events
    /// handled.
    pub fn poll(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(ev) = self.rx.try_recv() {
            trace!(self.log, "event"; "kind" => ev.kind());
            self.handle(ev);
            handled += 1;
        }
        self.kbd.service_timers();
        handled
    }

    fn handle(&mut self, ev: Event) {
        match ev {
            Event::KeyboardReport(buf) => self.kbd.recv_report(&buf),
            Event::MouseReport(buf) => self.mouse.recv_report(&buf),
            Event::KeyboardHostByte { val, parity_ok } => {
                self.kbd.cmd_input(val, parity_ok)
            }
            Event::MouseHostByte { val, parity_ok } => {
                self.mouse.cmd_input(val, parity_ok)
            }
            Event::KeyboardMounted(leds) => self.kbd.mount(leds),
            Event::KeyboardUnmounted => self.kbd.unmount(),
            Event::MouseMounted => self.mouse.mount(),
            Event::MouseUnmounted => self.mouse.unmount(),
        }
    }

    pub fn keyboard(&self) -> &PS2Kbd {
        &self.kbd
    }
    pub fn mouse(&self) -> &PS2Mouse {
        &self.mouse
    }
}
