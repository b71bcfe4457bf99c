// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use ps2emu::chardev::QueueLine;
use ps2emu::hid::LedSink;
use ps2emu::timer::{ManualClock, ThreadTimers, TimerFactory};
use ps2emu::usdt::register_probes;
use ps2emu::{Bridge, Event};
use ps2emu_config_toml::{Config, Step};

use slog::{debug, info, o, Drain};

/// Length of one polling cycle while time passes
const TICK: Duration = Duration::from_millis(1);

/// Stands in for the USB keyboard's LEDs
struct LoggedLeds(slog::Logger);
impl LedSink for LoggedLeds {
    fn set_led_report(&self, mask: u8) {
        info!(self.0, "LED output report"; "mask" => format!("{mask:#05b}"));
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect::<Vec<_>>().join(" ")
}

struct Runner {
    bridge: Bridge,
    kbd_line: Arc<QueueLine>,
    mouse_line: Arc<QueueLine>,
    /// Virtual clock, unless running in real time
    clock: Option<ManualClock>,
    leds: Arc<dyn LedSink>,
    start: Instant,
    log: slog::Logger,
}
impl Runner {
    fn new(realtime: bool, log: &slog::Logger) -> Self {
        let kbd_line = Arc::new(QueueLine::new());
        let mouse_line = Arc::new(QueueLine::new());
        let clock = (!realtime).then(ManualClock::new);
        let timers: &dyn TimerFactory = match clock.as_ref() {
            Some(clock) => clock,
            None => &ThreadTimers,
        };
        let bridge =
            Bridge::new(kbd_line.clone(), mouse_line.clone(), timers, log);
        let leds = Arc::new(LoggedLeds(log.new(o!("dev" => "usb-kbd"))));

        Self {
            bridge,
            kbd_line,
            mouse_line,
            clock,
            leds,
            start: Instant::now(),
            log: log.clone(),
        }
    }

    fn now(&self) -> Duration {
        match self.clock.as_ref() {
            Some(clock) => clock.now(),
            None => self.start.elapsed(),
        }
    }

    fn post(&self, ev: Event) -> anyhow::Result<()> {
        self.bridge.sender().send(ev).context("bridge inbox closed")
    }

    /// One polling cycle, then play transceiver: put everything queued on
    /// either line "on the wire".
    fn cycle(&mut self) {
        self.bridge.poll();
        let t = format!("{:?}", self.now());
        for (name, line) in
            [("kbd", &self.kbd_line), ("mouse", &self.mouse_line)]
        {
            let bytes = line.drain();
            if !bytes.is_empty() {
                info!(self.log, "tx"; "t" => &t, "line" => name,
                    "bytes" => hex(&bytes));
            }
        }
    }

    fn wait(&mut self, dur: Duration) {
        let until = self.now() + dur;
        while self.now() < until {
            match self.clock.as_ref() {
                Some(clock) => clock.advance(TICK),
                None => std::thread::sleep(TICK),
            }
            self.cycle();
        }
    }

    fn step(&mut self, step: &Step) -> anyhow::Result<()> {
        let ev = match step {
            Step::Wait { ms } => {
                self.wait(Duration::from_millis(*ms));
                return Ok(());
            }
            Step::KbdReport { bytes } => Event::KeyboardReport(bytes.clone()),
            Step::MouseReport { bytes } => Event::MouseReport(bytes.clone()),
            Step::KbdHost { byte, parity_ok } => {
                Event::KeyboardHostByte { val: *byte, parity_ok: *parity_ok }
            }
            Step::MouseHost { byte, parity_ok } => {
                Event::MouseHostByte { val: *byte, parity_ok: *parity_ok }
            }
            Step::KbdMount => Event::KeyboardMounted(self.leds.clone()),
            Step::KbdUnmount => Event::KeyboardUnmounted,
            Step::MouseMount => Event::MouseMounted,
            Step::MouseUnmount => Event::MouseUnmounted,
        };
        self.post(ev)?;
        self.cycle();
        Ok(())
    }

    fn run(&mut self, config: &Config) -> anyhow::Result<()> {
        if config.keyboard.attached {
            self.post(Event::KeyboardMounted(self.leds.clone()))?;
        }
        if config.mouse.attached {
            self.post(Event::MouseMounted)?;
        }
        self.cycle();

        for (idx, step) in config.steps.iter().enumerate() {
            debug!(self.log, "step"; "idx" => idx, "step" => ?step);
            self.step(step).with_context(|| format!("step {idx}"))?;
        }
        Ok(())
    }
}

fn build_log(verbose: bool) -> (slog::Logger, slog_async::AsyncGuard) {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::CompactFormat::new(decorator).build().fuse();
    let level = if verbose { slog::Level::Debug } else { slog::Level::Info };
    let drain = slog::LevelFilter::new(drain, level).fuse();
    let (drain, guard) = slog_async::Async::new(drain).build_with_guard();
    (slog::Logger::root(drain.fuse(), o!()), guard)
}

#[derive(clap::Parser)]
/// Replay a scripted scenario through the PS/2 keyboard and mouse emulators.
struct Args {
    /// Scenario config file
    #[clap(value_name = "CONFIG", action)]
    config: String,

    /// Run timers on the wall clock, regardless of the config.
    #[clap(short, long, action)]
    realtime: bool,

    /// Log at debug level.
    #[clap(short, long, action)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let Args { config, realtime, verbose } = Args::parse();

    // Ensure proper setup of USDT probes
    register_probes().context("Failed to setup USDT probes")?;

    let (log, _log_async_guard) = build_log(verbose);
    info!(log, "ps2emu {}", ps2emu::version());

    let config = ps2emu_config_toml::parse(&config)
        .with_context(|| format!("Failed to parse config {config}"))?;
    let realtime = realtime || config.main.realtime;
    info!(log, "running scenario"; "name" => &config.main.name,
        "realtime" => realtime, "steps" => config.steps.len());

    let mut runner = Runner::new(realtime, &log);
    runner.run(&config)?;

    info!(log, "scenario complete");
    Ok(())
}
