// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use super::Timer;

#[derive(Default)]
struct Slot {
    /// Virtual time of the next firing
    deadline: Option<Duration>,
    interval: Option<Duration>,
    expired: bool,
}

#[derive(Default)]
struct ClockState {
    now: Duration,
    timers: Vec<Weak<Mutex<Slot>>>,
}

/// Virtual clock which only moves when told to.
///
/// Timers created from a clock fire synchronously inside
/// [`ManualClock::advance`], which makes timing-dependent behavior exactly
/// reproducible.
#[derive(Clone, Default)]
pub struct ManualClock {
    state: Arc<Mutex<ClockState>>,
}
impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual time elapsed since the clock was created
    pub fn now(&self) -> Duration {
        self.state.lock().unwrap().now
    }

    pub fn new_timer(&self) -> ManualTimer {
        let slot = Arc::new(Mutex::new(Slot::default()));
        let mut state = self.state.lock().unwrap();
        state.timers.retain(|t| t.strong_count() > 0);
        state.timers.push(Arc::downgrade(&slot));
        ManualTimer { clock: Arc::downgrade(&self.state), slot }
    }

    /// Move virtual time forward, firing every timer whose deadline is
    /// reached along the way.
    pub fn advance(&self, by: Duration) {
        let mut state = self.state.lock().unwrap();
        state.now += by;
        let now = state.now;
        for slot in state.timers.iter().filter_map(Weak::upgrade) {
            let mut slot = slot.lock().unwrap();
            while let Some(deadline) = slot.deadline {
                if deadline > now {
                    break;
                }
                slot.expired = true;
                slot.deadline = slot
                    .interval
                    .filter(|i| !i.is_zero())
                    .map(|i| deadline + i);
            }
        }
    }
}

pub struct ManualTimer {
    clock: Weak<Mutex<ClockState>>,
    slot: Arc<Mutex<Slot>>,
}
impl ManualTimer {
    fn now(&self) -> Duration {
        self.clock
            .upgrade()
            .map(|c| c.lock().unwrap().now)
            .unwrap_or_default()
    }

    /// Virtual time of the next firing, if armed
    pub fn deadline(&self) -> Option<Duration> {
        self.slot.lock().unwrap().deadline
    }
}

impl Timer for ManualTimer {
    fn arm(&self, delay: Duration, interval: Option<Duration>) {
        let now = self.now();
        let mut slot = self.slot.lock().unwrap();
        slot.deadline = Some(now + delay);
        slot.interval = interval;
        slot.expired = false;
    }

    fn disarm(&self) {
        let mut slot = self.slot.lock().unwrap();
        slot.deadline = None;
        slot.interval = None;
        slot.expired = false;
    }

    fn is_armed(&self) -> bool {
        self.slot.lock().unwrap().deadline.is_some()
    }

    fn take_expired(&self) -> bool {
        std::mem::replace(&mut self.slot.lock().unwrap().expired, false)
    }
}
