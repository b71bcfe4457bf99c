// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Single-slot deadline timers.
//!
//! Expiry runs outside the polling cycle (a worker thread, or whoever
//! advances a virtual clock).  All it may do is raise a flag; the owner
//! consumes that flag with [`Timer::take_expired`] from the polling cycle and
//! does the real work there.

use std::time::Duration;

mod manual;
mod thread;

pub use manual::{ManualClock, ManualTimer};
pub use thread::ThreadTimer;

pub trait Timer: Send + 'static {
    /// Fire first after `delay`, then every `interval` if one is given.
    ///
    /// Replaces any earlier arming and discards an undrained expiry, so there
    /// is never more than one pending firing.
    fn arm(&self, delay: Duration, interval: Option<Duration>);

    /// Cancel the pending firing (if any) and discard an undrained expiry.
    fn disarm(&self);

    fn is_armed(&self) -> bool;

    /// Consume the expiry signal.  Expiries which occur between two calls
    /// coalesce into one.
    fn take_expired(&self) -> bool;
}

/// Source of [`Timer`]s for the emulators.
pub trait TimerFactory {
    fn timer(&self) -> Box<dyn Timer>;
}

/// Wall-clock timers, each backed by its own worker thread
pub struct ThreadTimers;
impl TimerFactory for ThreadTimers {
    fn timer(&self) -> Box<dyn Timer> {
        Box::new(ThreadTimer::new())
    }
}
impl TimerFactory for ManualClock {
    fn timer(&self) -> Box<dyn Timer> {
        Box::new(self.new_timer())
    }
}
