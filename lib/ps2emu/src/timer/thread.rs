// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::time::{Duration, Instant};

use super::Timer;

#[derive(Default)]
struct Slot {
    deadline: Option<Instant>,
    interval: Option<Duration>,
    terminate: bool,
}

/// [`Timer`] driven by the wall clock.
///
/// A worker thread sleeps until the armed deadline, raises the expiry flag,
/// and then either re-arms itself `interval` later or goes idle.  The worker
/// touches nothing but its own slot and the flag.
pub struct ThreadTimer {
    slot: Arc<(Mutex<Slot>, Condvar)>,
    expired: Arc<AtomicBool>,
    worker: Option<std::thread::JoinHandle<()>>,
}
impl ThreadTimer {
    pub fn new() -> Self {
        let slot = Arc::new((Mutex::new(Slot::default()), Condvar::new()));
        let expired = Arc::new(AtomicBool::new(false));

        let pair = Arc::downgrade(&slot);
        let flag = Arc::downgrade(&expired);
        let worker = Some(std::thread::spawn(move || {
            Self::wait_loop(pair, flag)
        }));
        Self { slot, expired, worker }
    }

    fn wait_loop(pair: Weak<(Mutex<Slot>, Condvar)>, flag: Weak<AtomicBool>) {
        while let Some(pair) = pair.upgrade() {
            let (slot, cvar) = &*pair;

            let guard = cvar
                .wait_while(slot.lock().unwrap(), |s| {
                    !s.terminate && s.deadline.is_none()
                })
                .unwrap();
            if guard.terminate {
                break;
            }
            let Some(deadline) = guard.deadline else { continue };

            let timeout = deadline.saturating_duration_since(Instant::now());
            // The golden path here *is* for this to time out; a wakeup means
            // the slot was re-armed, disarmed, or is being torn down.
            let (mut guard, timeout_result) = cvar
                .wait_timeout_while(guard, timeout, |s| {
                    !s.terminate && s.deadline == Some(deadline)
                })
                .unwrap();
            if !timeout_result.timed_out() {
                continue;
            }

            let Some(expired) = flag.upgrade() else { break };
            expired.store(true, Ordering::Release);
            guard.deadline = guard.interval.map(|i| deadline + i);
        }
    }
}
impl Default for ThreadTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer for ThreadTimer {
    fn arm(&self, delay: Duration, interval: Option<Duration>) {
        let (slot, cvar) = &*self.slot;
        let mut guard = slot.lock().unwrap();
        guard.deadline = Some(Instant::now() + delay);
        guard.interval = interval;
        self.expired.store(false, Ordering::Release);
        cvar.notify_one();
    }

    fn disarm(&self) {
        let (slot, cvar) = &*self.slot;
        let mut guard = slot.lock().unwrap();
        guard.deadline = None;
        guard.interval = None;
        self.expired.store(false, Ordering::Release);
        cvar.notify_one();
    }

    fn is_armed(&self) -> bool {
        self.slot.0.lock().unwrap().deadline.is_some()
    }

    fn take_expired(&self) -> bool {
        self.expired.swap(false, Ordering::AcqRel)
    }
}

impl Drop for ThreadTimer {
    fn drop(&mut self) {
        self.slot.0.lock().unwrap().terminate = true;
        self.slot.1.notify_one();
        if let Some(worker) = self.worker.take() {
            worker.join().ok();
        }
    }
}
