// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device-side view of a PS/2 line.
//!
//! The emulators never clock bits onto the wire themselves.  They hand bytes
//! to a [`Ps2Line`], which owns an ordered queue in front of the electrical
//! transceiver for one logical device (keyboard or mouse).  Bytes must reach
//! the wire in the order they were enqueued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

mod queue;

pub use queue::QueueLine;

pub type LineNotifier = Box<dyn Fn(&dyn Ps2Line) + Send + Sync + 'static>;

pub trait Ps2Line: Send + Sync + 'static {
    /// Append a byte to the outbound queue.
    fn enqueue(&self, data: u8);

    /// Append a run of bytes, preserving their order.
    fn enqueue_many(&self, data: &[u8]) {
        for b in data {
            self.enqueue(*b);
        }
    }

    /// Drop any bytes which have not yet been transmitted.
    fn clear_pending(&self);

    /// Kick the transmitter in case it stalled waiting for new work.
    fn resume(&self);
}

type NotifierFn<T> = dyn Fn(&T) + Send + Sync + 'static;
pub struct NotifierCell<T: ?Sized> {
    is_set: AtomicBool,
    notifier: Mutex<Option<Box<NotifierFn<T>>>>,
}
impl<T: ?Sized> NotifierCell<T> {
    pub fn new() -> Self {
        Self { is_set: AtomicBool::new(false), notifier: Mutex::new(None) }
    }
}
impl NotifierCell<dyn Ps2Line> {
    pub fn set(&self, f: Option<LineNotifier>) {
        let mut guard = self.notifier.lock().unwrap();
        self.is_set.store(f.is_some(), Ordering::Release);
        *guard = f;
    }
    pub fn notify(&self, line: &dyn Ps2Line) {
        if self.is_set.load(Ordering::Acquire) {
            let guard = self.notifier.lock().unwrap();
            if let Some(f) = guard.as_ref() {
                f(line);
            }
        }
    }
}
impl Default for NotifierCell<dyn Ps2Line> {
    fn default() -> Self {
        Self::new()
    }
}
