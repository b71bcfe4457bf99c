// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::VecDeque;
use std::sync::Mutex;

use super::{LineNotifier, NotifierCell, Ps2Line};

#[derive(Default)]
struct LineState {
    buf: VecDeque<u8>,
    /// Transmitter found the queue empty and is waiting on `resume()`
    stalled: bool,
}

/// In-memory [`Ps2Line`] whose far side is drained by whoever plays the
/// transceiver: the standalone harness, or a test.
pub struct QueueLine {
    state: Mutex<LineState>,
    notifier: NotifierCell<dyn Ps2Line>,
}
impl QueueLine {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LineState::default()),
            notifier: NotifierCell::new(),
        }
    }

    /// Take the next byte to put on the wire.
    pub fn transmit(&self) -> Option<u8> {
        let mut state = self.state.lock().unwrap();
        let res = state.buf.pop_front();
        if res.is_none() {
            state.stalled = true;
        }
        res
    }

    /// Take every queued byte, in order.
    pub fn drain(&self) -> Vec<u8> {
        let mut state = self.state.lock().unwrap();
        state.stalled = true;
        state.buf.drain(..).collect()
    }

    pub fn pending(&self) -> usize {
        self.state.lock().unwrap().buf.len()
    }

    pub fn is_stalled(&self) -> bool {
        self.state.lock().unwrap().stalled
    }

    /// Set notifier callback for when the transmitter is resumed.  If that
    /// callback acquires any exclusion resources (locks, etc), they must not
    /// be held setting the notifier.
    pub fn set_notifier(&self, f: Option<LineNotifier>) {
        self.notifier.set(f);
    }
}
impl Default for QueueLine {
    fn default() -> Self {
        Self::new()
    }
}

impl Ps2Line for QueueLine {
    fn enqueue(&self, data: u8) {
        self.state.lock().unwrap().buf.push_back(data);
    }

    fn enqueue_many(&self, data: &[u8]) {
        self.state.lock().unwrap().buf.extend(data.iter().copied());
    }

    fn clear_pending(&self) {
        self.state.lock().unwrap().buf.clear();
    }

    fn resume(&self) {
        let was_stalled = {
            let mut state = self.state.lock().unwrap();
            let was_stalled = state.stalled && !state.buf.is_empty();
            if was_stalled {
                state.stalled = false;
            }
            was_stalled
        };
        // Notifier is called without the state lock held, so it may drain
        // the line directly.
        if was_stalled {
            self.notifier.notify(self);
        }
    }
}
