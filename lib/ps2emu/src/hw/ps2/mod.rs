// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! PS/2 device emulation
//!
//! Two devices sit side by side, each on its own line: a keyboard speaking
//! Scan Code Set 2 and a mouse with optional wheel extensions.  Both are fed
//! from USB HID boot reports on one side and from host command bytes (with a
//! parity verdict from the transceiver) on the other.
//!
//! Neither device ever rejects input.  A byte with bad parity is answered
//! with a resend request, an unmapped HID usage is dropped, and a command we
//! do not implement is acknowledged as though it were understood.

pub mod keyboard;
pub mod mouse;

pub use keyboard::PS2Kbd;
pub use mouse::PS2Mouse;
