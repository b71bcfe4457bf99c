// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![allow(clippy::style)]

pub extern crate usdt;
#[macro_use]
extern crate bitflags;

pub mod bridge;
pub mod chardev;
pub mod hid;
pub mod hw;
pub mod timer;

pub use bridge::{Bridge, Event};

pub fn version() -> &'static str {
    lazy_static::lazy_static! {
        static ref VERSION: String = {
            let mut version = format!("v{}", env!("CARGO_PKG_VERSION"));
            match option_env!("VERGEN_GIT_SHA") {
                Some(sha) => {
                    version.push_str(" (");
                    version.push_str(sha);
                    version.push(')');
                }
                None => version.push_str(" <unknown git commit>"),
            }
            version
        };
    };
    &VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn print_version() {
        let v = version();
        eprintln!("ps2emu {v}");
        assert!(v.contains(env!("CARGO_PKG_VERSION")));
    }
}
