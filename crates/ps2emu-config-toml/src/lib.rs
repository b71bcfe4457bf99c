// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;

use serde_derive::{Deserialize, Serialize};
use thiserror::Error;

/// A scripted run of the emulators: which USB devices are present, and the
/// sequence of inputs fed to them.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Config {
    pub main: Main,

    #[serde(default)]
    pub keyboard: DeviceOpts,

    #[serde(default)]
    pub mouse: DeviceOpts,

    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct Main {
    pub name: String,

    /// Drive timers from the wall clock rather than a virtual one.  Waits
    /// then take real time, and runs are no longer exactly repeatable.
    #[serde(default)]
    pub realtime: bool,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct DeviceOpts {
    /// USB device of this kind is mounted before the first step
    #[serde(default = "default_true")]
    pub attached: bool,
}
impl Default for DeviceOpts {
    fn default() -> Self {
        Self { attached: true }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Step {
    /// Boot-protocol report from the USB keyboard
    KbdReport { bytes: Vec<u8> },
    /// Boot-protocol report from the USB mouse
    MouseReport { bytes: Vec<u8> },
    /// Byte from the host on the keyboard line
    KbdHost {
        byte: u8,
        #[serde(default = "default_true", rename = "parity-ok")]
        parity_ok: bool,
    },
    /// Byte from the host on the mouse line
    MouseHost {
        byte: u8,
        #[serde(default = "default_true", rename = "parity-ok")]
        parity_ok: bool,
    },
    /// Let time pass
    Wait { ms: u64 },
    KbdMount,
    KbdUnmount,
    MouseMount,
    MouseUnmount,
}

/// Errors which may be returned when parsing a scenario.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Cannot parse toml: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Parses a TOML file into a configuration object.
pub fn parse<P: AsRef<Path>>(path: P) -> Result<Config, ParseError> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let cfg = toml::from_str::<Config>(&contents)?;
    Ok(cfg)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn config_can_be_serialized_as_toml() {
        let config = Config {
            main: Main { name: "roundtrip".to_string(), realtime: false },
            keyboard: DeviceOpts::default(),
            mouse: DeviceOpts { attached: false },
            steps: vec![
                Step::KbdMount,
                Step::KbdReport { bytes: vec![0x02, 0, 0x04, 0, 0, 0, 0, 0] },
                Step::MouseHost { byte: 0xf4, parity_ok: false },
                Step::Wait { ms: 250 },
            ],
        };
        let serialized = toml::ser::to_string(&config).unwrap();
        let deserialized: Config = toml::de::from_str(&serialized).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn parse_basic_config() {
        let raw = r#"
[main]
name = "shift-a"

[mouse]
attached = false

[[step]]
kind = "kbd-report"
bytes = [0x02, 0, 0x04, 0, 0, 0, 0, 0]

[[step]]
kind = "wait"
ms = 300

[[step]]
kind = "kbd-host"
byte = 0xff
parity-ok = false

[[step]]
kind = "mouse-host"
byte = 0xf4

[[step]]
kind = "mouse-mount"
"#;
        let cfg: Config = toml::de::from_str(raw).unwrap();

        assert_eq!(cfg.main.name, "shift-a");
        assert!(!cfg.main.realtime);
        assert!(cfg.keyboard.attached);
        assert!(!cfg.mouse.attached);
        assert_eq!(
            cfg.steps,
            vec![
                Step::KbdReport { bytes: vec![2, 0, 4, 0, 0, 0, 0, 0] },
                Step::Wait { ms: 300 },
                Step::KbdHost { byte: 0xff, parity_ok: false },
                Step::MouseHost { byte: 0xf4, parity_ok: true },
                Step::MouseMount,
            ]
        );
    }

    #[test]
    fn missing_main_rejected() {
        let raw = r#"
[[step]]
kind = "kbd-mount"
"#;
        assert!(toml::de::from_str::<Config>(raw).is_err());
    }

    #[test]
    fn unknown_step_rejected() {
        let raw = r#"
[main]
name = "bad"

[[step]]
kind = "kbd-explode"
"#;
        assert!(toml::de::from_str::<Config>(raw).is_err());
    }

    #[test]
    fn out_of_range_byte_rejected() {
        let raw = r#"
[main]
name = "bad"

[[step]]
kind = "kbd-host"
byte = 256
"#;
        assert!(toml::de::from_str::<Config>(raw).is_err());
    }

    #[test]
    fn bundled_scenarios_parse() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../../bin/ps2emu-standalone/scenarios");
        for name in ["typing.toml", "wheel-mouse.toml"] {
            let cfg = parse(dir.join(name)).unwrap();
            assert!(!cfg.steps.is_empty(), "{name}");
        }
    }

    #[test]
    fn parse_missing_file() {
        let err = parse("/nonexistent/ps2emu/scenario.toml").unwrap_err();
        assert!(matches!(err, ParseError::Io(_)));
    }
}
