//! Raw keyboard layouts
//!
//! A layout lists, per scan code, the characters the key produces alone,
//! with Shift, with AltGr and with Shift+AltGr. Layout files use the JSON
//! shape `{"KeyA": {"value": "a", "withShift": "A", ...}, ...}`; entry order
//! is preserved because it decides which key wins when two produce the same
//! character.

use std::fmt;
use std::path::Path;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use crate::error::KeyboardError;
use crate::scan_codes::ScanCode;

/// Characters produced by one physical key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KeyMapping {
    pub value: String,
    pub with_shift: String,
    pub with_alt_gr: String,
    pub with_shift_alt_gr: String,
}

impl KeyMapping {
    pub fn new(value: &str, with_shift: &str, with_alt_gr: &str, with_shift_alt_gr: &str) -> Self {
        KeyMapping {
            value: value.to_string(),
            with_shift: with_shift.to_string(),
            with_alt_gr: with_alt_gr.to_string(),
            with_shift_alt_gr: with_shift_alt_gr.to_string(),
        }
    }
}

/// An ordered scan code to characters table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Layout {
    entries: Vec<(ScanCode, KeyMapping)>,
    us_standard: bool,
}

impl Layout {
    pub fn new(entries: Vec<(ScanCode, KeyMapping)>) -> Self {
        Layout {
            entries,
            us_standard: false,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, KeyboardError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, KeyboardError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn entries(&self) -> &[(ScanCode, KeyMapping)] {
        &self.entries
    }

    pub fn get(&self, scan_code: ScanCode) -> Option<&KeyMapping> {
        self.entries
            .iter()
            .find(|(code, _)| *code == scan_code)
            .map(|(_, mapping)| mapping)
    }

    pub fn is_us_standard(&self) -> bool {
        self.us_standard
    }

    /// The US standard layout
    pub fn us_standard() -> Self {
        const US: &[(ScanCode, &str, &str)] = &[
            (ScanCode::KeyA, "a", "A"),
            (ScanCode::KeyB, "b", "B"),
            (ScanCode::KeyC, "c", "C"),
            (ScanCode::KeyD, "d", "D"),
            (ScanCode::KeyE, "e", "E"),
            (ScanCode::KeyF, "f", "F"),
            (ScanCode::KeyG, "g", "G"),
            (ScanCode::KeyH, "h", "H"),
            (ScanCode::KeyI, "i", "I"),
            (ScanCode::KeyJ, "j", "J"),
            (ScanCode::KeyK, "k", "K"),
            (ScanCode::KeyL, "l", "L"),
            (ScanCode::KeyM, "m", "M"),
            (ScanCode::KeyN, "n", "N"),
            (ScanCode::KeyO, "o", "O"),
            (ScanCode::KeyP, "p", "P"),
            (ScanCode::KeyQ, "q", "Q"),
            (ScanCode::KeyR, "r", "R"),
            (ScanCode::KeyS, "s", "S"),
            (ScanCode::KeyT, "t", "T"),
            (ScanCode::KeyU, "u", "U"),
            (ScanCode::KeyV, "v", "V"),
            (ScanCode::KeyW, "w", "W"),
            (ScanCode::KeyX, "x", "X"),
            (ScanCode::KeyY, "y", "Y"),
            (ScanCode::KeyZ, "z", "Z"),
            (ScanCode::Digit1, "1", "!"),
            (ScanCode::Digit2, "2", "@"),
            (ScanCode::Digit3, "3", "#"),
            (ScanCode::Digit4, "4", "$"),
            (ScanCode::Digit5, "5", "%"),
            (ScanCode::Digit6, "6", "^"),
            (ScanCode::Digit7, "7", "&"),
            (ScanCode::Digit8, "8", "*"),
            (ScanCode::Digit9, "9", "("),
            (ScanCode::Digit0, "0", ")"),
            (ScanCode::Minus, "-", "_"),
            (ScanCode::Equal, "=", "+"),
            (ScanCode::BracketLeft, "[", "{"),
            (ScanCode::BracketRight, "]", "}"),
            (ScanCode::Backslash, "\\", "|"),
            (ScanCode::Semicolon, ";", ":"),
            (ScanCode::Quote, "'", "\""),
            (ScanCode::Backquote, "`", "~"),
            (ScanCode::Comma, ",", "<"),
            (ScanCode::Period, ".", ">"),
            (ScanCode::Slash, "/", "?"),
        ];

        Layout {
            entries: US
                .iter()
                .map(|&(code, value, with_shift)| {
                    (code, KeyMapping::new(value, with_shift, "", ""))
                })
                .collect(),
            us_standard: true,
        }
    }
}

struct LayoutVisitor;

impl<'de> Visitor<'de> for LayoutVisitor {
    type Value = Layout;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a map from scan code names to key mappings")
    }

    fn visit_map<A>(self, mut access: A) -> Result<Layout, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut entries = Vec::new();
        while let Some((name, mapping)) = access.next_entry::<String, KeyMapping>()? {
            match ScanCode::from_name(&name) {
                Some(scan_code) => entries.push((scan_code, mapping)),
                None => warn!("Ignoring unknown scan code '{}' in keyboard layout", name),
            }
        }
        Ok(Layout::new(entries))
    }
}

impl<'de> Deserialize<'de> for Layout {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(LayoutVisitor)
    }
}
