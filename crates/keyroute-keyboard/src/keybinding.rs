//! Keybinding values and their packed integer encoding
//!
//! A packed keybinding is a `u32`. The low 16 bits hold the first part and
//! the high 16 bits an optional chord part; each part is an 8-bit
//! [`KeyCode`] plus four modifier bits. `CtrlCmd` and `WinCtrl` are relative
//! to the operating system: `CtrlCmd` is Cmd on macOS and Ctrl elsewhere.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::key_codes::KeyCode;
use crate::scan_codes::ScanCode;

/// Operating system flavor that decides modifier semantics and labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingSystem {
    Windows,
    Macintosh,
    Linux,
}

impl OperatingSystem {
    /// The operating system this binary was built for
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            OperatingSystem::Windows
        } else if cfg!(target_os = "macos") {
            OperatingSystem::Macintosh
        } else {
            OperatingSystem::Linux
        }
    }
}

impl fmt::Display for OperatingSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperatingSystem::Windows => "windows",
            OperatingSystem::Macintosh => "macintosh",
            OperatingSystem::Linux => "linux",
        };
        write!(f, "{}", name)
    }
}

/// Modifier bits of a packed keybinding part
pub struct KeyMod;

impl KeyMod {
    pub const CTRL_CMD: u32 = 1 << 11;
    pub const SHIFT: u32 = 1 << 10;
    pub const ALT: u32 = 1 << 9;
    pub const WIN_CTRL: u32 = 1 << 8;
}

const KEY_CODE_MASK: u32 = 0x0000_00FF;
const FIRST_PART_MASK: u32 = 0x0000_FFFF;

/// Pack two parts into one chord keybinding
pub fn key_chord(first_part: u32, second_part: u32) -> u32 {
    first_part | ((second_part & FIRST_PART_MASK) << 16)
}

/// Decode a packed keybinding for `os`. Zero means "no keybinding".
pub fn create_keybinding(packed: u32, os: OperatingSystem) -> Option<Keybinding> {
    if packed == 0 {
        return None;
    }
    let first_part = packed & FIRST_PART_MASK;
    let chord_part = packed >> 16;
    if chord_part != 0 {
        return Some(Keybinding::Chord(ChordKeybinding {
            first_part: create_simple_keybinding(first_part, os),
            chord_part: create_simple_keybinding(chord_part, os),
        }));
    }
    Some(Keybinding::Simple(create_simple_keybinding(first_part, os)))
}

/// Decode one 16-bit part
pub fn create_simple_keybinding(packed: u32, os: OperatingSystem) -> SimpleKeybinding {
    let ctrl_cmd = packed & KeyMod::CTRL_CMD != 0;
    let win_ctrl = packed & KeyMod::WIN_CTRL != 0;
    let is_mac = os == OperatingSystem::Macintosh;

    SimpleKeybinding {
        ctrl_key: if is_mac { win_ctrl } else { ctrl_cmd },
        shift_key: packed & KeyMod::SHIFT != 0,
        alt_key: packed & KeyMod::ALT != 0,
        meta_key: if is_mac { ctrl_cmd } else { win_ctrl },
        key_code: KeyCode::from_u8((packed & KEY_CODE_MASK) as u8).unwrap_or(KeyCode::Unknown),
    }
}

/// One key press expressed with a logical key code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SimpleKeybinding {
    pub ctrl_key: bool,
    pub shift_key: bool,
    pub alt_key: bool,
    pub meta_key: bool,
    pub key_code: KeyCode,
}

impl SimpleKeybinding {
    pub fn new(
        ctrl_key: bool,
        shift_key: bool,
        alt_key: bool,
        meta_key: bool,
        key_code: KeyCode,
    ) -> Self {
        SimpleKeybinding {
            ctrl_key,
            shift_key,
            alt_key,
            meta_key,
            key_code,
        }
    }

    /// Pack back into 16 bits, the inverse of [`create_simple_keybinding`]
    pub fn encode(&self, os: OperatingSystem) -> u32 {
        let is_mac = os == OperatingSystem::Macintosh;
        let (ctrl_cmd, win_ctrl) = if is_mac {
            (self.meta_key, self.ctrl_key)
        } else {
            (self.ctrl_key, self.meta_key)
        };

        let mut packed = self.key_code as u32;
        if ctrl_cmd {
            packed |= KeyMod::CTRL_CMD;
        }
        if self.shift_key {
            packed |= KeyMod::SHIFT;
        }
        if self.alt_key {
            packed |= KeyMod::ALT;
        }
        if win_ctrl {
            packed |= KeyMod::WIN_CTRL;
        }
        packed
    }

    /// The key itself is a modifier, e.g. a bare Ctrl press
    pub fn is_modifier_key(&self) -> bool {
        self.key_code.is_modifier()
    }

    /// A modifier is held while pressing that same modifier key
    pub fn is_duplicate_modifier_case(&self) -> bool {
        (self.ctrl_key && self.key_code == KeyCode::Ctrl)
            || (self.shift_key && self.key_code == KeyCode::Shift)
            || (self.alt_key && self.key_code == KeyCode::Alt)
            || (self.meta_key && self.key_code == KeyCode::Meta)
    }
}

/// Two key presses bound together
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChordKeybinding {
    pub first_part: SimpleKeybinding,
    pub chord_part: SimpleKeybinding,
}

/// A keybinding as authored in rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keybinding {
    Simple(SimpleKeybinding),
    Chord(ChordKeybinding),
}

impl Keybinding {
    pub fn first_part(&self) -> &SimpleKeybinding {
        match self {
            Keybinding::Simple(simple) => simple,
            Keybinding::Chord(chord) => &chord.first_part,
        }
    }

    pub fn chord_part(&self) -> Option<&SimpleKeybinding> {
        match self {
            Keybinding::Simple(_) => None,
            Keybinding::Chord(chord) => Some(&chord.chord_part),
        }
    }

    pub fn parts(&self) -> Vec<SimpleKeybinding> {
        match self {
            Keybinding::Simple(simple) => vec![*simple],
            Keybinding::Chord(chord) => vec![chord.first_part, chord.chord_part],
        }
    }

    pub fn is_chord(&self) -> bool {
        matches!(self, Keybinding::Chord(_))
    }

    pub fn encode(&self, os: OperatingSystem) -> u32 {
        match self {
            Keybinding::Simple(simple) => simple.encode(os),
            Keybinding::Chord(chord) => {
                key_chord(chord.first_part.encode(os), chord.chord_part.encode(os))
            }
        }
    }
}

/// One key press expressed with a physical key position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ScanCodeBinding {
    pub ctrl_key: bool,
    pub shift_key: bool,
    pub alt_key: bool,
    pub meta_key: bool,
    pub scan_code: ScanCode,
}

impl ScanCodeBinding {
    pub fn new(
        ctrl_key: bool,
        shift_key: bool,
        alt_key: bool,
        meta_key: bool,
        scan_code: ScanCode,
    ) -> Self {
        ScanCodeBinding {
            ctrl_key,
            shift_key,
            alt_key,
            meta_key,
            scan_code,
        }
    }

    /// A modifier is held while pressing one of that modifier's keys
    pub fn is_duplicate_modifier_case(&self) -> bool {
        use ScanCode::*;

        (self.ctrl_key && matches!(self.scan_code, ControlLeft | ControlRight))
            || (self.shift_key && matches!(self.scan_code, ShiftLeft | ShiftRight))
            || (self.alt_key && matches!(self.scan_code, AltLeft | AltRight))
            || (self.meta_key && matches!(self.scan_code, MetaLeft | MetaRight))
    }
}
