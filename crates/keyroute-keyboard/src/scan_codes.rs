//! Physical key positions
//!
//! Scan codes follow the W3C `KeyboardEvent.code` names. Some positions
//! produce the same logical key on every layout (function row, navigation
//! block, numpad); [`ScanCode::immutable_key_code`] reports those.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::error::KeyboardError;
use crate::key_codes::KeyCode;

macro_rules! scan_codes {
    ($($name:ident),* $(,)?) => {
        /// Physical key position as reported by the operating system
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u8)]
        pub enum ScanCode {
            $($name,)*
        }

        impl ScanCode {
            /// Every scan code, ordered by numeric value
            pub const ALL: &'static [ScanCode] = &[$(ScanCode::$name,)*];

            /// Canonical `KeyboardEvent.code` name
            pub fn name(self) -> &'static str {
                match self {
                    $(ScanCode::$name => stringify!($name),)*
                }
            }
        }
    };
}

scan_codes! {
    None, Hyper, Super, Fn, FnLock, Suspend, Resume, Turbo, Sleep, WakeUp,
    KeyA, KeyB, KeyC, KeyD, KeyE, KeyF, KeyG, KeyH, KeyI, KeyJ, KeyK, KeyL, KeyM,
    KeyN, KeyO, KeyP, KeyQ, KeyR, KeyS, KeyT, KeyU, KeyV, KeyW, KeyX, KeyY, KeyZ,
    Digit1, Digit2, Digit3, Digit4, Digit5, Digit6, Digit7, Digit8, Digit9, Digit0,
    Enter, Escape, Backspace, Tab, Space, Minus, Equal, BracketLeft, BracketRight,
    Backslash, IntlHash, Semicolon, Quote, Backquote, Comma, Period, Slash, CapsLock,
    F1, F2, F3, F4, F5, F6, F7, F8, F9, F10, F11, F12,
    PrintScreen, ScrollLock, Pause, Insert, Home, PageUp, Delete, End, PageDown,
    ArrowRight, ArrowLeft, ArrowDown, ArrowUp,
    NumLock, NumpadDivide, NumpadMultiply, NumpadSubtract, NumpadAdd, NumpadEnter,
    Numpad1, Numpad2, Numpad3, Numpad4, Numpad5, Numpad6, Numpad7, Numpad8, Numpad9,
    Numpad0, NumpadDecimal, IntlBackslash, ContextMenu, Power, NumpadEqual,
    F13, F14, F15, F16, F17, F18, F19, F20, F21, F22, F23, F24,
    Open, Help, Select, Again, Undo, Cut, Copy, Paste, Find,
    AudioVolumeMute, AudioVolumeUp, AudioVolumeDown,
    NumpadComma, IntlRo, KanaMode, IntlYen, Convert, NonConvert,
    Lang1, Lang2, Lang3, Lang4, Lang5, Abort, Props,
    NumpadParenLeft, NumpadParenRight, NumpadBackspace,
    NumpadMemoryStore, NumpadMemoryRecall, NumpadMemoryClear,
    NumpadMemoryAdd, NumpadMemorySubtract, NumpadClear, NumpadClearEntry,
    ControlLeft, ShiftLeft, AltLeft, MetaLeft, ControlRight, ShiftRight, AltRight, MetaRight,
    BrightnessUp, BrightnessDown, MediaPlay, MediaRecord, MediaFastForward, MediaRewind,
    MediaTrackNext, MediaTrackPrevious, MediaStop, Eject, MediaPlayPause, MediaSelect,
    LaunchMail, LaunchApp2, LaunchApp1, SelectTask, LaunchScreenSaver,
    BrowserSearch, BrowserHome, BrowserBack, BrowserForward, BrowserStop,
    BrowserRefresh, BrowserFavorites, ZoomToggle, MailReply, MailForward, MailSend,
}

struct ScanCodeTables {
    from_lowercase: HashMap<String, ScanCode>,
    immutable_scan_codes: HashMap<KeyCode, ScanCode>,
}

fn build_tables() -> ScanCodeTables {
    let mut from_lowercase = HashMap::new();
    let mut immutable_scan_codes = HashMap::new();

    for &scan_code in ScanCode::ALL {
        from_lowercase.insert(scan_code.name().to_lowercase(), scan_code);

        if let Some(key_code) = scan_code.immutable_key_code() {
            // Enter is reachable from Enter and NumpadEnter; modifiers from both sides
            let ambiguous = matches!(
                key_code,
                KeyCode::Unknown
                    | KeyCode::Enter
                    | KeyCode::Ctrl
                    | KeyCode::Shift
                    | KeyCode::Alt
                    | KeyCode::Meta
            );
            if !ambiguous {
                immutable_scan_codes.insert(key_code, scan_code);
            }
        }
    }
    immutable_scan_codes.insert(KeyCode::Enter, ScanCode::Enter);

    ScanCodeTables {
        from_lowercase,
        immutable_scan_codes,
    }
}

fn tables() -> &'static ScanCodeTables {
    static TABLES: OnceLock<ScanCodeTables> = OnceLock::new();
    TABLES.get_or_init(build_tables)
}

impl ScanCode {
    pub fn from_u8(value: u8) -> Option<ScanCode> {
        ScanCode::ALL.get(value as usize).copied()
    }

    /// Case-insensitive lookup of a `KeyboardEvent.code` name
    pub fn from_name(name: &str) -> Option<ScanCode> {
        tables().from_lowercase.get(&name.to_lowercase()).copied()
    }

    /// The key code this position produces on every layout.
    ///
    /// `None` means the key depends on the layout (letters, digits and
    /// punctuation). `Some(KeyCode::Unknown)` marks a layout-independent
    /// position that has no key code and cannot be bound.
    pub fn immutable_key_code(self) -> Option<KeyCode> {
        use ScanCode::*;

        let key_code = match self {
            _ if (KeyA..=Digit0).contains(&self) => return Option::None,
            Minus | Equal | BracketLeft | BracketRight | Backslash | IntlHash | Semicolon
            | Quote | Backquote | Comma | Period | Slash | IntlBackslash | IntlRo | IntlYen => {
                return Option::None
            }
            Enter => KeyCode::Enter,
            Escape => KeyCode::Escape,
            Backspace => KeyCode::Backspace,
            Tab => KeyCode::Tab,
            Space => KeyCode::Space,
            CapsLock => KeyCode::CapsLock,
            F1 => KeyCode::F1,
            F2 => KeyCode::F2,
            F3 => KeyCode::F3,
            F4 => KeyCode::F4,
            F5 => KeyCode::F5,
            F6 => KeyCode::F6,
            F7 => KeyCode::F7,
            F8 => KeyCode::F8,
            F9 => KeyCode::F9,
            F10 => KeyCode::F10,
            F11 => KeyCode::F11,
            F12 => KeyCode::F12,
            F13 => KeyCode::F13,
            F14 => KeyCode::F14,
            F15 => KeyCode::F15,
            F16 => KeyCode::F16,
            F17 => KeyCode::F17,
            F18 => KeyCode::F18,
            F19 => KeyCode::F19,
            ScrollLock => KeyCode::ScrollLock,
            Pause => KeyCode::PauseBreak,
            Insert => KeyCode::Insert,
            Home => KeyCode::Home,
            PageUp => KeyCode::PageUp,
            Delete => KeyCode::Delete,
            End => KeyCode::End,
            PageDown => KeyCode::PageDown,
            ArrowRight => KeyCode::RightArrow,
            ArrowLeft => KeyCode::LeftArrow,
            ArrowDown => KeyCode::DownArrow,
            ArrowUp => KeyCode::UpArrow,
            NumLock => KeyCode::NumLock,
            NumpadDivide => KeyCode::NumpadDivide,
            NumpadMultiply => KeyCode::NumpadMultiply,
            NumpadSubtract => KeyCode::NumpadSubtract,
            NumpadAdd => KeyCode::NumpadAdd,
            NumpadEnter => KeyCode::Enter,
            Numpad1 => KeyCode::Numpad1,
            Numpad2 => KeyCode::Numpad2,
            Numpad3 => KeyCode::Numpad3,
            Numpad4 => KeyCode::Numpad4,
            Numpad5 => KeyCode::Numpad5,
            Numpad6 => KeyCode::Numpad6,
            Numpad7 => KeyCode::Numpad7,
            Numpad8 => KeyCode::Numpad8,
            Numpad9 => KeyCode::Numpad9,
            Numpad0 => KeyCode::Numpad0,
            NumpadDecimal => KeyCode::NumpadDecimal,
            ContextMenu => KeyCode::ContextMenu,
            NumpadComma => KeyCode::NumpadSeparator,
            ControlLeft | ControlRight => KeyCode::Ctrl,
            ShiftLeft | ShiftRight => KeyCode::Shift,
            AltLeft | AltRight => KeyCode::Alt,
            MetaLeft | MetaRight => KeyCode::Meta,
            _ => KeyCode::Unknown,
        };
        Some(key_code)
    }

    pub fn is_immutable(self) -> bool {
        self.immutable_key_code().is_some()
    }

    /// The layout-independent position that produces `key_code`, if any
    pub fn from_immutable_key_code(key_code: KeyCode) -> Option<ScanCode> {
        tables().immutable_scan_codes.get(&key_code).copied()
    }

    pub fn is_numpad_digit_or_decimal(self) -> bool {
        (ScanCode::Numpad1..=ScanCode::NumpadDecimal).contains(&self)
    }

    pub(crate) fn offset(base: ScanCode, delta: u8) -> ScanCode {
        ScanCode::from_u8(base as u8 + delta).unwrap_or(ScanCode::None)
    }
}

impl Default for ScanCode {
    fn default() -> Self {
        ScanCode::None
    }
}

impl fmt::Display for ScanCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ScanCode {
    type Err = KeyboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ScanCode::from_name(s).ok_or_else(|| KeyboardError::UnknownScanCode(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for &scan_code in ScanCode::ALL {
            assert_eq!(scan_code.name().parse::<ScanCode>().unwrap(), scan_code);
        }
        assert_eq!("keya".parse::<ScanCode>().unwrap(), ScanCode::KeyA);
        assert_eq!("NUMPADENTER".parse::<ScanCode>().unwrap(), ScanCode::NumpadEnter);
        assert!("KeyÄ".parse::<ScanCode>().is_err());
    }

    #[test]
    fn test_all_is_indexed_by_value() {
        for (index, scan_code) in ScanCode::ALL.iter().enumerate() {
            assert_eq!(*scan_code as usize, index);
        }
    }

    #[test]
    fn test_immutable_key_codes() {
        assert_eq!(ScanCode::KeyA.immutable_key_code(), None);
        assert_eq!(ScanCode::Digit0.immutable_key_code(), None);
        assert_eq!(ScanCode::IntlBackslash.immutable_key_code(), None);
        assert_eq!(ScanCode::Escape.immutable_key_code(), Some(KeyCode::Escape));
        assert_eq!(ScanCode::NumpadEnter.immutable_key_code(), Some(KeyCode::Enter));
        assert_eq!(ScanCode::F20.immutable_key_code(), Some(KeyCode::Unknown));
        assert_eq!(ScanCode::ControlRight.immutable_key_code(), Some(KeyCode::Ctrl));
    }

    #[test]
    fn test_reverse_immutable_lookup() {
        assert_eq!(
            ScanCode::from_immutable_key_code(KeyCode::Enter),
            Some(ScanCode::Enter)
        );
        assert_eq!(
            ScanCode::from_immutable_key_code(KeyCode::LeftArrow),
            Some(ScanCode::ArrowLeft)
        );
        assert_eq!(ScanCode::from_immutable_key_code(KeyCode::Ctrl), None);
        assert_eq!(ScanCode::from_immutable_key_code(KeyCode::KeyA), None);
        assert_eq!(ScanCode::from_immutable_key_code(KeyCode::Unknown), None);
    }
}
