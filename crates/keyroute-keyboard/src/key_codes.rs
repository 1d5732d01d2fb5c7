//! Abstract key codes
//!
//! A [`KeyCode`] names a logical key as rules are authored against it, for
//! example "the key that produces `k` on a US keyboard". Each code has three
//! labels: the UI label, the US user-settings label and a general
//! user-settings label used for OEM keys whose meaning depends on the layout.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::error::KeyboardError;

macro_rules! key_codes {
    (@labels $ui:literal) => {
        ($ui, $ui, $ui)
    };
    (@labels $ui:literal, $us:literal) => {
        ($ui, $us, $us)
    };
    (@labels $ui:literal, $us:literal, $general:literal) => {
        ($ui, $us, $general)
    };
    ($($name:ident = $value:literal => $ui:literal $(, $us:literal $(, $general:literal)?)?;)*) => {
        /// Logical key identity, independent of the keyboard layout
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u8)]
        pub enum KeyCode {
            $($name = $value,)*
        }

        impl KeyCode {
            /// Every key code, ordered by numeric value
            pub const ALL: &'static [KeyCode] = &[$(KeyCode::$name,)*];

            fn labels(self) -> (&'static str, &'static str, &'static str) {
                match self {
                    $(KeyCode::$name => key_codes!(@labels $ui $(, $us $(, $general)?)?),)*
                }
            }
        }
    };
}

key_codes! {
    Unknown = 0 => "unknown";
    Backspace = 1 => "Backspace";
    Tab = 2 => "Tab";
    Enter = 3 => "Enter";
    Shift = 4 => "Shift";
    Ctrl = 5 => "Ctrl";
    Alt = 6 => "Alt";
    PauseBreak = 7 => "PauseBreak";
    CapsLock = 8 => "CapsLock";
    Escape = 9 => "Escape";
    Space = 10 => "Space";
    PageUp = 11 => "PageUp";
    PageDown = 12 => "PageDown";
    End = 13 => "End";
    Home = 14 => "Home";
    LeftArrow = 15 => "LeftArrow", "Left";
    UpArrow = 16 => "UpArrow", "Up";
    RightArrow = 17 => "RightArrow", "Right";
    DownArrow = 18 => "DownArrow", "Down";
    Insert = 19 => "Insert";
    Delete = 20 => "Delete";
    Key0 = 21 => "0";
    Key1 = 22 => "1";
    Key2 = 23 => "2";
    Key3 = 24 => "3";
    Key4 = 25 => "4";
    Key5 = 26 => "5";
    Key6 = 27 => "6";
    Key7 = 28 => "7";
    Key8 = 29 => "8";
    Key9 = 30 => "9";
    KeyA = 31 => "A";
    KeyB = 32 => "B";
    KeyC = 33 => "C";
    KeyD = 34 => "D";
    KeyE = 35 => "E";
    KeyF = 36 => "F";
    KeyG = 37 => "G";
    KeyH = 38 => "H";
    KeyI = 39 => "I";
    KeyJ = 40 => "J";
    KeyK = 41 => "K";
    KeyL = 42 => "L";
    KeyM = 43 => "M";
    KeyN = 44 => "N";
    KeyO = 45 => "O";
    KeyP = 46 => "P";
    KeyQ = 47 => "Q";
    KeyR = 48 => "R";
    KeyS = 49 => "S";
    KeyT = 50 => "T";
    KeyU = 51 => "U";
    KeyV = 52 => "V";
    KeyW = 53 => "W";
    KeyX = 54 => "X";
    KeyY = 55 => "Y";
    KeyZ = 56 => "Z";
    Meta = 57 => "Meta";
    ContextMenu = 58 => "ContextMenu";
    F1 = 59 => "F1";
    F2 = 60 => "F2";
    F3 = 61 => "F3";
    F4 = 62 => "F4";
    F5 = 63 => "F5";
    F6 = 64 => "F6";
    F7 = 65 => "F7";
    F8 = 66 => "F8";
    F9 = 67 => "F9";
    F10 = 68 => "F10";
    F11 = 69 => "F11";
    F12 = 70 => "F12";
    F13 = 71 => "F13";
    F14 = 72 => "F14";
    F15 = 73 => "F15";
    F16 = 74 => "F16";
    F17 = 75 => "F17";
    F18 = 76 => "F18";
    F19 = 77 => "F19";
    NumLock = 78 => "NumLock";
    ScrollLock = 79 => "ScrollLock";
    UsSemicolon = 80 => ";", ";", "OEM_1";
    UsEqual = 81 => "=", "=", "OEM_PLUS";
    UsComma = 82 => ",", ",", "OEM_COMMA";
    UsMinus = 83 => "-", "-", "OEM_MINUS";
    UsDot = 84 => ".", ".", "OEM_PERIOD";
    UsSlash = 85 => "/", "/", "OEM_2";
    UsBacktick = 86 => "`", "`", "OEM_3";
    UsOpenSquareBracket = 87 => "[", "[", "OEM_4";
    UsBackslash = 88 => "\\", "\\", "OEM_5";
    UsCloseSquareBracket = 89 => "]", "]", "OEM_6";
    UsQuote = 90 => "'", "'", "OEM_7";
    Oem8 = 91 => "OEM_8";
    Oem102 = 92 => "OEM_102";
    Numpad0 = 93 => "NumPad0";
    Numpad1 = 94 => "NumPad1";
    Numpad2 = 95 => "NumPad2";
    Numpad3 = 96 => "NumPad3";
    Numpad4 = 97 => "NumPad4";
    Numpad5 = 98 => "NumPad5";
    Numpad6 = 99 => "NumPad6";
    Numpad7 = 100 => "NumPad7";
    Numpad8 = 101 => "NumPad8";
    Numpad9 = 102 => "NumPad9";
    NumpadMultiply = 103 => "NumPad_Multiply";
    NumpadAdd = 104 => "NumPad_Add";
    NumpadSeparator = 105 => "NumPad_Separator";
    NumpadSubtract = 106 => "NumPad_Subtract";
    NumpadDecimal = 107 => "NumPad_Decimal";
    NumpadDivide = 108 => "NumPad_Divide";
    KeyInComposition = 109 => "KeyInComposition";
    AbntC1 = 110 => "ABNT_C1";
    AbntC2 = 111 => "ABNT_C2";
}

struct KeyCodeTables {
    from_ui: HashMap<String, KeyCode>,
    from_user_settings: HashMap<String, KeyCode>,
}

fn build_tables() -> KeyCodeTables {
    let mut from_ui = HashMap::new();
    let mut from_general = HashMap::new();
    let mut from_us = HashMap::new();
    for &key_code in KeyCode::ALL {
        let (ui, us, general) = key_code.labels();
        from_ui.insert(ui.to_lowercase(), key_code);
        from_us.insert(us.to_lowercase(), key_code);
        from_general.insert(general.to_lowercase(), key_code);
    }

    // US names take precedence over the general OEM names
    let mut from_user_settings = from_general;
    from_user_settings.extend(from_us);

    KeyCodeTables {
        from_ui,
        from_user_settings,
    }
}

fn tables() -> &'static KeyCodeTables {
    static TABLES: OnceLock<KeyCodeTables> = OnceLock::new();
    TABLES.get_or_init(build_tables)
}

impl KeyCode {
    pub fn from_u8(value: u8) -> Option<KeyCode> {
        KeyCode::ALL.get(value as usize).copied()
    }

    /// Label shown in menus and hovers, e.g. `LeftArrow`
    pub fn ui_label(self) -> &'static str {
        self.labels().0
    }

    /// Lowercase name written in user keybinding files, e.g. `left` or `;`
    pub fn user_settings_us_label(self) -> String {
        self.labels().1.to_lowercase()
    }

    /// Lowercase layout-neutral name, e.g. `oem_1` for the US semicolon key
    pub fn user_settings_general_label(self) -> String {
        self.labels().2.to_lowercase()
    }

    /// Case-insensitive lookup of a UI label
    pub fn from_ui_label(label: &str) -> Option<KeyCode> {
        tables().from_ui.get(&label.to_lowercase()).copied()
    }

    /// Case-insensitive lookup of a user-settings label, US or general
    pub fn from_user_settings(label: &str) -> Option<KeyCode> {
        tables()
            .from_user_settings
            .get(&label.to_lowercase())
            .copied()
    }

    pub fn is_digit(self) -> bool {
        (KeyCode::Key0..=KeyCode::Key9).contains(&self)
    }

    pub fn is_letter(self) -> bool {
        (KeyCode::KeyA..=KeyCode::KeyZ).contains(&self)
    }

    pub fn is_modifier(self) -> bool {
        matches!(
            self,
            KeyCode::Ctrl | KeyCode::Shift | KeyCode::Alt | KeyCode::Meta
        )
    }

    /// Keys that usually produce a character, and therefore collide with
    /// AltGr input when bound with Ctrl+Alt on Windows
    pub fn might_produce_char(self) -> bool {
        self.is_digit()
            || self.is_letter()
            || matches!(
                self,
                KeyCode::UsSemicolon
                    | KeyCode::UsEqual
                    | KeyCode::UsComma
                    | KeyCode::UsMinus
                    | KeyCode::UsDot
                    | KeyCode::UsSlash
                    | KeyCode::UsBacktick
                    | KeyCode::AbntC1
                    | KeyCode::AbntC2
                    | KeyCode::UsOpenSquareBracket
                    | KeyCode::UsBackslash
                    | KeyCode::UsCloseSquareBracket
                    | KeyCode::UsQuote
                    | KeyCode::Oem8
                    | KeyCode::Oem102
            )
    }

    pub(crate) fn offset(base: KeyCode, delta: u8) -> KeyCode {
        KeyCode::from_u8(base as u8 + delta).unwrap_or(KeyCode::Unknown)
    }
}

impl Default for KeyCode {
    fn default() -> Self {
        KeyCode::Unknown
    }
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ui_label())
    }
}

impl FromStr for KeyCode {
    type Err = KeyboardError;

    /// Accepts UI labels and both user-settings labels, ignoring case
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KeyCode::from_ui_label(s)
            .or_else(|| KeyCode::from_user_settings(s))
            .ok_or_else(|| KeyboardError::UnknownKeyCode(s.to_string()))
    }
}
