//! Keyboard layout mapper
//!
//! Builds, from a raw [`Layout`], the relation between physical key
//! combinations (Ctrl, Shift, Alt plus a [`ScanCode`]) and logical key
//! combinations (Ctrl, Shift, Alt plus a [`KeyCode`]). Meta never changes
//! what a key produces, so it is carried through unchanged.
//!
//! Rules are authored against key codes and resolved through this table into
//! scan-code keybindings. Keyboard events arrive as scan codes and are
//! dispatched on them directly.

use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use crate::key_codes::KeyCode;
use crate::keybinding::{Keybinding, OperatingSystem, ScanCodeBinding, SimpleKeybinding};
use crate::layout::{KeyMapping, Layout};
use crate::resolved::{PartData, ResolvedKeybinding};
use crate::scan_codes::ScanCode;
use crate::user_binding::UserKeyPart;

const CTRL: u8 = 0b001;
const SHIFT: u8 = 0b010;
const ALT: u8 = 0b100;

fn encode(mods: u8, principal: u8) -> u32 {
    ((principal as u32) << 3) | (mods & 0b111) as u32
}

fn decode_mods(encoded: u32) -> (bool, bool, bool) {
    (encoded & 0b001 != 0, encoded & 0b010 != 0, encoded & 0b100 != 0)
}

fn mods_of(ctrl_key: bool, shift_key: bool, alt_key: bool) -> u8 {
    (if ctrl_key { CTRL } else { 0 }) | (if shift_key { SHIFT } else { 0 }) | (if alt_key { ALT } else { 0 })
}

/// Ctrl, Shift and Alt plus a physical key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScanCodeCombo {
    pub ctrl_key: bool,
    pub shift_key: bool,
    pub alt_key: bool,
    pub scan_code: ScanCode,
}

impl ScanCodeCombo {
    pub fn new(ctrl_key: bool, shift_key: bool, alt_key: bool, scan_code: ScanCode) -> Self {
        ScanCodeCombo {
            ctrl_key,
            shift_key,
            alt_key,
            scan_code,
        }
    }

    fn encode(&self) -> u32 {
        encode(
            mods_of(self.ctrl_key, self.shift_key, self.alt_key),
            self.scan_code as u8,
        )
    }

    fn decode(encoded: u32) -> Self {
        let (ctrl_key, shift_key, alt_key) = decode_mods(encoded);
        let scan_code = ScanCode::from_u8((encoded >> 3) as u8).unwrap_or(ScanCode::None);
        ScanCodeCombo::new(ctrl_key, shift_key, alt_key, scan_code)
    }

    fn produced_char(&self, mapping: Option<&KeyMapping>) -> String {
        let produced = mapping.map(|m| {
            if self.ctrl_key && self.shift_key && self.alt_key {
                m.with_shift_alt_gr.as_str()
            } else if self.ctrl_key && self.alt_key {
                m.with_alt_gr.as_str()
            } else if self.shift_key {
                m.with_shift.as_str()
            } else {
                m.value.as_str()
            }
        });
        let char_code = char_code(produced.unwrap_or(""));
        if char_code == 0 {
            return " --- ".to_string();
        }
        if (0x0300..=0x036F).contains(&char_code) {
            return format!("U+{:x}", char_code);
        }
        match char::from_u32(char_code) {
            Some(c) => format!("  {}  ", c),
            None => " --- ".to_string(),
        }
    }
}

impl fmt::Display for ScanCodeCombo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}{}",
            if self.ctrl_key { "Ctrl+" } else { "" },
            if self.shift_key { "Shift+" } else { "" },
            if self.alt_key { "Alt+" } else { "" },
            self.scan_code
        )
    }
}

/// Ctrl, Shift and Alt plus a logical key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyCodeCombo {
    pub ctrl_key: bool,
    pub shift_key: bool,
    pub alt_key: bool,
    pub key_code: KeyCode,
}

impl KeyCodeCombo {
    pub fn new(ctrl_key: bool, shift_key: bool, alt_key: bool, key_code: KeyCode) -> Self {
        KeyCodeCombo {
            ctrl_key,
            shift_key,
            alt_key,
            key_code,
        }
    }

    fn encode(&self) -> u32 {
        encode(
            mods_of(self.ctrl_key, self.shift_key, self.alt_key),
            self.key_code as u8,
        )
    }

    fn decode(encoded: u32) -> Self {
        let (ctrl_key, shift_key, alt_key) = decode_mods(encoded);
        let key_code = KeyCode::from_u8((encoded >> 3) as u8).unwrap_or(KeyCode::Unknown);
        KeyCodeCombo::new(ctrl_key, shift_key, alt_key, key_code)
    }
}

impl fmt::Display for KeyCodeCombo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}{}",
            if self.ctrl_key { "Ctrl+" } else { "" },
            if self.shift_key { "Shift+" } else { "" },
            if self.alt_key { "Alt+" } else { "" },
            self.key_code
        )
    }
}

/// Bidirectional candidate lists between encoded combos. Earlier entries in
/// a list are preferred.
#[derive(Debug, Default)]
struct ComboTable {
    scan_code_to_key_code: HashMap<u32, Vec<u32>>,
    key_code_to_scan_code: HashMap<u32, Vec<u32>>,
}

impl ComboTable {
    fn register_if_unknown(&mut self, scan_code_combo: ScanCodeCombo, key_code_combo: KeyCodeCombo) {
        if key_code_combo.key_code == KeyCode::Unknown {
            return;
        }
        let scan_encoded = scan_code_combo.encode();
        let key_encoded = key_code_combo.encode();
        let key_code = key_code_combo.key_code;

        if let Some(existing) = self.scan_code_to_key_code.get(&scan_encoded) {
            if key_code.is_digit() || key_code.is_letter() {
                // letters and digits may be reached through several layout remaps
                if existing.contains(&key_encoded) {
                    return;
                }
            } else if !existing.is_empty() {
                return;
            }
        }

        self.scan_code_to_key_code
            .entry(scan_encoded)
            .or_default()
            .insert(0, key_encoded);
        self.key_code_to_scan_code
            .entry(key_encoded)
            .or_default()
            .insert(0, scan_encoded);
    }

    fn register(&mut self, hw_mods: u8, scan_code: ScanCode, kb_mods: u8, key_code: KeyCode) {
        self.register_if_unknown(
            ScanCodeCombo::new(hw_mods & CTRL != 0, hw_mods & SHIFT != 0, hw_mods & ALT != 0, scan_code),
            KeyCodeCombo::new(kb_mods & CTRL != 0, kb_mods & SHIFT != 0, kb_mods & ALT != 0, key_code),
        );
    }

    fn register_all_combos(&mut self, scan_code: ScanCode, key_code: KeyCode) {
        for mods in 0..8u8 {
            self.register(mods, scan_code, mods, key_code);
        }
    }

    /// Demote a scan code to the end of every candidate list it shares
    fn move_to_end(&mut self, scan_code: ScanCode) {
        for mods in 0..8u8 {
            let Some(key_combos) = self.scan_code_to_key_code.get(&encode(mods, scan_code as u8)) else {
                continue;
            };
            for key_encoded in key_combos.clone() {
                let Some(scan_combos) = self.key_code_to_scan_code.get_mut(&key_encoded) else {
                    continue;
                };
                if scan_combos.len() == 1 {
                    continue;
                }
                let (mut demoted, mut kept): (Vec<u32>, Vec<u32>) = scan_combos
                    .iter()
                    .partition(|&&entry| (entry >> 3) as u8 == scan_code as u8);
                kept.append(&mut demoted);
                *scan_combos = kept;
            }
        }
    }

    fn registration_complete(&mut self) {
        // rare keys should never be the preferred position for a key code
        self.move_to_end(ScanCode::IntlHash);
        self.move_to_end(ScanCode::IntlBackslash);
    }

    fn lookup_key_code_combo(&self, combo: KeyCodeCombo) -> Vec<ScanCodeCombo> {
        self.key_code_to_scan_code
            .get(&combo.encode())
            .map(|list| list.iter().map(|&e| ScanCodeCombo::decode(e)).collect())
            .unwrap_or_default()
    }

    fn lookup_scan_code_combo(&self, combo: ScanCodeCombo) -> Vec<KeyCodeCombo> {
        self.scan_code_to_key_code
            .get(&combo.encode())
            .map(|list| list.iter().map(|&e| KeyCodeCombo::decode(e)).collect())
            .unwrap_or_default()
    }
}

/// Map a produced character to the code used for key-code lookup. Combining
/// accents are folded onto the spacing character that renders the same way.
fn char_code(produced: &str) -> u32 {
    let Some(c) = produced.chars().next() else {
        return 0;
    };
    match c as u32 {
        0x0300 => 0x0060, // grave accent
        0x0301 => 0x00B4, // acute accent
        0x0302 => 0x005E, // circumflex
        0x0303 => 0x02DC, // small tilde
        0x0304 => 0x00AF, // macron
        0x0305 => 0x203E, // overline
        0x0306 => 0x02D8, // breve
        0x0307 => 0x02D9, // dot above
        0x0308 => 0x00A8, // diaeresis
        0x030A => 0x02DA, // ring above
        0x030B => 0x02DD, // double acute accent
        other => other,
    }
}

/// Key code of a character on the US layout, and whether it needs Shift
fn char_code_to_key_code(char_code: u32) -> Option<(KeyCode, bool)> {
    let c = char::from_u32(char_code)?;
    if c.is_ascii_uppercase() {
        return Some((KeyCode::offset(KeyCode::KeyA, c as u8 - b'A'), true));
    }
    if c.is_ascii_lowercase() {
        return Some((KeyCode::offset(KeyCode::KeyA, c as u8 - b'a'), false));
    }
    let kb = match c {
        ';' => (KeyCode::UsSemicolon, false),
        ':' => (KeyCode::UsSemicolon, true),
        '=' => (KeyCode::UsEqual, false),
        '+' => (KeyCode::UsEqual, true),
        ',' => (KeyCode::UsComma, false),
        '<' => (KeyCode::UsComma, true),
        '-' => (KeyCode::UsMinus, false),
        '_' => (KeyCode::UsMinus, true),
        '.' => (KeyCode::UsDot, false),
        '>' => (KeyCode::UsDot, true),
        '/' => (KeyCode::UsSlash, false),
        '?' => (KeyCode::UsSlash, true),
        '`' => (KeyCode::UsBacktick, false),
        '~' => (KeyCode::UsBacktick, true),
        '[' => (KeyCode::UsOpenSquareBracket, false),
        '{' => (KeyCode::UsOpenSquareBracket, true),
        '\\' => (KeyCode::UsBackslash, false),
        '|' => (KeyCode::UsBackslash, true),
        ']' => (KeyCode::UsCloseSquareBracket, false),
        '}' => (KeyCode::UsCloseSquareBracket, true),
        '\'' => (KeyCode::UsQuote, false),
        '"' => (KeyCode::UsQuote, true),
        _ => return None,
    };
    Some(kb)
}

struct ScanCodeMapping {
    scan_code: ScanCode,
    value: u32,
    with_shift: u32,
    with_alt_gr: u32,
    with_shift_alt_gr: u32,
}

/// A raw key press as reported by the windowing layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyboardEvent {
    pub ctrl_key: bool,
    pub shift_key: bool,
    pub alt_key: bool,
    pub meta_key: bool,
    /// Logical key reported alongside the scan code, `Unknown` when absent
    pub key_code: KeyCode,
    pub code: ScanCode,
}

impl KeyboardEvent {
    pub fn new(code: ScanCode) -> Self {
        KeyboardEvent {
            code,
            ..Default::default()
        }
    }

    pub fn with_modifiers(mut self, ctrl_key: bool, shift_key: bool, alt_key: bool, meta_key: bool) -> Self {
        self.ctrl_key = ctrl_key;
        self.shift_key = shift_key;
        self.alt_key = alt_key;
        self.meta_key = meta_key;
        self
    }

    pub fn with_key_code(mut self, key_code: KeyCode) -> Self {
        self.key_code = key_code;
        self
    }
}

/// Resolves keybindings and keyboard events for one keyboard layout
pub struct KeyboardMapper {
    os: OperatingSystem,
    is_us_standard: bool,
    code_info: HashMap<ScanCode, KeyMapping>,
    combos: ComboTable,
    scan_code_to_label: Vec<Option<String>>,
    scan_code_to_dispatch: Vec<Option<String>>,
    numpad_key_code_dispatch: bool,
}

impl KeyboardMapper {
    pub fn new(layout: &Layout, os: OperatingSystem) -> Self {
        let mut combos = ComboTable::default();
        let scan_code_count = ScanCode::ALL.len();
        let mut scan_code_to_label: Vec<Option<String>> = vec![None; scan_code_count];
        let mut scan_code_to_dispatch: Vec<Option<String>> = vec![None; scan_code_count];

        for &scan_code in ScanCode::ALL {
            let Some(key_code) = scan_code.immutable_key_code() else {
                continue;
            };
            combos.register_all_combos(scan_code, key_code);
            scan_code_to_label[scan_code as usize] = Some(key_code.ui_label().to_string());
            if key_code != KeyCode::Unknown && !key_code.is_modifier() {
                scan_code_to_dispatch[scan_code as usize] = Some(format!("[{}]", scan_code));
            }
        }

        let entries: Vec<&(ScanCode, KeyMapping)> = layout
            .entries()
            .iter()
            .filter(|(scan_code, _)| *scan_code != ScanCode::None && !scan_code.is_immutable())
            .collect();

        let missing_latin_letters = missing_latin_letter_overrides(&entries);

        let mut code_info = HashMap::new();
        let mut mappings = Vec::with_capacity(entries.len());
        for (scan_code, raw) in entries {
            let scan_code = *scan_code;
            code_info.insert(scan_code, raw.clone());

            let mapping = missing_latin_letters.get(&scan_code).unwrap_or(raw);
            let value = char_code(&mapping.value);
            mappings.push(ScanCodeMapping {
                scan_code,
                value,
                with_shift: char_code(&mapping.with_shift),
                with_alt_gr: char_code(&mapping.with_alt_gr),
                with_shift_alt_gr: char_code(&mapping.with_shift_alt_gr),
            });

            scan_code_to_dispatch[scan_code as usize] = Some(format!("[{}]", scan_code));
            scan_code_to_label[scan_code as usize] = char::from_u32(value)
                .filter(|_| value != 0)
                .map(|c| c.to_ascii_uppercase().to_string());
        }

        for mapping in mappings.iter().rev() {
            let produced = mapping.with_shift_alt_gr;
            if produced == mapping.with_alt_gr || produced == mapping.with_shift || produced == mapping.value {
                continue;
            }
            let Some((key_code, kb_shift)) = char_code_to_key_code(produced) else {
                continue;
            };
            let kb_mods = if kb_shift { SHIFT } else { 0 };
            combos.register(CTRL | SHIFT | ALT, mapping.scan_code, kb_mods, key_code);
        }

        for mapping in mappings.iter().rev() {
            let produced = mapping.with_alt_gr;
            if produced == mapping.with_shift || produced == mapping.value {
                continue;
            }
            let Some((key_code, kb_shift)) = char_code_to_key_code(produced) else {
                continue;
            };
            let kb_mods = if kb_shift { SHIFT } else { 0 };
            combos.register(CTRL | ALT, mapping.scan_code, kb_mods, key_code);
        }

        for mapping in mappings.iter().rev() {
            let produced = mapping.with_shift;
            if produced == mapping.value {
                continue;
            }
            let Some((key_code, kb_shift)) = char_code_to_key_code(produced) else {
                continue;
            };
            let sc = mapping.scan_code;
            if kb_shift {
                combos.register(SHIFT, sc, SHIFT, key_code);
                combos.register(SHIFT | ALT, sc, SHIFT | ALT, key_code);
                combos.register(CTRL | SHIFT, sc, CTRL | SHIFT, key_code);
                combos.register(CTRL | SHIFT | ALT, sc, CTRL | SHIFT | ALT, key_code);
            } else {
                combos.register(SHIFT, sc, 0, key_code);
                combos.register(SHIFT, sc, SHIFT, key_code);
                combos.register(SHIFT | ALT, sc, ALT, key_code);
                combos.register(SHIFT | ALT, sc, SHIFT | ALT, key_code);
                combos.register(CTRL | SHIFT, sc, CTRL, key_code);
                combos.register(CTRL | SHIFT, sc, CTRL | SHIFT, key_code);
                combos.register(CTRL | SHIFT | ALT, sc, CTRL | ALT, key_code);
                combos.register(CTRL | SHIFT | ALT, sc, CTRL | SHIFT | ALT, key_code);
            }
        }

        for mapping in mappings.iter().rev() {
            let Some((key_code, kb_shift)) = char_code_to_key_code(mapping.value) else {
                continue;
            };
            let sc = mapping.scan_code;
            if kb_shift {
                combos.register(0, sc, SHIFT, key_code);
                combos.register(ALT, sc, SHIFT | ALT, key_code);
                combos.register(CTRL, sc, CTRL | SHIFT, key_code);
                combos.register(CTRL | ALT, sc, CTRL | SHIFT | ALT, key_code);
            } else {
                for mods in 0..8u8 {
                    combos.register(mods, sc, mods, key_code);
                }
            }
        }

        // digits nobody claimed keep their usual positions
        for delta in 0..9u8 {
            combos.register_all_combos(
                ScanCode::offset(ScanCode::Digit1, delta),
                KeyCode::offset(KeyCode::Key1, delta),
            );
        }
        combos.register_all_combos(ScanCode::Digit0, KeyCode::Key0);

        combos.registration_complete();
        debug!(
            os = %os,
            us_standard = layout.is_us_standard(),
            entries = layout.entries().len(),
            "Built keyboard mapper"
        );

        KeyboardMapper {
            os,
            is_us_standard: layout.is_us_standard(),
            code_info,
            combos,
            scan_code_to_label,
            scan_code_to_dispatch,
            numpad_key_code_dispatch: true,
        }
    }

    /// Whether numpad digits dispatch on the reported key code so that
    /// NumLock state is honored. Enabled by default.
    pub fn with_numpad_key_code_dispatch(mut self, enabled: bool) -> Self {
        self.numpad_key_code_dispatch = enabled;
        self
    }

    pub fn os(&self) -> OperatingSystem {
        self.os
    }

    pub fn lookup_key_code_combo(&self, combo: KeyCodeCombo) -> Vec<ScanCodeCombo> {
        self.combos.lookup_key_code_combo(combo)
    }

    pub fn lookup_scan_code_combo(&self, combo: ScanCodeCombo) -> Vec<KeyCodeCombo> {
        self.combos.lookup_scan_code_combo(combo)
    }

    /// The key code a physical key produces both with and without Shift,
    /// if it is the same one. Such keys get key-code based labels.
    pub fn guess_stable_key_code(&self, scan_code: ScanCode) -> Option<KeyCode> {
        if (ScanCode::Digit1..=ScanCode::Digit0).contains(&scan_code) {
            if scan_code == ScanCode::Digit0 {
                return Some(KeyCode::Key0);
            }
            return Some(KeyCode::offset(
                KeyCode::Key1,
                scan_code as u8 - ScanCode::Digit1 as u8,
            ));
        }

        let plain = self.lookup_scan_code_combo(ScanCodeCombo::new(false, false, false, scan_code));
        let shifted = self.lookup_scan_code_combo(ScanCodeCombo::new(false, true, false, scan_code));
        match (plain.as_slice(), shifted.as_slice()) {
            ([plain], [shifted])
                if plain.key_code == shifted.key_code && plain.shift_key != shifted.shift_key =>
            {
                Some(plain.key_code)
            }
            _ => None,
        }
    }

    /// Every physical combination that produces a logical key press
    pub fn simple_keybinding_to_scan_code_bindings(
        &self,
        keybinding: &SimpleKeybinding,
    ) -> Vec<ScanCodeBinding> {
        // NumpadEnter also produces Enter; bind only the main key
        if keybinding.key_code == KeyCode::Enter {
            return vec![ScanCodeBinding::new(
                keybinding.ctrl_key,
                keybinding.shift_key,
                keybinding.alt_key,
                keybinding.meta_key,
                ScanCode::Enter,
            )];
        }

        self.lookup_key_code_combo(KeyCodeCombo::new(
            keybinding.ctrl_key,
            keybinding.shift_key,
            keybinding.alt_key,
            keybinding.key_code,
        ))
        .into_iter()
        .map(|combo| {
            ScanCodeBinding::new(
                combo.ctrl_key,
                combo.shift_key,
                combo.alt_key,
                keybinding.meta_key,
                combo.scan_code,
            )
        })
        .collect()
    }

    fn scan_code_label(&self, scan_code: ScanCode) -> Option<String> {
        self.scan_code_to_label
            .get(scan_code as usize)
            .cloned()
            .flatten()
    }

    pub fn ui_label_for(&self, binding: &ScanCodeBinding) -> Option<String> {
        if binding.is_duplicate_modifier_case() {
            return Some(String::new());
        }
        if self.os == OperatingSystem::Macintosh {
            let arrow = match binding.scan_code {
                ScanCode::ArrowLeft => Some("←"),
                ScanCode::ArrowUp => Some("↑"),
                ScanCode::ArrowRight => Some("→"),
                ScanCode::ArrowDown => Some("↓"),
                _ => None,
            };
            if let Some(arrow) = arrow {
                return Some(arrow.to_string());
            }
        }
        self.scan_code_label(binding.scan_code)
    }

    pub fn aria_label_for(&self, binding: &ScanCodeBinding) -> Option<String> {
        if binding.is_duplicate_modifier_case() {
            return Some(String::new());
        }
        self.scan_code_label(binding.scan_code)
    }

    /// Index key of a press, e.g. `ctrl+shift+[KeyK]`
    pub fn dispatch_str_for(&self, binding: &ScanCodeBinding) -> Option<String> {
        let code_dispatch = self
            .scan_code_to_dispatch
            .get(binding.scan_code as usize)?
            .as_deref()?;

        let mut result = String::new();
        if binding.ctrl_key {
            result.push_str("ctrl+");
        }
        if binding.shift_key {
            result.push_str("shift+");
        }
        if binding.alt_key {
            result.push_str("alt+");
        }
        if binding.meta_key {
            result.push_str("meta+");
        }
        result.push_str(code_dispatch);
        Some(result)
    }

    /// Key name for user keybinding files. Stable keys use their key-code
    /// name; anything else falls back to the bracketed scan code.
    pub fn user_settings_label_for(&self, binding: &ScanCodeBinding) -> Option<String> {
        if binding.is_duplicate_modifier_case() {
            return Some(String::new());
        }

        if let Some(key_code) = binding.scan_code.immutable_key_code() {
            return Some(key_code.user_settings_us_label());
        }

        if let Some(key_code) = self.guess_stable_key_code(binding.scan_code) {
            // only if the key code maps back onto this very key
            let reverse = self.simple_keybinding_to_scan_code_bindings(&SimpleKeybinding::new(
                binding.ctrl_key,
                binding.shift_key,
                binding.alt_key,
                binding.meta_key,
                key_code,
            ));
            if reverse.iter().any(|r| r.scan_code == binding.scan_code) {
                return Some(key_code.user_settings_us_label());
            }
        }

        self.scan_code_to_dispatch
            .get(binding.scan_code as usize)
            .cloned()
            .flatten()
    }

    pub fn is_wysiwyg(&self, binding: &ScanCodeBinding) -> bool {
        if binding.scan_code.is_immutable() {
            return true;
        }
        let aria = self.aria_label_for(binding).filter(|s| !s.is_empty());
        let user_settings = self.user_settings_label_for(binding).filter(|s| !s.is_empty());
        match (aria, user_settings) {
            (None, None) => true,
            (Some(a), Some(b)) => a.to_lowercase() == b.to_lowercase(),
            _ => false,
        }
    }

    fn to_resolved(&self, bindings: Vec<ScanCodeBinding>) -> ResolvedKeybinding {
        let parts = bindings
            .into_iter()
            .map(|binding| PartData {
                ui_label: self.ui_label_for(&binding),
                aria_label: self.aria_label_for(&binding),
                user_settings_label: self.user_settings_label_for(&binding),
                dispatch: self.dispatch_str_for(&binding),
                wysiwyg: self.is_wysiwyg(&binding),
                binding,
            })
            .collect();
        ResolvedKeybinding::new(self.os, parts)
    }

    fn cross(&self, first_parts: Vec<ScanCodeBinding>, chord_parts: Option<Vec<ScanCodeBinding>>) -> Vec<ResolvedKeybinding> {
        let mut result = Vec::new();
        for first in first_parts {
            match &chord_parts {
                Some(chord_parts) => {
                    for chord in chord_parts {
                        result.push(self.to_resolved(vec![first, *chord]));
                    }
                }
                None => result.push(self.to_resolved(vec![first])),
            }
        }
        result
    }

    /// All scan-code keybindings a rule keybinding stands for on this layout
    pub fn resolve_keybinding(&self, keybinding: &Keybinding) -> Vec<ResolvedKeybinding> {
        let first_parts = self.simple_keybinding_to_scan_code_bindings(keybinding.first_part());
        let chord_parts = keybinding
            .chord_part()
            .map(|chord| self.simple_keybinding_to_scan_code_bindings(chord));
        self.cross(first_parts, chord_parts)
    }

    /// Convert a raw key press into a single-part keybinding
    pub fn resolve_keyboard_event(&self, event: &KeyboardEvent) -> ResolvedKeybinding {
        let mut code = event.code;
        if code == ScanCode::NumpadEnter {
            code = ScanCode::Enter;
        }

        let key_code = event.key_code;
        let navigation = matches!(
            key_code,
            KeyCode::LeftArrow
                | KeyCode::UpArrow
                | KeyCode::RightArrow
                | KeyCode::DownArrow
                | KeyCode::Delete
                | KeyCode::Insert
                | KeyCode::Home
                | KeyCode::End
                | KeyCode::PageDown
                | KeyCode::PageUp
        );
        if navigation || (self.numpad_key_code_dispatch && code.is_numpad_digit_or_decimal()) {
            // remote desktop tools report wrong scan codes for these keys,
            // and numpad keys change meaning with NumLock
            if let Some(scan_code) = ScanCode::from_immutable_key_code(key_code) {
                code = scan_code;
            }
        }

        self.to_resolved(vec![ScanCodeBinding::new(
            event.ctrl_key,
            event.shift_key,
            event.alt_key,
            event.meta_key,
            code,
        )])
    }

    fn resolve_user_part(&self, part: &UserKeyPart) -> Vec<ScanCodeBinding> {
        match part {
            UserKeyPart::ScanCode(binding) => vec![*binding],
            UserKeyPart::KeyCode(keybinding) => self.simple_keybinding_to_scan_code_bindings(keybinding),
        }
    }

    /// Resolve parsed user keybinding text
    pub fn resolve_user_binding(&self, parts: &[UserKeyPart]) -> Vec<ResolvedKeybinding> {
        let Some(first) = parts.first() else {
            return Vec::new();
        };
        let first_parts = self.resolve_user_part(first);
        let chord_parts = parts.get(1).map(|chord| self.resolve_user_part(chord));
        self.cross(first_parts, chord_parts)
    }

    /// A table of every layout-dependent key and two sample fixed keys, in
    /// all Ctrl/Shift/Alt combinations
    pub fn dump_debug_info(&self) -> String {
        const RULE: &str = "--------------------------------------------------------------------------------------------------------------------------------------------------------------";
        let immutable_samples = [ScanCode::ArrowUp, ScanCode::Numpad0];

        let mut result = Vec::new();
        result.push(format!("isUSStandard: {}", self.is_us_standard));
        result.push(RULE.to_string());

        let mut count = 0;
        for &scan_code in ScanCode::ALL {
            if scan_code.is_immutable() && !immutable_samples.contains(&scan_code) {
                continue;
            }
            if count % 4 == 0 {
                result.push(format!(
                    "| {:^30} | {:^5} | {:^25} | {:^3} | {:^25} | {:^30} | {:^30} | {:^7} |",
                    "HW Code combination",
                    "Key",
                    "KeyCode combination",
                    "Pri",
                    "UI label",
                    "User settings",
                    "Dispatching string",
                    "WYSIWYG"
                ));
                result.push(RULE.to_string());
            }
            count += 1;

            let mapping = self.code_info.get(&scan_code);
            for mods in 0..8u8 {
                let combo = ScanCodeCombo::new(mods & CTRL != 0, mods & SHIFT != 0, mods & ALT != 0, scan_code);
                let resolved = self.resolve_keyboard_event(
                    &KeyboardEvent::new(scan_code).with_modifiers(
                        combo.ctrl_key,
                        combo.shift_key,
                        combo.alt_key,
                        false,
                    ),
                );

                let out_combo = combo.to_string();
                let out_key = combo.produced_char(mapping);
                let out_ui = resolved
                    .aria_label()
                    .map(|l| l.replacen("Control+", "Ctrl+", 1))
                    .unwrap_or_else(|| "null".to_string());
                let out_user_settings = resolved
                    .user_settings_label()
                    .unwrap_or_else(|| "null".to_string());
                let out_dispatch = resolved.dispatch_parts().0.unwrap_or("null").to_string();
                let out_wysiwyg = if resolved.is_wysiwyg() { "" } else { "NO" };

                let key_combos = self.lookup_scan_code_combo(combo);
                if key_combos.is_empty() {
                    result.push(format!(
                        "| {:>30} | {:^5} | {:>25} | {:>3} | {:>25} | {:>30} | {:>30} | {:^7} |",
                        out_combo, out_key, "", "", out_ui, out_user_settings, out_dispatch, out_wysiwyg
                    ));
                    continue;
                }

                for (index, key_combo) in key_combos.iter().enumerate() {
                    let scan_combos = self.lookup_key_code_combo(*key_combo);
                    let priority = if scan_combos.len() == 1 {
                        String::new()
                    } else {
                        scan_combos
                            .iter()
                            .position(|c| *c == combo)
                            .map(|p| (p + 1).to_string())
                            .unwrap_or_else(|| "-1".to_string())
                    };

                    if index == 0 {
                        result.push(format!(
                            "| {:>30} | {:^5} | {:>25} | {:>3} | {:>25} | {:>30} | {:>30} | {:^7} |",
                            out_combo,
                            out_key,
                            key_combo.to_string(),
                            priority,
                            out_ui,
                            out_user_settings,
                            out_dispatch,
                            out_wysiwyg
                        ));
                    } else {
                        result.push(format!(
                            "| {:>30} | {:^5} | {:>25} | {:>3} | {:>25} | {:>30} | {:>30} | {:^7} |",
                            "", "", key_combo.to_string(), priority, "", "", "", ""
                        ));
                    }
                }
            }
            result.push(RULE.to_string());
        }

        result.join("\n")
    }
}

/// Layouts without some Latin letter (Cyrillic, Greek, ...) get that letter
/// forced onto its US position so shortcuts like Ctrl+C keep working
fn missing_latin_letter_overrides(entries: &[&(ScanCode, KeyMapping)]) -> HashMap<ScanCode, KeyMapping> {
    let mut produces_latin_letter = [false; 26];
    for (_, mapping) in entries {
        let value = char_code(&mapping.value);
        if (u32::from(b'a')..=u32::from(b'z')).contains(&value) {
            produces_latin_letter[(value - u32::from(b'a')) as usize] = true;
        }
    }

    let mut overrides = HashMap::new();
    for (index, produced) in produces_latin_letter.iter().enumerate() {
        if *produced {
            continue;
        }
        let lower = char::from(b'a' + index as u8);
        overrides.insert(
            ScanCode::offset(ScanCode::KeyA, index as u8),
            KeyMapping::new(
                &lower.to_string(),
                &lower.to_ascii_uppercase().to_string(),
                "",
                "",
            ),
        );
    }
    overrides
}

#[cfg(test)]
mod tests {
    use super::*;

    fn us_mapper(os: OperatingSystem) -> KeyboardMapper {
        KeyboardMapper::new(&Layout::us_standard(), os)
    }

    fn simple(ctrl: bool, shift: bool, key_code: KeyCode) -> SimpleKeybinding {
        SimpleKeybinding::new(ctrl, shift, false, false, key_code)
    }

    #[test]
    fn test_letters_map_to_their_us_position() {
        let mapper = us_mapper(OperatingSystem::Linux);
        let bindings = mapper.simple_keybinding_to_scan_code_bindings(&simple(true, false, KeyCode::KeyK));
        assert_eq!(
            bindings,
            vec![ScanCodeBinding::new(true, false, false, false, ScanCode::KeyK)]
        );
    }

    #[test]
    fn test_shifted_characters() {
        let mapper = us_mapper(OperatingSystem::Linux);
        // `:` is Shift+Semicolon, both as key code and on the US layout
        let combos = mapper.lookup_scan_code_combo(ScanCodeCombo::new(false, true, false, ScanCode::Semicolon));
        assert!(combos.contains(&KeyCodeCombo::new(false, true, false, KeyCode::UsSemicolon)));
    }

    #[test]
    fn test_enter_binds_main_key_only() {
        let mapper = us_mapper(OperatingSystem::Windows);
        let bindings = mapper.simple_keybinding_to_scan_code_bindings(&simple(false, false, KeyCode::Enter));
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].scan_code, ScanCode::Enter);
    }

    #[test]
    fn test_immutable_keys() {
        let mapper = us_mapper(OperatingSystem::Linux);
        let bindings = mapper.simple_keybinding_to_scan_code_bindings(&simple(false, true, KeyCode::F5));
        assert_eq!(
            bindings,
            vec![ScanCodeBinding::new(false, true, false, false, ScanCode::F5)]
        );
    }

    #[test]
    fn test_dispatch_strings() {
        let mapper = us_mapper(OperatingSystem::Linux);
        let binding = ScanCodeBinding::new(true, true, true, true, ScanCode::KeyA);
        assert_eq!(
            mapper.dispatch_str_for(&binding).as_deref(),
            Some("ctrl+shift+alt+meta+[KeyA]")
        );
        let modifier_only = ScanCodeBinding::new(false, true, false, false, ScanCode::ControlLeft);
        assert_eq!(mapper.dispatch_str_for(&modifier_only), None);
        let unknown = ScanCodeBinding::new(false, false, false, false, ScanCode::F24);
        assert_eq!(mapper.dispatch_str_for(&unknown), None);
    }

    #[test]
    fn test_labels() {
        let linux = us_mapper(OperatingSystem::Linux);
        let ctrl_k = ScanCodeBinding::new(true, false, false, false, ScanCode::KeyK);
        assert_eq!(linux.ui_label_for(&ctrl_k).as_deref(), Some("K"));
        assert_eq!(linux.user_settings_label_for(&ctrl_k).as_deref(), Some("k"));

        let up = ScanCodeBinding::new(false, false, false, false, ScanCode::ArrowUp);
        assert_eq!(linux.ui_label_for(&up).as_deref(), Some("UpArrow"));
        assert_eq!(linux.user_settings_label_for(&up).as_deref(), Some("up"));

        let mac = us_mapper(OperatingSystem::Macintosh);
        assert_eq!(mac.ui_label_for(&up).as_deref(), Some("↑"));
        assert_eq!(mac.aria_label_for(&up).as_deref(), Some("UpArrow"));
    }

    #[test]
    fn test_duplicate_modifier_has_empty_labels() {
        let mapper = us_mapper(OperatingSystem::Linux);
        let resolved = mapper.resolve_keyboard_event(
            &KeyboardEvent::new(ScanCode::ControlLeft).with_modifiers(true, false, false, false),
        );
        assert_eq!(resolved.label().as_deref(), Some(""));
        assert_eq!(resolved.dispatch_parts(), (None, None));
    }

    #[test]
    fn test_stable_key_codes() {
        let mapper = us_mapper(OperatingSystem::Linux);
        assert_eq!(mapper.guess_stable_key_code(ScanCode::KeyQ), Some(KeyCode::KeyQ));
        assert_eq!(mapper.guess_stable_key_code(ScanCode::Digit0), Some(KeyCode::Key0));
        assert_eq!(mapper.guess_stable_key_code(ScanCode::Digit7), Some(KeyCode::Key7));
        assert_eq!(mapper.guess_stable_key_code(ScanCode::Semicolon), Some(KeyCode::UsSemicolon));
    }

    #[test]
    fn test_missing_latin_letters_are_forced() {
        let layout = Layout::new(vec![
            (ScanCode::KeyC, KeyMapping::new("с", "С", "", "")),
            (ScanCode::KeyA, KeyMapping::new("ф", "Ф", "", "")),
        ]);
        let mapper = KeyboardMapper::new(&layout, OperatingSystem::Linux);
        let bindings = mapper.simple_keybinding_to_scan_code_bindings(&simple(true, false, KeyCode::KeyC));
        assert_eq!(
            bindings,
            vec![ScanCodeBinding::new(true, false, false, false, ScanCode::KeyC)]
        );
        // the forced letter also drives the label
        assert_eq!(mapper.ui_label_for(&bindings[0]).as_deref(), Some("C"));
    }

    #[test]
    fn test_remapped_letters() {
        // German layout swaps Y and Z
        let layout = Layout::new(vec![
            (ScanCode::KeyY, KeyMapping::new("z", "Z", "", "")),
            (ScanCode::KeyZ, KeyMapping::new("y", "Y", "", "")),
        ]);
        let mapper = KeyboardMapper::new(&layout, OperatingSystem::Linux);
        let bindings = mapper.simple_keybinding_to_scan_code_bindings(&simple(true, false, KeyCode::KeyZ));
        assert_eq!(bindings[0].scan_code, ScanCode::KeyY);
        assert_eq!(
            mapper.user_settings_label_for(&bindings[0]).as_deref(),
            Some("z")
        );
    }

    #[test]
    fn test_unresolvable_key_code_yields_nothing() {
        let mapper = KeyboardMapper::new(&Layout::default(), OperatingSystem::Linux);
        assert!(mapper
            .simple_keybinding_to_scan_code_bindings(&simple(false, false, KeyCode::UsQuote))
            .is_empty());
        assert!(mapper
            .simple_keybinding_to_scan_code_bindings(&simple(false, false, KeyCode::Unknown))
            .is_empty());
    }

    #[test]
    fn test_leftover_digits_fall_back() {
        let mapper = KeyboardMapper::new(&Layout::default(), OperatingSystem::Linux);
        let bindings = mapper.simple_keybinding_to_scan_code_bindings(&simple(true, false, KeyCode::Key3));
        assert_eq!(bindings[0].scan_code, ScanCode::Digit3);
    }

    #[test]
    fn test_keyboard_event_normalization() {
        let mapper = us_mapper(OperatingSystem::Linux);

        let numpad_enter = mapper.resolve_keyboard_event(&KeyboardEvent::new(ScanCode::NumpadEnter));
        assert_eq!(numpad_enter.dispatch_parts().0, Some("[Enter]"));

        // remote desktop reports a wrong scan code for the arrow
        let arrow = mapper.resolve_keyboard_event(
            &KeyboardEvent::new(ScanCode::Numpad4).with_key_code(KeyCode::LeftArrow),
        );
        assert_eq!(arrow.dispatch_parts().0, Some("[ArrowLeft]"));

        let numlock = mapper.resolve_keyboard_event(
            &KeyboardEvent::new(ScanCode::Numpad7).with_key_code(KeyCode::Home),
        );
        assert_eq!(numlock.dispatch_parts().0, Some("[Home]"));

        let digit = mapper.resolve_keyboard_event(
            &KeyboardEvent::new(ScanCode::Numpad7).with_key_code(KeyCode::Numpad7),
        );
        assert_eq!(digit.dispatch_parts().0, Some("[Numpad7]"));
    }

    #[test]
    fn test_resolve_chord() {
        let mapper = us_mapper(OperatingSystem::Linux);
        let keybinding = Keybinding::Chord(crate::keybinding::ChordKeybinding {
            first_part: simple(true, false, KeyCode::KeyK),
            chord_part: simple(true, false, KeyCode::KeyC),
        });
        let resolved = mapper.resolve_keybinding(&keybinding);
        assert_eq!(resolved.len(), 1);
        assert!(resolved[0].is_chord());
        assert_eq!(
            resolved[0].dispatch_parts(),
            (Some("ctrl+[KeyK]"), Some("ctrl+[KeyC]"))
        );
        assert_eq!(resolved[0].label().as_deref(), Some("Ctrl+K Ctrl+C"));
        assert_eq!(resolved[0].user_settings_label().as_deref(), Some("ctrl+k ctrl+c"));
    }

    #[test]
    fn test_dump_debug_info() {
        let dump = us_mapper(OperatingSystem::Linux).dump_debug_info();
        assert!(dump.starts_with("isUSStandard: true"));
        assert!(dump.contains("Ctrl+Shift+KeyK"));
        assert!(dump.contains("ctrl+shift+[KeyK]"));
    }
}
