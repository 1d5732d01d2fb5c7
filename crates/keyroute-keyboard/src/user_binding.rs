//! Parser for the keybinding text written in user keybinding files
//!
//! Syntax: `[mod(+|-)]*key [mod(+|-)]*key`, where a modifier is one of
//! `ctrl`, `shift`, `alt`, `meta`, `win` or `cmd` and a key is a key-code
//! name (`k`, `f5`, `escape`, `oem_1`) or a bracketed scan code (`[KeyK]`).
//! A space separates the parts of a chord. Input is case-insensitive.

use tracing::warn;

use crate::key_codes::KeyCode;
use crate::keybinding::{ChordKeybinding, Keybinding, ScanCodeBinding, SimpleKeybinding};
use crate::scan_codes::ScanCode;

/// One parsed part: a logical key or a physical key position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserKeyPart {
    KeyCode(SimpleKeybinding),
    ScanCode(ScanCodeBinding),
}

struct ParsedModifiers<'a> {
    ctrl: bool,
    shift: bool,
    alt: bool,
    meta: bool,
    key: &'a str,
    remains: &'a str,
}

const MODIFIERS: &[&str] = &["ctrl", "shift", "alt", "meta", "win", "cmd"];

fn strip_modifier<'a>(input: &'a str, name: &str) -> Option<&'a str> {
    let rest = input.strip_prefix(name)?;
    rest.strip_prefix('+').or_else(|| rest.strip_prefix('-'))
}

fn read_modifiers(input: &str) -> ParsedModifiers<'_> {
    let mut input = input.trim();
    let (mut ctrl, mut shift, mut alt, mut meta) = (false, false, false, false);

    'outer: loop {
        for &name in MODIFIERS {
            if let Some(rest) = strip_modifier(input, name) {
                match name {
                    "ctrl" => ctrl = true,
                    "shift" => shift = true,
                    "alt" => alt = true,
                    _ => meta = true,
                }
                input = rest;
                continue 'outer;
            }
        }
        break;
    }

    let (key, remains) = match input.find(' ') {
        Some(index) if index > 0 => (&input[..index], &input[index..]),
        _ => (input, ""),
    };

    ParsedModifiers {
        ctrl,
        shift,
        alt,
        meta,
        key,
        remains,
    }
}

fn parse_user_part(input: &str) -> (Option<UserKeyPart>, &str) {
    let mods = read_modifiers(input);

    let bracketed = mods
        .key
        .strip_prefix('[')
        .and_then(|k| k.strip_suffix(']'))
        .filter(|k| !k.is_empty() && !k.contains(']'));
    if let Some(name) = bracketed {
        let part = match ScanCode::from_name(name) {
            Some(scan_code) => Some(UserKeyPart::ScanCode(ScanCodeBinding::new(
                mods.ctrl, mods.shift, mods.alt, mods.meta, scan_code,
            ))),
            None => {
                warn!("Unknown scan code '{}' in keybinding", name);
                None
            }
        };
        return (part, mods.remains);
    }

    let part = match KeyCode::from_user_settings(mods.key) {
        Some(key_code) => Some(UserKeyPart::KeyCode(SimpleKeybinding::new(
            mods.ctrl, mods.shift, mods.alt, mods.meta, key_code,
        ))),
        None => {
            warn!("Unknown key '{}' in keybinding", mods.key);
            None
        }
    };
    (part, mods.remains)
}

/// Parse user keybinding text into one or two parts. Parts past the
/// second are dropped with a warning.
///
/// Returns an empty list for blank input or when any part names an unknown
/// key; such entries end up unbound.
pub fn parse_user_binding(input: &str) -> Vec<UserKeyPart> {
    let input = input.to_lowercase();
    if input.trim().is_empty() {
        return Vec::new();
    }

    let (first, remains) = parse_user_part(&input);
    let Some(first) = first else {
        return Vec::new();
    };
    if remains.trim().is_empty() {
        return vec![first];
    }

    let (chord, rest) = parse_user_part(remains);
    let Some(chord) = chord else {
        return Vec::new();
    };
    if !rest.trim().is_empty() {
        warn!(
            "Keybinding '{}' has more than two parts, ignoring '{}'",
            input.trim(),
            rest.trim()
        );
    }
    vec![first, chord]
}

/// Parse keybinding text that only uses key-code names, as in default
/// keybinding files. Bracketed scan codes are rejected.
pub fn parse_keybinding(input: &str) -> Option<Keybinding> {
    let parts = parse_user_binding(input);
    let simple = |part: &UserKeyPart| match part {
        UserKeyPart::KeyCode(simple) => Some(*simple),
        UserKeyPart::ScanCode(_) => {
            warn!("Scan code keys are not allowed in '{}'", input);
            None
        }
    };

    match parts.as_slice() {
        [first] => Some(Keybinding::Simple(simple(first)?)),
        [first, chord] => Some(Keybinding::Chord(ChordKeybinding {
            first_part: simple(first)?,
            chord_part: simple(chord)?,
        })),
        _ => None,
    }
}
