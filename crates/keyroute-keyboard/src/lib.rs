//! Keyboard model for keybinding dispatch
//!
//! This crate provides:
//! - Logical key codes and physical scan codes with their name tables
//! - Keybindings and their packed `u32` encoding
//! - Keyboard layouts and the mapper that relates key codes to scan codes
//! - Labels for menus, screen readers and user keybinding files
//! - The parser for user keybinding text

pub mod error;
pub mod key_codes;
pub mod keybinding;
pub mod labels;
pub mod layout;
pub mod mapper;
pub mod resolved;
pub mod scan_codes;
pub mod user_binding;

// Re-export public types
pub use error::KeyboardError;
pub use key_codes::KeyCode;
pub use keybinding::{
    create_keybinding, create_simple_keybinding, key_chord, ChordKeybinding, KeyMod, Keybinding,
    OperatingSystem, ScanCodeBinding, SimpleKeybinding,
};
pub use labels::{Modifiers, ModifierLabelProvider};
pub use layout::{KeyMapping, Layout};
pub use mapper::{KeyCodeCombo, KeyboardEvent, KeyboardMapper, ScanCodeCombo};
pub use resolved::{ResolvedKeybinding, ResolvedKeybindingPart};
pub use scan_codes::ScanCode;
pub use user_binding::{parse_keybinding, parse_user_binding, UserKeyPart};
