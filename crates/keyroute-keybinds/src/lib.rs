//! Keybinding rules, resolution and dispatch
//!
//! This crate provides:
//! - A registry of weighted keybinding rules with per-platform overrides
//! - User keybinding files with removal directives
//! - A resolver that picks the command for a key press under the current context
//! - A dispatch service running the two-key chord state machine
//! - Settings loaded from files and `KEYROUTE_*` environment variables

pub mod commands;
pub mod error;
pub mod registry;
pub mod resolver;
pub mod service;
pub mod settings;
pub mod user_keybindings;

// Re-export public types
pub use commands::{CommandHandler, CommandService, CommandsRegistry};
pub use error::{KeybindError, Result};
pub use registry::{
    KeybindingItem, KeybindingRule, KeybindingWeight, KeybindingsRegistry, PlatformKeybindings,
};
pub use resolver::{
    when_is_entirely_included, KeybindingResolver, ResolveResult, ResolvedKeybindingItem,
};
pub use service::{AlwaysFocused, FocusFlag, FocusTracker, KeybindingService, IN_KEYBINDING_CHORD};
pub use settings::{KeybindingSettings, ENV_PREFIX};
pub use user_keybindings::{
    default_keybindings_content, load_user_keybindings, parse_user_keybindings,
    resolve_user_keybindings, write_keybinding_item, UserKeybindingEntry,
};
