//! User keybinding files
//!
//! A keybindings file is a JSON array of
//! `{ "key": "ctrl+k", "command": "x", "when": "a && b", "args": ... }`
//! entries. A command prefixed with `-` removes matching defaults.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use keyroute_context::ContextKeyExpr;
use keyroute_keyboard::{parse_user_binding, KeyboardMapper};

use crate::error::Result;
use crate::resolver::ResolvedKeybindingItem;

/// One entry of a user keybindings file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserKeybindingEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
}

impl UserKeybindingEntry {
    pub fn new(key: &str, command: &str) -> Self {
        UserKeybindingEntry {
            key: Some(key.to_string()),
            command: Some(command.to_string()),
            ..Default::default()
        }
    }

    pub fn with_when(mut self, when: &str) -> Self {
        self.when = Some(when.to_string());
        self
    }

    pub fn with_args(mut self, args: Value) -> Self {
        self.args = Some(args);
        self
    }
}

/// Parse the content of a keybindings file. The top level must be an array;
/// entries that are not objects of the expected shape are skipped.
pub fn parse_user_keybindings(content: &str) -> Result<Vec<UserKeybindingEntry>> {
    let values: Vec<Value> = serde_json::from_str(content)?;
    let entries = values
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| match serde_json::from_value(value) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping keybinding entry {}: {}", index, e);
                None
            }
        })
        .collect();
    Ok(entries)
}

pub fn load_user_keybindings(path: impl AsRef<Path>) -> Result<Vec<UserKeybindingEntry>> {
    let content = std::fs::read_to_string(path)?;
    parse_user_keybindings(&content)
}

/// Materialize user entries for a layout. An entry whose key is missing or
/// malformed becomes a single unbound item, which still works as a removal
/// directive for every keybinding of its command.
pub fn resolve_user_keybindings(
    entries: &[UserKeybindingEntry],
    mapper: &KeyboardMapper,
) -> Vec<ResolvedKeybindingItem> {
    let mut result = Vec::new();
    for entry in entries {
        let when = entry.when.as_deref().and_then(ContextKeyExpr::deserialize);
        let parts = entry
            .key
            .as_deref()
            .map(parse_user_binding)
            .unwrap_or_default();
        let resolved = mapper.resolve_user_binding(&parts);

        if resolved.is_empty() {
            result.push(ResolvedKeybindingItem::new(
                None,
                entry.command.as_deref(),
                entry.args.clone(),
                when,
                false,
            ));
            continue;
        }
        for keybinding in resolved {
            result.push(ResolvedKeybindingItem::new(
                Some(keybinding),
                entry.command.as_deref(),
                entry.args.clone(),
                when.clone(),
                false,
            ));
        }
    }
    result
}

/// Render one item as a single keybindings file entry. Unbound items render
/// as nothing.
pub fn write_keybinding_item(item: &ResolvedKeybindingItem) -> Option<String> {
    let label = item.resolved_keybinding.as_ref()?.user_settings_label()?;
    let quoted_key = Value::String(label).to_string();
    let quoted_command = Value::String(item.command.clone().unwrap_or_default()).to_string();

    let mut out = format!(
        "{{ \"key\": {:<25} \"command\": {}",
        format!("{},", quoted_key),
        quoted_command
    );
    if let Some(when) = &item.when {
        out.push_str(&format!(", \"when\": {}", Value::String(when.serialize())));
    }
    if let Some(args) = &item.command_args {
        out.push_str(&format!(", \"args\": {}", args));
    }
    out.push_str(" }");
    Some(out)
}

/// All default keybindings as the content of a keybindings file, followed by
/// a comment listing commands that have no default keybinding
pub fn default_keybindings_content(
    defaults: &[impl AsRef<ResolvedKeybindingItem>],
    all_commands: &[String],
    bound_commands: &HashSet<String>,
) -> String {
    let entries: Vec<String> = defaults
        .iter()
        .filter_map(|item| write_keybinding_item(item.as_ref()))
        .map(|line| format!("  {}", line))
        .collect();

    let mut out = String::from("[\n");
    out.push_str(&entries.join(",\n"));
    if !entries.is_empty() {
        out.push('\n');
    }
    out.push_str("]\n");

    let unbound: Vec<&String> = all_commands
        .iter()
        .filter(|command| !bound_commands.contains(*command))
        .collect();
    if !unbound.is_empty() {
        out.push_str("// Here are other available commands:\n");
        for command in unbound {
            out.push_str(&format!("// - {}\n", command));
        }
    }
    out
}
