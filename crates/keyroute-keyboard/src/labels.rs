//! Modifier label providers
//!
//! Turns modifier flags plus a key label into text for three audiences:
//! the UI (`⌘K`, `Ctrl+K`), screen readers (`Command+K`, `Control+K`) and
//! user keybinding files (`cmd+k`, `ctrl+k`).

use crate::keybinding::OperatingSystem;

/// Modifier flags of one keybinding part
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub ctrl_key: bool,
    pub shift_key: bool,
    pub alt_key: bool,
    pub meta_key: bool,
}

/// Words used for each modifier and the separator between them
#[derive(Debug, Clone, Copy)]
pub struct ModifierLabels {
    pub ctrl_key: &'static str,
    pub shift_key: &'static str,
    pub alt_key: &'static str,
    pub meta_key: &'static str,
    pub separator: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct ModifierLabelProvider {
    mac: ModifierLabels,
    windows: ModifierLabels,
    linux: ModifierLabels,
}

pub const UI_LABEL_PROVIDER: ModifierLabelProvider = ModifierLabelProvider {
    mac: ModifierLabels {
        ctrl_key: "⌃",
        shift_key: "⇧",
        alt_key: "⌥",
        meta_key: "⌘",
        separator: "",
    },
    windows: ModifierLabels {
        ctrl_key: "Ctrl",
        shift_key: "Shift",
        alt_key: "Alt",
        meta_key: "Windows",
        separator: "+",
    },
    linux: ModifierLabels {
        ctrl_key: "Ctrl",
        shift_key: "Shift",
        alt_key: "Alt",
        meta_key: "Super",
        separator: "+",
    },
};

pub const ARIA_LABEL_PROVIDER: ModifierLabelProvider = ModifierLabelProvider {
    mac: ModifierLabels {
        ctrl_key: "Control",
        shift_key: "Shift",
        alt_key: "Alt",
        meta_key: "Command",
        separator: "+",
    },
    windows: ModifierLabels {
        ctrl_key: "Control",
        shift_key: "Shift",
        alt_key: "Alt",
        meta_key: "Windows",
        separator: "+",
    },
    linux: ModifierLabels {
        ctrl_key: "Control",
        shift_key: "Shift",
        alt_key: "Alt",
        meta_key: "Super",
        separator: "+",
    },
};

pub const USER_SETTINGS_LABEL_PROVIDER: ModifierLabelProvider = ModifierLabelProvider {
    mac: ModifierLabels {
        ctrl_key: "ctrl",
        shift_key: "shift",
        alt_key: "alt",
        meta_key: "cmd",
        separator: "+",
    },
    windows: ModifierLabels {
        ctrl_key: "ctrl",
        shift_key: "shift",
        alt_key: "alt",
        meta_key: "win",
        separator: "+",
    },
    linux: ModifierLabels {
        ctrl_key: "ctrl",
        shift_key: "shift",
        alt_key: "alt",
        meta_key: "meta",
        separator: "+",
    },
};

impl ModifierLabelProvider {
    pub fn labels(&self, os: OperatingSystem) -> &ModifierLabels {
        match os {
            OperatingSystem::Macintosh => &self.mac,
            OperatingSystem::Windows => &self.windows,
            OperatingSystem::Linux => &self.linux,
        }
    }

    /// Render every part, separated by a space. Parts with a missing or
    /// empty key label render as empty text; `None` only when no part has a
    /// key label at all.
    pub fn to_label(&self, os: OperatingSystem, parts: &[(Modifiers, Option<&str>)]) -> Option<String> {
        if parts.iter().all(|(_, key)| key.is_none()) {
            return None;
        }
        let labels = self.labels(os);
        let rendered: Vec<String> = parts
            .iter()
            .map(|(modifiers, key)| match key {
                Some(key) if !key.is_empty() => simple_as_string(modifiers, key, labels),
                _ => String::new(),
            })
            .collect();
        Some(rendered.join(" "))
    }
}

fn simple_as_string(modifiers: &Modifiers, key: &str, labels: &ModifierLabels) -> String {
    let mut result = Vec::with_capacity(5);
    if modifiers.ctrl_key {
        result.push(labels.ctrl_key);
    }
    if modifiers.shift_key {
        result.push(labels.shift_key);
    }
    if modifiers.alt_key {
        result.push(labels.alt_key);
    }
    if modifiers.meta_key {
        result.push(labels.meta_key);
    }
    result.push(key);
    result.join(labels.separator)
}
