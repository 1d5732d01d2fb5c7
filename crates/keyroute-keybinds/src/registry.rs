//! Registry of default keybinding rules

use serde_json::Value;
use tracing::{debug, warn};

use keyroute_context::ContextKeyExpr;
use keyroute_keyboard::{create_keybinding, Keybinding, OperatingSystem};

use crate::error::{KeybindError, Result};

/// Conventional weights. Rules with a higher weight are registered later and
/// therefore win ties.
pub struct KeybindingWeight;

impl KeybindingWeight {
    pub fn editor_core(importance: i32) -> i32 {
        importance
    }

    pub fn editor_contrib(importance: i32) -> i32 {
        100 + importance
    }

    pub fn workbench_contrib(importance: i32) -> i32 {
        200 + importance
    }

    pub fn builtin_extension(importance: i32) -> i32 {
        300 + importance
    }

    pub fn external_extension(importance: i32) -> i32 {
        400 + importance
    }
}

/// Packed keybindings that replace a rule's defaults on one OS
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlatformKeybindings {
    pub primary: Option<u32>,
    pub secondary: Vec<u32>,
}

/// A declared default keybinding
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeybindingRule {
    /// Command id
    pub id: String,
    pub weight: i32,
    pub when: Option<ContextKeyExpr>,
    pub primary: Option<u32>,
    pub secondary: Vec<u32>,
    pub win: Option<PlatformKeybindings>,
    pub mac: Option<PlatformKeybindings>,
    pub linux: Option<PlatformKeybindings>,
    /// Passed to the command on dispatch
    pub args: Option<Value>,
}

impl KeybindingRule {
    pub fn new(id: impl Into<String>, weight: i32) -> Self {
        KeybindingRule {
            id: id.into(),
            weight,
            ..Default::default()
        }
    }

    pub fn with_primary(mut self, primary: u32) -> Self {
        self.primary = Some(primary);
        self
    }

    pub fn with_secondary(mut self, secondary: Vec<u32>) -> Self {
        self.secondary = secondary;
        self
    }

    pub fn with_when(mut self, when: Option<ContextKeyExpr>) -> Self {
        self.when = when;
        self
    }

    pub fn with_args(mut self, args: Value) -> Self {
        self.args = Some(args);
        self
    }

    pub fn with_platform(mut self, os: OperatingSystem, keybindings: PlatformKeybindings) -> Self {
        match os {
            OperatingSystem::Windows => self.win = Some(keybindings),
            OperatingSystem::Macintosh => self.mac = Some(keybindings),
            OperatingSystem::Linux => self.linux = Some(keybindings),
        }
        self
    }

    /// The keybindings in effect on `os`; an OS override replaces the
    /// rule's own primary and secondary keybindings
    pub fn bind_to_platform(&self, os: OperatingSystem) -> PlatformKeybindings {
        let platform = match os {
            OperatingSystem::Windows => self.win.as_ref(),
            OperatingSystem::Macintosh => self.mac.as_ref(),
            OperatingSystem::Linux => self.linux.as_ref(),
        };
        match platform {
            Some(platform) => platform.clone(),
            None => PlatformKeybindings {
                primary: self.primary,
                secondary: self.secondary.clone(),
            },
        }
    }
}

/// One registered default keybinding
#[derive(Debug, Clone, PartialEq)]
pub struct KeybindingItem {
    pub keybinding: Option<Keybinding>,
    pub command: String,
    pub command_args: Option<Value>,
    pub when: Option<ContextKeyExpr>,
    pub weight1: i32,
    pub weight2: i32,
}

pub struct KeybindingsRegistry {
    os: OperatingSystem,
    items: Vec<KeybindingItem>,
}

impl KeybindingsRegistry {
    pub fn new(os: OperatingSystem) -> Self {
        KeybindingsRegistry {
            os,
            items: Vec::new(),
        }
    }

    pub fn os(&self) -> OperatingSystem {
        self.os
    }

    /// Register the keybindings of a rule. Packed values of zero are
    /// skipped; a rule without any keybinding registers nothing.
    pub fn register_keybinding_rule(&mut self, rule: &KeybindingRule) -> Result<()> {
        if rule.id.trim().is_empty() {
            return Err(KeybindError::InvalidRule(
                "Command id cannot be empty".to_string(),
            ));
        }

        let actual = rule.bind_to_platform(self.os);
        if let Some(keybinding) = actual.primary.and_then(|p| create_keybinding(p, self.os)) {
            self.register_default(keybinding, rule, 0);
        }
        for (index, &packed) in actual.secondary.iter().enumerate() {
            if let Some(keybinding) = create_keybinding(packed, self.os) {
                self.register_default(keybinding, rule, -(index as i32 + 1));
            }
        }
        Ok(())
    }

    fn register_default(&mut self, keybinding: Keybinding, rule: &KeybindingRule, weight2: i32) {
        if self.os == OperatingSystem::Windows {
            let first = keybinding.first_part();
            if first.ctrl_key && first.alt_key && !first.meta_key && first.key_code.might_produce_char() {
                warn!(
                    "Ctrl+Alt+ keybindings should not be used by default under Windows. Offender: {:?} for {}",
                    keybinding, rule.id
                );
            }
        }

        debug!(command = %rule.id, weight1 = rule.weight, weight2, "Registered default keybinding");
        self.items.push(KeybindingItem {
            keybinding: Some(keybinding),
            command: rule.id.clone(),
            command_args: rule.args.clone(),
            when: rule.when.as_ref().and_then(|w| w.normalize()),
            weight1: rule.weight,
            weight2,
        });
    }

    /// All default keybindings ordered by weight, then command, then
    /// secondary weight. The sort is stable, so equal entries keep their
    /// registration order.
    pub fn default_keybindings(&self) -> Vec<KeybindingItem> {
        let mut items = self.items.clone();
        items.sort_by(|a, b| {
            a.weight1
                .cmp(&b.weight1)
                .then_with(|| a.command.cmp(&b.command))
                .then_with(|| a.weight2.cmp(&b.weight2))
        });
        items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Default for KeybindingsRegistry {
    fn default() -> Self {
        Self::new(OperatingSystem::current())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyroute_keyboard::{key_chord, KeyCode, KeyMod};

    fn ctrl(key_code: KeyCode) -> u32 {
        KeyMod::CTRL_CMD | key_code as u32
    }

    #[test]
    fn test_weights() {
        assert_eq!(KeybindingWeight::editor_core(5), 5);
        assert_eq!(KeybindingWeight::editor_contrib(0), 100);
        assert_eq!(KeybindingWeight::workbench_contrib(1), 201);
        assert_eq!(KeybindingWeight::builtin_extension(0), 300);
        assert_eq!(KeybindingWeight::external_extension(2), 402);
    }

    #[test]
    fn test_secondary_weights_and_order() {
        let mut registry = KeybindingsRegistry::new(OperatingSystem::Linux);
        registry
            .register_keybinding_rule(
                &KeybindingRule::new("b", 0)
                    .with_primary(ctrl(KeyCode::KeyB))
                    .with_secondary(vec![ctrl(KeyCode::KeyC), ctrl(KeyCode::KeyD)]),
            )
            .unwrap();
        registry
            .register_keybinding_rule(&KeybindingRule::new("a", 0).with_primary(ctrl(KeyCode::KeyA)))
            .unwrap();
        registry
            .register_keybinding_rule(
                &KeybindingRule::new("early", -10).with_primary(ctrl(KeyCode::KeyE)),
            )
            .unwrap();

        let items = registry.default_keybindings();
        let order: Vec<(&str, i32)> = items.iter().map(|i| (i.command.as_str(), i.weight2)).collect();
        assert_eq!(
            order,
            vec![("early", 0), ("a", 0), ("b", -2), ("b", -1), ("b", 0)]
        );
    }

    #[test]
    fn test_platform_override_replaces() {
        let rule = KeybindingRule::new("x", 0)
            .with_primary(ctrl(KeyCode::KeyX))
            .with_secondary(vec![ctrl(KeyCode::KeyY)])
            .with_platform(
                OperatingSystem::Macintosh,
                PlatformKeybindings {
                    primary: Some(KeyMod::WIN_CTRL | KeyCode::KeyZ as u32),
                    secondary: Vec::new(),
                },
            );

        let mut mac = KeybindingsRegistry::new(OperatingSystem::Macintosh);
        mac.register_keybinding_rule(&rule).unwrap();
        let items = mac.default_keybindings();
        assert_eq!(items.len(), 1);
        let first = *items[0].keybinding.unwrap().first_part();
        assert!(first.ctrl_key && !first.meta_key);
        assert_eq!(first.key_code, KeyCode::KeyZ);

        let mut linux = KeybindingsRegistry::new(OperatingSystem::Linux);
        linux.register_keybinding_rule(&rule).unwrap();
        assert_eq!(linux.len(), 2);
    }

    #[test]
    fn test_rules_without_keybindings() {
        let mut registry = KeybindingsRegistry::new(OperatingSystem::Windows);
        registry
            .register_keybinding_rule(&KeybindingRule::new("nothing", 0).with_primary(0))
            .unwrap();
        assert!(registry.is_empty());

        assert!(matches!(
            registry.register_keybinding_rule(&KeybindingRule::new(" ", 0)),
            Err(KeybindError::InvalidRule(_))
        ));
    }

    #[test]
    fn test_chords_and_when_are_kept() {
        let mut registry = KeybindingsRegistry::new(OperatingSystem::Windows);
        let when = ContextKeyExpr::deserialize("editorFocus && editorFocus");
        registry
            .register_keybinding_rule(
                &KeybindingRule::new("comment", 0)
                    .with_primary(key_chord(ctrl(KeyCode::KeyK), ctrl(KeyCode::KeyC)))
                    .with_when(when)
                    .with_args(serde_json::json!({"line": true})),
            )
            .unwrap();
        // Ctrl+Alt+Q would shadow an AltGr character; registering only warns
        registry
            .register_keybinding_rule(
                &KeybindingRule::new("altgr", 0)
                    .with_primary(KeyMod::CTRL_CMD | KeyMod::ALT | KeyCode::KeyQ as u32),
            )
            .unwrap();

        let items = registry.default_keybindings();
        assert_eq!(items.len(), 2);
        let comment = items.iter().find(|i| i.command == "comment").unwrap();
        assert!(comment.keybinding.unwrap().is_chord());
        assert_eq!(comment.when, Some(ContextKeyExpr::has("editorFocus")));
        assert_eq!(comment.command_args, Some(serde_json::json!({"line": true})));
    }
}
