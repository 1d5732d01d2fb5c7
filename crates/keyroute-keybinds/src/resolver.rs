//! Keybinding resolver
//!
//! Merges default and user keybindings into one ordered list and indexes it
//! twice: by the dispatch string of the first part, for resolving key
//! presses, and by command, for showing keybindings next to commands.
//!
//! When two items share a key press, the later one shadows the earlier one
//! whenever its `when` clause is at least as specific. The shadowed item
//! stays in the key press index (an unsatisfied `when` lets it through) but
//! leaves the command index, so it is no longer advertised.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use keyroute_context::{ContextKeyExpr, ContextLookup};
use keyroute_keyboard::ResolvedKeybinding;

/// A keybinding materialized for the current keyboard layout
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedKeybindingItem {
    pub resolved_keybinding: Option<ResolvedKeybinding>,
    pub keypress_first_part: Option<String>,
    pub keypress_chord_part: Option<String>,
    /// Let the key event continue to the default handler after the command
    pub bubble: bool,
    pub command: Option<String>,
    pub command_args: Option<Value>,
    pub when: Option<ContextKeyExpr>,
    pub is_default: bool,
}

impl ResolvedKeybindingItem {
    /// Build an item; a `^` command prefix marks the binding as bubbling
    pub fn new(
        resolved_keybinding: Option<ResolvedKeybinding>,
        command: Option<&str>,
        command_args: Option<Value>,
        when: Option<ContextKeyExpr>,
        is_default: bool,
    ) -> Self {
        let (keypress_first_part, keypress_chord_part) = match &resolved_keybinding {
            Some(resolved) => {
                let (first, chord) = resolved.dispatch_parts();
                (first.map(str::to_string), chord.map(str::to_string))
            }
            None => (None, None),
        };

        let bubble = command.map(|c| c.starts_with('^')).unwrap_or(false);
        let command = command
            .map(|c| c.strip_prefix('^').unwrap_or(c))
            .filter(|c| !c.is_empty())
            .map(str::to_string);

        ResolvedKeybindingItem {
            resolved_keybinding,
            keypress_first_part,
            keypress_chord_part,
            bubble,
            command,
            command_args,
            when: when.and_then(|w| w.normalize()),
            is_default,
        }
    }

    /// The command a `-command` removal directive targets
    fn removal_target(&self) -> Option<&str> {
        self.command.as_deref().and_then(|c| c.strip_prefix('-'))
    }
}

/// Outcome of resolving a key press
#[derive(Debug, Clone, PartialEq)]
pub enum ResolveResult {
    /// The press is the first part of a chord; wait for the second key
    EnterChord,
    Command {
        command_id: Option<String>,
        command_args: Option<Value>,
        bubble: bool,
    },
}

pub struct KeybindingResolver {
    default_keybindings: Vec<Arc<ResolvedKeybindingItem>>,
    keybindings: Vec<Arc<ResolvedKeybindingItem>>,
    default_bound_commands: HashSet<String>,
    map: HashMap<String, Vec<Arc<ResolvedKeybindingItem>>>,
    lookup_map: HashMap<String, Vec<Arc<ResolvedKeybindingItem>>>,
}

impl KeybindingResolver {
    pub fn new(defaults: Vec<ResolvedKeybindingItem>, overrides: Vec<ResolvedKeybindingItem>) -> Self {
        let default_bound_commands = defaults.iter().filter_map(|d| d.command.clone()).collect();

        let keybindings: Vec<Arc<ResolvedKeybindingItem>> = Self::combine(defaults.clone(), overrides)
            .into_iter()
            .map(Arc::new)
            .collect();

        let mut resolver = KeybindingResolver {
            default_keybindings: defaults.into_iter().map(Arc::new).collect(),
            keybindings: Vec::new(),
            default_bound_commands,
            map: HashMap::new(),
            lookup_map: HashMap::new(),
        };

        for item in &keybindings {
            let Some(first_part) = item.keypress_first_part.clone() else {
                // unbound
                continue;
            };
            resolver.add_key_press(first_part, Arc::clone(item));
        }
        resolver.keybindings = keybindings;

        debug!(
            keybindings = resolver.keybindings.len(),
            key_presses = resolver.map.len(),
            "Built keybinding resolver"
        );
        resolver
    }

    fn is_targeted_for_removal(
        default: &ResolvedKeybindingItem,
        first_part: Option<&str>,
        chord_part: Option<&str>,
        command: &str,
        when: Option<&ContextKeyExpr>,
    ) -> bool {
        if default.command.as_deref() != Some(command) {
            return false;
        }
        if first_part.is_some() && default.keypress_first_part.as_deref() != first_part {
            return false;
        }
        if chord_part.is_some() && default.keypress_chord_part.as_deref() != chord_part {
            return false;
        }
        if let Some(when) = when {
            match &default.when {
                Some(default_when) => return default_when == when,
                None => return false,
            }
        }
        true
    }

    /// Apply `-command` removal directives to the defaults and append the
    /// remaining overrides
    pub fn combine(
        mut defaults: Vec<ResolvedKeybindingItem>,
        overrides: Vec<ResolvedKeybindingItem>,
    ) -> Vec<ResolvedKeybindingItem> {
        let mut kept = Vec::with_capacity(overrides.len());
        for item in overrides {
            let Some(command) = item.removal_target() else {
                kept.push(item);
                continue;
            };

            let before = defaults.len();
            defaults.retain(|default| {
                !Self::is_targeted_for_removal(
                    default,
                    item.keypress_first_part.as_deref(),
                    item.keypress_chord_part.as_deref(),
                    command,
                    item.when.as_ref(),
                )
            });
            debug!(command, removed = before - defaults.len(), "Applied keybinding removal");
        }

        defaults.extend(kept);
        defaults
    }

    fn add_key_press(&mut self, key_press: String, item: Arc<ResolvedKeybindingItem>) {
        let conflicts = self.map.entry(key_press).or_default();
        let mut evicted = Vec::new();

        for conflict in conflicts.iter().rev() {
            if conflict.command == item.command {
                continue;
            }

            // chords with different second parts do not collide
            if let (Some(conflict_chord), Some(item_chord)) =
                (&conflict.keypress_chord_part, &item.keypress_chord_part)
            {
                if conflict_chord != item_chord {
                    continue;
                }
            }

            if when_is_entirely_included(item.when.as_ref(), conflict.when.as_ref()) {
                evicted.push(Arc::clone(conflict));
            }
        }
        conflicts.push(Arc::clone(&item));

        for conflict in evicted {
            self.remove_from_lookup_map(&conflict);
        }
        self.add_to_lookup_map(item);
    }

    fn add_to_lookup_map(&mut self, item: Arc<ResolvedKeybindingItem>) {
        let Some(command) = item.command.clone() else {
            return;
        };
        self.lookup_map.entry(command).or_default().push(item);
    }

    fn remove_from_lookup_map(&mut self, item: &Arc<ResolvedKeybindingItem>) {
        let Some(command) = item.command.as_deref() else {
            return;
        };
        if let Some(items) = self.lookup_map.get_mut(command) {
            items.retain(|candidate| !Arc::ptr_eq(candidate, item));
            if items.is_empty() {
                self.lookup_map.remove(command);
            }
        }
    }

    pub fn default_keybindings(&self) -> &[Arc<ResolvedKeybindingItem>] {
        &self.default_keybindings
    }

    /// The merged keybindings, defaults first
    pub fn keybindings(&self) -> &[Arc<ResolvedKeybindingItem>] {
        &self.keybindings
    }

    pub fn default_bound_commands(&self) -> &HashSet<String> {
        &self.default_bound_commands
    }

    /// Keybindings advertised for a command, most recent first
    pub fn lookup_keybindings(&self, command: &str) -> Vec<Arc<ResolvedKeybindingItem>> {
        self.lookup_map
            .get(command)
            .map(|items| items.iter().rev().cloned().collect())
            .unwrap_or_default()
    }

    pub fn lookup_primary_keybinding(&self, command: &str) -> Option<Arc<ResolvedKeybindingItem>> {
        self.lookup_map
            .get(command)
            .and_then(|items| items.last().cloned())
    }

    /// Resolve a key press, or the second key of a pending chord
    pub fn resolve(
        &self,
        context: &dyn ContextLookup,
        current_chord: Option<&str>,
        key_press: &str,
    ) -> Option<ResolveResult> {
        let candidates: Vec<&Arc<ResolvedKeybindingItem>> = match current_chord {
            Some(chord) => self
                .map
                .get(chord)?
                .iter()
                .filter(|c| c.keypress_chord_part.as_deref() == Some(key_press))
                .collect(),
            None => self.map.get(key_press)?.iter().collect(),
        };

        let result = Self::find_command(context, &candidates)?;
        if current_chord.is_none() && result.keypress_chord_part.is_some() {
            return Some(ResolveResult::EnterChord);
        }

        Some(ResolveResult::Command {
            command_id: result.command.clone(),
            command_args: result.command_args.clone(),
            bubble: result.bubble,
        })
    }

    fn find_command<'a>(
        context: &dyn ContextLookup,
        candidates: &[&'a Arc<ResolvedKeybindingItem>],
    ) -> Option<&'a Arc<ResolvedKeybindingItem>> {
        candidates
            .iter()
            .rev()
            .find(|candidate| Self::context_matches_rules(context, candidate.when.as_ref()))
            .copied()
    }

    fn context_matches_rules(context: &dyn ContextLookup, rules: Option<&ContextKeyExpr>) -> bool {
        rules.map(|r| r.evaluate(context)).unwrap_or(true)
    }
}

/// Whether `a` is at least as specific as `b`: every clause of `b` appears,
/// in order, among the clauses of `a`. A missing `b` is always included; a
/// missing `a` includes nothing else.
pub fn when_is_entirely_included(a: Option<&ContextKeyExpr>, b: Option<&ContextKeyExpr>) -> bool {
    let Some(b) = b else {
        return true;
    };
    let Some(a) = a else {
        return false;
    };

    let a_clauses = a.clauses();
    let mut a_index = 0;
    for b_clause in b.clauses() {
        let mut matched = false;
        while !matched && a_index < a_clauses.len() {
            matched = a_clauses[a_index] == *b_clause;
            a_index += 1;
        }
        if !matched {
            return false;
        }
    }
    true
}
