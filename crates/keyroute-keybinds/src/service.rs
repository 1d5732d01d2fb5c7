//! Keybinding service
//!
//! Ties the keyboard mapper, the rule registry, user keybindings and the
//! resolver together and runs the chord state machine:
//!
//! - Idle: a key press either resolves to a command, which is executed, or
//!   to the first part of a chord, which enters chord mode.
//! - Awaiting chord: the next key press is resolved against the pending
//!   first part and chord mode is left unconditionally. Chord mode is also
//!   left when focus is lost or the chord timeout elapses, both checked by a
//!   periodic poll that is cancelled on every exit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, warn};

use keyroute_context::{ContextId, ContextKeyService};
use keyroute_keyboard::{
    parse_user_binding, Keybinding, KeyboardEvent, KeyboardMapper, Layout, ResolvedKeybinding,
};

use crate::commands::{CommandHandler, CommandService, CommandsRegistry};
use crate::error::Result;
use crate::registry::{KeybindingRule, KeybindingsRegistry};
use crate::resolver::{KeybindingResolver, ResolveResult, ResolvedKeybindingItem};
use crate::settings::KeybindingSettings;
use crate::user_keybindings::{
    default_keybindings_content, parse_user_keybindings, resolve_user_keybindings,
    UserKeybindingEntry,
};

/// Root context key that is true while the second key of a chord is awaited
pub const IN_KEYBINDING_CHORD: &str = "inKeybindingChord";

/// Reports whether the application window has focus
pub trait FocusTracker: Send + Sync {
    fn has_focus(&self) -> bool;
}

/// Focus tracker for hosts without a focus notion
pub struct AlwaysFocused;

impl FocusTracker for AlwaysFocused {
    fn has_focus(&self) -> bool {
        true
    }
}

/// Focus tracker driven by the host's focus and blur events
#[derive(Debug, Clone)]
pub struct FocusFlag(Arc<AtomicBool>);

impl FocusFlag {
    pub fn new(focused: bool) -> Self {
        FocusFlag(Arc::new(AtomicBool::new(focused)))
    }

    pub fn set_focused(&self, focused: bool) {
        self.0.store(focused, Ordering::SeqCst);
    }
}

impl Default for FocusFlag {
    fn default() -> Self {
        Self::new(true)
    }
}

impl FocusTracker for FocusFlag {
    fn has_focus(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

struct CurrentChord {
    keypress: String,
    label: Option<String>,
    entered_at: Instant,
}

#[derive(Default)]
struct ChordState {
    current: Option<CurrentChord>,
    checker: Option<JoinHandle<()>>,
    /// Bumped on every enter and leave so a stale poll task can tell
    generation: u64,
}

impl ChordState {
    fn cancel_checker(&mut self) {
        if let Some(checker) = self.checker.take() {
            checker.abort();
        }
    }
}

pub struct KeybindingService {
    context_keys: ContextKeyService,
    commands: Arc<CommandsRegistry>,
    command_service: Arc<dyn CommandService>,
    focus: Arc<dyn FocusTracker>,
    mapper: KeyboardMapper,
    settings: KeybindingSettings,
    registry: RwLock<KeybindingsRegistry>,
    user_keybindings: RwLock<Vec<UserKeybindingEntry>>,
    cached_resolver: RwLock<Option<Arc<KeybindingResolver>>>,
    chord: Arc<Mutex<ChordState>>,
}

impl KeybindingService {
    pub fn new(
        context_keys: ContextKeyService,
        commands: Arc<CommandsRegistry>,
        layout: &Layout,
        settings: KeybindingSettings,
    ) -> Self {
        let os = settings.os();
        let mapper = KeyboardMapper::new(layout, os)
            .with_numpad_key_code_dispatch(settings.dispatch_on_numpad_key_code);
        let command_service: Arc<dyn CommandService> = commands.clone();

        KeybindingService {
            context_keys,
            commands,
            command_service,
            focus: Arc::new(AlwaysFocused),
            mapper,
            settings,
            registry: RwLock::new(KeybindingsRegistry::new(os)),
            user_keybindings: RwLock::new(Vec::new()),
            cached_resolver: RwLock::new(None),
            chord: Arc::new(Mutex::new(ChordState::default())),
        }
    }

    /// Execute commands through another service instead of the registry
    pub fn with_command_service(mut self, command_service: Arc<dyn CommandService>) -> Self {
        self.command_service = command_service;
        self
    }

    pub fn with_focus_tracker(mut self, focus: Arc<dyn FocusTracker>) -> Self {
        self.focus = focus;
        self
    }

    pub fn mapper(&self) -> &KeyboardMapper {
        &self.mapper
    }

    pub fn context_keys(&self) -> &ContextKeyService {
        &self.context_keys
    }

    pub fn commands(&self) -> &Arc<CommandsRegistry> {
        &self.commands
    }

    pub fn settings(&self) -> &KeybindingSettings {
        &self.settings
    }

    fn invalidate(&self) {
        *self.cached_resolver.write() = None;
    }

    pub fn register_keybinding_rule(&self, rule: &KeybindingRule) -> Result<()> {
        self.registry.write().register_keybinding_rule(rule)?;
        self.invalidate();
        Ok(())
    }

    pub fn register_command_and_keybinding_rule(
        &self,
        rule: &KeybindingRule,
        handler: impl CommandHandler + 'static,
    ) -> Result<()> {
        self.register_keybinding_rule(rule)?;
        self.commands.register_command(rule.id.clone(), handler);
        Ok(())
    }

    pub fn update_user_keybindings(&self, entries: Vec<UserKeybindingEntry>) {
        debug!(entries = entries.len(), "Updated user keybindings");
        *self.user_keybindings.write() = entries;
        self.invalidate();
    }

    /// Replace the user keybindings with the content of a keybindings file
    pub fn load_user_keybindings_json(&self, content: &str) -> Result<()> {
        let entries = parse_user_keybindings(content)?;
        self.update_user_keybindings(entries);
        Ok(())
    }

    fn resolve_default_items(&self) -> Vec<ResolvedKeybindingItem> {
        let mut result = Vec::new();
        for item in self.registry.read().default_keybindings() {
            let Some(keybinding) = item.keybinding else {
                result.push(ResolvedKeybindingItem::new(
                    None,
                    Some(&item.command),
                    item.command_args.clone(),
                    item.when.clone(),
                    true,
                ));
                continue;
            };
            for resolved in self.mapper.resolve_keybinding(&keybinding) {
                result.push(ResolvedKeybindingItem::new(
                    Some(resolved),
                    Some(&item.command),
                    item.command_args.clone(),
                    item.when.clone(),
                    true,
                ));
            }
        }
        result
    }

    /// The resolver for the current rules, rebuilt after any change
    pub fn resolver(&self) -> Arc<KeybindingResolver> {
        if let Some(resolver) = self.cached_resolver.read().as_ref() {
            return Arc::clone(resolver);
        }

        // built under the write lock so a concurrent invalidate waits for the store
        let mut cached = self.cached_resolver.write();
        if let Some(resolver) = cached.as_ref() {
            return Arc::clone(resolver);
        }
        let defaults = self.resolve_default_items();
        let overrides = resolve_user_keybindings(&self.user_keybindings.read(), &self.mapper);
        let resolver = Arc::new(KeybindingResolver::new(defaults, overrides));
        *cached = Some(Arc::clone(&resolver));
        resolver
    }

    pub fn resolve_keybinding(&self, keybinding: &Keybinding) -> Vec<ResolvedKeybinding> {
        self.mapper.resolve_keybinding(keybinding)
    }

    pub fn resolve_keyboard_event(&self, event: &KeyboardEvent) -> ResolvedKeybinding {
        self.mapper.resolve_keyboard_event(event)
    }

    /// Resolve user keybinding text such as `ctrl+k ctrl+c` for this layout
    pub fn resolve_user_binding(&self, text: &str) -> Vec<ResolvedKeybinding> {
        self.mapper.resolve_user_binding(&parse_user_binding(text))
    }

    /// Keybindings of a command, most recent first
    pub fn lookup_keybindings(&self, command: &str) -> Vec<ResolvedKeybinding> {
        self.resolver()
            .lookup_keybindings(command)
            .iter()
            .filter_map(|item| item.resolved_keybinding.clone())
            .collect()
    }

    pub fn lookup_keybinding(&self, command: &str) -> Option<ResolvedKeybinding> {
        self.resolver()
            .lookup_primary_keybinding(command)
            .and_then(|item| item.resolved_keybinding.clone())
    }

    pub fn default_keybindings_content(&self) -> String {
        let resolver = self.resolver();
        default_keybindings_content(
            resolver.default_keybindings(),
            &self.commands.command_ids(),
            resolver.default_bound_commands(),
        )
    }

    pub fn is_in_chord_mode(&self) -> bool {
        self.chord.lock().current.is_some()
    }

    /// Label of the pending first part, if a chord is pending
    pub fn current_chord_label(&self) -> Option<String> {
        self.chord
            .lock()
            .current
            .as_ref()
            .and_then(|c| c.label.clone())
    }

    /// Handle a key press in the scope `target`. Returns whether the host
    /// should suppress its default handling of the key.
    pub fn dispatch(&self, event: &KeyboardEvent, target: ContextId) -> bool {
        let keybinding = self.resolve_keyboard_event(event);
        if keybinding.is_chord() {
            warn!("Unexpected keyboard event mapped to a chord");
            return false;
        }
        let Some(first_part) = keybinding.dispatch_parts().0.map(str::to_string) else {
            // a bare modifier press
            return false;
        };

        let context = self.context_keys.get_context(target);
        let current_chord = self
            .chord
            .lock()
            .current
            .as_ref()
            .map(|c| (c.keypress.clone(), c.label.clone()));
        let key_label = keybinding.label();

        let result = self.resolver().resolve(
            &context,
            current_chord.as_ref().map(|(keypress, _)| keypress.as_str()),
            &first_part,
        );

        if result == Some(ResolveResult::EnterChord) {
            self.enter_chord_mode(first_part, key_label);
            return true;
        }

        let command = match result {
            Some(ResolveResult::Command {
                command_id: Some(command_id),
                command_args,
                bubble,
            }) => Some((command_id, command_args, bubble)),
            _ => None,
        };

        if let Some((_, chord_label)) = &current_chord {
            if command.is_none() {
                info!(
                    "The key combination ({}, {}) is not a command.",
                    chord_label.as_deref().unwrap_or_default(),
                    key_label.as_deref().unwrap_or_default()
                );
            }
        }
        self.leave_chord_mode();

        match command {
            Some((command_id, command_args, bubble)) => {
                self.execute_command(command_id, command_args);
                !bubble
            }
            None => false,
        }
    }

    fn execute_command(&self, command_id: String, args: Option<Value>) {
        let Ok(handle) = Handle::try_current() else {
            warn!("No async runtime available, command '{}' was not executed", command_id);
            return;
        };
        let command_service = Arc::clone(&self.command_service);
        handle.spawn(async move {
            if let Err(e) = command_service.execute_command(&command_id, args).await {
                warn!("Command '{}' failed: {}", command_id, e);
            }
        });
    }

    fn enter_chord_mode(&self, keypress: String, label: Option<String>) {
        {
            let mut state = self.chord.lock();
            state.cancel_checker();
            state.generation += 1;
            state.current = Some(CurrentChord {
                keypress,
                label: label.clone(),
                entered_at: Instant::now(),
            });
            let generation = state.generation;
            state.checker = self.spawn_chord_checker(generation);
        }

        info!(
            "({}) was pressed. Waiting for second key of chord...",
            label.as_deref().unwrap_or_default()
        );
        self.context_keys.set_context(IN_KEYBINDING_CHORD, true);
    }

    fn leave_chord_mode(&self) {
        let was_pending = {
            let mut state = self.chord.lock();
            state.cancel_checker();
            state.generation += 1;
            state.current.take().is_some()
        };

        if was_pending {
            debug!("Left chord mode");
            self.context_keys.set_context(IN_KEYBINDING_CHORD, false);
        }
    }

    fn spawn_chord_checker(&self, generation: u64) -> Option<JoinHandle<()>> {
        let Ok(handle) = Handle::try_current() else {
            warn!("No async runtime available, chord mode will not time out");
            return None;
        };

        let chord = Arc::clone(&self.chord);
        let focus = Arc::clone(&self.focus);
        let context_keys = self.context_keys.clone();
        let timeout = self.settings.chord_timeout();
        let period = self.settings.chord_poll_interval();

        Some(handle.spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            loop {
                interval.tick().await;

                let expired = {
                    let mut state = chord.lock();
                    if state.generation != generation {
                        return;
                    }
                    let expired = match &state.current {
                        Some(current) => {
                            !focus.has_focus() || current.entered_at.elapsed() > timeout
                        }
                        None => return,
                    };
                    if expired {
                        state.current = None;
                        state.checker = None;
                        state.generation += 1;
                    }
                    expired
                };

                if expired {
                    debug!("Chord mode timed out or lost focus");
                    context_keys.set_context(IN_KEYBINDING_CHORD, false);
                    return;
                }
            }
        }))
    }
}

impl Drop for KeybindingService {
    fn drop(&mut self) {
        self.chord.lock().cancel_checker();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyroute_context::ROOT_CONTEXT_ID;
    use keyroute_keyboard::{KeyCode, KeyMod, OperatingSystem, ScanCode};

    fn service() -> KeybindingService {
        let settings = KeybindingSettings {
            os: Some(OperatingSystem::Linux),
            ..Default::default()
        };
        KeybindingService::new(
            ContextKeyService::new(),
            Arc::new(CommandsRegistry::new()),
            &Layout::us_standard(),
            settings,
        )
    }

    fn ctrl_k() -> KeyboardEvent {
        KeyboardEvent::new(ScanCode::KeyK).with_modifiers(true, false, false, false)
    }

    #[test]
    fn test_resolver_is_cached_until_rules_change() {
        let service = service();
        let first = service.resolver();
        assert!(Arc::ptr_eq(&first, &service.resolver()));

        service
            .register_keybinding_rule(
                &KeybindingRule::new("x", 0).with_primary(KeyMod::CTRL_CMD | KeyCode::KeyK as u32),
            )
            .unwrap();
        let second = service.resolver();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.keybindings().len(), 1);

        service.update_user_keybindings(Vec::new());
        assert!(!Arc::ptr_eq(&second, &service.resolver()));
    }

    #[test]
    fn test_concurrent_rebuild_keeps_latest_rules() {
        let service = service();
        let done = AtomicBool::new(false);

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    while !done.load(Ordering::SeqCst) {
                        service.resolver();
                    }
                });
            }
            for i in 0..50 {
                service
                    .register_keybinding_rule(
                        &KeybindingRule::new(format!("cmd{}", i), 0)
                            .with_primary(KeyMod::CTRL_CMD | KeyCode::KeyK as u32),
                    )
                    .unwrap();
            }
            done.store(true, Ordering::SeqCst);
        });

        assert_eq!(service.resolver().keybindings().len(), 50);
        assert!(service.lookup_keybinding("cmd49").is_some());
    }

    #[test]
    fn test_dispatch_without_runtime_still_reports() {
        let service = service();
        service
            .register_keybinding_rule(
                &KeybindingRule::new("x", 0).with_primary(KeyMod::CTRL_CMD | KeyCode::KeyK as u32),
            )
            .unwrap();
        // the command cannot run without a runtime, but the key is still consumed
        assert!(service.dispatch(&ctrl_k(), ROOT_CONTEXT_ID));
    }

    #[test]
    fn test_modifier_only_press_is_ignored() {
        let service = service();
        let event = KeyboardEvent::new(ScanCode::ControlLeft).with_modifiers(true, false, false, false);
        assert!(!service.dispatch(&event, ROOT_CONTEXT_ID));
    }

    #[test]
    fn test_lookup_keybinding_labels() {
        let service = service();
        service
            .register_keybinding_rule(
                &KeybindingRule::new("x", 0).with_primary(KeyMod::CTRL_CMD | KeyCode::KeyK as u32),
            )
            .unwrap();
        let keybinding = service.lookup_keybinding("x").unwrap();
        assert_eq!(keybinding.label().as_deref(), Some("Ctrl+K"));
        assert_eq!(service.lookup_keybindings("x").len(), 1);
        assert!(service.lookup_keybinding("y").is_none());
    }
}
