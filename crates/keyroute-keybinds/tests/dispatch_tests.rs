use std::sync::Arc;
use std::time::Duration;

use keyroute_context::{ContextKeyExpr, ContextKeyService, ContextValue, ROOT_CONTEXT_ID};
use keyroute_keybinds::*;
use keyroute_keyboard::{key_chord, KeyCode, KeyMod, KeyboardEvent, Layout, OperatingSystem, ScanCode};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::time::sleep;

const CTRL_K: u32 = KeyMod::CTRL_CMD | KeyCode::KeyK as u32;
const CTRL_C: u32 = KeyMod::CTRL_CMD | KeyCode::KeyC as u32;
const CTRL_S: u32 = KeyMod::CTRL_CMD | KeyCode::KeyS as u32;

struct Fixture {
    service: KeybindingService,
    executed: Arc<Mutex<Vec<(String, Option<Value>)>>>,
}

impl Fixture {
    fn new() -> Self {
        let settings = KeybindingSettings {
            os: Some(OperatingSystem::Linux),
            ..Default::default()
        };
        let service = KeybindingService::new(
            ContextKeyService::new(),
            Arc::new(CommandsRegistry::new()),
            &Layout::us_standard(),
            settings,
        );
        Fixture {
            service,
            executed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn bind(&self, rule: KeybindingRule) {
        let executed = Arc::clone(&self.executed);
        let id = rule.id.clone();
        self.service
            .register_command_and_keybinding_rule(&rule, move |args: Option<&Value>| -> Result<()> {
                executed.lock().push((id.clone(), args.cloned()));
                Ok(())
            })
            .unwrap();
    }

    fn executed_ids(&self) -> Vec<String> {
        self.executed.lock().iter().map(|(id, _)| id.clone()).collect()
    }

    fn in_chord_key(&self) -> Option<ContextValue> {
        self.service
            .context_keys()
            .get_context_key_value(IN_KEYBINDING_CHORD)
    }
}

fn ctrl(code: ScanCode) -> KeyboardEvent {
    KeyboardEvent::new(code).with_modifiers(true, false, false, false)
}

async fn settle() {
    sleep(Duration::from_millis(1)).await;
}

#[tokio::test(start_paused = true)]
async fn test_single_key_command_is_executed() {
    let fixture = Fixture::new();
    fixture.bind(
        KeybindingRule::new("save", 0)
            .with_primary(CTRL_S)
            .with_args(serde_json::json!({ "all": false })),
    );

    assert!(fixture.service.dispatch(&ctrl(ScanCode::KeyS), ROOT_CONTEXT_ID));
    settle().await;

    assert_eq!(
        *fixture.executed.lock(),
        vec![("save".to_string(), Some(serde_json::json!({ "all": false })))]
    );
    assert!(!fixture.service.dispatch(&ctrl(ScanCode::KeyQ), ROOT_CONTEXT_ID));
}

#[tokio::test(start_paused = true)]
async fn test_chord_runs_command_on_second_key() {
    let fixture = Fixture::new();
    fixture.bind(KeybindingRule::new("comment", 0).with_primary(key_chord(CTRL_K, CTRL_C)));

    assert!(fixture.service.dispatch(&ctrl(ScanCode::KeyK), ROOT_CONTEXT_ID));
    assert!(fixture.service.is_in_chord_mode());
    assert_eq!(fixture.service.current_chord_label().as_deref(), Some("Ctrl+K"));
    assert_eq!(fixture.in_chord_key(), Some(ContextValue::Bool(true)));
    settle().await;
    assert!(fixture.executed_ids().is_empty());

    assert!(fixture.service.dispatch(&ctrl(ScanCode::KeyC), ROOT_CONTEXT_ID));
    settle().await;

    assert_eq!(fixture.executed_ids(), vec!["comment".to_string()]);
    assert!(!fixture.service.is_in_chord_mode());
    assert_eq!(fixture.in_chord_key(), Some(ContextValue::Bool(false)));
}

#[tokio::test(start_paused = true)]
async fn test_unmatched_second_key_leaves_chord_mode() {
    let fixture = Fixture::new();
    fixture.bind(KeybindingRule::new("comment", 0).with_primary(key_chord(CTRL_K, CTRL_C)));
    fixture.bind(KeybindingRule::new("save", 0).with_primary(CTRL_S));

    assert!(fixture.service.dispatch(&ctrl(ScanCode::KeyK), ROOT_CONTEXT_ID));
    // ctrl+s is a command on its own but not as the second key of ctrl+k
    assert!(!fixture.service.dispatch(&ctrl(ScanCode::KeyS), ROOT_CONTEXT_ID));
    settle().await;

    assert!(fixture.executed_ids().is_empty());
    assert!(!fixture.service.is_in_chord_mode());
    assert_eq!(fixture.in_chord_key(), Some(ContextValue::Bool(false)));

    assert!(fixture.service.dispatch(&ctrl(ScanCode::KeyS), ROOT_CONTEXT_ID));
    settle().await;
    assert_eq!(fixture.executed_ids(), vec!["save".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_chord_times_out() {
    let fixture = Fixture::new();
    fixture.bind(KeybindingRule::new("comment", 0).with_primary(key_chord(CTRL_K, CTRL_C)));

    assert!(fixture.service.dispatch(&ctrl(ScanCode::KeyK), ROOT_CONTEXT_ID));

    sleep(Duration::from_millis(4900)).await;
    assert!(fixture.service.is_in_chord_mode());

    sleep(Duration::from_millis(700)).await;
    assert!(!fixture.service.is_in_chord_mode());
    assert_eq!(fixture.in_chord_key(), Some(ContextValue::Bool(false)));

    // the late second key starts from idle again
    assert!(!fixture.service.dispatch(&ctrl(ScanCode::KeyC), ROOT_CONTEXT_ID));
    settle().await;
    assert!(fixture.executed_ids().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_reentering_chord_restarts_timeout() {
    let fixture = Fixture::new();
    fixture.bind(KeybindingRule::new("comment", 0).with_primary(key_chord(CTRL_K, CTRL_C)));

    assert!(fixture.service.dispatch(&ctrl(ScanCode::KeyK), ROOT_CONTEXT_ID));
    sleep(Duration::from_millis(3000)).await;
    assert!(!fixture.service.dispatch(&ctrl(ScanCode::KeyQ), ROOT_CONTEXT_ID));
    assert!(fixture.service.dispatch(&ctrl(ScanCode::KeyK), ROOT_CONTEXT_ID));

    sleep(Duration::from_millis(4000)).await;
    assert!(fixture.service.is_in_chord_mode());
}

#[tokio::test(start_paused = true)]
async fn test_focus_loss_leaves_chord_mode() {
    let focus = FocusFlag::default();
    let mut fixture = Fixture::new();
    fixture.service = fixture
        .service
        .with_focus_tracker(Arc::new(focus.clone()));
    fixture.bind(KeybindingRule::new("comment", 0).with_primary(key_chord(CTRL_K, CTRL_C)));

    assert!(fixture.service.dispatch(&ctrl(ScanCode::KeyK), ROOT_CONTEXT_ID));
    sleep(Duration::from_millis(1200)).await;
    assert!(fixture.service.is_in_chord_mode());

    focus.set_focused(false);
    sleep(Duration::from_millis(600)).await;
    assert!(!fixture.service.is_in_chord_mode());
    assert_eq!(fixture.in_chord_key(), Some(ContextValue::Bool(false)));
}

#[tokio::test(start_paused = true)]
async fn test_bubbling_command_runs_without_consuming_key() {
    let fixture = Fixture::new();
    let executed = Arc::clone(&fixture.executed);
    fixture
        .service
        .commands()
        .register_command("type.tab", move |_: Option<&Value>| -> Result<()> {
            executed.lock().push(("type.tab".to_string(), None));
            Ok(())
        });
    fixture
        .service
        .register_keybinding_rule(&KeybindingRule::new("^type.tab", 0).with_primary(KeyCode::Tab as u32))
        .unwrap();

    assert!(!fixture.service.dispatch(&KeyboardEvent::new(ScanCode::Tab), ROOT_CONTEXT_ID));
    settle().await;
    assert_eq!(fixture.executed_ids(), vec!["type.tab".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_when_clause_uses_target_scope() {
    let fixture = Fixture::new();
    fixture.bind(
        KeybindingRule::new("editor.save", 0)
            .with_primary(CTRL_S)
            .with_when(ContextKeyExpr::deserialize("editorFocus")),
    );
    let editor = fixture.service.context_keys().create_scoped().unwrap();
    editor.set_context("editorFocus", true);

    assert!(!fixture.service.dispatch(&ctrl(ScanCode::KeyS), ROOT_CONTEXT_ID));
    assert!(fixture.service.dispatch(&ctrl(ScanCode::KeyS), editor.context_id()));
    settle().await;
    assert_eq!(fixture.executed_ids(), vec!["editor.save".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_failing_command_is_only_logged() {
    let fixture = Fixture::new();
    fixture
        .service
        .register_command_and_keybinding_rule(
            &KeybindingRule::new("broken", 0).with_primary(CTRL_S),
            |_: Option<&Value>| -> Result<()> { Err(KeybindError::command_failed("broken", "boom")) },
        )
        .unwrap();
    fixture.bind(KeybindingRule::new("comment", 0).with_primary(key_chord(CTRL_K, CTRL_C)));

    assert!(fixture.service.dispatch(&ctrl(ScanCode::KeyS), ROOT_CONTEXT_ID));
    settle().await;

    assert!(fixture.service.dispatch(&ctrl(ScanCode::KeyK), ROOT_CONTEXT_ID));
    assert!(fixture.service.dispatch(&ctrl(ScanCode::KeyC), ROOT_CONTEXT_ID));
    settle().await;
    assert_eq!(fixture.executed_ids(), vec!["comment".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_command_is_consumed() {
    let fixture = Fixture::new();
    fixture
        .service
        .register_keybinding_rule(&KeybindingRule::new("nobody.home", 0).with_primary(CTRL_S))
        .unwrap();
    assert!(fixture.service.dispatch(&ctrl(ScanCode::KeyS), ROOT_CONTEXT_ID));
    settle().await;
}

#[tokio::test(start_paused = true)]
async fn test_user_removal_unbinds_default() {
    let fixture = Fixture::new();
    fixture.bind(KeybindingRule::new("save", 0).with_primary(CTRL_S));

    fixture
        .service
        .load_user_keybindings_json(r#"[{ "key": "ctrl+s", "command": "-save" }]"#)
        .unwrap();

    assert!(fixture.service.lookup_keybindings("save").is_empty());
    assert!(!fixture.service.dispatch(&ctrl(ScanCode::KeyS), ROOT_CONTEXT_ID));
    settle().await;
    assert!(fixture.executed_ids().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_user_keybinding_rebinds_command() {
    let fixture = Fixture::new();
    fixture.bind(KeybindingRule::new("save", 0).with_primary(CTRL_S));

    fixture.service.update_user_keybindings(vec![
        UserKeybindingEntry::new("ctrl+s", "-save"),
        UserKeybindingEntry::new("ctrl+k ctrl+s", "save").with_args(serde_json::json!(7)),
    ]);

    let keybinding = fixture.service.lookup_keybinding("save").unwrap();
    assert_eq!(keybinding.label().as_deref(), Some("Ctrl+K Ctrl+S"));

    assert!(fixture.service.dispatch(&ctrl(ScanCode::KeyK), ROOT_CONTEXT_ID));
    assert!(fixture.service.dispatch(&ctrl(ScanCode::KeyS), ROOT_CONTEXT_ID));
    settle().await;
    assert_eq!(
        *fixture.executed.lock(),
        vec![("save".to_string(), Some(serde_json::json!(7)))]
    );
}

#[tokio::test(start_paused = true)]
async fn test_removal_requires_equal_when() {
    let fixture = Fixture::new();
    fixture.bind(
        KeybindingRule::new("save", 0)
            .with_primary(CTRL_S)
            .with_when(ContextKeyExpr::deserialize("editorFocus && !readonly")),
    );

    fixture.service.update_user_keybindings(vec![
        UserKeybindingEntry::new("ctrl+s", "-save").with_when("editorFocus"),
    ]);
    assert_eq!(fixture.service.lookup_keybindings("save").len(), 1);

    fixture.service.update_user_keybindings(vec![
        UserKeybindingEntry::new("ctrl+s", "-save").with_when("!readonly && editorFocus"),
    ]);
    assert!(fixture.service.lookup_keybindings("save").is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_more_specific_binding_shadows_lookup_but_not_dispatch() {
    let fixture = Fixture::new();
    fixture.bind(
        KeybindingRule::new("save", 0)
            .with_primary(CTRL_S)
            .with_when(ContextKeyExpr::deserialize("editorFocus")),
    );
    fixture.bind(
        KeybindingRule::new("save.dirty", 0)
            .with_primary(CTRL_S)
            .with_when(ContextKeyExpr::deserialize("editorFocus && dirty")),
    );

    // `editorFocus && dirty` includes `editorFocus`, so ctrl+s is no longer
    // advertised for `save`
    assert!(fixture.service.lookup_keybinding("save").is_none());
    assert!(fixture.service.lookup_keybinding("save.dirty").is_some());

    let editor = fixture.service.context_keys().create_scoped().unwrap();
    editor.set_context("editorFocus", true);
    assert!(fixture.service.dispatch(&ctrl(ScanCode::KeyS), editor.context_id()));
    editor.set_context("dirty", true);
    assert!(fixture.service.dispatch(&ctrl(ScanCode::KeyS), editor.context_id()));
    settle().await;

    assert_eq!(
        fixture.executed_ids(),
        vec!["save".to_string(), "save.dirty".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn test_default_keybindings_content_lists_unbound_commands() {
    let fixture = Fixture::new();
    fixture.bind(KeybindingRule::new("save", 0).with_primary(CTRL_S));
    fixture
        .service
        .commands()
        .register_command("zen", |_: Option<&Value>| -> Result<()> { Ok(()) });

    let content = fixture.service.default_keybindings_content();
    assert!(content.starts_with("[\n  { \"key\": \"ctrl+s\","));
    assert!(content.ends_with("// Here are other available commands:\n// - zen\n"));
}

#[test]
fn test_resolve_user_binding_text() {
    let fixture = Fixture::new();
    let resolved = fixture.service.resolve_user_binding("ctrl+k ctrl+[KeyC]");
    assert_eq!(resolved.len(), 1);
    assert!(resolved[0].is_chord());
    assert_eq!(
        resolved[0].dispatch_parts(),
        (Some("ctrl+[KeyK]"), Some("ctrl+[KeyC]"))
    );
}
