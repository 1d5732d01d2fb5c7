// Command line definition and subcommand handlers

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{info, warn};

use keyroute_context::{ContextKeyExpr, ContextKeyService, ContextValue, ROOT_CONTEXT_ID};
use keyroute_keybinds::{
    parse_user_keybindings, CommandService, CommandsRegistry, KeybindingRule, KeybindingService,
    KeybindingSettings, KeybindingWeight,
};
use keyroute_keyboard::{
    parse_keybinding, KeyboardEvent, KeyboardMapper, Layout, OperatingSystem,
};

/// Keyroute - inspect keybinding resolution for a keyboard layout
#[derive(Parser, Debug)]
#[command(name = "keyroute")]
#[command(bin_name = "keyroute")]
#[command(about = "Inspect keyboard layouts, when clauses and keybinding resolution")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Settings file (TOML or JSON)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Simulate key presses and print the command each one resolves to
    Resolve {
        /// Keyboard layout JSON (default: US standard)
        #[arg(long, value_name = "FILE")]
        layout: Option<PathBuf>,

        /// Default keybindings in the keybindings file format
        #[arg(long, value_name = "FILE")]
        defaults: Option<PathBuf>,

        /// User keybindings file
        #[arg(long, value_name = "FILE")]
        keybindings: Option<PathBuf>,

        /// Set a root context key, e.g. `--set editorFocus=true`
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,

        /// Key presses in keybinding syntax, e.g. `ctrl+k ctrl+c`
        #[arg(required = true, value_name = "KEYS")]
        keys: Vec<String>,
    },

    /// Print the scan code to key code table of a layout
    Layout {
        /// Keyboard layout JSON (default: US standard)
        #[arg(long, value_name = "FILE")]
        layout: Option<PathBuf>,
    },

    /// Parse, normalize and evaluate a when clause
    Expr {
        #[arg(value_name = "EXPR")]
        expr: String,

        /// Set a context key, e.g. `--set resourceLangId=rust`
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
    },
}

pub async fn run(cli: Cli) -> Result<()> {
    let settings = KeybindingSettings::load(cli.config.as_deref())
        .context("Failed to load settings")?;

    match cli.command {
        Commands::Resolve {
            layout,
            defaults,
            keybindings,
            set,
            keys,
        } => {
            let layout = load_layout(layout.as_deref())?;
            let recorder = Arc::new(RecordingCommands::default());
            let service = KeybindingService::new(
                ContextKeyService::new(),
                Arc::new(CommandsRegistry::new()),
                &layout,
                settings,
            )
            .with_command_service(recorder.clone());

            if let Some(path) = defaults {
                let content = read(&path)?;
                for rule in default_rules(&content, service.mapper().os())? {
                    service.register_keybinding_rule(&rule)?;
                }
            }
            if let Some(path) = keybindings {
                service.load_user_keybindings_json(&read(&path)?)?;
            }
            for assignment in &set {
                let (key, value) = parse_assignment(assignment)?;
                service.context_keys().set_context(&key, value);
            }

            for line in resolve_keys(&service, &recorder, &keys).await {
                println!("{}", line);
            }
            Ok(())
        }
        Commands::Layout { layout } => {
            let layout = load_layout(layout.as_deref())?;
            let mapper = KeyboardMapper::new(&layout, settings.os())
                .with_numpad_key_code_dispatch(settings.dispatch_on_numpad_key_code);
            print!("{}", mapper.dump_debug_info());
            Ok(())
        }
        Commands::Expr { expr, set } => {
            for line in describe_expr(&expr, &set)? {
                println!("{}", line);
            }
            Ok(())
        }
    }
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn load_layout(path: Option<&Path>) -> Result<Layout> {
    match path {
        Some(path) => Layout::from_file(path)
            .with_context(|| format!("Failed to load layout {}", path.display())),
        None => Ok(Layout::us_standard()),
    }
}

/// Parse `key=value`; `true`/`false` become booleans and numeric text a number
fn parse_assignment(assignment: &str) -> Result<(String, ContextValue)> {
    let Some((key, raw)) = assignment.split_once('=') else {
        bail!("Expected KEY=VALUE, got '{}'", assignment);
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("Empty context key in '{}'", assignment);
    }

    let raw = raw.trim();
    let value = match raw {
        "true" => ContextValue::Bool(true),
        "false" => ContextValue::Bool(false),
        _ => match raw.parse::<f64>() {
            Ok(n) => ContextValue::Number(n),
            Err(_) => ContextValue::String(raw.trim_matches('\'').to_string()),
        },
    };
    Ok((key.to_string(), value))
}

/// Turn a keybindings file into default rules. Keys are bound as key codes,
/// so `[KeyA]` style entries are skipped.
fn default_rules(content: &str, os: OperatingSystem) -> Result<Vec<KeybindingRule>> {
    let mut rules = Vec::new();
    for entry in parse_user_keybindings(content)? {
        let Some(command) = entry.command.as_deref() else {
            warn!("Skipping default keybinding without a command");
            continue;
        };
        let mut rule = KeybindingRule::new(command, KeybindingWeight::editor_core(0))
            .with_when(entry.when.as_deref().and_then(ContextKeyExpr::deserialize));

        if let Some(key) = entry.key.as_deref() {
            match parse_keybinding(key) {
                Some(keybinding) => rule = rule.with_primary(keybinding.encode(os)),
                None => {
                    warn!("Skipping default keybinding '{}' for {}", key, command);
                    continue;
                }
            }
        }
        if let Some(args) = entry.args {
            rule = rule.with_args(args);
        }
        rules.push(rule);
    }
    Ok(rules)
}

/// Command service that records executions instead of running anything
#[derive(Default)]
struct RecordingCommands {
    executed: Mutex<Vec<(String, Option<Value>)>>,
}

impl RecordingCommands {
    fn drain(&self) -> Vec<(String, Option<Value>)> {
        std::mem::take(&mut *self.executed.lock())
    }
}

#[async_trait]
impl CommandService for RecordingCommands {
    async fn execute_command(&self, id: &str, args: Option<Value>) -> keyroute_keybinds::Result<()> {
        info!(command = %id, "Resolved command");
        self.executed.lock().push((id.to_string(), args));
        Ok(())
    }
}

/// Dispatch every key press of every argument, one line of outcome per press
async fn resolve_keys(
    service: &KeybindingService,
    recorder: &RecordingCommands,
    keys: &[String],
) -> Vec<String> {
    let mut lines = Vec::new();
    for text in keys {
        let resolved = service.resolve_user_binding(text);
        let Some(keybinding) = resolved.first() else {
            lines.push(format!("{:<20} not a valid keybinding", text));
            continue;
        };

        for binding in keybinding.bindings() {
            let event = KeyboardEvent::new(binding.scan_code).with_modifiers(
                binding.ctrl_key,
                binding.shift_key,
                binding.alt_key,
                binding.meta_key,
            );
            let label = service
                .resolve_keyboard_event(&event)
                .label()
                .unwrap_or_default();

            let handled = service.dispatch(&event, ROOT_CONTEXT_ID);
            // let the spawned command run
            tokio::task::yield_now().await;

            let executed = recorder.drain();
            let outcome = match executed.first() {
                Some((command, Some(args))) => format!("{} {}", command, args),
                Some((command, None)) => command.clone(),
                None if service.is_in_chord_mode() => "waiting for second key".to_string(),
                None => "no command".to_string(),
            };
            let bubble = if !executed.is_empty() && !handled {
                " (bubbles)"
            } else {
                ""
            };
            lines.push(format!("{:<20} {}{}", label, outcome, bubble));
        }
    }
    lines
}

fn describe_expr(text: &str, assignments: &[String]) -> Result<Vec<String>> {
    let Some(expr) = ContextKeyExpr::deserialize(text) else {
        return Ok(vec!["(empty expression)".to_string()]);
    };

    let context = ContextKeyService::new();
    for assignment in assignments {
        let (key, value) = parse_assignment(assignment)?;
        context.set_context(&key, value);
    }

    let normalized = expr
        .normalize()
        .map(|e| e.serialize())
        .unwrap_or_else(|| "(always true)".to_string());
    Ok(vec![
        format!("parsed:     {}", expr.serialize()),
        format!("normalized: {}", normalized),
        format!("keys:       {}", expr.keys().join(", ")),
        format!("value:      {}", context.context_matches_rules(Some(&expr))),
    ])
}
