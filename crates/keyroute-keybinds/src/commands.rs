//! Command handlers and the registry that executes them

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use crate::error::{KeybindError, Result};

/// Something a keybinding can run
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn execute(&self, args: Option<&Value>) -> Result<()>;
}

#[async_trait]
impl<F> CommandHandler for F
where
    F: Fn(Option<&Value>) -> Result<()> + Send + Sync,
{
    async fn execute(&self, args: Option<&Value>) -> Result<()> {
        self(args)
    }
}

/// Executes commands by id
#[async_trait]
pub trait CommandService: Send + Sync {
    async fn execute_command(&self, id: &str, args: Option<Value>) -> Result<()>;
}

/// Maps command ids to handlers
#[derive(Default)]
pub struct CommandsRegistry {
    commands: RwLock<HashMap<String, Arc<dyn CommandHandler>>>,
}

impl CommandsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous handler for `id`
    pub fn register_command(&self, id: impl Into<String>, handler: impl CommandHandler + 'static) {
        let id = id.into();
        debug!(command = %id, "Registered command");
        self.commands.write().insert(id, Arc::new(handler));
    }

    pub fn unregister_command(&self, id: &str) -> bool {
        self.commands.write().remove(id).is_some()
    }

    pub fn get_command(&self, id: &str) -> Option<Arc<dyn CommandHandler>> {
        self.commands.read().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.commands.read().contains_key(id)
    }

    /// Registered command ids, sorted
    pub fn command_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.commands.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl CommandService for CommandsRegistry {
    async fn execute_command(&self, id: &str, args: Option<Value>) -> Result<()> {
        let handler = self
            .get_command(id)
            .ok_or_else(|| KeybindError::CommandNotFound(id.to_string()))?;
        debug!(command = %id, "Executing command");
        handler.execute(args.as_ref()).await
    }
}
