//! Error types for keybinding registration, loading and command execution

use thiserror::Error;

/// Keybinding result type
pub type Result<T> = std::result::Result<T, KeybindError>;

/// Errors that can occur while registering, loading or executing keybindings
#[derive(Debug, Error)]
pub enum KeybindError {
    #[error("Invalid keybindings JSON: {0}")]
    InvalidKeybindings(#[from] serde_json::Error),

    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),

    #[error("Invalid keybinding rule: {0}")]
    InvalidRule(String),

    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Command '{command}' failed: {message}")]
    CommandFailed { command: String, message: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl KeybindError {
    /// Convenience constructor for handler failures
    pub fn command_failed(command: impl Into<String>, message: impl Into<String>) -> Self {
        KeybindError::CommandFailed {
            command: command.into(),
            message: message.into(),
        }
    }
}
