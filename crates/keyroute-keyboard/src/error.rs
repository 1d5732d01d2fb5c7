//! Error types for keyboard tables and layouts

use thiserror::Error;

/// Errors that can occur while reading key names or keyboard layouts
#[derive(Debug, Error)]
pub enum KeyboardError {
    #[error("Unknown key code: {0}")]
    UnknownKeyCode(String),

    #[error("Unknown scan code: {0}")]
    UnknownScanCode(String),

    #[error("Invalid keyboard layout: {0}")]
    InvalidLayout(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
