//! Error types for context operations

use thiserror::Error;

use crate::store::ContextId;

/// Errors that can occur while manipulating context scopes
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("Context scope not found: {0}")]
    ScopeNotFound(ContextId),

    #[error("The root context scope cannot be disposed")]
    CannotDisposeRoot,
}
