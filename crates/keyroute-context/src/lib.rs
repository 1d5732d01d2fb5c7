//! Context keys for keybinding `when` clauses
//!
//! This crate provides:
//! - A small boolean expression language over context keys
//! - Context values with explicit truthiness and loose equality
//! - A hierarchical scope arena with change notification

pub mod emitter;
pub mod error;
pub mod expr;
pub mod service;
pub mod store;
pub mod value;

// Re-export public types
pub use emitter::{Emitter, Subscription};
pub use error::ContextError;
pub use expr::{ContextKeyExpr, ContextLookup, ContextRegex};
pub use service::{Context, ContextKey, ContextKeyChangeEvent, ContextKeyService};
pub use store::{ContextId, ContextStore, ROOT_CONTEXT_ID};
pub use value::ContextValue;
