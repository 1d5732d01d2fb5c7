//! Arena of context scopes
//!
//! Scopes are addressed by integer id and link to an optional parent. A
//! lookup that misses in a scope continues in its parent until the root.

use std::collections::HashMap;

use crate::error::ContextError;
use crate::value::ContextValue;

/// Identifier of a context scope
pub type ContextId = u32;

/// The root scope always exists and has no parent
pub const ROOT_CONTEXT_ID: ContextId = 0;

#[derive(Debug, Default)]
struct Scope {
    parent: Option<ContextId>,
    values: HashMap<String, ContextValue>,
}

/// Storage for every scope of one context key service
#[derive(Debug)]
pub struct ContextStore {
    scopes: HashMap<ContextId, Scope>,
    last_id: ContextId,
}

impl ContextStore {
    /// Create a store holding only the root scope
    pub fn new() -> Self {
        let mut scopes = HashMap::new();
        scopes.insert(ROOT_CONTEXT_ID, Scope::default());
        ContextStore {
            scopes,
            last_id: ROOT_CONTEXT_ID,
        }
    }

    /// Create a child of `parent` and return its id
    pub fn create_child(&mut self, parent: ContextId) -> Result<ContextId, ContextError> {
        if !self.scopes.contains_key(&parent) {
            return Err(ContextError::ScopeNotFound(parent));
        }
        self.last_id += 1;
        let id = self.last_id;
        self.scopes.insert(
            id,
            Scope {
                parent: Some(parent),
                values: HashMap::new(),
            },
        );
        Ok(id)
    }

    /// Remove a scope. Its children keep their parent link, which now
    /// dangles, so their lookups stop at their own values.
    pub fn dispose(&mut self, id: ContextId) -> Result<(), ContextError> {
        if id == ROOT_CONTEXT_ID {
            return Err(ContextError::CannotDisposeRoot);
        }
        self.scopes
            .remove(&id)
            .map(|_| ())
            .ok_or(ContextError::ScopeNotFound(id))
    }

    pub fn contains(&self, id: ContextId) -> bool {
        self.scopes.contains_key(&id)
    }

    pub fn parent_of(&self, id: ContextId) -> Option<ContextId> {
        self.scopes.get(&id).and_then(|scope| scope.parent)
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Set a value in the given scope; returns whether anything changed
    pub fn set_value(
        &mut self,
        id: ContextId,
        key: &str,
        value: ContextValue,
    ) -> Result<bool, ContextError> {
        let scope = self
            .scopes
            .get_mut(&id)
            .ok_or(ContextError::ScopeNotFound(id))?;
        if scope.values.get(key) == Some(&value) {
            return Ok(false);
        }
        scope.values.insert(key.to_string(), value);
        Ok(true)
    }

    /// Remove a value from the given scope; returns whether it was present
    pub fn remove_value(&mut self, id: ContextId, key: &str) -> Result<bool, ContextError> {
        let scope = self
            .scopes
            .get_mut(&id)
            .ok_or(ContextError::ScopeNotFound(id))?;
        Ok(scope.values.remove(key).is_some())
    }

    /// Look up a key starting at `id` and walking towards the root
    pub fn get_value(&self, id: ContextId, key: &str) -> Option<ContextValue> {
        let mut current = Some(id);
        while let Some(scope_id) = current {
            let scope = self.scopes.get(&scope_id)?;
            if let Some(value) = scope.values.get(key) {
                return Some(value.clone());
            }
            current = scope.parent;
        }
        None
    }

    /// Keys set directly on the given scope (not inherited ones)
    pub fn own_keys(&self, id: ContextId) -> Vec<String> {
        self.scopes
            .get(&id)
            .map(|scope| scope.values.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Every value visible from `id`, nearer scopes shadowing farther ones
    pub fn collect_values(&self, id: ContextId) -> HashMap<String, ContextValue> {
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(scope_id) = current {
            match self.scopes.get(&scope_id) {
                Some(scope) => {
                    chain.push(scope);
                    current = scope.parent;
                }
                None => break,
            }
        }

        let mut values = HashMap::new();
        for scope in chain.into_iter().rev() {
            for (key, value) in &scope.values {
                values.insert(key.clone(), value.clone());
            }
        }
        values
    }
}

impl Default for ContextStore {
    fn default() -> Self {
        Self::new()
    }
}
