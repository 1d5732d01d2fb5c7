//! Context key service
//!
//! One service owns a scope arena and a change emitter. Scoped services are
//! thin views over the same arena and emitter that address their own scope.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::emitter::{Emitter, Subscription};
use crate::error::ContextError;
use crate::expr::{ContextKeyExpr, ContextLookup};
use crate::store::{ContextId, ContextStore, ROOT_CONTEXT_ID};
use crate::value::ContextValue;

const CONFIG_KEY_PREFIX: &str = "config.";

/// The set of keys affected by one context mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextKeyChangeEvent {
    pub keys: Vec<String>,
}

impl ContextKeyChangeEvent {
    pub fn affects(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }

    /// Whether any changed key is in `keys`
    pub fn affects_some(&self, keys: &HashSet<String>) -> bool {
        self.keys.iter().any(|k| keys.contains(k))
    }
}

/// Live read view over one scope
#[derive(Clone)]
pub struct Context {
    store: Arc<RwLock<ContextStore>>,
    id: ContextId,
}

impl Context {
    pub fn id(&self) -> ContextId {
        self.id
    }
}

impl ContextLookup for Context {
    fn get_value(&self, key: &str) -> Option<ContextValue> {
        self.store.read().get_value(self.id, key)
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("values", &self.store.read().collect_values(self.id))
            .finish()
    }
}

/// Hierarchical context key service
#[derive(Clone)]
pub struct ContextKeyService {
    store: Arc<RwLock<ContextStore>>,
    emitter: Emitter<ContextKeyChangeEvent>,
    my_context_id: ContextId,
}

impl ContextKeyService {
    /// Create a service addressing the root scope of a fresh arena
    pub fn new() -> Self {
        ContextKeyService {
            store: Arc::new(RwLock::new(ContextStore::new())),
            emitter: Emitter::new(),
            my_context_id: ROOT_CONTEXT_ID,
        }
    }

    pub fn context_id(&self) -> ContextId {
        self.my_context_id
    }

    /// Create a child scope of this service's scope and return a view on it
    pub fn create_scoped(&self) -> Result<ContextKeyService, ContextError> {
        let id = self.create_child_context(self.my_context_id)?;
        Ok(ContextKeyService {
            store: Arc::clone(&self.store),
            emitter: self.emitter.clone(),
            my_context_id: id,
        })
    }

    pub fn create_child_context(&self, parent: ContextId) -> Result<ContextId, ContextError> {
        let id = self.store.write().create_child(parent)?;
        debug!(parent, id, "Created context scope");
        Ok(id)
    }

    /// Dispose any scope of the arena; children are left in place
    pub fn dispose_context(&self, id: ContextId) -> Result<(), ContextError> {
        self.store.write().dispose(id)?;
        debug!(id, "Disposed context scope");
        Ok(())
    }

    /// Dispose the scope this view addresses
    pub fn dispose(&self) -> Result<(), ContextError> {
        self.dispose_context(self.my_context_id)
    }

    /// Create a handle for one key in this scope, initialized to `default`
    pub fn create_key(
        &self,
        key: impl Into<String>,
        default: Option<ContextValue>,
    ) -> ContextKey {
        let handle = ContextKey {
            service: self.clone(),
            key: key.into(),
            default,
        };
        handle.reset();
        handle
    }

    pub fn set_context(&self, key: &str, value: impl Into<ContextValue>) {
        let changed = self
            .store
            .write()
            .set_value(self.my_context_id, key, value.into());
        self.fire_if_changed(key, changed);
    }

    pub fn remove_context(&self, key: &str) {
        let changed = self.store.write().remove_value(self.my_context_id, key);
        self.fire_if_changed(key, changed);
    }

    fn fire_if_changed(&self, key: &str, changed: Result<bool, ContextError>) {
        match changed {
            Ok(true) => self.emitter.fire(ContextKeyChangeEvent {
                keys: vec![key.to_string()],
            }),
            Ok(false) => {}
            Err(e) => warn!("Ignoring update of context key '{}': {}", key, e),
        }
    }

    pub fn get_context_key_value(&self, key: &str) -> Option<ContextValue> {
        self.store.read().get_value(self.my_context_id, key)
    }

    /// Read view over an arbitrary scope of the arena
    pub fn get_context(&self, id: ContextId) -> Context {
        Context {
            store: Arc::clone(&self.store),
            id,
        }
    }

    /// Read view over this service's scope
    pub fn context(&self) -> Context {
        self.get_context(self.my_context_id)
    }

    /// Evaluate an optional `when` clause against this scope; no clause matches
    pub fn context_matches_rules(&self, rules: Option<&ContextKeyExpr>) -> bool {
        match rules {
            Some(rules) => rules.evaluate(&self.context()),
            None => true,
        }
    }

    pub fn on_did_change_context(
        &self,
        listener: impl Fn(&ContextKeyChangeEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.emitter.subscribe(listener)
    }

    /// Mirror a settings object into the root scope as `config.*` keys.
    ///
    /// Scalar leaves become keys named by their dotted path; keys from a
    /// previous call that are absent now are removed. All changed keys are
    /// reported in a single change event.
    pub fn apply_configuration(&self, settings: &serde_json::Value) {
        let mut leaves = Vec::new();
        flatten_settings(CONFIG_KEY_PREFIX.trim_end_matches('.'), settings, &mut leaves);

        let mut changed = Vec::new();
        {
            let mut store = self.store.write();
            let fresh: HashSet<&str> = leaves.iter().map(|(k, _)| k.as_str()).collect();
            for stale in store
                .own_keys(ROOT_CONTEXT_ID)
                .into_iter()
                .filter(|k| k.starts_with(CONFIG_KEY_PREFIX) && !fresh.contains(k.as_str()))
            {
                if let Ok(true) = store.remove_value(ROOT_CONTEXT_ID, &stale) {
                    changed.push(stale);
                }
            }
            for (key, value) in leaves {
                if let Ok(true) = store.set_value(ROOT_CONTEXT_ID, &key, value) {
                    changed.push(key);
                }
            }
        }

        if !changed.is_empty() {
            debug!(count = changed.len(), "Configuration context keys changed");
            changed.sort();
            self.emitter.fire(ContextKeyChangeEvent { keys: changed });
        }
    }
}

impl Default for ContextKeyService {
    fn default() -> Self {
        Self::new()
    }
}

fn flatten_settings(
    prefix: &str,
    value: &serde_json::Value,
    out: &mut Vec<(String, ContextValue)>,
) {
    match value {
        serde_json::Value::Object(map) => {
            for (name, child) in map {
                flatten_settings(&format!("{}.{}", prefix, name), child, out);
            }
        }
        scalar => {
            if let Some(value) = ContextValue::from_json(scalar) {
                out.push((prefix.to_string(), value));
            }
        }
    }
}

/// Handle bound to one key of one scope
#[derive(Clone)]
pub struct ContextKey {
    service: ContextKeyService,
    key: String,
    default: Option<ContextValue>,
}

impl ContextKey {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn set(&self, value: impl Into<ContextValue>) {
        self.service.set_context(&self.key, value);
    }

    /// Restore the default, or remove the key when there is none
    pub fn reset(&self) {
        match &self.default {
            Some(default) => self.service.set_context(&self.key, default.clone()),
            None => self.service.remove_context(&self.key),
        }
    }

    pub fn get(&self) -> Option<ContextValue> {
        self.service.get_context_key_value(&self.key)
    }
}

impl std::fmt::Debug for ContextKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextKey")
            .field("key", &self.key)
            .field("default", &self.default)
            .finish()
    }
}
