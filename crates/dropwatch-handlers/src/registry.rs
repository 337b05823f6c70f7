//! Handler registry
//!
//! Maps configured identifiers to constructor functions. Resolution happens
//! once at startup and fails fast: an unknown identifier or a constructor
//! error aborts startup with a [`ConfigError`].

use std::{collections::BTreeMap, sync::Arc};

use dropwatch_core::{
    config::{keys, split_handler_ids, ConfigStore, ValidationError},
    ports::{EventHandler, HandlerSet, NamedHandler},
    ConfigError,
};
use tracing::{debug, info};

use crate::{
    printout::{PrintoutHandler, PRINTOUT_ID},
    upload::{HttpUploadHandler, UPLOAD_ID},
};

/// Constructor of a handler from the configuration store
pub type HandlerCtor = fn(&ConfigStore) -> anyhow::Result<Arc<dyn EventHandler>>;

/// Identifier → constructor table
#[derive(Clone)]
pub struct HandlerRegistry {
    ctors: BTreeMap<String, HandlerCtor>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl HandlerRegistry {
    /// Registry without any handler
    pub fn empty() -> Self {
        Self {
            ctors: BTreeMap::new(),
        }
    }

    /// Registry with the built-in `printout` and `upload` handlers
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry
            .register(PRINTOUT_ID, PrintoutHandler::from_config)
            .register(UPLOAD_ID, HttpUploadHandler::from_config);
        registry
    }

    /// Adds or replaces the constructor for `id`
    pub fn register(&mut self, id: impl Into<String>, ctor: HandlerCtor) -> &mut Self {
        self.ctors.insert(id.into(), ctor);
        self
    }

    /// Returns true if `id` is known
    pub fn contains(&self, id: &str) -> bool {
        self.ctors.contains_key(id)
    }

    /// Known identifiers, sorted
    pub fn identifiers(&self) -> Vec<&str> {
        self.ctors.keys().map(String::as_str).collect()
    }

    /// Instantiates every handler named in `ids`
    ///
    /// Duplicate identifiers are instantiated once.
    ///
    /// # Errors
    /// - [`ConfigError::Invalid`] if `ids` is empty
    /// - [`ConfigError::UnknownHandler`] for an identifier with no constructor
    /// - [`ConfigError::HandlerInit`] if a constructor fails
    pub fn resolve(&self, ids: &[String], store: &ConfigStore) -> Result<HandlerSet, ConfigError> {
        if ids.is_empty() {
            return Err(ConfigError::Invalid(vec![ValidationError {
                field: keys::EVENT_HANDLER_CLASSES.into(),
                message: "at least one handler is required".into(),
            }]));
        }

        let mut handlers: Vec<NamedHandler> = Vec::with_capacity(ids.len());
        for id in ids {
            if handlers.iter().any(|h| h.id() == id) {
                debug!(handler = %id, "Duplicate handler identifier ignored");
                continue;
            }
            let ctor = self
                .ctors
                .get(id)
                .ok_or_else(|| ConfigError::UnknownHandler(id.clone()))?;
            let handler = ctor(store).map_err(|source| ConfigError::HandlerInit {
                id: id.clone(),
                source,
            })?;
            handlers.push(NamedHandler::new(id.clone(), handler));
        }

        let set = HandlerSet::new(handlers);
        info!(handlers = ?set.ids(), "Resolved event handlers");
        Ok(set)
    }

    /// [`resolve`](Self::resolve) for a raw comma-separated list
    pub fn resolve_list(&self, raw: &str, store: &ConfigStore) -> Result<HandlerSet, ConfigError> {
        self.resolve(&split_handler_ids(raw), store)
    }
}
