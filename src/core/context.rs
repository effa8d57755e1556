// src/core/context.rs

//! # Context
//!
//! The per-session pool of live objects that commands are resolved against.
//!
//! A context holds at most one instance per concrete type. Storing a second
//! instance of a type replaces the first in place, so the pool keeps its
//! insertion order. Resolution itself lives in `core::resolver`.

use crate::constants::{DEFAULT_MASK, DEFAULT_MAX_RESOLUTION_DEPTH};
use crate::core::config::EngineConfig;
use crate::core::converter::{ConversionError, TypeConverter};
use crate::core::logging::{LogFacadeSink, LogSink};
use crate::core::registry::Registry;
use crate::core::version::Version;
use crate::models::{Object, Parameter, TypeKey, downcast, runtime_type};
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Unknown command '{name}'.")]
    UnknownCommand { name: String },
    #[error("No factory can produce {type_name} (needed by '{command}').")]
    NoFactory { type_name: String, command: String },
    #[error(
        "Cannot produce {type_name} for '{command}': no factory can be satisfied (missing: {}).",
        missing.join(", ")
    )]
    UnsatisfiableFactory {
        type_name: String,
        command: String,
        missing: Vec<String>,
    },
    #[error("Could not resolve {type_name} for '{command}': {reason}")]
    ContextResolution {
        type_name: String,
        command: String,
        reason: String,
    },
    #[error("{type_name} is required by '{command}' but is not present in the context.")]
    MissingContextObject { type_name: String, command: String },
    #[error("Command '{command}' runs on {type_name}, but no instance is present in the context.")]
    MissingHost { type_name: String, command: String },
    #[error("Missing required argument '{parameter}' for command '{command}'.")]
    MissingRequiredArgument { parameter: String, command: String },
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    #[error("Command '{command}' failed")]
    CommandExecution {
        command: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("Command '{command}' is not available in version {version} ({range}).")]
    NotApplicable {
        command: String,
        version: String,
        range: String,
    },
    #[error(
        "Resolving {type_name} for '{command}' went deeper than {limit} steps. Is the factory graph cyclic?"
    )]
    ResolutionTooDeep {
        type_name: String,
        command: String,
        limit: usize,
    },
}

pub(crate) type DispatchResult<T> = Result<T, DispatchError>;

/// Asked for a value when a parameter cannot be resolved any other way.
/// Returning `None` leaves the parameter unresolved.
pub type MissingArgumentHandler = Box<dyn FnMut(&Parameter) -> Option<String>>;

/// The runtime object pool, bound to the registry it resolves commands from.
pub struct Context<'r> {
    pub(crate) registry: &'r Registry,
    pub(crate) converter: TypeConverter,
    instances: Vec<Object>,
    /// Single-use objects produced during the current top-level invocation.
    pub(crate) pending_purge: Vec<Object>,
    pub(crate) missing_argument_handler: Option<MissingArgumentHandler>,
    pub(crate) sink: Rc<dyn LogSink>,
    pub(crate) mask: String,
    pub(crate) max_depth: usize,
    pub(crate) target_version: Option<Version>,
}

impl<'r> Context<'r> {
    /// An empty context with the default converter, the `log` facade as its
    /// sink and no missing-argument handler.
    pub fn new(registry: &'r Registry) -> Self {
        Self {
            registry,
            converter: TypeConverter::new(),
            instances: Vec::new(),
            pending_purge: Vec::new(),
            missing_argument_handler: None,
            sink: Rc::new(LogFacadeSink),
            mask: DEFAULT_MASK.to_string(),
            max_depth: DEFAULT_MAX_RESOLUTION_DEPTH,
            target_version: None,
        }
    }

    // --- BUILDER ---

    pub fn with_converter(mut self, converter: TypeConverter) -> Self {
        self.converter = converter;
        self
    }

    pub fn with_missing_argument_handler(
        mut self,
        handler: impl FnMut(&Parameter) -> Option<String> + 'static,
    ) -> Self {
        self.missing_argument_handler = Some(Box::new(handler));
        self
    }

    pub fn with_log_sink(mut self, sink: Rc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Applies the mask, depth limit and target version of `config`.
    pub fn with_config(mut self, config: &EngineConfig) -> Self {
        self.mask = config.mask.clone();
        self.max_depth = config.max_resolution_depth;
        self.target_version = config.target_version.clone();
        self
    }

    pub fn registry(&self) -> &'r Registry {
        self.registry
    }

    pub fn converter(&self) -> &TypeConverter {
        &self.converter
    }

    /// For registering extra conversions (enumerations, domain types) after construction.
    pub fn converter_mut(&mut self) -> &mut TypeConverter {
        &mut self.converter
    }

    pub fn target_version(&self) -> Option<&Version> {
        self.target_version.as_ref()
    }

    // --- INSTANCE STORE ---

    /// Stores `value`, replacing any existing instance of `T`.
    pub fn set<T: 'static>(&mut self, value: T) -> Rc<T> {
        let value = Rc::new(value);
        self.set_object(Rc::clone(&value) as Object);
        value
    }

    /// Stores an erased object, replacing any existing instance of the same runtime type.
    pub fn set_object(&mut self, object: Object) {
        let id = runtime_type(&object);
        match self.instances.iter_mut().find(|o| runtime_type(o) == id) {
            Some(slot) => *slot = object,
            None => self.instances.push(object),
        }
    }

    /// The live instance of `T`, if any.
    pub fn get<T: 'static>(&self) -> Option<Rc<T>> {
        self.object(TypeKey::of::<T>()).and_then(downcast::<T>)
    }

    /// The live instance of `key`, if any.
    pub fn object(&self, key: TypeKey) -> Option<&Object> {
        self.instances.iter().find(|o| runtime_type(o) == key.id())
    }

    pub fn contains(&self, key: TypeKey) -> bool {
        self.object(key).is_some()
    }

    /// Removes and returns the instance of `key`.
    pub fn remove(&mut self, key: TypeKey) -> Option<Object> {
        let index = self
            .instances
            .iter()
            .position(|o| runtime_type(o) == key.id())?;
        Some(self.instances.remove(index))
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Drops every single-use object recorded since the last purge.
    ///
    /// Only the exact recorded instances are removed; if a later step replaced
    /// one of them with a new instance of the same type, the new one stays.
    pub(crate) fn purge(&mut self) {
        if self.pending_purge.is_empty() {
            return;
        }
        let pending = std::mem::take(&mut self.pending_purge);
        let before = self.instances.len();
        self.instances
            .retain(|live| !pending.iter().any(|p| Rc::ptr_eq(live, p)));
        log::debug!(
            "Purged {} single-use object(s) from the context.",
            before - self.instances.len()
        );
    }
}

impl fmt::Debug for Context<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("instances", &self.instances.len())
            .field("pending_purge", &self.pending_purge.len())
            .field("interactive", &self.missing_argument_handler.is_some())
            .field("mask", &self.mask)
            .field("max_depth", &self.max_depth)
            .field("target_version", &self.target_version)
            .finish_non_exhaustive()
    }
}
