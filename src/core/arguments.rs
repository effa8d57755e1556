// src/core/arguments.rs

use crate::models::{Object, TypeKey, downcast, runtime_type};
use anyhow::{Result, anyhow};
use std::any::TypeId;
use std::rc::Rc;

/// A raw argument value handed to the engine: either text that still has to be
/// converted to the parameter's type, or a value that is already typed.
#[derive(Debug, Clone)]
pub enum ArgValue {
    Text(String),
    Object(Object),
}

impl ArgValue {
    /// Wraps an already-typed value.
    pub fn object<T: 'static>(value: T) -> Self {
        Self::Object(Rc::new(value))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Object(_) => None,
        }
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// The flat set of named arguments for one invocation.
///
/// Keys keep their insertion order and are compared ASCII-case-insensitively.
/// Inserting a key that already exists (in any case) replaces its value in place.
#[derive(Debug, Clone, Default)]
pub struct ArgMap {
    entries: Vec<(String, ArgValue)>,
}

impl ArgMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ArgValue>) {
        let key = key.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(&key))
        {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&ArgValue> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    }

    /// Looks up `name` first, then `alias`. Returns the key that matched as well.
    pub fn lookup(&self, name: &str, alias: Option<&str>) -> Option<(&str, &ArgValue)> {
        let by_key = |key: &str| {
            self.entries
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(k, v)| (k.as_str(), v))
        };
        by_key(name).or_else(|| alias.and_then(by_key))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArgValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<ArgValue>> FromIterator<(K, V)> for ArgMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

/// The converted, ordered argument list handed to a command body.
#[derive(Debug, Default)]
pub struct BoundArgs {
    values: Vec<(String, Object)>,
}

impl BoundArgs {
    pub(crate) fn push(&mut self, name: &str, value: Object) {
        self.values.push((name.to_string(), value));
    }

    fn find(&self, name: &str) -> Option<&Object> {
        self.values
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    /// The shared instance bound to `name`.
    pub fn object<T: 'static>(&self, name: &str) -> Result<Rc<T>> {
        let value = self
            .find(name)
            .ok_or_else(|| anyhow!("Argument '{}' was not bound.", name))?;
        downcast::<T>(value).ok_or_else(|| {
            anyhow!(
                "Argument '{}' is not a {}.",
                name,
                TypeKey::of::<T>().short_name()
            )
        })
    }

    /// A copy of the value bound to `name`.
    pub fn get<T: Clone + 'static>(&self, name: &str) -> Result<T> {
        self.object::<T>(name).map(|rc| (*rc).clone())
    }

    /// Like [`get`](Self::get), but `None` for unbound arguments or type mismatches.
    pub fn opt<T: Clone + 'static>(&self, name: &str) -> Option<T> {
        self.get(name).ok()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// The live objects handed to a constructor factory, one per declared dependency.
#[derive(Debug, Clone, Copy)]
pub struct Dependencies<'a> {
    objects: &'a [Object],
}

impl<'a> Dependencies<'a> {
    pub(crate) fn new(objects: &'a [Object]) -> Self {
        Self { objects }
    }

    /// The dependency of type `T`.
    pub fn get<T: 'static>(&self) -> Result<Rc<T>> {
        self.objects
            .iter()
            .find(|o| runtime_type(o) == TypeId::of::<T>())
            .and_then(downcast::<T>)
            .ok_or_else(|| {
                anyhow!(
                    "Dependency {} was not declared for this constructor.",
                    TypeKey::of::<T>().short_name()
                )
            })
    }
}
