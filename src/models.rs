// src/models.rs

//! The validated metadata held by a [`Registry`](crate::core::registry::Registry):
//! commands, their parameters, settings-collection members and factories.
//!
//! Nothing in here is built by hand. Declarations (see `core::declaration`) are
//! checked by the registry and turned into these structures exactly once, at
//! startup, and are read-only from then on.

use crate::core::arguments::{BoundArgs, Dependencies};
use crate::core::version::VersionRange;
use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// An erased, shared instance living in a [`Context`](crate::core::context::Context).
pub type Object = Rc<dyn Any>;

pub(crate) type HandlerFn = Box<dyn Fn(&Object, &BoundArgs) -> anyhow::Result<Option<Object>>>;
pub(crate) type ConstructFn = Box<dyn Fn(&Dependencies<'_>) -> anyhow::Result<Object>>;
pub(crate) type PropertyFn = Box<dyn Fn(&Object) -> Option<Object>>;
/// Writes one value into a detached settings collection. Returns `false` when
/// either the collection or the value has an unexpected runtime type.
pub(crate) type SetterFn = Box<dyn Fn(&mut dyn Any, &str, Object) -> bool>;
pub(crate) type DetachFn = fn(&Object) -> Option<Box<dyn Any>>;
pub(crate) type DynamicNamesFn = Box<dyn Fn(&dyn Any) -> Vec<String>>;

/// Downcasts an erased object back to its concrete type.
pub fn downcast<T: 'static>(object: &Object) -> Option<Rc<T>> {
    Rc::clone(object).downcast::<T>().ok()
}

/// Returns the `TypeId` of the value behind an erased object.
pub(crate) fn runtime_type(object: &Object) -> TypeId {
    Any::type_id(&**object)
}

// --- TYPE TOKENS ---

/// A stable identifier for a Rust type.
///
/// Equality and hashing only look at the `TypeId`; the name is kept for
/// diagnostics and help output.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// The token for `T`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// The underlying `TypeId`.
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// The fully qualified type name, as reported by the compiler.
    pub fn full_name(&self) -> &'static str {
        self.name
    }

    /// The type name without its module path, generics included
    /// (`alloc::vec::Vec<alloc::string::String>` becomes `Vec<String>`).
    pub fn short_name(&self) -> String {
        let mut out = String::with_capacity(self.name.len());
        let mut segment = String::new();
        for ch in self.name.chars() {
            match ch {
                ':' => segment.clear(),
                '<' | '>' | ',' | ' ' | '[' | ']' | ';' | '&' | '(' | ')' => {
                    out.push_str(&segment);
                    segment.clear();
                    out.push(ch);
                }
                _ => segment.push(ch),
            }
        }
        out.push_str(&segment);
        out
    }

    /// True if this token identifies `T`.
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short_name())
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeKey({})", self.name)
    }
}

// --- SETTINGS ---

/// The descriptive part shared by every kind of setting.
#[derive(Debug, Clone)]
pub struct SettingInfo {
    pub name: String,
    pub alias: Option<String>,
    pub description: Option<String>,
    pub value_type: TypeKey,
    pub sensitive: bool,
    pub default_value: Option<String>,
    pub versions: VersionRange,
}

/// A named, described, optionally aliased and optionally defaulted value
/// descriptor. Implemented by command parameters and by the members of a
/// settings collection.
pub trait Setting {
    /// The descriptive metadata.
    fn info(&self) -> &SettingInfo;

    fn name(&self) -> &str {
        &self.info().name
    }

    fn alias(&self) -> Option<&str> {
        self.info().alias.as_deref()
    }

    fn description(&self) -> Option<&str> {
        self.info().description.as_deref()
    }

    fn value_type(&self) -> TypeKey {
        self.info().value_type
    }

    fn is_sensitive(&self) -> bool {
        self.info().sensitive
    }

    fn default_value(&self) -> Option<&str> {
        self.info().default_value.as_deref()
    }

    fn versions(&self) -> &VersionRange {
        &self.info().versions
    }
}

/// One parameter of a [`Command`].
#[derive(Debug, Clone)]
pub struct Parameter {
    pub info: SettingInfo,
    /// The parameter type aggregates many settings instead of being a single value.
    pub is_collection: bool,
    /// False for parameters that are resolved purely by type (injection).
    pub has_metadata: bool,
}

impl Setting for Parameter {
    fn info(&self) -> &SettingInfo {
        &self.info
    }
}

/// A member of a settings collection.
pub struct CollectionSetting {
    pub info: SettingInfo,
    pub order: i32,
    /// Stands for every name the collection reports at runtime.
    pub dynamic: bool,
    pub(crate) assign: SetterFn,
}

impl Setting for CollectionSetting {
    fn info(&self) -> &SettingInfo {
        &self.info
    }
}

impl fmt::Debug for CollectionSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionSetting")
            .field("info", &self.info)
            .field("order", &self.order)
            .field("dynamic", &self.dynamic)
            .finish_non_exhaustive()
    }
}

/// All settings declared on one settings-collection type, sorted by order key.
pub struct SettingsCollection {
    pub owner: TypeKey,
    pub settings: Vec<CollectionSetting>,
    pub(crate) detach: DetachFn,
    pub(crate) dynamic_names: Option<DynamicNamesFn>,
}

impl SettingsCollection {
    /// True if the collection type can report setting names at runtime.
    pub fn has_dynamic_names(&self) -> bool {
        self.dynamic_names.is_some()
    }

    /// The names reported by a live instance, or nothing if the type has no
    /// dynamic-name capability.
    pub fn dynamic_names_of(&self, instance: &Object) -> Vec<String> {
        match &self.dynamic_names {
            Some(names) => names(&**instance),
            None => Vec::new(),
        }
    }
}

impl fmt::Debug for SettingsCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingsCollection")
            .field("owner", &self.owner)
            .field("settings", &self.settings)
            .field("dynamic_names", &self.dynamic_names.is_some())
            .finish_non_exhaustive()
    }
}

// --- COMMANDS ---

/// A named, invocable operation bound to a host type.
pub struct Command {
    pub name: String,
    pub alias: Option<String>,
    pub description: Option<String>,
    pub parameters: Vec<Parameter>,
    /// The type whose instance the operation runs on.
    pub host: TypeKey,
    pub returns: TypeKey,
    /// Index of the linked factory when the result is itself a producible type.
    pub(crate) factory: Option<usize>,
    pub versions: VersionRange,
    pub(crate) handler: HandlerFn,
}

impl Command {
    /// True if the command's result is registered as a factory product.
    pub fn is_factory(&self) -> bool {
        self.factory.is_some()
    }

    /// Finds a parameter by name or alias, case-insensitively.
    pub fn parameter(&self, key: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| {
            p.name().eq_ignore_ascii_case(key)
                || p.alias().is_some_and(|a| a.eq_ignore_ascii_case(key))
        })
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("alias", &self.alias)
            .field("host", &self.host)
            .field("returns", &self.returns)
            .field("parameters", &self.parameters)
            .field("factory", &self.factory)
            .finish_non_exhaustive()
    }
}

// --- FACTORIES ---

/// How a factory produces its instance.
pub enum FactoryKind {
    /// Builds the instance from other objects already in the context.
    Constructor {
        dependencies: Vec<TypeKey>,
        build: ConstructFn,
    },
    /// Reads the instance off a live object of the declaring type.
    Property { name: String, read: PropertyFn },
    /// Runs a registered command whose result is the instance.
    Command { command: usize },
}

/// A registered way to obtain an instance of [`Factory::returns`].
pub struct Factory {
    pub returns: TypeKey,
    /// Required live type for property and command factories.
    pub declaring: Option<TypeKey>,
    pub kind: FactoryKind,
    pub alternate: bool,
    pub single_use: bool,
    pub(crate) label: String,
}

impl Factory {
    pub fn is_constructor(&self) -> bool {
        matches!(self.kind, FactoryKind::Constructor { .. })
    }

    pub fn is_property(&self) -> bool {
        matches!(self.kind, FactoryKind::Property { .. })
    }

    pub fn is_command(&self) -> bool {
        matches!(self.kind, FactoryKind::Command { .. })
    }

    /// A human-readable description, e.g. `command Login` or `property Session.profile`.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The types that must be live before this factory can run.
    pub fn prerequisites(&self) -> Vec<TypeKey> {
        match &self.kind {
            FactoryKind::Constructor { dependencies, .. } => dependencies.clone(),
            FactoryKind::Property { .. } | FactoryKind::Command { .. } => {
                self.declaring.into_iter().collect()
            }
        }
    }
}

impl fmt::Debug for Factory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factory")
            .field("label", &self.label)
            .field("returns", &self.returns)
            .field("declaring", &self.declaring)
            .field("alternate", &self.alternate)
            .field("single_use", &self.single_use)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Session;

    #[test]
    fn test_type_key_short_name_strips_paths() {
        assert_eq!(TypeKey::of::<String>().short_name(), "String");
        assert_eq!(TypeKey::of::<Vec<String>>().short_name(), "Vec<String>");
        assert_eq!(TypeKey::of::<Session>().to_string(), "Session");
    }

    #[test]
    fn test_type_key_equality_ignores_name() {
        assert_eq!(TypeKey::of::<u32>(), TypeKey::of::<u32>());
        assert_ne!(TypeKey::of::<u32>(), TypeKey::of::<i32>());
        assert!(TypeKey::of::<Session>().is::<Session>());
    }

    #[test]
    fn test_downcast_and_runtime_type() {
        let object: Object = Rc::new(42_u16);
        assert_eq!(runtime_type(&object), TypeId::of::<u16>());
        assert_eq!(downcast::<u16>(&object).as_deref(), Some(&42));
        assert!(downcast::<u32>(&object).is_none());
    }
}
