// src/core/declaration.rs

//! # Declarations
//!
//! The registration side of the engine. A type describes what it offers (the
//! commands it hosts, the factories that produce instances, the settings it
//! aggregates) by filling a [`Declaration`]; the
//! [`Registry`](crate::core::registry::Registry) validates declarations and
//! turns them into the read-only metadata in [`crate::models`].
//!
//! ```ignore
//! impl Component for Session {
//!     fn declare(decl: &mut Declaration) {
//!         decl.command(
//!             CommandDef::new(Session::open)
//!                 .named("Open")
//!                 .param(ParamDef::new::<String>("app").alias("a"))
//!                 .as_factory(),
//!         );
//!     }
//! }
//! ```

use crate::core::arguments::{BoundArgs, Dependencies};
use crate::models::{
    ConstructFn, DetachFn, DynamicNamesFn, HandlerFn, Object, PropertyFn, SetterFn, TypeKey,
    downcast,
};
use anyhow::anyhow;
use std::any::{Any, TypeId};
use std::fmt;
use std::rc::Rc;

/// A type that declares its own commands, factories and settings.
pub trait Component: 'static {
    fn declare(decl: &mut Declaration);
}

/// Everything one type contributes to a registry.
pub struct Declaration {
    subject: TypeKey,
    pub(crate) commands: Vec<CommandDef>,
    pub(crate) factories: Vec<FactoryDef>,
    pub(crate) settings: Vec<SettingDef>,
    pub(crate) dynamic_names: Option<DynamicNamesFn>,
}

impl Declaration {
    /// An empty declaration for `T`.
    pub fn of<T: 'static>() -> Self {
        Self {
            subject: TypeKey::of::<T>(),
            commands: Vec::new(),
            factories: Vec::new(),
            settings: Vec::new(),
            dynamic_names: None,
        }
    }

    /// The declaration a [`Component`] makes about itself.
    pub fn of_component<T: Component>() -> Self {
        let mut decl = Self::of::<T>();
        T::declare(&mut decl);
        decl
    }

    pub fn subject(&self) -> TypeKey {
        self.subject
    }

    pub fn command(&mut self, def: CommandDef) -> &mut Self {
        self.commands.push(def);
        self
    }

    pub fn factory(&mut self, def: FactoryDef) -> &mut Self {
        self.factories.push(def);
        self
    }

    pub fn setting(&mut self, def: SettingDef) -> &mut Self {
        self.settings.push(def);
        self
    }

    /// Gives the subject the dynamic-setting-name capability: `names` reports,
    /// for a live instance, the setting names only known at runtime.
    pub fn dynamic_names<C: 'static>(
        &mut self,
        names: impl Fn(&C) -> Vec<String> + 'static,
    ) -> &mut Self {
        self.dynamic_names = Some(Box::new(move |any: &dyn Any| {
            any.downcast_ref::<C>().map(&names).unwrap_or_default()
        }));
        self
    }
}

impl fmt::Debug for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Declaration")
            .field("subject", &self.subject)
            .field("commands", &self.commands)
            .field("factories", &self.factories)
            .field("settings", &self.settings)
            .field("dynamic_names", &self.dynamic_names.is_some())
            .finish()
    }
}

// --- SETTING METADATA ---

/// Descriptive metadata shared by parameters and collection settings.
#[derive(Debug, Clone)]
pub(crate) struct SettingMeta {
    pub(crate) name: String,
    pub(crate) value_type: TypeKey,
    pub(crate) alias: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) sensitive: bool,
    pub(crate) default_value: Option<String>,
    pub(crate) since: Option<String>,
    pub(crate) deprecated: Option<String>,
}

impl SettingMeta {
    fn new(name: impl Into<String>, value_type: TypeKey) -> Self {
        Self {
            name: name.into(),
            value_type,
            alias: None,
            description: None,
            sensitive: false,
            default_value: None,
            since: None,
            deprecated: None,
        }
    }
}

macro_rules! setting_builders {
    () => {
        pub fn alias(mut self, alias: impl Into<String>) -> Self {
            self.meta.alias = Some(alias.into());
            self
        }

        pub fn describe(mut self, description: impl Into<String>) -> Self {
            self.meta.description = Some(description.into());
            self
        }

        /// Values are masked in logs and read without echo when prompted.
        pub fn sensitive(mut self) -> Self {
            self.meta.sensitive = true;
            self
        }

        /// A textual default, converted like any other argument.
        pub fn default_value(mut self, value: impl Into<String>) -> Self {
            self.meta.default_value = Some(value.into());
            self
        }

        pub fn since(mut self, version: impl Into<String>) -> Self {
            self.meta.since = Some(version.into());
            self
        }

        pub fn deprecated(mut self, version: impl Into<String>) -> Self {
            self.meta.deprecated = Some(version.into());
            self
        }
    };
}

/// One parameter of a [`CommandDef`].
#[derive(Debug, Clone)]
pub struct ParamDef {
    pub(crate) meta: SettingMeta,
    pub(crate) is_collection: bool,
    pub(crate) has_metadata: bool,
}

impl ParamDef {
    /// A named parameter of type `T`.
    pub fn new<T: 'static>(name: impl Into<String>) -> Self {
        Self {
            meta: SettingMeta::new(name, TypeKey::of::<T>()),
            is_collection: false,
            has_metadata: true,
        }
    }

    /// A parameter whose type is a settings collection; its value is assembled
    /// from the individual settings declared on `C`.
    pub fn collection<C: 'static>(name: impl Into<String>) -> Self {
        Self {
            is_collection: true,
            ..Self::new::<C>(name)
        }
    }

    /// A parameter resolved purely by type, from the context or a factory.
    pub fn inject<T: 'static>() -> Self {
        let key = TypeKey::of::<T>();
        Self {
            meta: SettingMeta::new(key.short_name(), key),
            is_collection: false,
            has_metadata: false,
        }
    }

    setting_builders!();
}

/// One member of a settings collection.
pub struct SettingDef {
    pub(crate) meta: SettingMeta,
    pub(crate) owner: TypeKey,
    pub(crate) order: i32,
    pub(crate) dynamic: bool,
    pub(crate) assign: SetterFn,
    pub(crate) detach: DetachFn,
}

impl SettingDef {
    /// A setting of type `V` on collection `C`, written with `set`.
    pub fn new<C, V>(name: impl Into<String>, set: impl Fn(&mut C, V) + 'static) -> Self
    where
        C: Clone + 'static,
        V: Clone + 'static,
    {
        Self::build::<C, V>(name.into(), false, move |c, _, v| set(c, v))
    }

    /// A setting standing for every name the collection reports at runtime
    /// (see [`Declaration::dynamic_names`]). `set` receives the matched name.
    pub fn dynamic<C, V>(
        name: impl Into<String>,
        set: impl Fn(&mut C, &str, V) + 'static,
    ) -> Self
    where
        C: Clone + 'static,
        V: Clone + 'static,
    {
        Self::build::<C, V>(name.into(), true, set)
    }

    fn build<C, V>(name: String, dynamic: bool, set: impl Fn(&mut C, &str, V) + 'static) -> Self
    where
        C: Clone + 'static,
        V: Clone + 'static,
    {
        let assign: SetterFn = Box::new(move |target: &mut dyn Any, key: &str, value: Object| {
            let (Some(collection), Some(value)) = (target.downcast_mut::<C>(), downcast::<V>(&value))
            else {
                return false;
            };
            set(collection, key, Rc::unwrap_or_clone(value));
            true
        });
        Self {
            meta: SettingMeta::new(name, TypeKey::of::<V>()),
            owner: TypeKey::of::<C>(),
            order: 0,
            dynamic,
            assign,
            detach: detach_as::<C>,
        }
    }

    /// Position among the collection's settings (declaration order is not kept).
    pub fn order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    setting_builders!();
}

impl fmt::Debug for SettingDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingDef")
            .field("meta", &self.meta)
            .field("owner", &self.owner)
            .field("order", &self.order)
            .field("dynamic", &self.dynamic)
            .finish_non_exhaustive()
    }
}

/// Clones a live collection so its settings can be written without touching
/// instances other owners still hold.
fn detach_as<C: Clone + 'static>(object: &Object) -> Option<Box<dyn Any>> {
    downcast::<C>(object).map(|c| Box::new((*c).clone()) as Box<dyn Any>)
}

// --- COMMANDS ---

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct FactoryFlags {
    pub(crate) alternate: bool,
    pub(crate) single_use: bool,
}

/// A command: a named operation on an instance of its host type.
pub struct CommandDef {
    pub(crate) name: Option<String>,
    pub(crate) alias: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) params: Vec<ParamDef>,
    pub(crate) host: TypeKey,
    pub(crate) returns: TypeKey,
    pub(crate) since: Option<String>,
    pub(crate) deprecated: Option<String>,
    pub(crate) factory: Option<FactoryFlags>,
    pub(crate) handler: HandlerFn,
}

impl CommandDef {
    /// A command running `handler` on the live `T`. Returning `()` means the
    /// command produces nothing.
    ///
    /// The name defaults to the handler function's identifier; closures have
    /// none and must be given one with [`named`](Self::named).
    pub fn new<T, R, F>(handler: F) -> Self
    where
        T: 'static,
        R: 'static,
        F: Fn(&T, &BoundArgs) -> anyhow::Result<R> + 'static,
    {
        let erased: HandlerFn = Box::new(move |object, args| {
            let host = host_of::<T>(object)?;
            let result = handler(&host, args)?;
            Ok(erase_result(result))
        });
        Self::with_handler::<T, R, F>(erased)
    }

    /// Like [`new`](Self::new), for operations that may produce nothing.
    pub fn new_optional<T, R, F>(handler: F) -> Self
    where
        T: 'static,
        R: 'static,
        F: Fn(&T, &BoundArgs) -> anyhow::Result<Option<R>> + 'static,
    {
        let erased: HandlerFn = Box::new(move |object, args| {
            let host = host_of::<T>(object)?;
            Ok(handler(&host, args)?.map(|r| Rc::new(r) as Object))
        });
        Self::with_handler::<T, R, F>(erased)
    }

    fn with_handler<T: 'static, R: 'static, F>(handler: HandlerFn) -> Self {
        Self {
            name: derive_name(std::any::type_name::<F>()),
            alias: None,
            description: None,
            params: Vec::new(),
            host: TypeKey::of::<T>(),
            returns: TypeKey::of::<R>(),
            since: None,
            deprecated: None,
            factory: None,
            handler,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn param(mut self, param: ParamDef) -> Self {
        self.params.push(param);
        self
    }

    pub fn since(mut self, version: impl Into<String>) -> Self {
        self.since = Some(version.into());
        self
    }

    pub fn deprecated(mut self, version: impl Into<String>) -> Self {
        self.deprecated = Some(version.into());
        self
    }

    /// Registers the command as the primary factory of its return type.
    pub fn as_factory(mut self) -> Self {
        self.factory.get_or_insert_with(FactoryFlags::default);
        self
    }

    /// Registers the command as a fallback factory of its return type.
    pub fn as_alternate_factory(mut self) -> Self {
        self.factory.get_or_insert_with(FactoryFlags::default).alternate = true;
        self
    }

    /// Objects this command builds while satisfying another command are
    /// purged once that invocation completes. Implies [`as_factory`](Self::as_factory).
    pub fn single_use(mut self) -> Self {
        self.factory.get_or_insert_with(FactoryFlags::default).single_use = true;
        self
    }
}

impl fmt::Debug for CommandDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDef")
            .field("name", &self.name)
            .field("alias", &self.alias)
            .field("host", &self.host)
            .field("returns", &self.returns)
            .field("params", &self.params)
            .field("factory", &self.factory)
            .finish_non_exhaustive()
    }
}

fn host_of<T: 'static>(object: &Object) -> anyhow::Result<Rc<T>> {
    downcast::<T>(object)
        .ok_or_else(|| anyhow!("Host object is not a {}.", TypeKey::of::<T>().short_name()))
}

fn erase_result<R: 'static>(result: R) -> Option<Object> {
    if TypeId::of::<R>() == TypeId::of::<()>() {
        None
    } else {
        Some(Rc::new(result))
    }
}

/// `my_crate::module::Session::open` -> `open`; closures have no usable name.
fn derive_name(type_name: &str) -> Option<String> {
    let last = type_name.rsplit("::").next()?;
    if last.is_empty() || last.contains(['{', '}', '<', '>', ' ']) {
        return None;
    }
    Some(last.to_string())
}

// --- FACTORIES ---

pub(crate) enum FactoryDefKind {
    Constructor {
        dependencies: Vec<TypeKey>,
        build: ConstructFn,
    },
    Property {
        name: String,
        read: PropertyFn,
    },
}

/// A constructor or property factory. Command factories are declared on the
/// command itself (see [`CommandDef::as_factory`]).
pub struct FactoryDef {
    pub(crate) returns: TypeKey,
    pub(crate) declaring: Option<TypeKey>,
    pub(crate) kind: FactoryDefKind,
    pub(crate) alternate: bool,
    pub(crate) single_use: bool,
}

impl FactoryDef {
    /// Builds a `T` from the listed live objects.
    pub fn constructor<T: 'static>(
        dependencies: Vec<TypeKey>,
        build: impl Fn(&Dependencies<'_>) -> anyhow::Result<T> + 'static,
    ) -> Self {
        let build: ConstructFn = Box::new(move |deps| Ok(Rc::new(build(deps)?) as Object));
        Self {
            returns: TypeKey::of::<T>(),
            declaring: None,
            kind: FactoryDefKind::Constructor {
                dependencies,
                build,
            },
            alternate: false,
            single_use: false,
        }
    }

    /// Builds a `T` out of nothing, with `T::default()`.
    pub fn default_constructor<T: Default + 'static>() -> Self {
        Self::constructor::<T>(Vec::new(), |_| Ok(T::default()))
    }

    /// Reads a `P` off the live `D`. `None` counts as "nothing produced".
    pub fn property<D: 'static, P: 'static>(
        name: impl Into<String>,
        read: impl Fn(&D) -> Option<P> + 'static,
    ) -> Self {
        let read: PropertyFn = Box::new(move |object| {
            downcast::<D>(object)
                .and_then(|d| read(&d))
                .map(|p| Rc::new(p) as Object)
        });
        Self {
            returns: TypeKey::of::<P>(),
            declaring: Some(TypeKey::of::<D>()),
            kind: FactoryDefKind::Property {
                name: name.into(),
                read,
            },
            alternate: false,
            single_use: false,
        }
    }

    pub fn alternate(mut self) -> Self {
        self.alternate = true;
        self
    }

    pub fn single_use(mut self) -> Self {
        self.single_use = true;
        self
    }
}

impl fmt::Debug for FactoryDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            FactoryDefKind::Constructor { dependencies, .. } => {
                format!("constructor{:?}", dependencies)
            }
            FactoryDefKind::Property { name, .. } => format!("property {}", name),
        };
        f.debug_struct("FactoryDef")
            .field("returns", &self.returns)
            .field("kind", &kind)
            .field("alternate", &self.alternate)
            .field("single_use", &self.single_use)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Probe {
        label: String,
    }

    impl Probe {
        fn rename(&self, args: &BoundArgs) -> anyhow::Result<Probe> {
            Ok(Probe {
                label: args.get::<String>("label")?,
            })
        }
    }

    #[test]
    fn test_command_name_is_derived_from_function() {
        let def = CommandDef::new(Probe::rename);
        assert_eq!(def.name.as_deref(), Some("rename"));
        assert!(def.host.is::<Probe>());
        assert!(def.returns.is::<Probe>());
    }

    #[test]
    fn test_closure_commands_have_no_derived_name() {
        let def = CommandDef::new(|_: &Probe, _: &BoundArgs| Ok(()));
        assert!(def.name.is_none());
        assert_eq!(def.named("Noop").name.as_deref(), Some("Noop"));
    }

    #[test]
    fn test_unit_results_are_erased_to_nothing() {
        assert!(erase_result(()).is_none());
        assert!(erase_result(5_u8).is_some());
    }

    #[test]
    fn test_factory_flags_accumulate() {
        let def = CommandDef::new(Probe::rename).single_use();
        let flags = def.factory.unwrap();
        assert!(flags.single_use);
        assert!(!flags.alternate);

        let def = CommandDef::new(Probe::rename).as_alternate_factory();
        assert!(def.factory.unwrap().alternate);
    }

    #[test]
    fn test_setting_assign_writes_into_detached_copy() {
        let def = SettingDef::new("label", |p: &mut Probe, v: String| p.label = v);
        let original: Object = Rc::new(Probe::default());

        let mut detached = (def.detach)(&original).unwrap();
        assert!((def.assign)(detached.as_mut(), "label", Rc::new("x".to_string())));
        // Wrong value type is refused.
        assert!(!(def.assign)(detached.as_mut(), "label", Rc::new(1_u8)));

        let probe = detached.downcast::<Probe>().unwrap();
        assert_eq!(probe.label, "x");
        assert_eq!(downcast::<Probe>(&original).unwrap().label, "");
    }

    #[test]
    fn test_property_factory_reads_declaring_instance() {
        let def = FactoryDef::property("label", |p: &Probe| Some(p.label.clone()));
        assert!(def.returns.is::<String>());
        assert_eq!(def.declaring, Some(TypeKey::of::<Probe>()));

        let FactoryDefKind::Property { read, .. } = &def.kind else {
            panic!("Expected a property factory");
        };
        let probe: Object = Rc::new(Probe {
            label: "p".to_string(),
        });
        let value = read(&probe).unwrap();
        assert_eq!(downcast::<String>(&value).as_deref().map(String::as_str), Some("p"));
        assert!(read(&(Rc::new(0_u8) as Object)).is_none());
    }
}
