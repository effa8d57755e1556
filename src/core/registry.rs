// src/core/registry.rs

//! # Registry
//!
//! The static catalogue of commands, factories and settings collections.
//!
//! A registry is filled once at startup from [`Declaration`]s and never changes
//! afterwards. Registration is all-or-nothing per declaration: every rule is
//! checked before anything is stored, so a rejected declaration leaves the
//! registry exactly as it was.

use crate::core::declaration::{
    CommandDef, Component, Declaration, FactoryDefKind, FactoryFlags, ParamDef, SettingDef,
    SettingMeta,
};
use crate::core::version::VersionRange;
use crate::models::{
    CollectionSetting, Command, DynamicNamesFn, Factory, FactoryKind, Parameter, SettingInfo,
    SettingsCollection, TypeKey,
};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Command name '{name}' is already taken by command '{existing}'.")]
    DuplicateCommand { name: String, existing: String },
    #[error("Type {type_name} already has a primary factory ({existing}).")]
    DuplicateFactory { type_name: String, existing: String },
    #[error("Invalid declaration for {type_name}: {reason}")]
    Configuration { type_name: String, reason: String },
    #[error("Unknown command '{name}'.")]
    UnknownCommand { name: String },
    #[error("No factory is registered for type {type_name}.")]
    NoFactory { type_name: String },
}

type RegistryResult<T> = Result<T, RegistryError>;

fn configuration(subject: TypeKey, reason: impl Into<String>) -> RegistryError {
    RegistryError::Configuration {
        type_name: subject.short_name(),
        reason: reason.into(),
    }
}

/// The catalogue of everything the engine can run or build.
#[derive(Debug, Default)]
pub struct Registry {
    commands: Vec<Command>,
    /// Lower-cased names and aliases, both pointing into `commands`.
    names: HashMap<String, usize>,
    factories: Vec<Factory>,
    primary: HashMap<TypeKey, usize>,
    alternates: HashMap<TypeKey, Vec<usize>>,
    collections: HashMap<TypeKey, SettingsCollection>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers everything `T` declares about itself.
    pub fn register_type<T: Component>(&mut self) -> RegistryResult<()> {
        self.register_declaration(Declaration::of_component::<T>())
    }

    /// Registers a set of declarations in order, stopping at the first error.
    pub fn register_namespace(
        &mut self,
        declarations: impl IntoIterator<Item = Declaration>,
    ) -> RegistryResult<()> {
        declarations
            .into_iter()
            .try_for_each(|decl| self.register_declaration(decl))
    }

    /// Validates a declaration and, if it is sound, adds it to the catalogue.
    pub fn register_declaration(&mut self, decl: Declaration) -> RegistryResult<()> {
        let subject = decl.subject();
        log::debug!(
            "Registering {} ({} commands, {} factories, {} settings)",
            subject,
            decl.commands.len(),
            decl.factories.len(),
            decl.settings.len()
        );

        let Declaration {
            commands: command_defs,
            factories: factory_defs,
            settings: setting_defs,
            dynamic_names,
            ..
        } = decl;

        let mut staged = Staged::default();

        // --- 1. Commands, and the factories they declare ---
        for def in command_defs {
            let command_index = self.commands.len() + staged.commands.len();
            let (mut command, flags) = self.build_command(subject, def, &staged)?;

            for key in std::iter::once(&command.name).chain(command.alias.as_ref()) {
                staged.names.insert(key.to_ascii_lowercase(), command_index);
            }

            if let Some(flags) = flags {
                let factory = command_factory(&command, command_index, flags);
                command.factory = Some(self.stage_factory(factory, &mut staged)?);
            }
            staged.commands.push(command);
        }

        // --- 2. Constructor and property factories ---
        for def in factory_defs {
            let (kind, label) = match def.kind {
                FactoryDefKind::Constructor {
                    dependencies,
                    build,
                } => (
                    FactoryKind::Constructor {
                        dependencies,
                        build,
                    },
                    format!("constructor of {}", def.returns),
                ),
                FactoryDefKind::Property { name, read } => {
                    let label = match def.declaring {
                        Some(declaring) => format!("property {}.{}", declaring, name),
                        None => format!("property {}", name),
                    };
                    (FactoryKind::Property { name, read }, label)
                }
            };
            let factory = Factory {
                returns: def.returns,
                declaring: def.declaring,
                kind,
                alternate: def.alternate,
                single_use: def.single_use,
                label,
            };
            self.stage_factory(factory, &mut staged)?;
        }

        // --- 3. Settings collection ---
        let collection = if setting_defs.is_empty() {
            None
        } else {
            if self.collections.contains_key(&subject) {
                return Err(configuration(subject, "settings were already declared"));
            }
            Some(build_collection(subject, setting_defs, dynamic_names)?)
        };

        // --- 4. Commit ---
        self.names.extend(staged.names);
        self.commands.extend(staged.commands);
        for factory in staged.factories {
            let index = self.factories.len();
            if factory.alternate {
                self.alternates.entry(factory.returns).or_default().push(index);
            } else {
                self.primary.insert(factory.returns, index);
            }
            self.factories.push(factory);
        }
        if let Some(collection) = collection {
            self.collections.insert(subject, collection);
        }
        Ok(())
    }

    fn build_command(
        &self,
        subject: TypeKey,
        def: CommandDef,
        staged: &Staged,
    ) -> RegistryResult<(Command, Option<FactoryFlags>)> {
        let name = def.name.ok_or_else(|| {
            configuration(
                subject,
                "a command backed by a closure needs an explicit name",
            )
        })?;
        if name.trim().is_empty() {
            return Err(configuration(subject, "command names cannot be empty"));
        }
        if def.host != subject {
            return Err(configuration(
                subject,
                format!("command '{}' runs on {}, not on {}", name, def.host, subject),
            ));
        }

        if def.alias.as_deref().is_some_and(|a| a.eq_ignore_ascii_case(&name)) {
            return Err(RegistryError::DuplicateCommand {
                name: name.clone(),
                existing: name,
            });
        }
        for key in std::iter::once(&name).chain(def.alias.as_ref()) {
            let lowered = key.to_ascii_lowercase();
            let existing = self
                .names
                .get(&lowered)
                .and_then(|&i| self.commands.get(i))
                .or_else(|| {
                    staged
                        .names
                        .get(&lowered)
                        .and_then(|&i| i.checked_sub(self.commands.len()))
                        .and_then(|i| staged.commands.get(i))
                });
            if let Some(existing) = existing {
                return Err(RegistryError::DuplicateCommand {
                    name: key.clone(),
                    existing: existing.name.clone(),
                });
            }
        }

        let versions = parse_versions(subject, &name, def.since.as_deref(), def.deprecated.as_deref())?;

        let mut seen = HashSet::new();
        let mut parameters = Vec::with_capacity(def.params.len());
        for param in def.params {
            for key in std::iter::once(&param.meta.name).chain(param.meta.alias.as_ref()) {
                if !seen.insert(key.to_ascii_lowercase()) {
                    return Err(configuration(
                        subject,
                        format!("command '{}' declares parameter key '{}' twice", name, key),
                    ));
                }
            }
            parameters.push(build_parameter(subject, param)?);
        }

        let command = Command {
            name,
            alias: def.alias,
            description: def.description,
            parameters,
            host: def.host,
            returns: def.returns,
            factory: None,
            versions,
            handler: def.handler,
        };
        Ok((command, def.factory))
    }

    /// Queues a factory, enforcing one primary factory per produced type.
    /// Returns the index the factory will have once committed.
    fn stage_factory(&self, factory: Factory, staged: &mut Staged) -> RegistryResult<usize> {
        if !factory.alternate {
            let existing = self
                .primary
                .get(&factory.returns)
                .and_then(|&i| self.factories.get(i))
                .or_else(|| {
                    staged
                        .factories
                        .iter()
                        .find(|f| !f.alternate && f.returns == factory.returns)
                });
            if let Some(existing) = existing {
                return Err(RegistryError::DuplicateFactory {
                    type_name: factory.returns.short_name(),
                    existing: existing.label().to_string(),
                });
            }
        }
        let index = self.factories.len() + staged.factories.len();
        staged.factories.push(factory);
        Ok(index)
    }

    // --- LOOKUPS ---

    /// Finds a command by name or alias, case-insensitively.
    pub fn lookup(&self, name: &str) -> RegistryResult<&Command> {
        self.names
            .get(&name.to_ascii_lowercase())
            .and_then(|&i| self.commands.get(i))
            .ok_or_else(|| RegistryError::UnknownCommand {
                name: name.to_string(),
            })
    }

    pub(crate) fn command_at(&self, index: usize) -> Option<&Command> {
        self.commands.get(index)
    }

    /// All commands, in registration order.
    pub fn commands(&self) -> impl Iterator<Item = &Command> {
        self.commands.iter()
    }

    /// All factories (primary and alternate), in registration order.
    pub fn factories(&self) -> impl Iterator<Item = &Factory> {
        self.factories.iter()
    }

    pub fn has_factory(&self, produced: TypeKey) -> bool {
        self.primary.contains_key(&produced)
    }

    /// The primary factory for `produced`.
    pub fn factory(&self, produced: TypeKey) -> RegistryResult<&Factory> {
        self.primary
            .get(&produced)
            .and_then(|&i| self.factories.get(i))
            .ok_or_else(|| RegistryError::NoFactory {
                type_name: produced.short_name(),
            })
    }

    /// The fallback factories for `produced`, in registration order.
    pub fn alternates(&self, produced: TypeKey) -> Vec<&Factory> {
        self.alternates
            .get(&produced)
            .map(|indices| indices.iter().filter_map(|&i| self.factories.get(i)).collect())
            .unwrap_or_default()
    }

    /// The settings declared on `collection`, sorted by their order key.
    pub fn settings(&self, collection: TypeKey) -> &[CollectionSetting] {
        self.collections
            .get(&collection)
            .map(|c| c.settings.as_slice())
            .unwrap_or(&[])
    }

    pub fn collection(&self, collection: TypeKey) -> Option<&SettingsCollection> {
        self.collections.get(&collection)
    }

    /// Number of registered commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Work-in-progress of a single `register_declaration` call.
#[derive(Default)]
struct Staged {
    commands: Vec<Command>,
    names: HashMap<String, usize>,
    factories: Vec<Factory>,
}

fn command_factory(command: &Command, command_index: usize, flags: FactoryFlags) -> Factory {
    Factory {
        returns: command.returns,
        declaring: Some(command.host),
        kind: FactoryKind::Command {
            command: command_index,
        },
        alternate: flags.alternate,
        single_use: flags.single_use,
        label: format!("command {}", command.name),
    }
}

fn parse_versions(
    subject: TypeKey,
    owner: &str,
    since: Option<&str>,
    deprecated: Option<&str>,
) -> RegistryResult<VersionRange> {
    VersionRange::parse(since, deprecated)
        .map_err(|e| configuration(subject, format!("'{}': {}", owner, e)))
}

fn build_info(subject: TypeKey, meta: SettingMeta) -> RegistryResult<SettingInfo> {
    let versions = parse_versions(
        subject,
        &meta.name,
        meta.since.as_deref(),
        meta.deprecated.as_deref(),
    )?;
    Ok(SettingInfo {
        name: meta.name,
        alias: meta.alias,
        description: meta.description,
        value_type: meta.value_type,
        sensitive: meta.sensitive,
        default_value: meta.default_value,
        versions,
    })
}

fn build_parameter(subject: TypeKey, def: ParamDef) -> RegistryResult<Parameter> {
    Ok(Parameter {
        info: build_info(subject, def.meta)?,
        is_collection: def.is_collection,
        has_metadata: def.has_metadata,
    })
}

fn build_collection(
    subject: TypeKey,
    defs: Vec<SettingDef>,
    dynamic_names: Option<DynamicNamesFn>,
) -> RegistryResult<SettingsCollection> {
    let mut detach = None;
    let mut settings = Vec::with_capacity(defs.len());

    for def in defs {
        if def.owner != subject {
            return Err(configuration(
                subject,
                format!("setting '{}' belongs to {}", def.meta.name, def.owner),
            ));
        }
        if def.dynamic && dynamic_names.is_none() {
            return Err(configuration(
                subject,
                format!(
                    "dynamic setting '{}' requires the type to report dynamic setting names",
                    def.meta.name
                ),
            ));
        }
        detach.get_or_insert(def.detach);
        settings.push(CollectionSetting {
            info: build_info(subject, def.meta)?,
            order: def.order,
            dynamic: def.dynamic,
            assign: def.assign,
        });
    }

    // Stable: equal order keys keep their declaration order.
    settings.sort_by_key(|s| s.order);

    let detach = detach.ok_or_else(|| configuration(subject, "empty settings collection"))?;
    Ok(SettingsCollection {
        owner: subject,
        settings,
        detach,
        dynamic_names,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::arguments::BoundArgs;
    use crate::core::declaration::{FactoryDef, ParamDef};
    use crate::models::Setting;

    #[derive(Debug, Clone, Default)]
    struct Host;
    #[derive(Debug, Clone, Default)]
    struct Widget;
    #[derive(Debug, Clone, Default)]
    struct Options {
        a: String,
        b: String,
    }

    impl Host {
        fn build(&self, _: &BoundArgs) -> anyhow::Result<Widget> {
            Ok(Widget)
        }
        fn ping(&self, _: &BoundArgs) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn host_decl() -> Declaration {
        let mut decl = Declaration::of::<Host>();
        decl.command(
            CommandDef::new(Host::build)
                .named("Build")
                .alias("b")
                .param(ParamDef::new::<String>("label"))
                .as_factory(),
        )
        .command(CommandDef::new(Host::ping));
        decl
    }

    #[test]
    fn test_register_and_lookup_commands() {
        let mut registry = Registry::new();
        registry.register_declaration(host_decl()).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.lookup("build").unwrap().name, "Build");
        assert_eq!(registry.lookup("B").unwrap().name, "Build");
        assert_eq!(registry.lookup("PING").unwrap().name, "ping");
        assert!(matches!(
            registry.lookup("nope"),
            Err(RegistryError::UnknownCommand { .. })
        ));
    }

    #[test]
    fn test_command_and_factory_are_cross_linked() {
        let mut registry = Registry::new();
        registry.register_declaration(host_decl()).unwrap();

        let command = registry.lookup("Build").unwrap();
        assert!(command.is_factory());

        let factory = registry.factory(TypeKey::of::<Widget>()).unwrap();
        assert!(factory.is_command());
        assert_eq!(factory.declaring, Some(TypeKey::of::<Host>()));
        let FactoryKind::Command { command: index } = factory.kind else {
            panic!("Expected a command factory");
        };
        assert_eq!(registry.command_at(index).unwrap().name, "Build");
    }

    #[test]
    fn test_duplicate_command_names_and_aliases_are_rejected() {
        let mut registry = Registry::new();
        registry.register_declaration(host_decl()).unwrap();

        let mut clash = Declaration::of::<Widget>();
        clash.command(
            CommandDef::new(|_: &Widget, _: &BoundArgs| Ok(())).named("BUILD"),
        );
        assert!(matches!(
            registry.register_declaration(clash),
            Err(RegistryError::DuplicateCommand { existing, .. }) if existing == "Build"
        ));

        // An alias colliding with an existing name is just as bad.
        let mut clash = Declaration::of::<Widget>();
        clash.command(
            CommandDef::new(|_: &Widget, _: &BoundArgs| Ok(()))
                .named("Other")
                .alias("Ping"),
        );
        assert!(matches!(
            registry.register_declaration(clash),
            Err(RegistryError::DuplicateCommand { .. })
        ));

        // Nothing from the rejected declarations leaked in.
        assert_eq!(registry.len(), 2);
        assert!(registry.lookup("other").is_err());
    }

    #[test]
    fn test_duplicate_primary_factory_is_rejected_but_alternates_are_not() {
        let mut registry = Registry::new();
        registry.register_declaration(host_decl()).unwrap();

        let mut decl = Declaration::of::<Widget>();
        decl.factory(FactoryDef::default_constructor::<Widget>());
        assert!(matches!(
            registry.register_declaration(decl),
            Err(RegistryError::DuplicateFactory { existing, .. }) if existing == "command Build"
        ));

        let mut decl = Declaration::of::<Widget>();
        decl.factory(FactoryDef::default_constructor::<Widget>().alternate())
            .factory(FactoryDef::property("self", |_: &Host| Some(Widget)).alternate());
        registry.register_declaration(decl).unwrap();

        let alternates = registry.alternates(TypeKey::of::<Widget>());
        assert_eq!(alternates.len(), 2);
        assert!(alternates[0].is_constructor());
        assert!(alternates[1].is_property());
        assert!(registry.alternates(TypeKey::of::<Host>()).is_empty());
    }

    #[test]
    fn test_has_factory_agrees_with_get_factory() {
        let mut registry = Registry::new();
        registry.register_declaration(host_decl()).unwrap();

        for key in [TypeKey::of::<Widget>(), TypeKey::of::<Host>(), TypeKey::of::<String>()] {
            assert_eq!(registry.has_factory(key), registry.factory(key).is_ok());
        }
    }

    #[test]
    fn test_configuration_errors() {
        let mut registry = Registry::new();

        // Closure without a name.
        let mut decl = Declaration::of::<Host>();
        decl.command(CommandDef::new(|_: &Host, _: &BoundArgs| Ok(())));
        assert!(matches!(
            registry.register_declaration(decl),
            Err(RegistryError::Configuration { .. })
        ));

        // Command declared on the wrong type.
        let mut decl = Declaration::of::<Widget>();
        decl.command(CommandDef::new(Host::ping));
        assert!(matches!(
            registry.register_declaration(decl),
            Err(RegistryError::Configuration { .. })
        ));

        // Malformed version.
        let mut decl = Declaration::of::<Host>();
        decl.command(CommandDef::new(Host::ping).since("one"));
        assert!(matches!(
            registry.register_declaration(decl),
            Err(RegistryError::Configuration { .. })
        ));

        // Same parameter key twice.
        let mut decl = Declaration::of::<Host>();
        decl.command(
            CommandDef::new(Host::ping)
                .param(ParamDef::new::<String>("x"))
                .param(ParamDef::new::<String>("y").alias("X")),
        );
        assert!(matches!(
            registry.register_declaration(decl),
            Err(RegistryError::Configuration { .. })
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_settings_are_sorted_by_order_key() {
        let mut registry = Registry::new();
        let mut decl = Declaration::of::<Options>();
        decl.setting(SettingDef::new("b", |o: &mut Options, v: String| o.b = v).order(2))
            .setting(SettingDef::new("a", |o: &mut Options, v: String| o.a = v).order(1))
            .setting(SettingDef::new("c", |_: &mut Options, _: String| {}).order(2));
        registry.register_declaration(decl).unwrap();

        let names: Vec<_> = registry
            .settings(TypeKey::of::<Options>())
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert!(registry.settings(TypeKey::of::<Host>()).is_empty());
    }

    #[test]
    fn test_dynamic_settings_need_the_dynamic_name_capability() {
        let mut registry = Registry::new();
        let mut decl = Declaration::of::<Options>();
        decl.setting(SettingDef::dynamic("extra", |_: &mut Options, _: &str, _: String| {}));
        assert!(matches!(
            registry.register_declaration(decl),
            Err(RegistryError::Configuration { .. })
        ));

        let mut decl = Declaration::of::<Options>();
        decl.setting(SettingDef::dynamic("extra", |_: &mut Options, _: &str, _: String| {}))
            .dynamic_names(|_: &Options| vec!["x".to_string()]);
        registry.register_declaration(decl).unwrap();
        assert!(
            registry
                .collection(TypeKey::of::<Options>())
                .unwrap()
                .has_dynamic_names()
        );
    }

    #[test]
    fn test_settings_can_only_be_declared_once_per_type() {
        let mut registry = Registry::new();
        let mut decl = Declaration::of::<Options>();
        decl.setting(SettingDef::new("a", |o: &mut Options, v: String| o.a = v));
        registry.register_declaration(decl).unwrap();

        let mut again = Declaration::of::<Options>();
        again.setting(SettingDef::new("b", |o: &mut Options, v: String| o.b = v));
        let err = registry.register_declaration(again).unwrap_err();
        assert!(matches!(
            &err,
            RegistryError::Configuration { reason, .. } if reason == "settings were already declared"
        ));

        let names: Vec<_> = registry
            .settings(TypeKey::of::<Options>())
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(names, vec!["a"]);
    }

    #[test]
    fn test_setting_owner_must_be_the_declared_type() {
        let mut registry = Registry::new();
        let mut decl = Declaration::of::<Host>();
        decl.setting(SettingDef::new("a", |o: &mut Options, v: String| o.a = v));
        assert!(matches!(
            registry.register_declaration(decl),
            Err(RegistryError::Configuration { .. })
        ));
    }
}
