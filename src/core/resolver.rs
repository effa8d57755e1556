// src/core/resolver.rs

//! # Resolution Engine
//!
//! Turns `(command name, arguments)` into a finished command call:
//!
//! 1. `find_path` works out which factories must run, prerequisites first,
//!    to obtain the command's host from what the context already holds.
//! 2. `instantiate` runs each of those steps, falling back to alternate
//!    factories and the missing-argument handler for command factories.
//! 3. `invoke_command` binds every parameter, logs the call and runs it.
//! 4. Single-use objects produced along the way are purged.

use crate::core::arguments::{ArgMap, ArgValue, BoundArgs, Dependencies};
use crate::core::context::{Context, DispatchError, DispatchResult};
use crate::core::converter::ConversionError;
use crate::core::logging::render_value;
use crate::core::version::VersionRange;
use crate::models::{
    CollectionSetting, Command, Factory, FactoryKind, Object, Parameter, Setting, TypeKey,
    downcast, runtime_type,
};
use log::Level;
use std::rc::Rc;

fn resolution(target: TypeKey, command: &str, reason: impl Into<String>) -> DispatchError {
    DispatchError::ContextResolution {
        type_name: target.short_name(),
        command: command.to_string(),
        reason: reason.into(),
    }
}

impl<'r> Context<'r> {
    // --- 1. ENTRY POINT ---

    /// Resolves and runs the command called `name` (or aliased `name`).
    ///
    /// Returns the command's result, or `None` for commands that produce nothing.
    /// Single-use objects created on the way are purged whether or not the
    /// call succeeded.
    pub fn invoke(&mut self, name: &str, args: ArgMap) -> DispatchResult<Option<Object>> {
        let registry = self.registry;
        let command = registry
            .lookup(name)
            .map_err(|_| DispatchError::UnknownCommand {
                name: name.to_string(),
            })?;
        self.ensure_applicable(command)?;

        let mut args = args;
        let result = self.resolve_and_run(command, &mut args);
        self.purge();
        result
    }

    /// Typed convenience over [`invoke`](Self::invoke).
    pub fn invoke_as<T: 'static>(
        &mut self,
        name: &str,
        args: ArgMap,
    ) -> DispatchResult<Option<Rc<T>>> {
        match self.invoke(name, args)? {
            None => Ok(None),
            Some(object) => downcast::<T>(&object).map(Some).ok_or_else(|| {
                DispatchError::Conversion(ConversionError::TypeMismatch {
                    expected: TypeKey::of::<T>().short_name(),
                    found: "a different type".to_string(),
                })
            }),
        }
    }

    fn resolve_and_run(
        &mut self,
        command: &'r Command,
        args: &mut ArgMap,
    ) -> DispatchResult<Option<Object>> {
        for step in self.find_path(command.host, &command.name)? {
            self.instantiate_for(step, args, &command.name)?;
        }
        self.invoke_command(command, args)
    }

    // --- 2. FIND PATH ---

    /// The factory steps needed to obtain `target`, dependency-first.
    ///
    /// Empty if an instance is already present. `command` only names the
    /// requester in errors.
    pub fn find_path(&self, target: TypeKey, command: &str) -> DispatchResult<Vec<&'r Factory>> {
        let mut stack = Vec::new();
        self.push_steps(target, command, 0, &mut stack)?;

        // Prerequisites were pushed after their dependents; reading the stack
        // backwards puts them first. A step reached twice only runs once.
        let mut path: Vec<&'r Factory> = Vec::with_capacity(stack.len());
        for step in stack.into_iter().rev() {
            if !path.iter().any(|seen| std::ptr::eq(*seen, step)) {
                path.push(step);
            }
        }
        log::debug!(
            "Path to {} for '{}': [{}]",
            target,
            command,
            path.iter().map(|f| f.label()).collect::<Vec<_>>().join(" -> ")
        );
        Ok(path)
    }

    fn push_steps(
        &self,
        target: TypeKey,
        command: &str,
        depth: usize,
        stack: &mut Vec<&'r Factory>,
    ) -> DispatchResult<()> {
        if self.contains(target) {
            return Ok(());
        }
        if depth >= self.max_depth {
            return Err(DispatchError::ResolutionTooDeep {
                type_name: target.short_name(),
                command: command.to_string(),
                limit: self.max_depth,
            });
        }

        let registry = self.registry;
        let factory = registry
            .factory(target)
            .map_err(|_| DispatchError::NoFactory {
                type_name: target.short_name(),
                command: command.to_string(),
            })?;
        stack.push(factory);

        for prerequisite in factory.prerequisites() {
            self.push_steps(prerequisite, command, depth + 1, stack)?;
        }
        Ok(())
    }

    // --- 3. INSTANTIATE ---

    /// Runs a single factory step against the current context and stores
    /// what it produces.
    pub fn instantiate(&mut self, step: &'r Factory, args: &mut ArgMap) -> DispatchResult<Object> {
        let requester = step.label().to_string();
        self.instantiate_for(step, args, &requester)
    }

    fn instantiate_for(
        &mut self,
        step: &'r Factory,
        args: &mut ArgMap,
        command: &str,
    ) -> DispatchResult<Object> {
        log::debug!("Instantiating {} via {}", step.returns, step.label());

        let produced = match &step.kind {
            FactoryKind::Constructor {
                dependencies,
                build,
            } => {
                let objects = dependencies
                    .iter()
                    .map(|dependency| self.require(*dependency, command))
                    .collect::<DispatchResult<Vec<_>>>()?;
                (build)(&Dependencies::new(&objects)).map_err(|e| {
                    resolution(step.returns, command, format!("{} failed: {:#}", step.label(), e))
                })?
            }
            FactoryKind::Property { read, .. } => {
                let declaring = step.declaring.ok_or_else(|| {
                    resolution(step.returns, command, "property factory has no declaring type")
                })?;
                let owner = self.require(declaring, command)?;
                (read)(&owner).ok_or_else(|| {
                    resolution(step.returns, command, format!("{} returned nothing", step.label()))
                })?
            }
            FactoryKind::Command { command: index } => {
                return self.instantiate_command(step, *index, args, command);
            }
        };
        self.adopt(step, produced, command)
    }

    /// Produces `step.returns` by running its command, or one of its
    /// fallbacks when the arguments for that command are incomplete.
    fn instantiate_command(
        &mut self,
        step: &'r Factory,
        index: usize,
        args: &mut ArgMap,
        requester: &str,
    ) -> DispatchResult<Object> {
        let registry = self.registry;
        let command = registry.command_at(index).ok_or_else(|| {
            resolution(step.returns, requester, format!("{} is not registered", step.label()))
        })?;
        let alternates: Vec<&'r Factory> = registry
            .alternates(step.returns)
            .into_iter()
            .filter(|alternate| !std::ptr::eq(*alternate, step))
            .collect();

        // An inapplicable primary can only be replaced, never asked about.
        if let Err(not_applicable) = self.ensure_applicable(command) {
            log::debug!("{} is not applicable; looking for a fallback.", step.label());
            return match self.first_satisfiable(&alternates, args) {
                Some(alternate) => self.instantiate_for(alternate, args, requester),
                None => Err(not_applicable),
            };
        }

        let missing = self.missing_arguments(command, args);
        if missing.is_empty() {
            return self.run_factory_command(step, command, args, requester);
        }
        log::debug!(
            "{} lacks [{}]; looking for a fallback.",
            step.label(),
            missing.join(", ")
        );

        // --- Alternates, in registration order ---
        if let Some(alternate) = self.first_satisfiable(&alternates, args) {
            log::debug!("Falling back to {} for {}.", alternate.label(), step.returns);
            return self.instantiate_for(alternate, args, requester);
        }

        // --- Ask once per missing value, then retry once ---
        if self.missing_argument_handler.is_some() {
            for name in &missing {
                let Some(parameter) = command.parameter(name) else {
                    continue;
                };
                if let Some(value) = self.ask_for(parameter) {
                    args.insert(parameter.name(), value);
                }
            }
            let still_missing = self.missing_arguments(command, args);
            if still_missing.is_empty() {
                return self.run_factory_command(step, command, args, requester);
            }
            return Err(DispatchError::UnsatisfiableFactory {
                type_name: step.returns.short_name(),
                command: requester.to_string(),
                missing: still_missing,
            });
        }

        if alternates.is_empty() {
            // Nothing to fall back on: the command reports its first unbound parameter.
            return self.run_factory_command(step, command, args, requester);
        }
        Err(DispatchError::UnsatisfiableFactory {
            type_name: step.returns.short_name(),
            command: requester.to_string(),
            missing,
        })
    }

    fn run_factory_command(
        &mut self,
        step: &'r Factory,
        command: &'r Command,
        args: &mut ArgMap,
        requester: &str,
    ) -> DispatchResult<Object> {
        let produced = self.invoke_command(command, args)?.ok_or_else(|| {
            resolution(step.returns, requester, format!("{} returned nothing", step.label()))
        })?;
        self.adopt(step, produced, requester)
    }

    /// Stores a freshly produced object and schedules it for purging if its
    /// factory is single-use.
    fn adopt(&mut self, step: &Factory, produced: Object, command: &str) -> DispatchResult<Object> {
        if runtime_type(&produced) != step.returns.id() {
            return Err(resolution(
                step.returns,
                command,
                format!("{} produced a value of another type", step.label()),
            ));
        }
        self.set_object(Rc::clone(&produced));
        if step.single_use {
            self.pending_purge.push(Rc::clone(&produced));
        }
        Ok(produced)
    }

    /// Resolves `target` through the registry, running every step needed.
    fn materialize(
        &mut self,
        target: TypeKey,
        args: &mut ArgMap,
        command: &str,
    ) -> DispatchResult<Object> {
        for step in self.find_path(target, command)? {
            self.instantiate_for(step, args, command)?;
        }
        self.object(target)
            .cloned()
            .ok_or_else(|| resolution(target, command, "no instance was produced"))
    }

    fn require(&self, key: TypeKey, command: &str) -> DispatchResult<Object> {
        self.object(key)
            .cloned()
            .ok_or_else(|| DispatchError::MissingContextObject {
                type_name: key.short_name(),
                command: command.to_string(),
            })
    }

    fn first_satisfiable(&self, alternates: &[&'r Factory], args: &ArgMap) -> Option<&'r Factory> {
        alternates.iter().copied().find(|a| self.is_satisfiable(a, args))
    }

    /// Whether an alternate can run right now without further resolution.
    fn is_satisfiable(&self, factory: &Factory, args: &ArgMap) -> bool {
        match &factory.kind {
            FactoryKind::Constructor { dependencies, .. } => {
                dependencies.iter().all(|d| self.contains(*d))
            }
            FactoryKind::Property { .. } => factory.declaring.is_some_and(|d| self.contains(d)),
            FactoryKind::Command { command } => {
                self.registry.command_at(*command).is_some_and(|c| {
                    self.contains(c.host)
                        && self.is_applicable(&c.versions)
                        && self.missing_arguments(c, args).is_empty()
                })
            }
        }
    }

    /// Named parameters of `command` with no value in `args` (by name or
    /// alias) and no default. Collections and injected parameters don't count.
    fn missing_arguments(&self, command: &Command, args: &ArgMap) -> Vec<String> {
        command
            .parameters
            .iter()
            .filter(|p| p.has_metadata && !p.is_collection && self.is_applicable(p.versions()))
            .filter(|p| p.default_value().is_none() && args.lookup(p.name(), p.alias()).is_none())
            .map(|p| p.name().to_string())
            .collect()
    }

    fn ask_for(&mut self, parameter: &Parameter) -> Option<String> {
        let handler = self.missing_argument_handler.as_mut()?;
        let answer = handler(parameter);
        log::debug!(
            "Missing-argument handler {} '{}'.",
            if answer.is_some() { "supplied" } else { "declined" },
            parameter.name()
        );
        answer
    }

    // --- 4. INVOKE COMMAND ---

    /// Binds every parameter of `command`, logs the call and runs it on the
    /// context's instance of its host type.
    ///
    /// If the command is a factory its result is stored in the context.
    pub fn invoke_command(
        &mut self,
        command: &'r Command,
        args: &mut ArgMap,
    ) -> DispatchResult<Option<Object>> {
        let host = self
            .object(command.host)
            .cloned()
            .ok_or_else(|| DispatchError::MissingHost {
                type_name: command.host.short_name(),
                command: command.name.clone(),
            })?;

        let mut bound = BoundArgs::default();
        let mut rendered = Vec::new();
        for parameter in &command.parameters {
            if !self.is_applicable(parameter.versions()) {
                log::debug!(
                    "Skipping parameter '{}' of '{}' ({}).",
                    parameter.name(),
                    command.name,
                    parameter.versions()
                );
                continue;
            }
            let value = self.bind_parameter(command, parameter, args, &mut rendered)?;
            bound.push(parameter.name(), value);
        }

        self.sink.record(
            Level::Info,
            &format!("Executing {}({})", command.name, rendered.join(", ")),
        );

        let result = (command.handler)(&host, &bound).map_err(|source| {
            DispatchError::CommandExecution {
                command: command.name.clone(),
                source,
            }
        })?;

        if let Some(object) = &result
            && command.is_factory()
        {
            self.set_object(Rc::clone(object));
        }
        Ok(result)
    }

    /// Finds a value for one parameter, trying each source in priority order.
    fn bind_parameter(
        &mut self,
        command: &'r Command,
        parameter: &'r Parameter,
        args: &mut ArgMap,
        rendered: &mut Vec<String>,
    ) -> DispatchResult<Object> {
        let target = parameter.value_type();

        if parameter.has_metadata {
            // (a) name, (b) alias
            let supplied = args
                .lookup(parameter.name(), parameter.alias())
                .map(|(_, value)| value.clone());
            if let Some(value) = supplied {
                let (object, shown) = self.accept(parameter, &value)?;
                rendered.push(format!("{}={}", parameter.name(), shown));
                return Ok(object);
            }
            // (c) settings collection
            if parameter.is_collection {
                return self.fill_collection(command, parameter, args, rendered);
            }
            // (d) default
            if let Some(default) = parameter.default_value() {
                let (object, shown) = self.accept(parameter, &ArgValue::from(default))?;
                rendered.push(format!("{}={}", parameter.name(), shown));
                return Ok(object);
            }
        }

        // (e) already in the context
        if let Some(existing) = self.object(target).cloned() {
            rendered.push(format!("{}=<{}>", parameter.name(), target));
            return Ok(existing);
        }

        // (f) producible
        if self.registry.has_factory(target) {
            let object = self.materialize(target, args, &command.name)?;
            rendered.push(format!("{}=<{}>", parameter.name(), target));
            return Ok(object);
        }

        // (g) ask
        if parameter.has_metadata
            && let Some(answer) = self.ask_for(parameter)
        {
            let (object, shown) = self.accept(parameter, &ArgValue::Text(answer))?;
            rendered.push(format!("{}={}", parameter.name(), shown));
            return Ok(object);
        }

        Err(DispatchError::MissingRequiredArgument {
            parameter: parameter.name().to_string(),
            command: command.name.clone(),
        })
    }

    /// Fills a settings collection from `args` and returns the updated instance.
    fn fill_collection(
        &mut self,
        command: &'r Command,
        parameter: &'r Parameter,
        args: &mut ArgMap,
        rendered: &mut Vec<String>,
    ) -> DispatchResult<Object> {
        let target = parameter.value_type();
        let registry = self.registry;
        let collection = registry.collection(target).ok_or_else(|| {
            resolution(target, &command.name, "the type declares no settings")
        })?;
        let instance = match self.object(target).cloned() {
            Some(instance) => instance,
            None => self.materialize(target, args, &command.name)?,
        };

        let mut updates: Vec<(&'r CollectionSetting, String, Object)> = Vec::new();
        let mut lines = Vec::new();
        for setting in &collection.settings {
            if !self.is_applicable(setting.versions()) {
                continue;
            }
            if setting.dynamic {
                for name in collection.dynamic_names_of(&instance) {
                    let Some(value) = args.get(&name).cloned() else {
                        continue;
                    };
                    let (object, shown) = self.accept(setting, &value)?;
                    lines.push(format!("{}.{}={}", parameter.name(), name, shown));
                    updates.push((setting, name, object));
                }
            } else if let Some(value) = args
                .lookup(setting.name(), setting.alias())
                .map(|(_, value)| value.clone())
            {
                let (object, shown) = self.accept(setting, &value)?;
                lines.push(format!("{}.{}={}", parameter.name(), setting.name(), shown));
                updates.push((setting, setting.name().to_string(), object));
            }
        }

        if updates.is_empty() {
            rendered.push(format!("{}=<{}>", parameter.name(), target));
            return Ok(instance);
        }

        let mut detached = (collection.detach)(&instance).ok_or_else(|| {
            resolution(target, &command.name, "the live instance has an unexpected type")
        })?;
        for (setting, key, value) in updates {
            if !(setting.assign)(detached.as_mut(), &key, value) {
                return Err(ConversionError::TypeMismatch {
                    expected: setting.value_type().short_name(),
                    found: "a different type".to_string(),
                }
                .into());
            }
        }

        let updated: Object = Rc::from(detached);
        self.set_object(Rc::clone(&updated));
        for pending in self.pending_purge.iter_mut() {
            if Rc::ptr_eq(pending, &instance) {
                *pending = Rc::clone(&updated);
            }
        }
        rendered.extend(lines);
        Ok(updated)
    }

    /// Converts a supplied value to the setting's type and renders it for the log.
    fn accept<S: Setting + ?Sized>(
        &self,
        setting: &S,
        value: &ArgValue,
    ) -> DispatchResult<(Object, String)> {
        let target = setting.value_type();
        let (object, shown) = match value {
            ArgValue::Text(text) => {
                let object = if target.is::<String>() {
                    Rc::new(text.clone()) as Object
                } else {
                    self.converter.convert(text, target)?
                };
                (object, text.clone())
            }
            ArgValue::Object(object) => {
                if runtime_type(object) != target.id() {
                    return Err(ConversionError::TypeMismatch {
                        expected: target.short_name(),
                        found: "a different type".to_string(),
                    }
                    .into());
                }
                (Rc::clone(object), format!("<{}>", target))
            }
        };
        Ok((object, render_value(&shown, setting.is_sensitive(), &self.mask)))
    }

    // --- 5. VERSIONS ---

    fn is_applicable(&self, versions: &VersionRange) -> bool {
        versions.applies_to_target(self.target_version.as_ref())
    }

    fn ensure_applicable(&self, command: &Command) -> DispatchResult<()> {
        match &self.target_version {
            Some(version) if !command.versions.applies_to(version) => {
                Err(DispatchError::NotApplicable {
                    command: command.name.clone(),
                    version: version.to_string(),
                    range: command.versions.to_string(),
                })
            }
            _ => Ok(()),
        }
    }
}
