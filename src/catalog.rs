// src/catalog.rs

//! # Demo Catalogue
//!
//! The commands the `cascade` binary ships with: a server you log in to, the
//! session that login produces, and the applications opened in that session.
//!
//! ```text
//! Server ──Login/Resume──▶ Session ──Open──▶ Application ──Close
//!                             │
//!                             └─profile─▶ Profile (single use) ──WhoAmI
//! ```

use crate::core::arguments::BoundArgs;
use crate::core::converter::{Enumeration, TypeConverter};
use crate::core::declaration::{
    CommandDef, Component, Declaration, FactoryDef, ParamDef, SettingDef,
};
use crate::core::registry::{Registry, RegistryError};
use anyhow::{Result, anyhow, bail};
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Property names a [`Connection`] accepts besides its fixed settings.
const KNOWN_PROPERTIES: &[&str] = &["region", "proxy", "locale"];

/// Registers every demo type.
pub fn register(registry: &mut Registry) -> Result<(), RegistryError> {
    registry.register_namespace([
        Declaration::of_component::<Server>(),
        Declaration::of_component::<Connection>(),
        Declaration::of_component::<Session>(),
        Declaration::of_component::<Application>(),
    ])
}

/// Adds the conversions the demo parameters need on top of the defaults.
pub fn install_conversions(converter: &mut TypeConverter) {
    converter.register_enum::<OpenMode>();
}

// --- TYPES ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Server {
    pub host: String,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
        }
    }
}

/// Connection options for a login, filled from individual arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub timeout: u32,
    pub secure: bool,
    pub properties: BTreeMap<String, String>,
}

impl Default for Connection {
    fn default() -> Self {
        Self {
            timeout: 30,
            secure: true,
            properties: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user: String,
    pub host: String,
    pub connection: Connection,
    pub resumed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    ReadOnly,
    ReadWrite,
    Exclusive,
}

impl Enumeration for OpenMode {
    fn variants() -> &'static [Self] {
        &[Self::ReadOnly, Self::ReadWrite, Self::Exclusive]
    }

    fn name(&self) -> &'static str {
        match self {
            Self::ReadOnly => "ReadOnly",
            Self::ReadWrite => "ReadWrite",
            Self::Exclusive => "Exclusive",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Application {
    pub name: String,
    pub mode: OpenMode,
    pub user: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub user: String,
    pub host: String,
}

// --- COMMANDS ---

impl Server {
    fn login(&self, args: &BoundArgs) -> Result<Session> {
        let user = args.get::<String>("user")?;
        if args.get::<String>("pass")?.is_empty() {
            bail!("The password for '{}' must not be empty.", user);
        }
        Ok(Session {
            user,
            host: self.host.clone(),
            connection: args.get::<Connection>("connection")?,
            resumed: false,
        })
    }

    fn resume(&self, args: &BoundArgs) -> Result<Session> {
        let token = args.get::<String>("token")?;
        let (user, id) = token
            .split_once(':')
            .filter(|(user, id)| !user.is_empty() && !id.is_empty())
            .ok_or_else(|| anyhow!("Malformed session token '{}' (expected '<user>:<id>').", token))?;
        log::debug!("Resuming session {} for '{}'", id, user);
        Ok(Session {
            user: user.to_string(),
            host: self.host.clone(),
            connection: Connection::default(),
            resumed: true,
        })
    }

    fn who_am_i(&self, args: &BoundArgs) -> Result<String> {
        let profile = args.object::<Profile>("profile")?;
        Ok(format!("{}@{}", profile.user, profile.host))
    }
}

impl Session {
    fn open(&self, args: &BoundArgs) -> Result<Application> {
        Ok(Application {
            name: args.get::<String>("app")?,
            mode: args.get::<OpenMode>("mode")?,
            user: self.user.clone(),
        })
    }

    fn report(&self, args: &BoundArgs) -> Result<String> {
        let from = args.get::<NaiveDate>("from")?;
        let to = args.get::<NaiveDate>("to")?;
        if from > to {
            bail!("The report starts ({}) after it ends ({}).", from, to);
        }
        let columns = args.get::<Vec<String>>("columns")?;
        Ok(format!(
            "Report for {}: {} to {} ({} days), columns: {}",
            self.user,
            from,
            to,
            (to - from).num_days() + 1,
            columns.join(", ")
        ))
    }
}

impl Application {
    fn close(&self, _: &BoundArgs) -> Result<String> {
        Ok(format!("Closed '{}' for {}.", self.name, self.user))
    }
}

// --- DECLARATIONS ---

impl Component for Server {
    fn declare(decl: &mut Declaration) {
        decl.factory(FactoryDef::default_constructor::<Self>())
            .command(
                CommandDef::new(Self::login)
                    .named("Login")
                    .describe("Opens a session on the server.")
                    .param(ParamDef::new::<String>("user").alias("u").describe("Account name."))
                    .param(
                        ParamDef::new::<String>("pass")
                            .alias("p")
                            .describe("Account password.")
                            .sensitive(),
                    )
                    .param(
                        ParamDef::collection::<Connection>("connection")
                            .describe("Connection options."),
                    )
                    .as_factory(),
            )
            .command(
                CommandDef::new(Self::resume)
                    .named("Resume")
                    .describe("Reattaches to an existing session.")
                    .param(
                        ParamDef::new::<String>("token")
                            .describe("Session token, '<user>:<id>'.")
                            .sensitive()
                            .since("1.1"),
                    )
                    .since("1.1")
                    .as_alternate_factory(),
            )
            .command(
                CommandDef::new(Self::who_am_i)
                    .named("WhoAmI")
                    .describe("Shows who the current session belongs to.")
                    .param(ParamDef::inject::<Profile>()),
            );
    }
}

impl Component for Connection {
    fn declare(decl: &mut Declaration) {
        decl.factory(FactoryDef::default_constructor::<Self>())
            .setting(
                SettingDef::new("timeout", |c: &mut Self, v: u32| c.timeout = v)
                    .alias("t")
                    .describe("Seconds before giving up.")
                    .default_value("30")
                    .order(1),
            )
            .setting(
                SettingDef::new("secure", |c: &mut Self, v: bool| c.secure = v)
                    .describe("Use TLS.")
                    .default_value("true")
                    .order(2),
            )
            .setting(
                SettingDef::dynamic("property", |c: &mut Self, key: &str, v: String| {
                    c.properties.insert(key.to_string(), v);
                })
                .describe("Any of: region, proxy, locale.")
                .order(3),
            )
            .dynamic_names(|_: &Self| KNOWN_PROPERTIES.iter().map(|p| p.to_string()).collect());
    }
}

impl Component for Session {
    fn declare(decl: &mut Declaration) {
        decl.command(
            CommandDef::new(Self::open)
                .named("Open")
                .describe("Opens an application in the current session.")
                .param(ParamDef::new::<String>("app").alias("a").describe("Application name."))
                .param(
                    ParamDef::new::<OpenMode>("mode")
                        .describe("ReadOnly, ReadWrite or Exclusive (any unique suffix).")
                        .default_value("ReadWrite"),
                )
                .as_factory(),
        )
        .command(
            CommandDef::new(Self::report)
                .named("Report")
                .describe("Summarizes activity between two dates.")
                .param(ParamDef::new::<NaiveDate>("from").describe("First day."))
                .param(ParamDef::new::<NaiveDate>("to").describe("Last day."))
                .param(
                    ParamDef::new::<Vec<String>>("columns")
                        .alias("c")
                        .describe("Comma-separated column names.")
                        .default_value("name,size"),
                ),
        )
        .factory(
            FactoryDef::property("profile", |s: &Self| {
                Some(Profile {
                    user: s.user.clone(),
                    host: s.host.clone(),
                })
            })
            .single_use(),
        );
    }
}

impl Component for Application {
    fn declare(decl: &mut Declaration) {
        decl.command(
            CommandDef::new(Self::close)
                .named("Close")
                .describe("Closes the open application."),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::arguments::ArgMap;
    use crate::core::context::{Context, DispatchError};
    use crate::core::converter::ConversionError;

    fn registry() -> Registry {
        let mut registry = Registry::new();
        register(&mut registry).unwrap();
        registry
    }

    fn context(registry: &Registry) -> Context<'_> {
        let mut context = Context::new(registry);
        install_conversions(context.converter_mut());
        context
    }

    fn login() -> ArgMap {
        ArgMap::new().with("user", "alice").with("pass", "secret")
    }

    #[test]
    fn test_catalogue_registers_cleanly() {
        let registry = registry();
        let names: Vec<_> = registry.commands().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Login", "Resume", "WhoAmI", "Open", "Report", "Close"]
        );
    }

    #[test]
    fn test_close_runs_the_whole_chain() {
        let registry = registry();
        let mut context = context(&registry);

        let message = context
            .invoke_as::<String>("Close", login().with("app", "Fin1"))
            .unwrap()
            .unwrap();

        assert_eq!(*message, "Closed 'Fin1' for alice.");
        let application = context.get::<Application>().unwrap();
        assert_eq!(application.mode, OpenMode::ReadWrite);
        assert_eq!(context.get::<Session>().unwrap().user, "alice");
    }

    #[test]
    fn test_open_mode_accepts_unique_suffixes() {
        let registry = registry();
        let mut context = context(&registry);

        context
            .invoke("Open", login().with("app", "x").with("mode", "only"))
            .unwrap();
        assert_eq!(context.get::<Application>().unwrap().mode, OpenMode::ReadOnly);

        // Both ReadWrite and Exclusive end in 'e'.
        let err = context
            .invoke("Open", ArgMap::new().with("app", "x").with("mode", "e"))
            .unwrap_err();
        let DispatchError::Conversion(ConversionError::InvalidEnumeration { valid, .. }) = err
        else {
            panic!("Expected an enumeration error");
        };
        assert_eq!(valid, vec!["ReadOnly", "ReadWrite", "Exclusive"]);
    }

    #[test]
    fn test_connection_settings_reach_the_session() {
        let registry = registry();
        let mut context = context(&registry);

        context
            .invoke(
                "Login",
                login().with("t", "5").with("secure", "no").with("region", "eu-west"),
            )
            .unwrap();

        let session = context.get::<Session>().unwrap();
        let connection = &session.connection;
        assert_eq!(connection.timeout, 5);
        assert!(!connection.secure);
        assert_eq!(connection.properties.get("region").map(String::as_str), Some("eu-west"));
    }

    #[test]
    fn test_resume_is_the_fallback_for_login() {
        let registry = registry();
        let mut context = context(&registry);

        context
            .invoke("Open", ArgMap::new().with("token", "bob:42").with("app", "x"))
            .unwrap();

        let session = context.get::<Session>().unwrap();
        assert!(session.resumed);
        assert_eq!(session.user, "bob");
    }

    #[test]
    fn test_whoami_uses_a_single_use_profile() {
        let registry = registry();
        let mut context = context(&registry);

        let me = context.invoke_as::<String>("whoami", login()).unwrap().unwrap();

        assert_eq!(*me, "alice@localhost");
        assert!(context.get::<Profile>().is_none());
        assert!(context.get::<Session>().is_some());
    }

    #[test]
    fn test_report_converts_dates_and_lists() {
        let registry = registry();
        let mut context = context(&registry);

        let report = context
            .invoke_as::<String>(
                "Report",
                login()
                    .with("from", "2024-01-01")
                    .with("to", "2024-01-31")
                    .with("c", "owner, size"),
            )
            .unwrap()
            .unwrap();
        assert_eq!(
            *report,
            "Report for alice: 2024-01-01 to 2024-01-31 (31 days), columns: owner, size"
        );

        let err = context
            .invoke(
                "Report",
                ArgMap::new().with("from", "2024-02-01").with("to", "2024-01-01"),
            )
            .unwrap_err();
        assert!(matches!(err, DispatchError::CommandExecution { command, .. } if command == "Report"));
    }

    #[test]
    fn test_empty_password_fails_inside_the_command() {
        let registry = registry();
        let mut context = context(&registry);
        let err = context
            .invoke("Login", ArgMap::new().with("user", "alice").with("pass", ""))
            .unwrap_err();
        assert!(format!("{:#}", anyhow::Error::from(err)).contains("must not be empty"));
    }
}
