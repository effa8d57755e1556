// src/constants.rs

/// The name of the directory holding cascade configuration (inside the user's config dir).
pub const CONFIG_DIR_NAME: &str = "cascade";

/// The name of the engine configuration file.
pub const CONFIG_FILENAME: &str = "cascade.toml";

/// What sensitive values are replaced with in log lines.
pub const DEFAULT_MASK: &str = "********";

/// How deep a prerequisite chain may go before resolution gives up.
pub const DEFAULT_MAX_RESOLUTION_DEPTH: usize = 32;

/// The `log` target of the one-line-per-command execution records.
pub const DISPATCH_LOG_TARGET: &str = "cascade::dispatch";

/// The token separating invocations on the command line.
pub const INVOCATION_SEPARATOR: &str = "+";
