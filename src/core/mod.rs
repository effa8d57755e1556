// src/core/mod.rs

pub mod arguments;
pub mod config;
pub mod context;
pub mod converter;
pub mod declaration;
pub mod logging;
pub mod registry;
pub mod resolver;
pub mod version;
