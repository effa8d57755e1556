//! `cascade` runs named commands and builds, on the way, every object those
//! commands need: the host they run on, the objects their parameters ask for
//! and whatever those objects depend on in turn.
//!
//! Types, commands and factories are declared once into a
//! [`Registry`](core::registry::Registry). A [`Context`](core::context::Context)
//! holds the live instances of one session and resolves each invocation
//! against the registry.

pub mod catalog;
pub mod cli;
pub mod constants;
pub mod core;
pub mod models;
