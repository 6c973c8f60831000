//! Command implementations.
//!
//! Each subcommand is implemented in its own module.

pub(crate) mod clear;
pub(crate) mod completions;
pub(crate) mod export;
pub(crate) mod merge;
pub(crate) mod ports;
pub(crate) mod send;
pub(crate) mod session;
