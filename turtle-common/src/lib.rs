//! Shared infrastructure for the Turtle stock platform.
//!
//! Every Turtle binary reads the same configuration file and logs through
//! the same tracing setup; both live here so the engine crate stays free
//! of bootstrap concerns.

pub mod config;
pub mod logging;
