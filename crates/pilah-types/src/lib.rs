//! Shared domain types for the Pilah capture and classification cycle.

pub mod classification;
pub mod config;
pub mod cycle;
pub mod events;
pub mod telemetry;
pub mod vision;

mod errors;

pub use errors::{ErrorKind, PilahError, Result};
