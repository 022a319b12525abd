//! Shared utilities for cadence
//!
//! This crate provides:
//! - ID types (AthleteId, SessionId, TemplateId)
//! - Local wall-clock time utilities (mockable `now()`, weekdays, session windows)
//! - Default paths for config and data directories

mod ids;
mod paths;
mod time;

pub use ids::*;
pub use paths::*;
pub use time::*;
