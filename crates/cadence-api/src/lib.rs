//! Shared types for cadence
//!
//! This crate defines the types every other crate and every caller agrees on:
//! - Schedule templates and dated sessions with their child records
//! - The closed set of lifecycle states and the action projected from each
//! - The maintenance trigger's response contract
//! - Analytics views

mod analytics;
mod lifecycle;
mod maintenance;
mod types;

pub use analytics::*;
pub use lifecycle::*;
pub use maintenance::*;
pub use types::*;
