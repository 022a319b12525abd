//! Session lifecycle and recurring-schedule engine for cadence
//!
//! This crate is the heart of cadence, containing:
//! - The materializer (weekly templates -> dated sessions on a rolling horizon)
//! - The lifecycle state machine and its action projection
//! - The daily maintenance sweep (reconcile -> materialize -> cleanup)
//! - The analytics aggregator (streaks, consistency, goal completion)
//! - Manual session actions and template management

mod actions;
mod analytics;
mod error;
mod lifecycle;
mod materializer;
mod schedule;
mod sweep;

pub use actions::*;
pub use analytics::*;
pub use error::*;
pub use lifecycle::*;
pub use materializer::*;
pub use schedule::*;
pub use sweep::*;
