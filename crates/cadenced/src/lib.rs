//! cadenced - the cadence maintenance service
//!
//! The binary wires these together; they live in a library so integration
//! tests drive the exact router and scheduler production uses.

pub mod http;
pub mod scheduler;
