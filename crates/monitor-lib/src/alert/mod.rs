//! Alerting: gates, message composition and dispatch

pub mod compose;
mod dispatcher;
mod gate;

pub use dispatcher::{AlertDispatcher, GroupReport, NETWORK_GROUP};
pub use gate::{AlertPolicy, AlertState, GateDecision};
