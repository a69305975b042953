//! Dialog engine: per-user state machines with queued, single-flight
//! execution.

pub mod engine;
pub mod flow;

pub use engine::{DialogEngine, SessionId, spawn_idle_sweeper};
pub use flow::{Context, Flow, Transition};
