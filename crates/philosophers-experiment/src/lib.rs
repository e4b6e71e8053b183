//! Philosophers Experiment: running the room and measuring its liveness.
//!
//! The deadlock avoidance of the room is a heuristic, not a proof. This crate
//! runs it repeatedly over many seeds and ring sizes and reports how often
//! every philosopher finished, alongside the protocol checks recorded from
//! each run's events.

pub mod results;
pub mod stress;
