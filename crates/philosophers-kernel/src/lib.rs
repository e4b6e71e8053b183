//! Philosophers Kernel: seats, forks and hand-preference negotiation.
//!
//! This crate implements a dining-philosophers room in which every
//! philosopher runs as its own task, cycling between thinking, a
//! single-occupant negotiation chair and eating at a ring of chairs.
//! Acquisition order of the two forks is diversified by a best-effort
//! preference negotiation rather than a global ordering.

pub mod config;
pub mod error;
pub mod events;
pub mod fork;
pub mod hand;
pub mod philosopher;
pub mod room;
pub mod seat;

pub use config::{DelayConfig, RoomConfig};
pub use error::ProtocolError;
pub use events::{Event, EventSink, MemorySink, TracingSink};
pub use fork::{Fork, ForkGuard, ForkId};
pub use hand::{Hand, HandSet};
pub use philosopher::{Action, Philosopher, PhilosopherId, PhilosopherSummary};
pub use room::{Meal, Room, SimulationReport};
pub use seat::{Seat, SeatObserver, SeatRef};
