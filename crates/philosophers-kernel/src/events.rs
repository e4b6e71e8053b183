//! Event sinks: where philosophers report what they do.
//!
//! The kernel never logs directly. Each philosopher is handed an
//! [`EventSink`]; the binary uses [`TracingSink`], tests and the stress
//! harness record into a [`MemorySink`] and check the protocol afterwards.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use tracing::info;

use crate::hand::{Hand, HandSet};
use crate::philosopher::{Action, PhilosopherId};

/// Something a philosopher did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    Enters,
    Decides { action: Action },
    SitsOnSeparateChair,
    /// A negotiation round: the distinct preferences of everyone else, and the pick.
    Prefers { others: HandSet, chosen: Hand },
    LeavesSeparateChair,
    SitsOnChair { index: usize },
    LeavesChair { index: usize },
    AllChairsOccupied,
    EatsMeal { meals: usize },
    Leaves,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enters => write!(f, "enters room"),
            Self::Decides { action } => write!(f, "decides to {}", action),
            Self::SitsOnSeparateChair => write!(f, "sits on separate chair"),
            Self::Prefers { chosen, .. } => write!(f, "prefers {} hand", chosen),
            Self::LeavesSeparateChair => write!(f, "leaves separate chair"),
            Self::SitsOnChair { index } => write!(f, "sits on chair nr {}", index),
            Self::LeavesChair { index } => write!(f, "leaves chair nr {}", index),
            Self::AllChairsOccupied => write!(f, "found all chairs occupied"),
            Self::EatsMeal { .. } => write!(f, "eats meal"),
            Self::Leaves => write!(f, "leaves room"),
        }
    }
}

pub trait EventSink: Send + Sync {
    fn record(&self, who: PhilosopherId, event: Event);
}

/// Forwards every event to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, who: PhilosopherId, event: Event) {
        match &event {
            Event::Prefers { others, chosen } => info!(
                philosopher = %who.name(),
                others = ?others,
                chosen = %chosen,
                "{} {}",
                who.name(),
                event
            ),
            Event::EatsMeal { meals } => {
                info!(philosopher = %who.name(), meals = meals, "{} {}", who.name(), event)
            }
            _ => info!(philosopher = %who.name(), "{} {}", who.name(), event),
        }
    }
}

/// Keeps every event in arrival order.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<(PhilosopherId, Event)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(PhilosopherId, Event)> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn events_of(&self, who: PhilosopherId) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|(id, _)| *id == who)
            .map(|(_, event)| event)
            .collect()
    }

    /// Negotiation rounds that saw exactly one peer preference but did not
    /// choose the opposite hand.
    pub fn diversification_violations(&self) -> usize {
        self.events()
            .iter()
            .filter(|(_, event)| match event {
                Event::Prefers { others, chosen } if others.len() == 1 => {
                    others.iter().next().map(|only| only.other()) != Some(*chosen)
                }
                _ => false,
            })
            .count()
    }

    /// Places where the separate chair's sit/leave sequence does not strictly
    /// alternate for one philosopher at a time.
    pub fn separate_chair_overlaps(&self) -> usize {
        let mut inside: Option<PhilosopherId> = None;
        let mut overlaps = 0;
        for (who, event) in self.events() {
            match event {
                Event::SitsOnSeparateChair => {
                    if inside.is_some() {
                        overlaps += 1;
                    }
                    inside = Some(who);
                }
                Event::LeavesSeparateChair => {
                    if inside != Some(who) {
                        overlaps += 1;
                    }
                    inside = None;
                }
                _ => {}
            }
        }
        overlaps
    }
}

impl EventSink for MemorySink {
    fn record(&self, who: PhilosopherId, event: Event) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((who, event));
    }
}

/// Record into both sinks.
impl<A: EventSink, B: EventSink> EventSink for (A, B) {
    fn record(&self, who: PhilosopherId, event: Event) {
        self.0.record(who, event.clone());
        self.1.record(who, event);
    }
}

impl<S: EventSink + ?Sized> EventSink for std::sync::Arc<S> {
    fn record(&self, who: PhilosopherId, event: Event) {
        (**self).record(who, event);
    }
}
