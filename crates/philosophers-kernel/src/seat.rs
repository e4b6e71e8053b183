//! Chairs: table positions and the separate negotiation chair.
//!
//! Both kinds share one [`Seat`] type; what a chair can do is decided by its
//! `SeatKind`:
//!
//! ```text
//!              try_occupy        occupy (blocking)        vacate
//! Table        atomic check+sit  direct sit (no check)    occupant only
//! Separate     always refuses    FIFO turnstile, then sit clear, then open turnstile
//! ```
//!
//! Chairs never own philosophers. They record the occupant's id and report
//! every change to a [`SeatObserver`] (the room), which keeps the
//! philosopher's own seat record and the seated counter in step.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::error::ProtocolError;
use crate::fork::ForkId;
use crate::hand::Hand;
use crate::philosopher::PhilosopherId;

/// Which chair a philosopher sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SeatRef {
    /// A chair at the table, by ring index.
    Table(usize),
    /// The single negotiation chair away from the table.
    Separate,
}

impl SeatRef {
    pub fn table_index(self) -> Option<usize> {
        match self {
            Self::Table(index) => Some(index),
            Self::Separate => None,
        }
    }
}

impl fmt::Display for SeatRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Table(index) => write!(f, "chair nr {}", index),
            Self::Separate => write!(f, "separate chair"),
        }
    }
}

/// Capability set of a chair.
#[derive(Debug)]
pub(crate) enum SeatKind {
    /// A table chair bordered by two forks.
    Table { left: ForkId, right: ForkId },
    /// The negotiation chair. One permit, handed out first-come first-served.
    Separate { turnstile: Semaphore },
}

/// Receives occupancy changes, inside the chair's critical section.
pub trait SeatObserver: Send + Sync {
    /// `who` now sits on `seat`, or stands when `seat` is `None`.
    fn seat_changed(&self, who: PhilosopherId, seat: Option<SeatRef>);
}

#[derive(Debug)]
pub struct Seat {
    id: SeatRef,
    kind: SeatKind,
    occupant: Mutex<Option<PhilosopherId>>,
}

impl Seat {
    pub fn table(index: usize, left: ForkId, right: ForkId) -> Self {
        Self {
            id: SeatRef::Table(index),
            kind: SeatKind::Table { left, right },
            occupant: Mutex::new(None),
        }
    }

    pub fn separate() -> Self {
        Self {
            id: SeatRef::Separate,
            kind: SeatKind::Separate {
                turnstile: Semaphore::new(1),
            },
            occupant: Mutex::new(None),
        }
    }

    pub fn id(&self) -> SeatRef {
        self.id
    }

    pub fn occupant(&self) -> Option<PhilosopherId> {
        *self.slot()
    }

    pub fn is_free(&self) -> bool {
        self.occupant().is_none()
    }

    /// The fork on the given side of a table chair; the separate chair has none.
    pub fn fork(&self, hand: Hand) -> Option<ForkId> {
        match (&self.kind, hand) {
            (SeatKind::Table { left, .. }, Hand::Left) => Some(*left),
            (SeatKind::Table { right, .. }, Hand::Right) => Some(*right),
            (SeatKind::Separate { .. }, _) => None,
        }
    }

    /// Sit down if the chair is free. Never blocks.
    ///
    /// The free check, the assignment and the observer notification happen in
    /// one critical section, so two philosophers can never both succeed.
    /// The separate chair always refuses.
    pub fn try_occupy(&self, who: PhilosopherId, observer: &dyn SeatObserver) -> bool {
        if let SeatKind::Separate { .. } = self.kind {
            return false;
        }
        let mut slot = self.slot();
        if slot.is_some() {
            return false;
        }
        *slot = Some(who);
        observer.seat_changed(who, Some(self.id));
        true
    }

    /// Sit down, waiting for the chair if it has a turnstile.
    ///
    /// A table chair has no waiting path: this assigns directly and fails with
    /// `SeatOccupied` when somebody already sits there. The separate chair waits
    /// in arrival order for its turnstile first, so the occupied check can only
    /// fail if the turnstile itself was bypassed.
    pub async fn occupy(
        &self,
        who: PhilosopherId,
        observer: &dyn SeatObserver,
    ) -> Result<(), ProtocolError> {
        match &self.kind {
            SeatKind::Table { .. } => self.sit_on(who, observer),
            SeatKind::Separate { turnstile } => {
                turnstile
                    .acquire()
                    .await
                    .map_err(|_| ProtocolError::Interrupted {
                        what: "separate chair",
                    })?
                    .forget();
                let seated = self.sit_on(who, observer);
                if seated.is_err() {
                    turnstile.add_permits(1);
                }
                seated
            }
        }
    }

    /// Stand up. Only the current occupant may do so.
    ///
    /// For the separate chair the occupant is cleared before the turnstile
    /// opens, so the next philosopher in line never finds it occupied.
    pub fn vacate(
        &self,
        who: PhilosopherId,
        observer: &dyn SeatObserver,
    ) -> Result<(), ProtocolError> {
        {
            let mut slot = self.slot();
            if *slot != Some(who) {
                return Err(ProtocolError::NotOccupant { seat: self.id, who });
            }
            *slot = None;
            observer.seat_changed(who, None);
        }
        if let SeatKind::Separate { turnstile } = &self.kind {
            turnstile.add_permits(1);
        }
        Ok(())
    }

    fn sit_on(&self, who: PhilosopherId, observer: &dyn SeatObserver) -> Result<(), ProtocolError> {
        let mut slot = self.slot();
        if slot.is_some() {
            return Err(ProtocolError::SeatOccupied { seat: self.id });
        }
        *slot = Some(who);
        observer.seat_changed(who, Some(self.id));
        Ok(())
    }

    fn slot(&self) -> MutexGuard<'_, Option<PhilosopherId>> {
        // The slot is a plain Option; a panic elsewhere cannot leave it half-written.
        self.occupant.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
