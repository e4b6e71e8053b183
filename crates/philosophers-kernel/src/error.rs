//! Protocol violations.
//!
//! None of these are expected under correct operation. They mark a broken
//! invariant in the seat/fork protocol and end the offending philosopher's
//! task; the room's join step reports them.

use std::fmt;

use crate::philosopher::PhilosopherId;
use crate::seat::SeatRef;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// An occupant was assigned to a chair that already has one.
    SeatOccupied { seat: SeatRef },
    /// A philosopher tried to stand up from a chair it does not sit on.
    NotOccupant { seat: SeatRef, who: PhilosopherId },
    /// A hand code other than left or right, or a missing preference.
    InvalidHand { code: u8 },
    /// Eating was attempted away from a table chair.
    NotSeated { who: PhilosopherId },
    /// A blocking wait was closed under the waiter.
    Interrupted { what: &'static str },
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SeatOccupied { seat } => write!(f, "{} is not empty", seat),
            Self::NotOccupant { seat, who } => {
                write!(f, "philosopher {} does not sit on {}", who, seat)
            }
            Self::InvalidHand { code } => write!(f, "invalid hand code {}", code),
            Self::NotSeated { who } => write!(f, "philosopher {} has no table chair", who),
            Self::Interrupted { what } => write!(f, "wait for {} was interrupted", what),
        }
    }
}

impl std::error::Error for ProtocolError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_the_parties() {
        let err = ProtocolError::NotOccupant {
            seat: SeatRef::Table(3),
            who: PhilosopherId(1),
        };
        assert_eq!(err.to_string(), "philosopher 1 does not sit on chair nr 3");

        let err = ProtocolError::SeatOccupied {
            seat: SeatRef::Separate,
        };
        assert_eq!(err.to_string(), "separate chair is not empty");
    }
}
