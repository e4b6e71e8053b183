//! Hands: which neighbouring fork a philosopher reaches for first.

use std::collections::BTreeSet;
use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Encoding of "no preference" in an atomic hand slot.
pub(crate) const NO_HAND: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hand {
    Left,
    Right,
}

/// Distinct preferences currently held in the room, in hand order.
pub type HandSet = BTreeSet<Hand>;

impl Hand {
    /// Pick a hand uniformly at random.
    pub fn random(rng: &mut impl Rng) -> Self {
        if rng.random_bool(0.5) {
            Self::Left
        } else {
            Self::Right
        }
    }

    pub fn other(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }

    /// Compact encoding used by the philosopher's atomic preference slot.
    pub(crate) fn code(self) -> u8 {
        match self {
            Self::Left => 1,
            Self::Right => 2,
        }
    }

    /// Decode an atomic preference slot; `NO_HAND` means no preference.
    pub(crate) fn from_code(code: u8) -> Result<Option<Self>, ProtocolError> {
        match code {
            NO_HAND => Ok(None),
            1 => Ok(Some(Self::Left)),
            2 => Ok(Some(Self::Right)),
            code => Err(ProtocolError::InvalidHand { code }),
        }
    }

    /// Choose a new preference given the distinct preferences held by everyone else.
    ///
    /// When the others agree on a single hand, take the opposite one; otherwise
    /// pick at random.
    pub fn negotiate(others: &HandSet, rng: &mut impl Rng) -> Self {
        match others.iter().next() {
            Some(only) if others.len() == 1 => only.other(),
            _ => Self::random(rng),
        }
    }
}

impl fmt::Display for Hand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Left => write!(f, "left"),
            Self::Right => write!(f, "right"),
        }
    }
}
