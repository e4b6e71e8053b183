//! Philosophers: the autonomous actors of the room.
//!
//! ```text
//! Entering ──> negotiate ──> seek seat
//!                 │
//!                 v
//!   ┌──── think, then pick one at random ────┐
//!   │   Eat  |  Negotiate  |  Seek seat      │  until meals == ring size
//!   └────────────────────────────────────────┘
//!                 │
//!                 v
//!             Leaving (stand up if seated)
//! ```
//!
//! Each philosopher owns its random source and event sink. Everything it
//! shares with the others lives in the room: its [`PhilosopherState`], the
//! chairs and the forks.

use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::events::{Event, EventSink};
use crate::hand::{Hand, NO_HAND};
use crate::room::Room;
use crate::seat::SeatRef;

/// Index of a philosopher in the room's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PhilosopherId(pub usize);

impl PhilosopherId {
    pub fn name(self) -> String {
        format!("philosopher {}", self.0)
    }
}

impl fmt::Display for PhilosopherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a philosopher decides to do after thinking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Eat,
    Negotiate,
    MoveSeat,
}

impl Action {
    /// Pick one of the three actions uniformly.
    pub fn random(rng: &mut impl Rng) -> Self {
        match rng.random_range(0..3) {
            0 => Self::Eat,
            1 => Self::Negotiate,
            _ => Self::MoveSeat,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eat => write!(f, "eat"),
            Self::Negotiate => write!(f, "sit on separate chair"),
            Self::MoveSeat => write!(f, "move chairs"),
        }
    }
}

/// The part of a philosopher other philosophers and chairs can see.
///
/// The preferred hand is only written by its owner while it sits on the
/// separate chair, so readers never need a lock to get a consistent set.
#[derive(Debug, Default)]
pub struct PhilosopherState {
    seat: Mutex<Option<SeatRef>>,
    preferred: AtomicU8,
    meals: AtomicUsize,
    decisions: AtomicUsize,
}

impl PhilosopherState {
    pub fn seat(&self) -> Option<SeatRef> {
        *self.seat.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn preferred(&self) -> Result<Option<Hand>, ProtocolError> {
        Hand::from_code(self.preferred.load(Ordering::Acquire))
    }

    pub fn meals(&self) -> usize {
        self.meals.load(Ordering::Acquire)
    }

    /// Rounds of the decision loop taken so far.
    pub fn decisions(&self) -> usize {
        self.decisions.load(Ordering::Acquire)
    }

    /// Record a new seat and return the previous one.
    pub(crate) fn replace_seat(&self, seat: Option<SeatRef>) -> Option<SeatRef> {
        std::mem::replace(
            &mut *self.seat.lock().unwrap_or_else(PoisonError::into_inner),
            seat,
        )
    }

    pub(crate) fn set_preferred(&self, hand: Option<Hand>) {
        let code = hand.map_or(NO_HAND, Hand::code);
        self.preferred.store(code, Ordering::Release);
    }

    pub(crate) fn add_meal(&self) -> usize {
        self.meals.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn count_decision(&self) {
        self.decisions.fetch_add(1, Ordering::AcqRel);
    }
}

/// Final tally of a philosopher that left the room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhilosopherSummary {
    pub id: PhilosopherId,
    pub name: String,
    pub meals: usize,
    pub decisions: usize,
    pub preferred: Option<Hand>,
}

/// A philosopher's task.
pub struct Philosopher {
    id: PhilosopherId,
    room: Arc<Room>,
    rng: ChaCha8Rng,
    sink: Arc<dyn EventSink>,
}

impl fmt::Debug for Philosopher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Philosopher")
            .field("id", &self.id)
            .field("seat", &self.state().seat())
            .field("meals", &self.state().meals())
            .finish()
    }
}

impl Philosopher {
    pub fn new(id: PhilosopherId, room: Arc<Room>, rng: ChaCha8Rng, sink: Arc<dyn EventSink>) -> Self {
        Self {
            id,
            room,
            rng,
            sink,
        }
    }

    /// Live the whole life cycle: enter, negotiate, loop until the quota of
    /// meals (the ring size) is eaten, then leave.
    pub async fn run(mut self) -> Result<PhilosopherSummary, ProtocolError> {
        self.emit(Event::Enters);
        self.negotiate().await?;

        let quota = self.room.size();
        while self.state().meals() < quota {
            self.pause().await;
            self.state().count_decision();

            let action = Action::random(&mut self.rng);
            self.emit(Event::Decides { action });
            match action {
                Action::Eat => self.eat().await?,
                Action::Negotiate => self.negotiate().await?,
                Action::MoveSeat => self.seek_seat().await?,
            }
        }

        self.stand_up_if_needed().await?;
        self.emit(Event::Leaves);
        self.summary()
    }

    /// Take a turn on the separate chair to pick a new preferred hand, then
    /// look for a table chair.
    ///
    /// The separate chair is vacated on every path out of the round.
    pub async fn negotiate(&mut self) -> Result<(), ProtocolError> {
        self.stand_up_if_needed().await?;
        self.pause().await;

        let room = Arc::clone(&self.room);
        let chair = room.separate_chair();
        chair.occupy(self.id, &*room).await?;
        self.emit(Event::SitsOnSeparateChair);

        let negotiated = self.choose_hand().await;

        self.emit(Event::LeavesSeparateChair);
        let vacated = chair.vacate(self.id, &*room);
        negotiated?;
        vacated?;

        self.seek_seat().await
    }

    /// Walk around the table from the chair after the current one and sit on
    /// the first free chair. Stays put when every chair is taken.
    ///
    /// A standing philosopher is always guaranteed a free chair: there are as
    /// many chairs as philosophers. The room's scan lock keeps other seekers
    /// from taking chairs mid-walk, so one lap is enough.
    pub async fn seek_seat(&mut self) -> Result<(), ProtocolError> {
        let room = Arc::clone(&self.room);
        let size = room.size();
        if room.seated() >= size {
            self.emit(Event::AllChairsOccupied);
            return Ok(());
        }

        let current = self.state().seat().and_then(SeatRef::table_index);
        let mut index = current.map_or(0, |i| (i + 1) % size);
        self.stand_up_if_needed().await?;
        self.pause().await;

        let _scan = room.lock_scan().await;
        let mut tried = 0;
        while !room.chair(index).try_occupy(self.id, &*room) {
            index = (index + 1) % size;
            tried += 1;
            if tried % size == 0 {
                tokio::task::yield_now().await;
            }
        }
        self.emit(Event::SitsOnChair { index });
        Ok(())
    }

    /// Pick up the fork on the preferred side, then the other one, eat, and
    /// put both down (the second one first).
    ///
    /// The order is never reversed. On a ring of one both sides are the same
    /// fork, which is then picked up once.
    pub async fn eat(&mut self) -> Result<(), ProtocolError> {
        let room = Arc::clone(&self.room);
        self.pause().await;

        let seat = match self.state().seat() {
            Some(seat @ SeatRef::Table(_)) => room.seat(seat),
            _ => return Err(ProtocolError::NotSeated { who: self.id }),
        };
        let hand = self
            .state()
            .preferred()?
            .ok_or(ProtocolError::InvalidHand { code: NO_HAND })?;
        let (first, second) = match (seat.fork(hand), seat.fork(hand.other())) {
            (Some(first), Some(second)) => (first, second),
            _ => return Err(ProtocolError::NotSeated { who: self.id }),
        };

        let first_guard = room.fork(first).acquire(self.id).await;
        self.pause().await;
        let second_guard = if second == first {
            None
        } else {
            Some(room.fork(second).acquire(self.id).await)
        };
        self.pause().await;

        let meals = self.state().add_meal();
        room.record_meal(self.id);
        self.emit(Event::EatsMeal { meals });

        drop(second_guard);
        first_guard.release();
        Ok(())
    }

    async fn choose_hand(&mut self) -> Result<Hand, ProtocolError> {
        self.pause().await;

        let state = self.room.philosopher(self.id);
        state.set_preferred(None);
        let others = self.room.preferences()?;
        let chosen = Hand::negotiate(&others, &mut self.rng);
        state.set_preferred(Some(chosen));
        self.emit(Event::Prefers { others, chosen });

        self.pause().await;
        Ok(chosen)
    }

    async fn stand_up_if_needed(&mut self) -> Result<(), ProtocolError> {
        let Some(seat) = self.state().seat() else {
            return Ok(());
        };
        self.pause().await;
        match seat {
            SeatRef::Table(index) => self.emit(Event::LeavesChair { index }),
            SeatRef::Separate => self.emit(Event::LeavesSeparateChair),
        }
        let room = Arc::clone(&self.room);
        room.seat(seat).vacate(self.id, &*room)
    }

    async fn pause(&mut self) {
        let delay = self.room.config().think.sample(&mut self.rng);
        if delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(delay).await;
        }
    }

    fn state(&self) -> &PhilosopherState {
        self.room.philosopher(self.id)
    }

    fn emit(&self, event: Event) {
        self.sink.record(self.id, event);
    }

    fn summary(&self) -> Result<PhilosopherSummary, ProtocolError> {
        let state = self.state();
        Ok(PhilosopherSummary {
            id: self.id,
            name: self.id.name(),
            meals: state.meals(),
            decisions: state.decisions(),
            preferred: state.preferred()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DelayConfig, RoomConfig};
    use crate::events::MemorySink;
    use rand::SeedableRng;

    fn room(size: usize) -> Arc<Room> {
        let config = RoomConfig {
            size,
            think: DelayConfig { min_ms: 1, max_ms: 5 },
            seed: Some(11),
        };
        Arc::new(Room::new(config).unwrap())
    }

    fn philosopher(room: &Arc<Room>, id: usize, sink: &Arc<MemorySink>) -> Philosopher {
        Philosopher::new(
            PhilosopherId(id),
            room.clone(),
            ChaCha8Rng::seed_from_u64(id as u64),
            sink.clone(),
        )
    }

    #[test]
    fn test_actions_cover_all_three() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut seen = Vec::new();
        for _ in 0..100 {
            let action = Action::random(&mut rng);
            if !seen.contains(&action) {
                seen.push(action);
            }
        }
        assert_eq!(seen.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_negotiation_opposes_unanimous_peers() {
        let room = room(5);
        for id in 0..4 {
            room.philosopher(PhilosopherId(id)).set_preferred(Some(Hand::Left));
        }
        let sink = Arc::new(MemorySink::new());
        let mut newcomer = philosopher(&room, 4, &sink);

        newcomer.negotiate().await.unwrap();

        let state = room.philosopher(PhilosopherId(4));
        assert_eq!(state.preferred(), Ok(Some(Hand::Right)));
        assert!(matches!(state.seat(), Some(SeatRef::Table(_))));
        assert!(room.separate_chair().is_free());
        assert_eq!(room.seated(), 1);
        assert_eq!(sink.diversification_violations(), 0);
        assert_eq!(
            sink.events_of(PhilosopherId(4))[..3],
            [
                Event::SitsOnSeparateChair,
                Event::Prefers {
                    others: [Hand::Left].into_iter().collect(),
                    chosen: Hand::Right,
                },
                Event::LeavesSeparateChair,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_seek_seat_moves_to_next_free_chair() {
        let room = room(4);
        let sink = Arc::new(MemorySink::new());
        let mut first = philosopher(&room, 0, &sink);
        let mut second = philosopher(&room, 1, &sink);

        first.seek_seat().await.unwrap();
        assert_eq!(room.philosopher(PhilosopherId(0)).seat(), Some(SeatRef::Table(0)));

        second.seek_seat().await.unwrap();
        assert_eq!(room.philosopher(PhilosopherId(1)).seat(), Some(SeatRef::Table(1)));

        // Moving starts at the chair after the current one and skips occupied ones.
        first.seek_seat().await.unwrap();
        assert_eq!(room.philosopher(PhilosopherId(0)).seat(), Some(SeatRef::Table(2)));
        assert_eq!(room.seated(), 2);
        assert_eq!(room.occupied_chairs(), 2);
        assert!(room.chair(0).is_free());
    }

    #[tokio::test(start_paused = true)]
    async fn test_seek_seat_stays_when_table_is_full() {
        let room = room(1);
        let sink = Arc::new(MemorySink::new());
        let mut only = philosopher(&room, 0, &sink);

        only.seek_seat().await.unwrap();
        only.seek_seat().await.unwrap();

        assert_eq!(room.philosopher(PhilosopherId(0)).seat(), Some(SeatRef::Table(0)));
        assert_eq!(
            sink.events_of(PhilosopherId(0)).last(),
            Some(&Event::AllChairsOccupied)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_eat_requires_table_chair() {
        let room = room(3);
        let sink = Arc::new(MemorySink::new());
        let mut hungry = philosopher(&room, 2, &sink);

        assert_eq!(
            hungry.eat().await,
            Err(ProtocolError::NotSeated { who: PhilosopherId(2) })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_eat_requires_preference() {
        let room = room(3);
        let sink = Arc::new(MemorySink::new());
        let mut hungry = philosopher(&room, 0, &sink);
        hungry.seek_seat().await.unwrap();

        assert_eq!(
            hungry.eat().await,
            Err(ProtocolError::InvalidHand { code: NO_HAND })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_eat_releases_both_forks() {
        let room = room(3);
        let sink = Arc::new(MemorySink::new());
        let mut hungry = philosopher(&room, 0, &sink);
        hungry.negotiate().await.unwrap();

        hungry.eat().await.unwrap();

        assert_eq!(room.philosopher(PhilosopherId(0)).meals(), 1);
        assert!(room.forks().iter().all(|fork| fork.holder().is_none()));
        assert_eq!(
            sink.events_of(PhilosopherId(0)).last(),
            Some(&Event::EatsMeal { meals: 1 })
        );
    }

    #[test]
    fn test_summary_reports_corrupt_preference() {
        let room = room(2);
        let sink = Arc::new(MemorySink::new());
        let guest = philosopher(&room, 1, &sink);
        room.philosopher(PhilosopherId(1)).set_preferred(Some(Hand::Left));
        assert_eq!(guest.summary().unwrap().preferred, Some(Hand::Left));

        room.philosopher(PhilosopherId(1))
            .preferred
            .store(9, Ordering::Release);
        assert_eq!(
            guest.summary().unwrap_err(),
            ProtocolError::InvalidHand { code: 9 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_lone_philosopher_eats_once_and_leaves() {
        let room = room(1);
        let sink = Arc::new(MemorySink::new());
        let summary = philosopher(&room, 0, &sink).run().await.unwrap();

        assert_eq!(summary.meals, 1);
        assert_eq!(summary.name, "philosopher 0");
        assert!(room.philosopher(PhilosopherId(0)).seat().is_none());
        assert_eq!(room.seated(), 0);
        assert_eq!(sink.events_of(PhilosopherId(0)).last(), Some(&Event::Leaves));
    }
}
