//! The room: owner of chairs, forks, philosophers and the meal record.
//!
//! ```text
//!        fork 0   chair 0   fork 1   chair 1   fork 2  ...  chair n-1   fork 0
//!          └── left ──┘└── right ──┘└── left ──┘              └── right ──┘
//! ```
//!
//! Chair `i` is bordered by fork `i` on its left and fork `(i + 1) % n` on
//! its right. The room is the only owner of chairs and philosophers; both
//! refer to each other by index. It is also the [`SeatObserver`] of every
//! chair, keeping philosopher seat records and the seated counter in step.

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, MutexGuard};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::config::RoomConfig;
use crate::error::ProtocolError;
use crate::events::EventSink;
use crate::fork::{Fork, ForkId};
use crate::hand::HandSet;
use crate::philosopher::{Philosopher, PhilosopherId, PhilosopherState, PhilosopherSummary};
use crate::seat::{Seat, SeatObserver, SeatRef};

/// One entry of the meal record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meal {
    pub philosopher: PhilosopherId,
    /// Milliseconds since the room opened
    pub elapsed_ms: u64,
}

impl fmt::Display for Meal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ate meal at {}", self.philosopher.name(), self.elapsed_ms)
    }
}

/// Everything a finished simulation produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationReport {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub size: usize,
    /// Base seed the philosophers' random sources were derived from
    pub seed: u64,
    /// Meals in the order they were eaten
    pub meals: Vec<Meal>,
    pub philosophers: Vec<PhilosopherSummary>,
}

impl SimulationReport {
    pub fn meals_of(&self, who: PhilosopherId) -> usize {
        self.meals.iter().filter(|meal| meal.philosopher == who).count()
    }

    /// Save the report to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

pub struct Room {
    config: RoomConfig,
    seed: u64,
    forks: Vec<Fork>,
    chairs: Vec<Seat>,
    separate: Seat,
    philosophers: Vec<PhilosopherState>,
    /// Philosophers currently on a table chair
    seated: AtomicUsize,
    /// Serializes walks around the table; FIFO so no seeker waits forever
    scan: tokio::sync::Mutex<()>,
    meals_tx: mpsc::UnboundedSender<Meal>,
    meals_rx: Mutex<mpsc::UnboundedReceiver<Meal>>,
    opened_at: Instant,
}

impl fmt::Debug for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Room")
            .field("size", &self.size())
            .field("seed", &self.seed)
            .field("seated", &self.seated())
            .finish()
    }
}

impl Room {
    /// Lay out `config.size` forks, chairs and philosophers in a ring.
    pub fn new(config: RoomConfig) -> Result<Self> {
        config.validate()?;
        let n = config.size;
        let seed = config.seed.unwrap_or_else(|| rand::rng().random());

        let forks = (0..n).map(|i| Fork::new(ForkId(i))).collect();
        let chairs = (0..n)
            .map(|i| Seat::table(i, ForkId(i), ForkId((i + 1) % n)))
            .collect();
        let philosophers = (0..n).map(|_| PhilosopherState::default()).collect();
        let (meals_tx, meals_rx) = mpsc::unbounded_channel();

        Ok(Self {
            config,
            seed,
            forks,
            chairs,
            separate: Seat::separate(),
            philosophers,
            seated: AtomicUsize::new(0),
            scan: tokio::sync::Mutex::new(()),
            meals_tx,
            meals_rx: Mutex::new(meals_rx),
            opened_at: Instant::now(),
        })
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Ring size: chairs, forks and philosophers alike.
    pub fn size(&self) -> usize {
        self.chairs.len()
    }

    pub fn chair(&self, index: usize) -> &Seat {
        &self.chairs[index]
    }

    pub fn chairs(&self) -> &[Seat] {
        &self.chairs
    }

    pub fn separate_chair(&self) -> &Seat {
        &self.separate
    }

    pub fn seat(&self, seat: SeatRef) -> &Seat {
        match seat {
            SeatRef::Table(index) => &self.chairs[index],
            SeatRef::Separate => &self.separate,
        }
    }

    /// Ring index of a chair; `None` for the separate chair.
    pub fn chair_index(&self, seat: &Seat) -> Option<usize> {
        seat.id().table_index()
    }

    pub fn fork(&self, id: ForkId) -> &Fork {
        &self.forks[id.0]
    }

    pub fn forks(&self) -> &[Fork] {
        &self.forks
    }

    pub fn philosopher(&self, id: PhilosopherId) -> &PhilosopherState {
        &self.philosophers[id.0]
    }

    pub fn philosophers(&self) -> &[PhilosopherState] {
        &self.philosophers
    }

    /// Number of philosophers on table chairs.
    pub fn seated(&self) -> usize {
        self.seated.load(Ordering::Acquire)
    }

    /// Number of table chairs with an occupant, counted chair by chair.
    pub fn occupied_chairs(&self) -> usize {
        self.chairs.iter().filter(|chair| !chair.is_free()).count()
    }

    /// Distinct preferred hands currently held by anyone in the room.
    pub fn preferences(&self) -> Result<HandSet, ProtocolError> {
        let mut hands = HandSet::new();
        for state in &self.philosophers {
            if let Some(hand) = state.preferred()? {
                hands.insert(hand);
            }
        }
        Ok(hands)
    }

    /// Append a meal to the record, stamped with the time since opening.
    pub fn record_meal(&self, who: PhilosopherId) {
        let meal = Meal {
            philosopher: who,
            elapsed_ms: self.opened_at.elapsed().as_millis() as u64,
        };
        // The receiver lives as long as the room, so this cannot fail.
        let _ = self.meals_tx.send(meal);
    }

    /// Take the advisory lock that serializes walks around the table.
    pub async fn lock_scan(&self) -> MutexGuard<'_, ()> {
        self.scan.lock().await
    }

    /// Let every philosopher in, wait for all of them to leave, and return
    /// the meal record.
    ///
    /// A philosopher that breaks the protocol ends its own task. Its error is
    /// reported here once everybody else has been joined.
    pub async fn run(self: Arc<Self>, sink: Arc<dyn EventSink>) -> Result<SimulationReport> {
        let started_at = Utc::now();
        info!(size = self.size(), seed = self.seed, "Opening room");

        let mut tasks = JoinSet::new();
        for index in 0..self.size() {
            let id = PhilosopherId(index);
            let rng = ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(index as u64));
            let philosopher = Philosopher::new(id, self.clone(), rng, sink.clone());
            tasks.spawn(async move { (id, philosopher.run().await) });
        }

        let mut summaries = Vec::with_capacity(self.size());
        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((id, Ok(summary))) => {
                    debug!(philosopher = %id.name(), meals = summary.meals, "Philosopher left");
                    summaries.push(summary);
                }
                Ok((id, Err(err))) => {
                    error!(philosopher = %id.name(), error = %err, "Philosopher broke the protocol");
                    failures.push(anyhow!(err).context(format!("{} failed", id.name())));
                }
                Err(err) => {
                    error!(error = %err, "Philosopher task did not finish");
                    failures.push(anyhow!(err).context("philosopher task panicked"));
                }
            }
        }
        first_failure(failures, self.size())?;

        info!("All philosophers left, main process listing all meals");
        summaries.sort_by_key(|summary| summary.id);
        let meals = self.drain_meals();

        Ok(SimulationReport {
            started_at,
            ended_at: Utc::now(),
            size: self.size(),
            seed: self.seed,
            meals,
            philosophers: summaries,
        })
    }

    fn drain_meals(&self) -> Vec<Meal> {
        let mut rx = self.meals_rx.lock().unwrap_or_else(PoisonError::into_inner);
        let mut meals = Vec::new();
        while let Ok(meal) = rx.try_recv() {
            meals.push(meal);
        }
        meals
    }
}

/// Fold the failed tasks of a run into its first error, counting the rest.
fn first_failure(failures: Vec<anyhow::Error>, size: usize) -> Result<()> {
    let failed = failures.len();
    match failures.into_iter().next() {
        Some(first) => Err(first.context(format!("{} of {} philosophers failed", failed, size))),
        None => Ok(()),
    }
}

impl SeatObserver for Room {
    fn seat_changed(&self, who: PhilosopherId, seat: Option<SeatRef>) {
        let previous = self.philosophers[who.0].replace_seat(seat);
        let was_at_table = matches!(previous, Some(SeatRef::Table(_)));
        let is_at_table = matches!(seat, Some(SeatRef::Table(_)));
        match (was_at_table, is_at_table) {
            (false, true) => {
                self.seated.fetch_add(1, Ordering::AcqRel);
            }
            (true, false) => {
                self.seated.fetch_sub(1, Ordering::AcqRel);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DelayConfig;
    use crate::events::MemorySink;
    use crate::hand::Hand;

    fn config(size: usize, seed: u64) -> RoomConfig {
        RoomConfig {
            size,
            think: DelayConfig::default(),
            seed: Some(seed),
        }
    }

    #[test]
    fn test_ring_adjacency() {
        let room = Room::new(config(4, 0)).unwrap();
        assert_eq!(room.size(), 4);
        assert_eq!(room.forks().len(), 4);
        assert_eq!(room.philosophers().len(), 4);

        assert_eq!(room.chair(0).fork(Hand::Left), Some(ForkId(0)));
        assert_eq!(room.chair(0).fork(Hand::Right), Some(ForkId(1)));
        assert_eq!(room.chair(3).fork(Hand::Left), Some(ForkId(3)));
        assert_eq!(room.chair(3).fork(Hand::Right), Some(ForkId(0)));

        assert_eq!(room.chair_index(room.chair(2)), Some(2));
        assert_eq!(room.chair_index(room.separate_chair()), None);
    }

    #[test]
    fn test_failures_keep_first_cause_and_count() {
        assert!(first_failure(Vec::new(), 3).is_ok());

        let failures = vec![
            anyhow!(ProtocolError::NotSeated { who: PhilosopherId(2) }).context("philosopher 2 failed"),
            anyhow!(ProtocolError::InvalidHand { code: 7 }).context("philosopher 0 failed"),
        ];
        let err = first_failure(failures, 5).unwrap_err();

        assert_eq!(err.to_string(), "2 of 5 philosophers failed");
        let chain: Vec<String> = err.chain().map(ToString::to_string).collect();
        assert_eq!(chain[1], "philosopher 2 failed");
        assert!(err.chain().all(|cause| !cause.to_string().contains("philosopher 0")));
    }

    #[test]
    fn test_report_save_writes_json() {
        let report = SimulationReport {
            started_at: Utc::now(),
            ended_at: Utc::now(),
            size: 2,
            seed: 9,
            meals: vec![
                Meal { philosopher: PhilosopherId(1), elapsed_ms: 640 },
                Meal { philosopher: PhilosopherId(0), elapsed_ms: 1210 },
            ],
            philosophers: Vec::new(),
        };

        let path = std::env::temp_dir().join(format!("room-report-{}.json", std::process::id()));
        report.save(&path).unwrap();
        let json = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        let loaded: SimulationReport = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.seed, 9);
        assert_eq!(loaded.meals, report.meals);
        assert_eq!(loaded.meals_of(PhilosopherId(1)), 1);
    }

    #[test]
    fn test_size_zero_is_rejected() {
        assert!(Room::new(config(0, 0)).is_err());
    }

    #[test]
    fn test_seated_counter_ignores_separate_chair() {
        let room = Room::new(config(3, 0)).unwrap();
        let who = PhilosopherId(1);

        assert!(room.chair(1).try_occupy(who, &room));
        assert_eq!(room.seated(), 1);
        assert_eq!(room.philosopher(who).seat(), Some(SeatRef::Table(1)));

        room.chair(1).vacate(who, &room).unwrap();
        assert_eq!(room.seated(), 0);
        assert!(room.philosopher(who).seat().is_none());

        assert!(!room.separate_chair().try_occupy(who, &room));
        assert_eq!(room.seated(), 0);
    }

    #[test]
    fn test_preferences_union() {
        let room = Room::new(config(3, 0)).unwrap();
        assert!(room.preferences().unwrap().is_empty());

        room.philosopher(PhilosopherId(0)).set_preferred(Some(Hand::Right));
        room.philosopher(PhilosopherId(2)).set_preferred(Some(Hand::Right));
        assert_eq!(
            room.preferences().unwrap().into_iter().collect::<Vec<_>>(),
            vec![Hand::Right]
        );

        room.philosopher(PhilosopherId(1)).set_preferred(Some(Hand::Left));
        assert_eq!(room.preferences().unwrap().len(), 2);
    }

    #[test]
    fn test_meal_text() {
        let meal = Meal {
            philosopher: PhilosopherId(3),
            elapsed_ms: 1520,
        };
        assert_eq!(meal.to_string(), "philosopher 3 ate meal at 1520");
    }

    #[tokio::test(start_paused = true)]
    async fn test_five_philosophers_eat_twenty_five_meals() {
        let room = Arc::new(Room::new(config(5, 42)).unwrap());
        let sink = Arc::new(MemorySink::new());

        let report = room.clone().run(sink.clone()).await.unwrap();

        assert_eq!(report.meals.len(), 25);
        for id in 0..5 {
            assert_eq!(report.meals_of(PhilosopherId(id)), 5);
            assert_eq!(report.philosophers[id].meals, 5);
        }
        assert!(report
            .meals
            .windows(2)
            .all(|pair| pair[0].elapsed_ms <= pair[1].elapsed_ms));
        assert_eq!(room.seated(), 0);
        assert_eq!(room.occupied_chairs(), 0);
        assert!(room.separate_chair().is_free());
        assert_eq!(sink.diversification_violations(), 0);
        assert_eq!(sink.separate_chair_overlaps(), 0);
    }
}
