//! Forks: the binary resources shared by neighbouring chairs.
//!
//! A fork is a plain mutual-exclusion primitive. Holding one is represented
//! by a [`ForkGuard`]; releasing it is dropping the guard, so only the holder
//! can ever release a fork and it is released on every exit path.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};

use crate::philosopher::PhilosopherId;

const NO_HOLDER: usize = usize::MAX;

/// Position of a fork in the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ForkId(pub usize);

impl fmt::Display for ForkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fork nr {}", self.0)
    }
}

#[derive(Debug)]
pub struct Fork {
    id: ForkId,
    lock: Mutex<()>,
    /// Current holder, for observation only; the mutex is what excludes.
    holder: AtomicUsize,
}

/// Proof that a philosopher holds a fork. Dropping it puts the fork down.
#[derive(Debug)]
pub struct ForkGuard<'a> {
    fork: &'a Fork,
    _held: MutexGuard<'a, ()>,
}

impl Fork {
    pub fn new(id: ForkId) -> Self {
        Self {
            id,
            lock: Mutex::new(()),
            holder: AtomicUsize::new(NO_HOLDER),
        }
    }

    /// Wait until the fork is free, then pick it up.
    pub async fn acquire(&self, who: PhilosopherId) -> ForkGuard<'_> {
        let held = self.lock.lock().await;
        let previous = self.holder.swap(who.0, Ordering::AcqRel);
        debug_assert_eq!(previous, NO_HOLDER, "{} picked up while held", self.id);
        ForkGuard {
            fork: self,
            _held: held,
        }
    }

    /// The philosopher currently holding this fork, if any.
    pub fn holder(&self) -> Option<PhilosopherId> {
        match self.holder.load(Ordering::Acquire) {
            NO_HOLDER => None,
            id => Some(PhilosopherId(id)),
        }
    }
}

impl ForkGuard<'_> {
    /// Put the fork down.
    pub fn release(self) {}
}

impl Drop for ForkGuard<'_> {
    fn drop(&mut self) {
        // Cleared while the mutex is still held, so a new holder never sees a stale one.
        self.fork.holder.store(NO_HOLDER, Ordering::Release);
    }
}
