//! In-process home for many trackers.
//!
//! Mutations (`append`, `reset`, `recompute`) are serialized per key by a
//! writer mutex; different keys never contend. Each key also publishes its
//! latest committed `CusumState` as an `Arc` snapshot, so readers only take a
//! short read lock to clone the pointer and never wait on a writer's fold.

use crate::engine::Outcome;
use crate::error::{CusumError, Result};
use crate::rates::ResolvedRates;
use crate::tracker::{CusumState, LearningCurveTracker, TrackerKey};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

struct Slot {
    writer: Mutex<LearningCurveTracker>,
    snapshot: RwLock<Arc<CusumState>>,
}

impl Slot {
    fn new(tracker: LearningCurveTracker) -> Self {
        let snapshot = Arc::new(tracker.state().clone());
        Self {
            writer: Mutex::new(tracker),
            snapshot: RwLock::new(snapshot),
        }
    }

    // Trackers are only replaced after a successful step, so a poisoned
    // lock still guards a consistent value.
    fn lock(&self) -> MutexGuard<'_, LearningCurveTracker> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &CusumState) -> Arc<CusumState> {
        let fresh = Arc::new(state.clone());
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&fresh);
        fresh
    }

    fn read(&self) -> Arc<CusumState> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }
}

#[derive(Default)]
pub struct TrackerRegistry {
    slots: RwLock<HashMap<TrackerKey, Arc<Slot>>>,
}

impl TrackerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tracker. Returns `false` and leaves the existing one in
    /// place if the key is already known.
    pub fn insert(&self, tracker: LearningCurveTracker) -> bool {
        let key = tracker.key();
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        if slots.contains_key(&key) {
            return false;
        }
        slots.insert(key, Arc::new(Slot::new(tracker)));
        true
    }

    pub fn keys(&self) -> Vec<TrackerKey> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<TrackerKey> = slots.keys().cloned().collect();
        keys.sort();
        keys
    }

    fn slot(&self, key: &TrackerKey) -> Result<Arc<Slot>> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots
            .get(key)
            .cloned()
            .ok_or_else(|| CusumError::TrackerNotFound {
                trainee: key.trainee.clone(),
                procedure: key.procedure.clone(),
            })
    }

    /// Latest committed state of the open cycle.
    pub fn snapshot(&self, key: &TrackerKey) -> Option<Arc<CusumState>> {
        self.slot(key).ok().map(|s| s.read())
    }

    /// Copy of the whole tracker, closed cycles included.
    pub fn tracker(&self, key: &TrackerKey) -> Option<LearningCurveTracker> {
        self.slot(key).ok().map(|s| s.lock().clone())
    }

    pub fn append(&self, key: &TrackerKey, outcome: Outcome) -> Result<Arc<CusumState>> {
        let slot = self.slot(key)?;
        let mut tracker = slot.lock();
        let state = tracker.append(outcome)?;
        Ok(slot.publish(state))
    }

    pub fn reset(&self, key: &TrackerKey) -> Result<Arc<CusumState>> {
        let slot = self.slot(key)?;
        let mut tracker = slot.lock();
        let state = tracker.reset()?;
        Ok(slot.publish(state))
    }

    /// Rebuilds a key's open cycle. The fold runs on a copy outside the
    /// writer lock; the lock is held again only to swap the result in. If the
    /// tracker moved in between, nothing is swapped and the caller has to
    /// reload the outcomes.
    pub fn recompute(
        &self,
        key: &TrackerKey,
        cycle: u32,
        rates: ResolvedRates,
        outcomes: &[Outcome],
    ) -> Result<Arc<CusumState>> {
        let slot = self.slot(key)?;
        let mut copy = slot.lock().clone();
        let seen = copy.state().highest_index;
        copy.recompute(cycle, rates, outcomes)?;

        let mut tracker = slot.lock();
        let now = tracker.state();
        if now.cycle != cycle {
            return Err(CusumError::StaleCycle {
                current: now.cycle,
                requested: cycle,
            });
        }
        if now.highest_index != seen {
            tracing::debug!(key = %key, cycle, "tracker moved during recompute");
            return Err(CusumError::TrackerMoved { cycle });
        }
        *tracker = copy;
        Ok(slot.publish(tracker.state()))
    }

    /// Recomputes many keys in parallel. Each job only touches its own key.
    pub fn recompute_batch(
        &self,
        jobs: Vec<(TrackerKey, u32, ResolvedRates, Vec<Outcome>)>,
    ) -> Vec<(TrackerKey, Result<Arc<CusumState>>)> {
        if jobs.is_empty() {
            return Vec::new();
        }
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .min(jobs.len());
        let chunk = jobs.len().div_ceil(workers);

        std::thread::scope(|scope| {
            let handles: Vec<_> = jobs
                .chunks(chunk)
                .map(|batch| {
                    scope.spawn(move || {
                        batch
                            .iter()
                            .map(|(key, cycle, rates, outcomes)| {
                                (key.clone(), self.recompute(key, *cycle, *rates, outcomes))
                            })
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| match h.join() {
                    Ok(results) => results,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
