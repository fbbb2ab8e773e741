//! File-backed store for outcome records and tracker state.
//!
//! Layout per `(trainee, procedure)`:
//! `.lccusum/trainees/<trainee>/<procedure>/outcomes.yaml` holds the
//! append-only record list, `tracker.yaml` the serialized
//! [`LearningCurveTracker`].

use crate::error::{CusumError, Result};
use crate::io;
use crate::outcome::OutcomeRecord;
use crate::paths;
use crate::registry::TrackerRegistry;
use crate::tracker::{LearningCurveTracker, TrackerKey};
use std::path::Path;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// All stored records for a key, oldest first. Empty if none were recorded.
pub fn load_outcomes(root: &Path, trainee: &str, procedure: &str) -> Result<Vec<OutcomeRecord>> {
    let path = paths::outcomes_path(root, trainee, procedure);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let data = std::fs::read_to_string(&path)?;
    let records: Vec<OutcomeRecord> = serde_yaml::from_str(&data)?;
    Ok(records)
}

/// Appends a record. A record already stored for the same cycle and index
/// is kept as is.
pub fn append_outcome(root: &Path, record: &OutcomeRecord) -> Result<()> {
    let mut records = load_outcomes(root, &record.trainee, &record.procedure)?;
    if records
        .iter()
        .any(|r| r.cycle == record.cycle && r.index == record.index)
    {
        return Ok(());
    }
    records.push(record.clone());
    let data = serde_yaml::to_string(&records)?;
    io::atomic_write(
        &paths::outcomes_path(root, &record.trainee, &record.procedure),
        data.as_bytes(),
    )
}

// ---------------------------------------------------------------------------
// Trackers
// ---------------------------------------------------------------------------

pub fn try_load_tracker(
    root: &Path,
    trainee: &str,
    procedure: &str,
) -> Result<Option<LearningCurveTracker>> {
    let path = paths::tracker_path(root, trainee, procedure);
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read_to_string(&path)?;
    let tracker: LearningCurveTracker = serde_yaml::from_str(&data)?;
    Ok(Some(tracker))
}

pub fn load_tracker(root: &Path, trainee: &str, procedure: &str) -> Result<LearningCurveTracker> {
    try_load_tracker(root, trainee, procedure)?.ok_or_else(|| CusumError::TrackerNotFound {
        trainee: trainee.to_string(),
        procedure: procedure.to_string(),
    })
}

pub fn save_tracker(root: &Path, tracker: &LearningCurveTracker) -> Result<()> {
    let key = tracker.key();
    paths::validate_id(&key.trainee)?;
    paths::validate_id(&key.procedure)?;
    let data = serde_yaml::to_string(tracker)?;
    io::atomic_write(
        &paths::tracker_path(root, &key.trainee, &key.procedure),
        data.as_bytes(),
    )
}

/// Persists a freshly applied outcome: the tracker first, then the record.
/// A failure between the two leaves the tracker ahead of the record list,
/// never a stored record the tracker has not folded.
pub fn commit_outcome(
    root: &Path,
    tracker: &LearningCurveTracker,
    record: &OutcomeRecord,
) -> Result<()> {
    save_tracker(root, tracker)?;
    append_outcome(root, record)
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

fn sorted_subdirs(dir: &Path) -> Result<Vec<String>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

pub fn list_trainees(root: &Path) -> Result<Vec<String>> {
    sorted_subdirs(&paths::trainees_dir(root))
}

/// Every key with a saved tracker, sorted.
pub fn list_trackers(root: &Path) -> Result<Vec<TrackerKey>> {
    let mut keys = Vec::new();
    for trainee in list_trainees(root)? {
        for procedure in sorted_subdirs(&paths::trainee_dir(root, &trainee))? {
            if paths::tracker_path(root, &trainee, &procedure).exists() {
                keys.push(TrackerKey::new(trainee.clone(), procedure));
            }
        }
    }
    Ok(keys)
}

/// Loads every saved tracker into a fresh registry.
pub fn load_registry(root: &Path) -> Result<TrackerRegistry> {
    let registry = TrackerRegistry::new();
    for key in list_trackers(root)? {
        let tracker = load_tracker(root, &key.trainee, &key.procedure)?;
        registry.insert(tracker);
    }
    Ok(registry)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
