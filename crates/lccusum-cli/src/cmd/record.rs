use crate::output::{fmt_score, print_json};
use anyhow::Context;
use lccusum_core::config::Config;
use lccusum_core::outcome::OutcomeRecord;
use lccusum_core::tracker::LearningCurveTracker;
use lccusum_core::types::AutonomyLevel;
use lccusum_core::{paths, store};
use std::path::Path;

pub struct RecordArgs<'a> {
    pub trainee: &'a str,
    pub procedure: &'a str,
    pub validated: Option<bool>,
    pub autonomy: Option<&'a str>,
    pub index: Option<u64>,
    pub team: Option<&'a str>,
}

pub fn run(root: &Path, args: RecordArgs<'_>, json: bool) -> anyhow::Result<()> {
    paths::validate_id(args.trainee)?;
    paths::validate_id(args.procedure)?;
    let autonomy = args
        .autonomy
        .map(str::parse::<AutonomyLevel>)
        .transpose()?;
    if args.validated.is_none() && autonomy.is_none() {
        anyhow::bail!("give --success, --failure, or --autonomy");
    }

    let config = Config::load(root).context("failed to load config")?;
    let mut tracker = match store::try_load_tracker(root, args.trainee, args.procedure)? {
        Some(t) => t,
        None => {
            let rates = config
                .resolver()
                .resolve(args.procedure, args.team, None)?;
            LearningCurveTracker::start(args.trainee, args.procedure, rates)?
        }
    };

    let highest = tracker.state().highest_index;
    let index = args.index.unwrap_or(highest + 1);
    let record = OutcomeRecord::new(
        args.trainee,
        args.procedure,
        tracker.state().cycle,
        index,
        args.validated,
        autonomy,
    )?;
    let was_decided = tracker.state().is_decided();
    let state = tracker.append(record.outcome())?.clone();

    // Replays change nothing and are not stored twice.
    let replayed = index <= highest;
    if !replayed {
        store::commit_outcome(root, &tracker, &record).context("failed to store outcome")?;
    }

    if json {
        let value = serde_json::json!({
            "record": record,
            "replayed": replayed,
            "state": state,
        });
        print_json(&value)?;
        return Ok(());
    }

    if replayed {
        println!(
            "attempt {index} already recorded for {}/{}; nothing changed",
            args.trainee, args.procedure
        );
        return Ok(());
    }
    let result = if record.success() { "success" } else { "failure" };
    println!(
        "{}/{} cycle {} attempt {index}: {result}, sum {}",
        args.trainee,
        args.procedure,
        state.cycle,
        fmt_score(state.trajectory.last().copied().unwrap_or(0.0)),
    );
    if !was_decided && state.is_decided() {
        println!("decision: {} at attempt {index}", state.status);
    } else if was_decided {
        println!("cycle already decided: {}", state.status);
    }
    Ok(())
}
