use crate::output::{print_json, print_table};
use anyhow::Context;
use lccusum_core::config::Config;
use lccusum_core::outcome::outcomes_for_cycle;
use lccusum_core::store;
use std::path::Path;

/// Rebuilds one tracker's open cycle under the currently resolved rates.
pub fn run(
    root: &Path,
    trainee: &str,
    procedure: &str,
    team: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let mut tracker = store::load_tracker(root, trainee, procedure)?;
    let rates = config.resolver().resolve(procedure, team, None)?;
    let records = store::load_outcomes(root, trainee, procedure)?;
    let cycle = tracker.state().cycle;
    let outcomes = outcomes_for_cycle(&records, cycle);

    let before = tracker.state().status;
    let state = tracker.recompute(cycle, rates, &outcomes)?.clone();
    store::save_tracker(root, &tracker).context("failed to save tracker")?;

    if json {
        let value = serde_json::json!({
            "before": before,
            "state": state,
            "rates": rates,
        });
        print_json(&value)?;
    } else {
        println!(
            "{trainee}/{procedure} cycle {}: {before} -> {} over {} attempts",
            state.cycle, state.status, state.highest_index
        );
    }
    Ok(())
}

/// Rebuilds every stored tracker in parallel.
pub fn run_all(root: &Path, team: Option<&str>, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let registry = store::load_registry(root)?;
    let resolver = config.resolver();

    let mut jobs = Vec::new();
    for key in registry.keys() {
        let Some(state) = registry.snapshot(&key) else {
            continue;
        };
        let rates = resolver.resolve(&key.procedure, team, None)?;
        let records = store::load_outcomes(root, &key.trainee, &key.procedure)?;
        jobs.push((key, state.cycle, rates, outcomes_for_cycle(&records, state.cycle)));
    }

    let mut rows = Vec::new();
    let mut failed = 0usize;
    for (key, result) in registry.recompute_batch(jobs) {
        match result {
            Ok(state) => {
                if let Some(tracker) = registry.tracker(&key) {
                    store::save_tracker(root, &tracker)
                        .with_context(|| format!("failed to save tracker {key}"))?;
                }
                rows.push((key, Ok(state)));
            }
            Err(e) => {
                failed += 1;
                tracing::warn!(key = %key, error = %e, "recompute failed");
                rows.push((key, Err(e)));
            }
        }
    }

    if json {
        let items: Vec<_> = rows
            .iter()
            .map(|(key, res)| match res {
                Ok(state) => serde_json::json!({ "key": key, "state": &**state }),
                Err(e) => serde_json::json!({ "key": key, "error": e.code(), "message": e.to_string() }),
            })
            .collect();
        print_json(&serde_json::json!({ "results": items }))?;
    } else if rows.is_empty() {
        println!("No trackers to recompute.");
    } else {
        let table = rows
            .iter()
            .map(|(key, res)| match res {
                Ok(state) => vec![
                    key.to_string(),
                    state.cycle.to_string(),
                    state.status.to_string(),
                    state.highest_index.to_string(),
                ],
                Err(e) => vec![key.to_string(), "-".into(), format!("error: {e}"), "-".into()],
            })
            .collect();
        print_table(&["TRACKER", "CYCLE", "STATUS", "ATTEMPTS"], table);
    }

    if failed > 0 {
        anyhow::bail!("{failed} tracker(s) failed to recompute");
    }
    Ok(())
}
