use crate::output::print_json;
use anyhow::Context;
use lccusum_core::store;
use std::path::Path;

pub fn run(root: &Path, trainee: &str, procedure: &str, json: bool) -> anyhow::Result<()> {
    let mut tracker = store::load_tracker(root, trainee, procedure)?;
    let state = tracker.reset()?.clone();
    store::save_tracker(root, &tracker).context("failed to save tracker")?;

    if json {
        print_json(&state)?;
    } else {
        let closed = tracker.closed_cycles().last();
        println!(
            "{trainee}/{procedure}: closed cycle {} ({}), opened cycle {}",
            closed.map_or(0, |c| c.cycle),
            closed.map_or_else(|| "-".to_string(), |c| c.status.to_string()),
            state.cycle
        );
    }
    Ok(())
}
