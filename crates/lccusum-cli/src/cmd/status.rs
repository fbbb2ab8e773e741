use crate::output::{fmt_score, print_json, print_table};
use lccusum_core::store;
use lccusum_core::tracker::chart_points;
use std::path::Path;

// ---------------------------------------------------------------------------
// status
// ---------------------------------------------------------------------------

pub fn status(root: &Path, trainee: &str, procedure: &str, json: bool) -> anyhow::Result<()> {
    let tracker = store::load_tracker(root, trainee, procedure)?;
    let state = tracker.state();
    let params = tracker.params()?;

    if json {
        let value = serde_json::json!({
            "state": state,
            "rates": tracker.rates(),
            "h": params.h(),
            "post_decision": state.post_decision_count(),
            "closed_cycles": tracker.closed_cycles().len(),
        });
        print_json(&value)?;
        return Ok(());
    }

    let rates = tracker.rates();
    println!("{trainee}/{procedure}  cycle {}", state.cycle);
    println!("  status:   {}", state.status);
    println!("  attempts: {}", state.highest_index);
    println!(
        "  sum:      {}  (h = {})",
        fmt_score(state.cumulative_sum),
        fmt_score(params.h())
    );
    if let Some(i) = state.decided_at_index {
        println!(
            "  decided:  attempt {i} ({} recorded since)",
            state.post_decision_count()
        );
    }
    println!(
        "  rates:    p0={} p1={} alpha={} beta={} ({})",
        rates.p0, rates.p1, rates.alpha, rates.beta, rates.source
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// history
// ---------------------------------------------------------------------------

pub fn history(root: &Path, trainee: &str, procedure: &str, json: bool) -> anyhow::Result<()> {
    let tracker = store::load_tracker(root, trainee, procedure)?;
    let closed = tracker.closed_cycles();

    if json {
        let value = serde_json::json!({
            "closed": closed,
            "open": tracker.state(),
        });
        print_json(&value)?;
        return Ok(());
    }

    if closed.is_empty() {
        println!("No closed cycles for {trainee}/{procedure}.");
        return Ok(());
    }

    let rows = closed
        .iter()
        .map(|c| {
            vec![
                c.cycle.to_string(),
                c.status.to_string(),
                c.decided_at_index
                    .map_or_else(|| "-".to_string(), |i| i.to_string()),
                c.highest_index.to_string(),
                fmt_score(c.cumulative_sum),
            ]
        })
        .collect();
    print_table(&["CYCLE", "STATUS", "DECIDED AT", "ATTEMPTS", "SUM"], rows);
    Ok(())
}

// ---------------------------------------------------------------------------
// chart
// ---------------------------------------------------------------------------

pub fn chart(root: &Path, trainee: &str, procedure: &str, json: bool) -> anyhow::Result<()> {
    let tracker = store::load_tracker(root, trainee, procedure)?;
    let records = store::load_outcomes(root, trainee, procedure)?;
    let points = chart_points(tracker.state(), &records);

    if json {
        let value = serde_json::json!({
            "cycle": tracker.state().cycle,
            "h": tracker.params()?.h(),
            "points": points,
        });
        print_json(&value)?;
        return Ok(());
    }

    if points.is_empty() {
        println!("No attempts in the open cycle.");
        return Ok(());
    }

    let rows = points
        .iter()
        .map(|p| {
            vec![
                p.attempt.to_string(),
                if p.success { "S" } else { "F" }.to_string(),
                fmt_score(p.score),
                p.recorded_at.format("%Y-%m-%d %H:%M").to_string(),
            ]
        })
        .collect();
    print_table(&["ATTEMPT", "RESULT", "SCORE", "RECORDED"], rows);
    Ok(())
}
