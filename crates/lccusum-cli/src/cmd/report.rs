use crate::output::{print_json, print_table};
use anyhow::Context;
use lccusum_core::alerts::{self, ProgressCell};
use lccusum_core::config::Config;
use lccusum_core::store;
use std::collections::BTreeMap;
use std::path::Path;

// ---------------------------------------------------------------------------
// alerts
// ---------------------------------------------------------------------------

pub fn alerts(root: &Path, team: &str, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let team_cfg = config
        .team(team)
        .with_context(|| format!("team '{team}' is not configured"))?;

    let mut found = Vec::new();
    for key in store::list_trackers(root)? {
        let Some(threshold) = team_cfg.thresholds.get(&key.procedure) else {
            continue;
        };
        let tracker = store::load_tracker(root, &key.trainee, &key.procedure)?;
        let records = store::load_outcomes(root, &key.trainee, &key.procedure)?;
        if let Some(alert) = alerts::detect(&tracker, &records, threshold) {
            found.push(alert);
        }
    }

    if json {
        print_json(&serde_json::json!({ "team": team, "alerts": found }))?;
        return Ok(());
    }

    if found.is_empty() {
        println!("No confidence alerts for team '{team}'.");
        return Ok(());
    }

    let rows = found
        .iter()
        .map(|a| {
            vec![
                a.trainee.clone(),
                a.procedure.clone(),
                a.kind.to_string(),
                a.attempts.to_string(),
                a.declared_at
                    .map_or_else(|| "-".to_string(), |i| i.to_string()),
                format!("{}..{}", a.min_procedures, a.max_procedures),
            ]
        })
        .collect();
    print_table(
        &["TRAINEE", "PROCEDURE", "ALERT", "ATTEMPTS", "AUTONOMOUS AT", "EXPECTED"],
        rows,
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// matrix
// ---------------------------------------------------------------------------

pub fn matrix(root: &Path, team: Option<&str>, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let procedures: Vec<&String> = config.procedures.keys().collect();

    let mut matrix: BTreeMap<String, BTreeMap<String, ProgressCell>> = BTreeMap::new();
    for trainee in store::list_trainees(root)? {
        let row = matrix.entry(trainee.clone()).or_default();
        for procedure in &procedures {
            let tracker = store::try_load_tracker(root, &trainee, procedure)?;
            let records = store::load_outcomes(root, &trainee, procedure)?;
            let threshold = team.and_then(|t| config.threshold_for(t, procedure));
            let cell = alerts::progress_cell(tracker.as_ref(), &records, threshold);
            row.insert((*procedure).clone(), cell);
        }
    }

    if json {
        print_json(&serde_json::json!({
            "team": team,
            "procedures": procedures,
            "trainees": matrix,
        }))?;
        return Ok(());
    }

    if matrix.is_empty() {
        println!("No trainees recorded yet.");
        return Ok(());
    }

    let mut headers = vec!["TRAINEE"];
    headers.extend(procedures.iter().map(|p| p.as_str()));
    let rows = matrix
        .iter()
        .map(|(trainee, cells)| {
            let mut row = vec![trainee.clone()];
            row.extend(cells.values().map(|c| {
                let mut s = format!("{} ({})", c.status, c.attempts);
                if let Some(alert) = c.alert {
                    s.push_str(&format!(" !{alert}"));
                }
                s
            }));
            row
        })
        .collect();
    print_table(&headers, rows);
    Ok(())
}
