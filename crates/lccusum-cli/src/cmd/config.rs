use crate::output::{fmt_score, print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use lccusum_core::config::{Config, WarnLevel};
use lccusum_core::rates::RateOverride;
use std::path::Path;

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show the procedure catalog and team overrides
    Show,

    /// Validate the config for common mistakes
    Validate,

    /// Resolve the rates a new cycle would run with
    Resolve {
        procedure: String,
        #[arg(long)]
        team: Option<String>,
        /// Cycle-level override of p0
        #[arg(long)]
        p0: Option<f64>,
        /// Cycle-level override of p1
        #[arg(long)]
        p1: Option<f64>,
        #[arg(long)]
        alpha: Option<f64>,
        #[arg(long)]
        beta: Option<f64>,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(root: &Path, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Show => show(root, json),
        ConfigSubcommand::Validate => validate(root, json),
        ConfigSubcommand::Resolve {
            procedure,
            team,
            p0,
            p1,
            alpha,
            beta,
        } => {
            let cycle = RateOverride::new(p0, p1, alpha, beta)?;
            resolve(root, &procedure, team.as_deref(), cycle, json)
        }
    }
}

// ---------------------------------------------------------------------------
// show
// ---------------------------------------------------------------------------

fn show(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;

    if json {
        print_json(&config)?;
        return Ok(());
    }

    let rates = config.error_rates();
    println!(
        "error rates: alpha={} beta={}",
        rates.alpha(),
        rates.beta()
    );
    println!();

    let fmt_rate = |r: Option<f64>| r.map_or_else(|| "-".to_string(), |v| v.to_string());
    let rows = config
        .procedures
        .iter()
        .map(|(id, p)| vec![id.clone(), fmt_rate(p.p0()), fmt_rate(p.p1())])
        .collect();
    print_table(&["PROCEDURE", "P0", "P1"], rows);

    for (team, cfg) in &config.teams {
        println!();
        println!("team {team}:");
        for (procedure, o) in &cfg.overrides {
            println!(
                "  override  {procedure}: p0={} p1={} alpha={} beta={}",
                fmt_rate(o.p0()),
                fmt_rate(o.p1()),
                fmt_rate(o.alpha()),
                fmt_rate(o.beta()),
            );
        }
        for (procedure, t) in &cfg.thresholds {
            println!(
                "  threshold {procedure}: {}..{} attempts",
                t.min_procedures(),
                t.max_procedures()
            );
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

fn validate(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let warnings = config.validate();

    if json {
        let value = serde_json::json!({
            "warnings": warnings,
        });
        print_json(&value)?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// resolve
// ---------------------------------------------------------------------------

fn resolve(
    root: &Path,
    procedure: &str,
    team: Option<&str>,
    cycle: RateOverride,
    json: bool,
) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let cycle = (!cycle.is_empty()).then_some(cycle);
    let rates = config.resolver().resolve(procedure, team, cycle.as_ref())?;
    let params = rates.params()?;

    if json {
        let value = serde_json::json!({
            "procedure": procedure,
            "team": team,
            "rates": rates,
            "h": params.h(),
            "weights": params.weights(),
        });
        print_json(&value)?;
        return Ok(());
    }

    println!("procedure: {procedure}");
    println!(
        "p0={} p1={} alpha={} beta={} (source: {}{})",
        rates.p0,
        rates.p1,
        rates.alpha,
        rates.beta,
        rates.source,
        if rates.derived { ", derived by 2:1 convention" } else { "" },
    );
    println!("h={}", fmt_score(params.h()));
    println!(
        "weights: success={} failure={}",
        fmt_score(params.weights().success),
        fmt_score(params.weights().failure)
    );
    Ok(())
}
