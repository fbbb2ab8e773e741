use crate::output::{fmt_score, print_json};
use lccusum_core::engine::{self, Outcome};
use lccusum_core::rates::{ResolvedRates, DEFAULT_ALPHA, DEFAULT_BETA};

/// Parses `S`/`F` characters (case-insensitive) into a 1-indexed sequence.
fn parse_outcomes(s: &str) -> anyhow::Result<Vec<Outcome>> {
    let results = s
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .map(|c| match c.to_ascii_uppercase() {
            'S' => Ok(true),
            'F' => Ok(false),
            other => Err(anyhow::anyhow!(
                "invalid outcome '{other}': use S for success and F for failure"
            )),
        })
        .collect::<anyhow::Result<Vec<bool>>>()?;
    Ok(Outcome::sequence(&results))
}

pub fn run(
    outcomes: &str,
    p0: f64,
    p1: f64,
    alpha: Option<f64>,
    beta: Option<f64>,
    json: bool,
) -> anyhow::Result<()> {
    let outcomes = parse_outcomes(outcomes)?;
    let rates = ResolvedRates::new(
        p0,
        p1,
        alpha.unwrap_or(DEFAULT_ALPHA),
        beta.unwrap_or(DEFAULT_BETA),
    )?;
    let params = rates.params()?;
    let run = engine::run(&outcomes, &params)?;

    if json {
        let value = serde_json::json!({
            "rates": rates,
            "h": params.h(),
            "weights": params.weights(),
            "trajectory": run.trajectory,
            "cumulative_sum": run.final_sum(),
            "status": run.status,
            "decided_at_index": run.decided_at_index,
        });
        print_json(&value)?;
        return Ok(());
    }

    println!(
        "h={}  w_success={}  w_failure={}",
        fmt_score(params.h()),
        fmt_score(params.weights().success),
        fmt_score(params.weights().failure)
    );
    for (o, s) in outcomes.iter().zip(&run.trajectory) {
        let mark = if o.success { 'S' } else { 'F' };
        println!("  {:>4}  {mark}  {}", o.index, fmt_score(*s));
    }
    match run.decided_at_index {
        Some(i) => println!("status: {} (decided at attempt {i})", run.status),
        None => println!("status: {} after {} attempts", run.status, outcomes.len()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mixed_case_and_separators() {
        let o = parse_outcomes("Ss, f S").unwrap();
        assert_eq!(
            o.iter().map(|o| o.success).collect::<Vec<_>>(),
            vec![true, true, false, true]
        );
        assert_eq!(o[3].index, 4);
    }

    #[test]
    fn rejects_unknown_symbols() {
        assert!(parse_outcomes("SSX").is_err());
    }
}
