//! Rate configuration: the validated value types for failure-rate hypotheses
//! and error rates, and the resolver that picks the effective quadruple
//! `(p0, p1, α, β)` for a (procedure, team, cycle) context.
//!
//! Priority, highest first: cycle override, team override, procedure default.
//! Every field is resolved on its own: `p0` and `p1` take the highest layer
//! that sets them, and `α`/`β` fall back to the process-wide defaults. If
//! one of `p0`/`p1` is still unset after every layer, it follows the
//! `p0 = 2·p1` convention. Ordering is checked on the merged pair.

use crate::config::TeamConfig;
use crate::engine::CusumParams;
use crate::error::{CusumError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const DEFAULT_ALPHA: f64 = 0.05;
pub const DEFAULT_BETA: f64 = 0.20;

/// Ratio between the unacceptable and the acceptable failure rate when only
/// one of them is known.
pub const CONVENTION_RATIO: f64 = 2.0;

fn check_open_unit(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(CusumError::domain(format!(
            "{name} must be in the open interval (0, 1), got {value}"
        )))
    }
}

fn check_ordered(p0: f64, p1: f64) -> Result<()> {
    if p1 < p0 {
        Ok(())
    } else {
        Err(CusumError::domain(format!(
            "acceptable rate p1 ({p1}) must be lower than unacceptable rate p0 ({p0})"
        )))
    }
}

fn check_partial(p0: Option<f64>, p1: Option<f64>) -> Result<()> {
    if let Some(p0) = p0 {
        check_open_unit("p0", p0)?;
    }
    if let Some(p1) = p1 {
        check_open_unit("p1", p1)?;
    }
    if let (Some(p0), Some(p1)) = (p0, p1) {
        check_ordered(p0, p1)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// ErrorRates
// ---------------------------------------------------------------------------

/// Type-I (`alpha`) and type-II (`beta`) error rates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawErrorRates")]
pub struct ErrorRates {
    alpha: f64,
    beta: f64,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawErrorRates {
    #[serde(default = "default_alpha")]
    alpha: f64,
    #[serde(default = "default_beta")]
    beta: f64,
}

fn default_alpha() -> f64 {
    DEFAULT_ALPHA
}

fn default_beta() -> f64 {
    DEFAULT_BETA
}

impl TryFrom<RawErrorRates> for ErrorRates {
    type Error = CusumError;

    fn try_from(raw: RawErrorRates) -> Result<Self> {
        ErrorRates::new(raw.alpha, raw.beta)
    }
}

impl ErrorRates {
    pub fn new(alpha: f64, beta: f64) -> Result<Self> {
        check_open_unit("alpha", alpha)?;
        check_open_unit("beta", beta)?;
        Ok(Self { alpha, beta })
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }
}

impl Default for ErrorRates {
    fn default() -> Self {
        Self {
            alpha: DEFAULT_ALPHA,
            beta: DEFAULT_BETA,
        }
    }
}

// ---------------------------------------------------------------------------
// ProcedureRateConfig
// ---------------------------------------------------------------------------

/// Default failure-rate hypotheses for one procedure type.
///
/// At least one of `p0`/`p1` is present. When both are, `p1 < p0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawProcedureRates")]
pub struct ProcedureRateConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    p0: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    p1: Option<f64>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawProcedureRates {
    #[serde(default)]
    p0: Option<f64>,
    #[serde(default)]
    p1: Option<f64>,
}

impl TryFrom<RawProcedureRates> for ProcedureRateConfig {
    type Error = CusumError;

    fn try_from(raw: RawProcedureRates) -> Result<Self> {
        ProcedureRateConfig::new(raw.p0, raw.p1)
    }
}

impl ProcedureRateConfig {
    pub fn new(p0: Option<f64>, p1: Option<f64>) -> Result<Self> {
        if p0.is_none() && p1.is_none() {
            return Err(CusumError::domain(
                "a procedure rate entry needs at least one of p0, p1",
            ));
        }
        check_partial(p0, p1)?;
        Ok(Self { p0, p1 })
    }

    pub fn pair(p0: f64, p1: f64) -> Result<Self> {
        Self::new(Some(p0), Some(p1))
    }

    pub fn p0(&self) -> Option<f64> {
        self.p0
    }

    pub fn p1(&self) -> Option<f64> {
        self.p1
    }
}

// ---------------------------------------------------------------------------
// RateOverride
// ---------------------------------------------------------------------------

/// Team- or cycle-level override. Any subset of fields may be set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRateOverride")]
pub struct RateOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    p0: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    p1: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    alpha: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    beta: Option<f64>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRateOverride {
    #[serde(default)]
    p0: Option<f64>,
    #[serde(default)]
    p1: Option<f64>,
    #[serde(default)]
    alpha: Option<f64>,
    #[serde(default)]
    beta: Option<f64>,
}

impl TryFrom<RawRateOverride> for RateOverride {
    type Error = CusumError;

    fn try_from(raw: RawRateOverride) -> Result<Self> {
        RateOverride::new(raw.p0, raw.p1, raw.alpha, raw.beta)
    }
}

impl RateOverride {
    pub fn new(
        p0: Option<f64>,
        p1: Option<f64>,
        alpha: Option<f64>,
        beta: Option<f64>,
    ) -> Result<Self> {
        check_partial(p0, p1)?;
        if let Some(alpha) = alpha {
            check_open_unit("alpha", alpha)?;
        }
        if let Some(beta) = beta {
            check_open_unit("beta", beta)?;
        }
        Ok(Self {
            p0,
            p1,
            alpha,
            beta,
        })
    }

    pub fn p0(&self) -> Option<f64> {
        self.p0
    }

    pub fn p1(&self) -> Option<f64> {
        self.p1
    }

    pub fn alpha(&self) -> Option<f64> {
        self.alpha
    }

    pub fn beta(&self) -> Option<f64> {
        self.beta
    }

    pub fn names_rates(&self) -> bool {
        self.p0.is_some() || self.p1.is_some()
    }

    pub fn is_empty(&self) -> bool {
        !self.names_rates() && self.alpha.is_none() && self.beta.is_none()
    }
}

// ---------------------------------------------------------------------------
// ResolvedRates
// ---------------------------------------------------------------------------

/// Which layer supplied the rate pair of a [`ResolvedRates`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateSource {
    Explicit,
    Cycle,
    Team,
    Procedure,
}

impl fmt::Display for RateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RateSource::Explicit => "explicit",
            RateSource::Cycle => "cycle",
            RateSource::Team => "team",
            RateSource::Procedure => "procedure",
        };
        f.write_str(s)
    }
}

/// The validated, immutable `(p0, p1, α, β)` quadruple a cycle is run with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawResolvedRates")]
pub struct ResolvedRates {
    pub p0: f64,
    pub p1: f64,
    pub alpha: f64,
    pub beta: f64,
    pub source: RateSource,
    /// True when one of `p0`/`p1` came from the 2:1 convention.
    #[serde(default)]
    pub derived: bool,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawResolvedRates {
    p0: f64,
    p1: f64,
    alpha: f64,
    beta: f64,
    source: RateSource,
    #[serde(default)]
    derived: bool,
}

impl TryFrom<RawResolvedRates> for ResolvedRates {
    type Error = CusumError;

    fn try_from(raw: RawResolvedRates) -> Result<Self> {
        ResolvedRates::build(raw.p0, raw.p1, raw.alpha, raw.beta, raw.source, raw.derived)
    }
}

impl ResolvedRates {
    pub fn new(p0: f64, p1: f64, alpha: f64, beta: f64) -> Result<Self> {
        Self::build(p0, p1, alpha, beta, RateSource::Explicit, false)
    }

    fn build(
        p0: f64,
        p1: f64,
        alpha: f64,
        beta: f64,
        source: RateSource,
        derived: bool,
    ) -> Result<Self> {
        check_open_unit("p0", p0)?;
        check_open_unit("p1", p1)?;
        check_ordered(p0, p1)?;
        check_open_unit("alpha", alpha)?;
        check_open_unit("beta", beta)?;
        Ok(Self {
            p0,
            p1,
            alpha,
            beta,
            source,
            derived,
        })
    }

    pub fn params(&self) -> Result<CusumParams> {
        CusumParams::from_rates(self)
    }
}

// ---------------------------------------------------------------------------
// RateConfigResolver
// ---------------------------------------------------------------------------

/// Pure lookup over the procedure catalog and team table.
#[derive(Debug, Clone, Copy)]
pub struct RateConfigResolver<'a> {
    error_rates: ErrorRates,
    procedures: &'a BTreeMap<String, ProcedureRateConfig>,
    teams: &'a BTreeMap<String, TeamConfig>,
}

impl<'a> RateConfigResolver<'a> {
    pub fn new(
        error_rates: ErrorRates,
        procedures: &'a BTreeMap<String, ProcedureRateConfig>,
        teams: &'a BTreeMap<String, TeamConfig>,
    ) -> Self {
        Self {
            error_rates,
            procedures,
            teams,
        }
    }

    pub fn resolve(
        &self,
        procedure: &str,
        team: Option<&str>,
        cycle: Option<&RateOverride>,
    ) -> Result<ResolvedRates> {
        let team_override = match team {
            Some(t) => match self.teams.get(t) {
                Some(cfg) => cfg.overrides.get(procedure),
                None => {
                    tracing::debug!(team = t, "unknown team, no team override applied");
                    None
                }
            },
            None => None,
        };
        let default = self.procedures.get(procedure);

        let layers = [
            (cycle.map(|o| (o.p0, o.p1)), RateSource::Cycle),
            (team_override.map(|o| (o.p0, o.p1)), RateSource::Team),
            (default.map(|d| (d.p0, d.p1)), RateSource::Procedure),
        ];
        let mut p0 = None;
        let mut p1 = None;
        let mut source = None;
        for (rates, layer) in layers {
            let Some((layer_p0, layer_p1)) = rates else {
                continue;
            };
            if layer_p0.is_none() && layer_p1.is_none() {
                continue;
            }
            source.get_or_insert(layer);
            p0 = p0.or(layer_p0);
            p1 = p1.or(layer_p1);
        }

        let (p0, p1, derived) = match (p0, p1) {
            (Some(p0), Some(p1)) => (p0, p1, false),
            (None, Some(p1)) => (p1 * CONVENTION_RATIO, p1, true),
            (Some(p0), None) => (p0, p0 / CONVENTION_RATIO, true),
            (None, None) => {
                return Err(CusumError::ConfigNotFound {
                    procedure: procedure.to_string(),
                })
            }
        };
        let source = source.unwrap_or(RateSource::Procedure);

        let alpha = cycle
            .and_then(|o| o.alpha)
            .or_else(|| team_override.and_then(|o| o.alpha))
            .unwrap_or(self.error_rates.alpha);
        let beta = cycle
            .and_then(|o| o.beta)
            .or_else(|| team_override.and_then(|o| o.beta))
            .unwrap_or(self.error_rates.beta);

        let resolved = ResolvedRates::build(p0, p1, alpha, beta, source, derived)?;
        tracing::debug!(
            procedure,
            p0 = resolved.p0,
            p1 = resolved.p1,
            alpha = resolved.alpha,
            beta = resolved.beta,
            source = %resolved.source,
            derived = resolved.derived,
            "resolved rate configuration"
        );
        Ok(resolved)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> BTreeMap<String, ProcedureRateConfig> {
        let mut m = BTreeMap::new();
        m.insert(
            "central-venous-catheter".to_string(),
            ProcedureRateConfig::pair(0.20, 0.10).unwrap(),
        );
        m.insert(
            "bronchoscopy".to_string(),
            ProcedureRateConfig::new(None, Some(0.05)).unwrap(),
        );
        m.insert(
            "ecmo-cannulation".to_string(),
            ProcedureRateConfig::new(Some(0.40), None).unwrap(),
        );
        m
    }

    fn teams() -> BTreeMap<String, TeamConfig> {
        let mut overrides = BTreeMap::new();
        overrides.insert(
            "central-venous-catheter".to_string(),
            RateOverride::new(Some(0.30), Some(0.15), Some(0.10), None).unwrap(),
        );
        let mut m = BTreeMap::new();
        m.insert(
            "cardiac-icu".to_string(),
            TeamConfig {
                overrides,
                thresholds: BTreeMap::new(),
            },
        );
        m
    }

    #[test]
    fn procedure_default_with_global_error_rates() {
        let (procs, teams) = (catalog(), teams());
        let r = RateConfigResolver::new(ErrorRates::default(), &procs, &teams);
        let rates = r.resolve("central-venous-catheter", None, None).unwrap();
        assert_eq!((rates.p0, rates.p1), (0.20, 0.10));
        assert_eq!((rates.alpha, rates.beta), (DEFAULT_ALPHA, DEFAULT_BETA));
        assert_eq!(rates.source, RateSource::Procedure);
        assert!(!rates.derived);
    }

    #[test]
    fn team_override_beats_default() {
        let (procs, teams) = (catalog(), teams());
        let r = RateConfigResolver::new(ErrorRates::default(), &procs, &teams);
        let rates = r
            .resolve("central-venous-catheter", Some("cardiac-icu"), None)
            .unwrap();
        assert_eq!((rates.p0, rates.p1), (0.30, 0.15));
        assert_eq!(rates.alpha, 0.10);
        assert_eq!(rates.beta, DEFAULT_BETA);
        assert_eq!(rates.source, RateSource::Team);
    }

    #[test]
    fn cycle_override_beats_team() {
        let (procs, teams) = (catalog(), teams());
        let r = RateConfigResolver::new(ErrorRates::default(), &procs, &teams);
        let cycle = RateOverride::new(Some(0.25), Some(0.05), None, Some(0.10)).unwrap();
        let rates = r
            .resolve("central-venous-catheter", Some("cardiac-icu"), Some(&cycle))
            .unwrap();
        assert_eq!((rates.p0, rates.p1), (0.25, 0.05));
        // alpha still comes from the team layer, beta from the cycle
        assert_eq!((rates.alpha, rates.beta), (0.10, 0.10));
        assert_eq!(rates.source, RateSource::Cycle);
    }

    #[test]
    fn error_rate_only_cycle_override_keeps_lower_rates() {
        let (procs, teams) = (catalog(), teams());
        let r = RateConfigResolver::new(ErrorRates::default(), &procs, &teams);
        let cycle = RateOverride::new(None, None, Some(0.01), None).unwrap();
        let rates = r
            .resolve("central-venous-catheter", None, Some(&cycle))
            .unwrap();
        assert_eq!((rates.p0, rates.p1), (0.20, 0.10));
        assert_eq!(rates.alpha, 0.01);
        assert_eq!(rates.source, RateSource::Procedure);
    }

    #[test]
    fn convention_derives_missing_rate() {
        let (procs, teams) = (catalog(), teams());
        let r = RateConfigResolver::new(ErrorRates::default(), &procs, &teams);

        let only_p1 = r.resolve("bronchoscopy", None, None).unwrap();
        assert!((only_p1.p0 - 0.10).abs() < 1e-12);
        assert!(only_p1.derived);

        let only_p0 = r.resolve("ecmo-cannulation", None, None).unwrap();
        assert!((only_p0.p1 - 0.20).abs() < 1e-12);
        assert!(only_p0.derived);
    }

    #[test]
    fn convention_out_of_range_is_domain_error() {
        let procs = BTreeMap::new();
        let teams = BTreeMap::new();
        let r = RateConfigResolver::new(ErrorRates::default(), &procs, &teams);
        let cycle = RateOverride::new(None, Some(0.6), None, None).unwrap();
        let err = r.resolve("anything", None, Some(&cycle)).unwrap_err();
        assert!(matches!(err, CusumError::Domain(_)));
    }

    fn partial_team(o: RateOverride) -> BTreeMap<String, TeamConfig> {
        let mut overrides = BTreeMap::new();
        overrides.insert("central-venous-catheter".to_string(), o);
        let mut m = BTreeMap::new();
        m.insert(
            "icu".to_string(),
            TeamConfig {
                overrides,
                thresholds: BTreeMap::new(),
            },
        );
        m
    }

    #[test]
    fn partial_team_override_keeps_default_for_unset_rate() {
        let procs = catalog();
        let teams = partial_team(RateOverride::new(None, Some(0.15), None, None).unwrap());
        let r = RateConfigResolver::new(ErrorRates::default(), &procs, &teams);
        let rates = r
            .resolve("central-venous-catheter", Some("icu"), None)
            .unwrap();
        assert_eq!((rates.p0, rates.p1), (0.20, 0.15));
        assert!(!rates.derived);
        assert_eq!(rates.source, RateSource::Team);
    }

    #[test]
    fn partial_cycle_override_merges_across_layers() {
        let procs = catalog();
        let teams = partial_team(RateOverride::new(None, Some(0.15), None, None).unwrap());
        let r = RateConfigResolver::new(ErrorRates::default(), &procs, &teams);
        let cycle = RateOverride::new(Some(0.35), None, None, None).unwrap();
        let rates = r
            .resolve("central-venous-catheter", Some("icu"), Some(&cycle))
            .unwrap();
        // p0 from the cycle, p1 from the team
        assert_eq!((rates.p0, rates.p1), (0.35, 0.15));
        assert!(!rates.derived);
        assert_eq!(rates.source, RateSource::Cycle);
    }

    #[test]
    fn merged_pair_out_of_order_is_domain_error() {
        let procs = catalog();
        let teams = partial_team(RateOverride::new(None, Some(0.25), None, None).unwrap());
        let r = RateConfigResolver::new(ErrorRates::default(), &procs, &teams);
        let err = r
            .resolve("central-venous-catheter", Some("icu"), None)
            .unwrap_err();
        assert!(matches!(err, CusumError::Domain(_)));
    }

    #[test]
    fn unknown_procedure_is_config_not_found() {
        let (procs, teams) = (catalog(), teams());
        let r = RateConfigResolver::new(ErrorRates::default(), &procs, &teams);
        let err = r.resolve("tavi", Some("cardiac-icu"), None).unwrap_err();
        assert!(matches!(err, CusumError::ConfigNotFound { ref procedure } if procedure == "tavi"));
    }

    #[test]
    fn unknown_team_falls_back_to_default() {
        let (procs, teams) = (catalog(), teams());
        let r = RateConfigResolver::new(ErrorRates::default(), &procs, &teams);
        let rates = r
            .resolve("central-venous-catheter", Some("night-shift"), None)
            .unwrap();
        assert_eq!(rates.source, RateSource::Procedure);
    }

    #[test]
    fn invalid_values_rejected_at_construction() {
        assert!(matches!(
            ProcedureRateConfig::pair(0.10, 0.20),
            Err(CusumError::Domain(_))
        ));
        assert!(ProcedureRateConfig::pair(0.10, 0.10).is_err());
        assert!(ProcedureRateConfig::pair(1.0, 0.10).is_err());
        assert!(ProcedureRateConfig::new(None, Some(0.0)).is_err());
        assert!(ProcedureRateConfig::new(None, None).is_err());
        assert!(RateOverride::new(None, None, Some(1.5), None).is_err());
        assert!(RateOverride::new(None, None, None, Some(f64::NAN)).is_err());
        assert!(ErrorRates::new(0.0, 0.2).is_err());
        assert!(ResolvedRates::new(0.1, 0.2, 0.05, 0.2).is_err());
    }

    #[test]
    fn invalid_yaml_fails_to_deserialize() {
        let bad = "p0: 0.1\np1: 0.3\n";
        assert!(serde_yaml::from_str::<ProcedureRateConfig>(bad).is_err());
        let bad_override = "alpha: 2.0\n";
        assert!(serde_yaml::from_str::<RateOverride>(bad_override).is_err());
        let typo = "p_zero: 0.1\n";
        assert!(serde_yaml::from_str::<RateOverride>(typo).is_err());
    }

    #[test]
    fn resolved_rates_yaml_is_validated() {
        let r = ResolvedRates::new(0.20, 0.10, 0.05, 0.20).unwrap();
        let yaml = serde_yaml::to_string(&r).unwrap();
        assert_eq!(serde_yaml::from_str::<ResolvedRates>(&yaml).unwrap(), r);

        let inverted = "p0: 0.10\np1: 0.20\nalpha: 0.05\nbeta: 0.20\nsource: explicit\n";
        assert!(serde_yaml::from_str::<ResolvedRates>(inverted).is_err());
        let bad_alpha = "p0: 0.20\np1: 0.10\nalpha: 0.0\nbeta: 0.20\nsource: team\n";
        assert!(serde_yaml::from_str::<ResolvedRates>(bad_alpha).is_err());
    }

    #[test]
    fn override_yaml_skips_unset_fields() {
        let o = RateOverride::new(None, Some(0.05), None, None).unwrap();
        let yaml = serde_yaml::to_string(&o).unwrap();
        assert_eq!(yaml.trim(), "p1: 0.05");
        let parsed: RateOverride = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, o);
    }
}
