use crate::alerts::ProcedureThreshold;
use crate::error::{CusumError, Result};
use crate::paths;
use crate::rates::{ErrorRates, ProcedureRateConfig, RateConfigResolver, RateOverride};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

impl ConfigWarning {
    fn warning(message: String) -> Self {
        Self {
            level: WarnLevel::Warning,
            message,
        }
    }

    fn error(message: String) -> Self {
        Self {
            level: WarnLevel::Error,
            message,
        }
    }
}

// ---------------------------------------------------------------------------
// TeamConfig
// ---------------------------------------------------------------------------

/// Per-team adjustments, keyed by procedure id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamConfig {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub overrides: BTreeMap<String, RateOverride>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub thresholds: BTreeMap<String, ProcedureThreshold>,
}

// ---------------------------------------------------------------------------
// Starter catalog
// ---------------------------------------------------------------------------

/// `(procedure, p0, p1)` written by `init`. A missing rate is derived by
/// the 2:1 convention at resolution time.
const STARTER_PROCEDURES: &[(&str, Option<f64>, Option<f64>)] = &[
    ("central-venous-catheter", Some(0.20), Some(0.10)),
    ("arterial-catheter", Some(0.20), Some(0.10)),
    ("pulmonary-artery-catheter", Some(0.30), Some(0.15)),
    ("double-lumen-intubation", None, Some(0.05)),
    ("bronchoscopy", Some(0.20), Some(0.10)),
    ("difficult-intubation", Some(0.30), Some(0.15)),
    ("percutaneous-tracheostomy", None, Some(0.10)),
    ("intraoperative-tee", Some(0.30), Some(0.15)),
];

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_rates: Option<ErrorRates>,
    #[serde(default)]
    pub procedures: BTreeMap<String, ProcedureRateConfig>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub teams: BTreeMap<String, TeamConfig>,
}

fn default_version() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            version: 1,
            error_rates: None,
            procedures: BTreeMap::new(),
            teams: BTreeMap::new(),
        }
    }

    /// Config written by `lccusum init`.
    pub fn starter() -> Result<Self> {
        let mut cfg = Self::new();
        cfg.error_rates = Some(ErrorRates::default());
        for (id, p0, p1) in STARTER_PROCEDURES {
            cfg.procedures
                .insert((*id).to_string(), ProcedureRateConfig::new(*p0, *p1)?);
        }
        Ok(cfg)
    }

    /// Malformed YAML is a `yaml_error`; well-formed YAML whose values are
    /// out of range or misnamed is a `domain_error`.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(CusumError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let value: serde_yaml::Value = serde_yaml::from_str(&data)?;
        serde_yaml::from_value(value)
            .map_err(|e| CusumError::domain(format!("invalid config: {e}")))
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    pub fn error_rates(&self) -> ErrorRates {
        self.error_rates.unwrap_or_default()
    }

    pub fn resolver(&self) -> RateConfigResolver<'_> {
        RateConfigResolver::new(self.error_rates(), &self.procedures, &self.teams)
    }

    pub fn team(&self, team: &str) -> Option<&TeamConfig> {
        self.teams.get(team)
    }

    pub fn threshold_for(&self, team: &str, procedure: &str) -> Option<&ProcedureThreshold> {
        self.teams.get(team)?.thresholds.get(procedure)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.version != 1 {
            warnings.push(ConfigWarning::warning(format!(
                "unsupported config version {}",
                self.version
            )));
        }

        if self.procedures.is_empty() {
            warnings.push(ConfigWarning::warning(
                "no procedures configured; every resolution will need explicit rates".to_string(),
            ));
        }

        for id in self.procedures.keys() {
            if paths::validate_id(id).is_err() {
                warnings.push(ConfigWarning::error(format!(
                    "procedure id '{id}' is not a valid identifier"
                )));
            }
        }

        for (team, cfg) in &self.teams {
            if paths::validate_id(team).is_err() {
                warnings.push(ConfigWarning::error(format!(
                    "team id '{team}' is not a valid identifier"
                )));
            }

            for (procedure, o) in &cfg.overrides {
                if !self.procedures.contains_key(procedure) {
                    warnings.push(ConfigWarning::warning(format!(
                        "team '{team}' overrides unknown procedure '{procedure}'"
                    )));
                }
                if o.is_empty() {
                    warnings.push(ConfigWarning::warning(format!(
                        "team '{team}' has an empty override for '{procedure}'"
                    )));
                }
            }

            for procedure in cfg.thresholds.keys() {
                if !self.procedures.contains_key(procedure) {
                    warnings.push(ConfigWarning::warning(format!(
                        "team '{team}' sets thresholds for unknown procedure '{procedure}'"
                    )));
                }
            }

            // Each override must still produce a usable quadruple once layered.
            let resolver = self.resolver();
            for procedure in cfg.overrides.keys() {
                if let Err(e) = resolver.resolve(procedure, Some(team), None) {
                    warnings.push(ConfigWarning::error(format!(
                        "team '{team}' / '{procedure}' does not resolve: {e}"
                    )));
                }
            }
        }

        let resolver = self.resolver();
        for procedure in self.procedures.keys() {
            if let Err(e) = resolver.resolve(procedure, None, None) {
                warnings.push(ConfigWarning::error(format!(
                    "procedure '{procedure}' does not resolve: {e}"
                )));
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
