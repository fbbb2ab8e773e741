use thiserror::Error;

#[derive(Debug, Error)]
pub enum CusumError {
    #[error("domain error: {0}")]
    Domain(String),

    #[error("no rate configuration resolvable for procedure '{procedure}'")]
    ConfigNotFound { procedure: String },

    #[error("sequence error: expected index {expected}, got {got} ({reason})")]
    Sequence {
        expected: u64,
        got: u64,
        reason: String,
    },

    #[error("not initialized: run 'lccusum init'")]
    NotInitialized,

    #[error("invalid identifier '{0}': must be lowercase alphanumeric with hyphens")]
    InvalidId(String),

    #[error("no tracker for trainee '{trainee}' on procedure '{procedure}'")]
    TrackerNotFound { trainee: String, procedure: String },

    #[error("cycle {cycle} is still in progress; only a decided cycle can be reset")]
    CycleStillOpen { cycle: u32 },

    #[error("outcomes belong to cycle {requested}, but the open cycle is {current}")]
    StaleCycle { current: u32, requested: u32 },

    #[error("tracker changed while cycle {cycle} was being recomputed; reload outcomes and retry")]
    TrackerMoved { cycle: u32 },

    #[error("invalid status: {0}")]
    InvalidStatus(String),

    #[error("invalid autonomy level: {0}")]
    InvalidAutonomy(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CusumError {
    pub(crate) fn domain(msg: impl Into<String>) -> Self {
        CusumError::Domain(msg.into())
    }

    pub(crate) fn sequence(expected: u64, got: u64, reason: impl Into<String>) -> Self {
        CusumError::Sequence {
            expected,
            got,
            reason: reason.into(),
        }
    }

    /// Stable diagnostic code, one per error kind.
    pub fn code(&self) -> &'static str {
        match self {
            CusumError::Domain(_) => "domain_error",
            CusumError::ConfigNotFound { .. } => "config_not_found",
            CusumError::Sequence { .. } => "sequence_error",
            CusumError::NotInitialized => "not_initialized",
            CusumError::InvalidId(_) => "invalid_id",
            CusumError::TrackerNotFound { .. } => "tracker_not_found",
            CusumError::CycleStillOpen { .. } => "cycle_still_open",
            CusumError::StaleCycle { .. } => "stale_cycle",
            CusumError::TrackerMoved { .. } => "tracker_moved",
            CusumError::InvalidStatus(_) => "invalid_status",
            CusumError::InvalidAutonomy(_) => "invalid_autonomy",
            CusumError::Io(_) => "io_error",
            CusumError::Yaml(_) => "yaml_error",
            CusumError::Json(_) => "json_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, CusumError>;
