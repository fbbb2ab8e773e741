use crate::error::{CusumError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const LCCUSUM_DIR: &str = ".lccusum";
pub const TRAINEES_DIR: &str = ".lccusum/trainees";

pub const CONFIG_FILE: &str = ".lccusum/config.yaml";
pub const OUTCOMES_FILE: &str = "outcomes.yaml";
pub const TRACKER_FILE: &str = "tracker.yaml";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn lccusum_dir(root: &Path) -> PathBuf {
    root.join(LCCUSUM_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn trainees_dir(root: &Path) -> PathBuf {
    root.join(TRAINEES_DIR)
}

pub fn trainee_dir(root: &Path, trainee: &str) -> PathBuf {
    trainees_dir(root).join(trainee)
}

pub fn procedure_dir(root: &Path, trainee: &str, procedure: &str) -> PathBuf {
    trainee_dir(root, trainee).join(procedure)
}

pub fn outcomes_path(root: &Path, trainee: &str, procedure: &str) -> PathBuf {
    procedure_dir(root, trainee, procedure).join(OUTCOMES_FILE)
}

pub fn tracker_path(root: &Path, trainee: &str, procedure: &str) -> PathBuf {
    procedure_dir(root, trainee, procedure).join(TRACKER_FILE)
}

// ---------------------------------------------------------------------------
// Identifier validation
// ---------------------------------------------------------------------------

static ID_RE: OnceLock<Regex> = OnceLock::new();

fn id_re() -> &'static Regex {
    ID_RE.get_or_init(|| {
        Regex::new(r"^[a-z0-9][a-z0-9\-]*[a-z0-9]$|^[a-z0-9]$").expect("identifier regex is valid")
    })
}

/// Trainee, procedure and team ids double as directory names.
pub fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() || id.len() > 64 || !id_re().is_match(id) {
        return Err(CusumError::InvalidId(id.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_ids() {
        for id in ["central-venous-catheter", "a", "m-dupont", "ecmo2"] {
            validate_id(id).unwrap_or_else(|_| panic!("expected valid: {id}"));
        }
    }

    #[test]
    fn invalid_ids() {
        for id in ["", "-lead", "trail-", "two words", "KTC", "a_b", "../etc"] {
            assert!(validate_id(id).is_err(), "expected invalid: {id}");
        }
    }

    #[test]
    fn path_helpers() {
        let root = Path::new("/tmp/unit");
        assert_eq!(
            config_path(root),
            PathBuf::from("/tmp/unit/.lccusum/config.yaml")
        );
        assert_eq!(
            tracker_path(root, "m-dupont", "bronchoscopy"),
            PathBuf::from("/tmp/unit/.lccusum/trainees/m-dupont/bronchoscopy/tracker.yaml")
        );
        assert_eq!(
            outcomes_path(root, "m-dupont", "bronchoscopy"),
            PathBuf::from("/tmp/unit/.lccusum/trainees/m-dupont/bronchoscopy/outcomes.yaml")
        );
    }
}
