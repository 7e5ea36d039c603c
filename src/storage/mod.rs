//! Persistence layer.
//!
//! Loads historical case libraries from JSON files on disk. The built-in
//! library ships inside the binary; a file configured in `config.toml`
//! replaces it.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::scoring::CaseLibrary;

/// Load a case library from a JSON file.
pub fn load_case_library(path: impl AsRef<Path>) -> Result<Arc<CaseLibrary>> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read case library from {}", path.display()))?;

    let library = CaseLibrary::from_json(&json)
        .with_context(|| format!("Failed to parse case library from {}", path.display()))?;

    info!(path = %path.display(), cases = library.len(), "Case library loaded from disk");
    Ok(Arc::new(library))
}

/// The configured library if a path is given, else the built-in one.
pub fn resolve_case_library(path: Option<&str>) -> Result<Arc<CaseLibrary>> {
    match path {
        Some(p) => load_case_library(p),
        None => CaseLibrary::builtin().context("Built-in case library is invalid"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_path() -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("integrity_cases_{}.json", uuid::Uuid::new_v4()));
        p
    }

    const TWO_CASES: &str = r#"[
        {"case_id":"T-1","market":"Test market","pattern":"volume_spike","occurred_on":"2024-01-02",
         "outcome":"flagged","details":"spike","confirmed_manipulation":false,"signals":[4.0,0.3,0.1,0.2]},
        {"case_id":"T-2","market":"Other market","pattern":"wash_trading","occurred_on":"2024-03-04",
         "outcome":"confirmed","details":"loop","confirmed_manipulation":true,"signals":[1.0,0.6,0.9,0.1]}
    ]"#;

    #[test]
    fn test_load_from_disk() {
        let path = temp_path();
        std::fs::write(&path, TWO_CASES).unwrap();

        let library = load_case_library(&path).unwrap();
        assert_eq!(library.len(), 2);
        assert_eq!(library.cases()[1].case_id, "T-2");

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_case_library("/tmp/integrity_does_not_exist_xyz.json").unwrap_err();
        assert!(err.to_string().contains("Failed to read case library"));
    }

    #[test]
    fn test_load_malformed_file() {
        let path = temp_path();
        std::fs::write(&path, "{not json").unwrap();
        assert!(load_case_library(&path).is_err());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_resolve_defaults_to_builtin() {
        let library = resolve_case_library(None).unwrap();
        assert!(!library.is_empty());
    }
}
