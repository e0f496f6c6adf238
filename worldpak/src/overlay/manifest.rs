//! Overlay manifest model.
//!
//! A manifest declares the overlay stack as JSON: one entry per overlay
//! with its archive root, priority and enabled flag.
//!
//! ```json
//! {
//!   "overlays": [
//!     { "id": "base", "root": "packs/base", "priority": 0 },
//!     { "id": "season", "root": "packs/season", "priority": 100, "enabled": false }
//!   ]
//! }
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse manifest {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("overlay id may not be empty")]
    EmptyId,

    #[error("duplicate overlay id {id:?}")]
    DuplicateId { id: String },
}

fn default_enabled() -> bool {
    true
}

/// One overlay declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayDecl {
    pub id: String,
    /// Directory scanned recursively for archives, or a single archive file.
    pub root: PathBuf,
    /// Higher priority shadows lower. Ties break on id, ascending.
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OverlayManifest {
    pub overlays: Vec<OverlayDecl>,
}

impl OverlayManifest {
    /// Load and validate a manifest file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let manifest: Self =
            serde_json::from_str(&text).map_err(|source| ManifestError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Check id uniqueness and shape.
    pub fn validate(&self) -> Result<(), ManifestError> {
        let mut seen = HashSet::new();
        for decl in &self.overlays {
            if decl.id.is_empty() {
                return Err(ManifestError::EmptyId);
            }
            if !seen.insert(decl.id.as_str()) {
                return Err(ManifestError::DuplicateId {
                    id: decl.id.clone(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_applies_defaults() {
        let manifest: OverlayManifest = serde_json::from_str(
            r#"{ "overlays": [ { "id": "base", "root": "packs/base" } ] }"#,
        )
        .unwrap();
        assert_eq!(manifest.overlays.len(), 1);
        assert_eq!(manifest.overlays[0].priority, 0);
        assert!(manifest.overlays[0].enabled);
    }

    #[test]
    fn test_validate_rejects_duplicate_ids() {
        let manifest: OverlayManifest = serde_json::from_str(
            r#"{ "overlays": [
                { "id": "base", "root": "a" },
                { "id": "base", "root": "b" }
            ] }"#,
        )
        .unwrap();
        let err = manifest.validate().unwrap_err();
        assert!(matches!(err, ManifestError::DuplicateId { id } if id == "base"));
    }

    #[test]
    fn test_validate_rejects_empty_id() {
        let manifest = OverlayManifest {
            overlays: vec![OverlayDecl {
                id: String::new(),
                root: PathBuf::from("x"),
                priority: 0,
                enabled: true,
            }],
        };
        assert!(matches!(
            manifest.validate().unwrap_err(),
            ManifestError::EmptyId
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "overlays": [
                {{ "id": "base", "root": "packs/base", "priority": 10 }},
                {{ "id": "season", "root": "packs/season", "priority": 100, "enabled": false }}
            ] }}"#
        )
        .unwrap();

        let manifest = OverlayManifest::load(file.path()).unwrap();
        assert_eq!(manifest.overlays.len(), 2);
        assert_eq!(manifest.overlays[1].priority, 100);
        assert!(!manifest.overlays[1].enabled);
    }

    #[test]
    fn test_load_rejects_malformed_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let err = OverlayManifest::load(file.path()).unwrap_err();
        assert!(matches!(err, ManifestError::Parse { .. }));
    }
}
