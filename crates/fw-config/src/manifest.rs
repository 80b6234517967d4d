//! YAML instrument manifest.
//!
//! ```yaml
//! instruments:
//!   - folder: NDXMARI
//!     file_prefix: MAR
//!   - folder: NDXWISH
//!     file_prefix: WISH
//!     destination: wish-files
//! ```
//!
//! Only `folder` and `file_prefix` are required; everything else defaults
//! from the archive layout and the environment.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::ConfigError;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstrumentEntry {
    pub folder: String,
    pub file_prefix: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub watch_dir: Option<PathBuf>,
    #[serde(default)]
    pub control_file: Option<PathBuf>,
    #[serde(default)]
    pub file_extension: Option<String>,
    #[serde(default)]
    pub destination: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    pub instruments: Vec<InstrumentEntry>,
}

pub fn parse_manifest(raw: &str) -> Result<Manifest, serde_yaml::Error> {
    serde_yaml::from_str(raw)
}

pub(crate) fn load_manifest(path: &Path) -> Result<Manifest, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|e| ConfigError::Manifest {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    parse_manifest(&raw).map_err(|e| ConfigError::Manifest {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{WatcherConfig, ENV_INSTRUMENTS_FILE, ENV_WATCH_DIR};
    use std::io::Write;

    #[test]
    fn manifest_lists_many_instruments() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            f,
            "instruments:\n  - folder: NDXMARI\n    file_prefix: MAR\n  - folder: NDXWISH\n    file_prefix: WISH\n    destination: wish-files\n"
        )
        .unwrap();
        let path = f.path().to_string_lossy().to_string();

        let cfg = WatcherConfig::from_lookup(|k| match k {
            ENV_INSTRUMENTS_FILE => Some(path.clone()),
            ENV_WATCH_DIR => Some("/data".to_string()),
            _ => None,
        })
        .unwrap();

        let ids: Vec<_> = cfg.instruments.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["MARI", "WISH"]);
        assert_eq!(cfg.instrument("WISH").unwrap().destination, "wish-files");
        assert_eq!(cfg.instrument("MARI").unwrap().destination, "watched-files");
        assert_eq!(
            cfg.instrument("WISH").unwrap().watch_dir,
            PathBuf::from("/data/NDXWISH/Instrument/data")
        );
    }

    #[test]
    fn duplicate_ids_are_fatal() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            f,
            "instruments:\n  - folder: NDXMARI\n    file_prefix: MAR\n  - folder: MARI\n    file_prefix: MAR\n"
        )
        .unwrap();
        let path = f.path().to_string_lossy().to_string();

        let err = WatcherConfig::from_lookup(|k| {
            (k == ENV_INSTRUMENTS_FILE).then(|| path.clone())
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateInstrument(id) if id == "MARI"));
    }

    #[test]
    fn unknown_manifest_key_is_rejected() {
        let err = parse_manifest("instruments:\n  - folder: X\n    file_prefix: X\n    colour: red\n");
        assert!(err.is_err());
    }

    #[test]
    fn unreadable_manifest_names_the_path() {
        let err = WatcherConfig::from_lookup(|k| {
            (k == ENV_INSTRUMENTS_FILE).then(|| "/definitely/not/here.yaml".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.yaml"));
    }
}
