//! Scan configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Everything a single scan needs to know. JSON round-trips so callers
/// can persist a scan profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScanConfig {
    /// The primary library directory.
    pub library_path: PathBuf,
    /// Additional directories scanned alongside the primary one.
    pub other_paths: Vec<PathBuf>,
    /// Discover catalog entries from parsed file titles, beyond the
    /// user's list.
    pub enhanced: bool,
    /// Leave locked (user-confirmed) files untouched.
    pub skip_locked: bool,
    /// Leave ignored files out of matching entirely.
    pub skip_ignored: bool,
    /// Force every scanned file onto this entry instead of matching.
    pub force_media_id: Option<i32>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            library_path: PathBuf::new(),
            other_paths: Vec::new(),
            enhanced: false,
            skip_locked: true,
            skip_ignored: true,
            force_media_id: None,
        }
    }
}

impl ScanConfig {
    pub fn new(library_path: impl Into<PathBuf>) -> Self {
        Self { library_path: library_path.into(), ..Default::default() }
    }

    /// All directories to walk, primary first.
    pub fn all_paths(&self) -> Vec<PathBuf> {
        let mut paths = vec![self.library_path.clone()];
        paths.extend(self.other_paths.iter().cloned());
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_skip_locked_and_ignored() {
        let config = ScanConfig::default();
        assert!(config.skip_locked);
        assert!(config.skip_ignored);
        assert!(!config.enhanced);
    }

    #[test]
    fn json_round_trip() {
        let config = ScanConfig {
            library_path: PathBuf::from("/library"),
            other_paths: vec![PathBuf::from("/mnt/anime")],
            enhanced: true,
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: ScanConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: ScanConfig = serde_json::from_str(r#"{"libraryPath":"/library"}"#).unwrap();
        assert_eq!(config.library_path, PathBuf::from("/library"));
        assert!(config.skip_locked);
    }
}
