//! Tree manifest
//!
//! A file-backed tree keeps its root id and node count in `manifest.json`
//! next to the page file. The manifest is replaced atomically:
//! 1. write `manifest.json.tmp`
//! 2. fsync it
//! 3. rename over `manifest.json`

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

pub const MANIFEST_FILE_NAME: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeManifest {
    /// Root record, absent for an empty tree
    pub root_id: Option<u64>,
    pub node_count: usize,
    /// Page capacity the records were written with
    pub max_object_size: usize,
}

impl TreeManifest {
    /// Reads the manifest under `data_dir`, `None` if there is none yet
    pub fn load(data_dir: &Path) -> EngineResult<Option<Self>> {
        let path = data_dir.join(MANIFEST_FILE_NAME);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        let manifest = serde_json::from_str(&content).map_err(|e| {
            EngineError::corruption(format!("failed to parse {}: {}", path.display(), e))
        })?;
        Ok(Some(manifest))
    }

    pub fn save(&self, data_dir: &Path) -> EngineResult<()> {
        fs::create_dir_all(data_dir)?;
        let final_path = data_dir.join(MANIFEST_FILE_NAME);
        let temp_path = data_dir.join(format!("{}.tmp", MANIFEST_FILE_NAME));

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| EngineError::Config(format!("failed to serialize manifest: {}", e)))?;

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        fs::rename(&temp_path, &final_path)?;

        if let Ok(dir) = File::open(data_dir) {
            let _ = dir.sync_all();
        }
        Ok(())
    }

    /// Records written for one capacity cannot be read under a smaller one
    pub fn check_capacity(&self, max_object_size: usize) -> EngineResult<()> {
        if max_object_size < self.max_object_size {
            return Err(EngineError::Config(format!(
                "tree was written with max_object_size {}, configured {}",
                self.max_object_size, max_object_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_manifest_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        assert!(TreeManifest::load(temp_dir.path()).unwrap().is_none());

        let manifest = TreeManifest {
            root_id: Some(3),
            node_count: 17,
            max_object_size: 512,
        };
        manifest.save(temp_dir.path()).unwrap();
        assert_eq!(TreeManifest::load(temp_dir.path()).unwrap(), Some(manifest));
        assert!(!temp_dir.path().join("manifest.json.tmp").exists());
    }

    #[test]
    fn test_garbled_manifest() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(MANIFEST_FILE_NAME), "{ not json").unwrap();
        let err = TreeManifest::load(temp_dir.path()).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_capacity_check() {
        let manifest = TreeManifest {
            root_id: None,
            node_count: 0,
            max_object_size: 1024,
        };
        assert!(manifest.check_capacity(1024).is_ok());
        assert!(manifest.check_capacity(4096).is_ok());
        assert!(manifest.check_capacity(512).is_err());
    }
}
