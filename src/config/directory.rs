//! Directory aggregation: every config document in one directory, folded
//! into a single partial configuration.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{debug, trace};

use super::file::{read_config_file_as, Format};
use super::merge::deep_merge;
use super::ConfigError;

/// Loads one configuration directory into a partial configuration.
///
/// The loader depends on this trait rather than on the filesystem directly,
/// so tests can count or fake directory loads.
pub trait DirectoryLoader: Send + Sync + std::fmt::Debug {
    fn load_directory(&self, dir: &Path) -> Result<Map<String, Value>, ConfigError>;
}

/// Reads configuration documents from a real directory.
///
/// Files are folded in file-name order, so `b.json` overrides `a.json`.
/// A directory that does not exist contributes an empty configuration.
#[derive(Debug, Clone)]
pub struct FileSystemDirectory {
    formats: Vec<Format>,
}

impl FileSystemDirectory {
    pub fn new(formats: impl Into<Vec<Format>>) -> Self {
        Self {
            formats: formats.into(),
        }
    }

    /// Lists the config documents in `dir`, sorted by file name.
    ///
    /// Returns `Ok(None)` if the directory does not exist.
    fn list(&self, dir: &Path) -> Result<Option<Vec<(PathBuf, Format)>>, ConfigError> {
        let dir_error = |source| ConfigError::DirReadError {
            path: dir.to_path_buf(),
            source,
        };

        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(dir_error(e)),
        };

        let mut files = Vec::new();
        for entry in entries {
            let path = entry.map_err(dir_error)?.path();
            if !path.is_file() {
                continue;
            }
            if let Some(format) = Format::for_path(&path, &self.formats) {
                files.push((path, format));
            }
        }
        files.sort_by(|(a, _), (b, _)| a.file_name().cmp(&b.file_name()));

        Ok(Some(files))
    }
}

impl Default for FileSystemDirectory {
    fn default() -> Self {
        Self::new(vec![Format::Json])
    }
}

impl DirectoryLoader for FileSystemDirectory {
    fn load_directory(&self, dir: &Path) -> Result<Map<String, Value>, ConfigError> {
        let Some(files) = self.list(dir)? else {
            debug!(dir = %dir.display(), "config directory not found, using empty layer");
            return Ok(Map::new());
        };

        let mut merged = Map::new();
        for (path, format) in &files {
            let document = read_config_file_as(path, *format)?;
            trace!(path = %path.display(), keys = document.len(), "merging config file");
            deep_merge(&mut merged, document);
        }

        debug!(dir = %dir.display(), files = files.len(), "loaded config directory");
        Ok(merged)
    }
}
