//! Persisted set of message ids that already produced a sink row.
//!
//! The ledger only ever grows. It is stored as a JSON array at a local path;
//! a missing file means nothing has been processed yet. Saves go through a
//! temporary sibling file and a rename so an interrupted write leaves the
//! previous ledger intact.

use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{PollerError, PollerResult};

#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
    ids: BTreeSet<String>,
}

impl Ledger {
    /// Load the ledger at `path`, or start empty if the file does not exist
    pub fn load(path: impl Into<PathBuf>) -> PollerResult<Self> {
        let path = path.into();

        if !path.exists() {
            debug!(path = %path.display(), "no ledger yet, starting empty");
            return Ok(Self {
                path,
                ids: BTreeSet::new(),
            });
        }

        let json = fs::read_to_string(&path).map_err(|source| PollerError::Ledger {
            path: path.clone(),
            source,
        })?;
        let ids: BTreeSet<String> = if json.trim().is_empty() {
            BTreeSet::new()
        } else {
            serde_json::from_str::<Vec<String>>(&json)
                .map_err(|source| PollerError::LedgerFormat {
                    path: path.clone(),
                    source,
                })?
                .into_iter()
                .collect()
        };

        debug!(path = %path.display(), count = ids.len(), "loaded ledger");
        Ok(Self { path, ids })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Add an id in memory. Returns false if it was already present.
    pub fn add(&mut self, id: impl Into<String>) -> bool {
        self.ids.insert(id.into())
    }

    /// Add an id and persist immediately
    pub fn record(&mut self, id: impl Into<String>) -> PollerResult<()> {
        if self.add(id) {
            self.save()?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Write the whole set to disk, replacing the previous file atomically
    pub fn save(&self) -> PollerResult<()> {
        let io_err = |source: std::io::Error| PollerError::Ledger {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let ids: Vec<&String> = self.ids.iter().collect();
        let json = serde_json::to_string_pretty(&ids).map_err(|source| {
            PollerError::LedgerFormat {
                path: self.path.clone(),
                source,
            }
        })?;

        let tmp_path = tmp_path_for(&self.path);
        {
            let mut file = fs::File::create(&tmp_path).map_err(io_err)?;
            file.write_all(json.as_bytes()).map_err(io_err)?;
            file.sync_all().map_err(io_err)?;
        }
        fs::rename(&tmp_path, &self.path).map_err(io_err)?;

        debug!(path = %self.path.display(), count = self.ids.len(), "saved ledger");
        Ok(())
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
