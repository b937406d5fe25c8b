//! Testcase persistence
//!
//! Testcases are stored as one pretty-printed JSON document per test name.

use std::fs;
use std::path::{Path, PathBuf};

use querywatch_types::Testcase;
use tracing::debug;

use crate::error::{EngineError, Result};

const EXTENSION: &str = "json";

/// Storage for recorded testcases
pub trait TestStore: Send + Sync {
    /// Load a testcase by name
    fn get(&self, name: &str) -> Result<Testcase>;

    /// Persist a testcase (additional expectations are never written)
    fn write(&self, name: &str, testcase: &Testcase) -> Result<()>;

    /// All stored testcases, sorted by name
    fn all(&self) -> Result<Vec<Testcase>>;

    fn exists(&self, name: &str) -> bool;
}

/// Directory of `<name>.json` files
#[derive(Clone, Debug)]
pub struct JsonTestStore {
    dir: PathBuf,
}

impl JsonTestStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.dir.join(format!("{name}.{EXTENSION}")))
    }

    fn read_file(path: &Path) -> Result<Testcase> {
        let content = fs::read_to_string(path).map_err(|source| EngineError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| EngineError::Deserialize {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl TestStore for JsonTestStore {
    fn get(&self, name: &str) -> Result<Testcase> {
        let path = self.path_for(name)?;
        if !path.exists() {
            return Err(EngineError::NotFound(name.to_string()));
        }
        Self::read_file(&path)
    }

    fn write(&self, name: &str, testcase: &Testcase) -> Result<()> {
        let path = self.path_for(name)?;
        let io_err = |source| EngineError::Io {
            path: path.clone(),
            source,
        };

        let content = serde_json::to_string_pretty(&testcase.persisted()).map_err(|source| {
            EngineError::Serialize {
                name: name.to_string(),
                source,
            }
        })?;

        fs::create_dir_all(&self.dir).map_err(|source| EngineError::Io {
            path: self.dir.clone(),
            source,
        })?;

        // Write then rename so readers never see a half-written document
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content).map_err(io_err)?;
        fs::rename(&tmp, &path).map_err(io_err)?;

        debug!(name, path = %path.display(), "testcase written");
        Ok(())
    }

    fn all(&self) -> Result<Vec<Testcase>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(EngineError::Io {
                    path: self.dir.clone(),
                    source,
                });
            }
        };

        let mut testcases = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|source| EngineError::Io {
                    path: self.dir.clone(),
                    source,
                })?
                .path();
            if path.extension().and_then(|e| e.to_str()) == Some(EXTENSION) {
                testcases.push(Self::read_file(&path)?);
            }
        }

        testcases.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(testcases)
    }

    fn exists(&self, name: &str) -> bool {
        self.path_for(name).map(|p| p.exists()).unwrap_or(false)
    }
}

/// Test names become file names, so keep them to a single path component
fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(EngineError::InvalidName(name.to_string()))
    }
}
