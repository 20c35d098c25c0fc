use std::path::{Path, PathBuf};

/// Well-known paths under `.saga/`.
#[derive(Debug, Clone)]
pub struct SagaPaths {
    pub root: PathBuf,
    pub saga_dir: PathBuf,
    pub db_file: PathBuf,
    pub config_json: PathBuf,
}

impl SagaPaths {
    /// Derive all paths from a repository root. No I/O.
    pub fn discover(repo_root: impl Into<PathBuf>) -> Self {
        let root = repo_root.into();
        let saga_dir = root.join(".saga");
        Self {
            db_file: saga_dir.join("saga.db"),
            config_json: saga_dir.join("config.json"),
            saga_dir,
            root,
        }
    }

    /// Create `.saga/`. Idempotent.
    pub fn ensure_layout(&self) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.saga_dir)?;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.saga_dir.is_dir()
    }

    /// Walk up from `start` to the nearest directory holding `.saga/` or
    /// `.git`.
    pub fn find_root(start: &Path) -> Option<PathBuf> {
        let mut cur = start.to_path_buf();
        loop {
            if cur.join(".saga").is_dir() || cur.join(".git").exists() {
                return Some(cur);
            }
            if !cur.pop() {
                return None;
            }
        }
    }

    /// Repository display name: the root directory's file name.
    pub fn default_name(&self) -> String {
        self.root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "repository".to_string())
    }
}
