use std::{
    io,
    path::{Path, PathBuf},
};

use crate::{
    allocator,
    error::{Error, Result},
};

/// Marker file at the root of every workspace; holds the owner's pid.
pub const MARKER_FILE: &str = ".mongobox";
pub const DEFAULT_DB_DIR: &str = "db";
pub const DEFAULT_LOG_DIR: &str = "logs";

/// Private directory tree of one instance: staged executable, data, logs.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    db_path: PathBuf,
    log_dir: PathBuf,
    log_override: Option<PathBuf>,
}

impl Workspace {
    /// Creates `<parent>/<random>` with its data and log directories.
    pub async fn create(parent: &Path, db_dir: &str, log_override: Option<&Path>) -> Result<Self> {
        let root = parent.join(allocator::random_name(allocator::WORKSPACE_NAME_LEN));
        let db_path = root.join(db_dir);
        let log_dir = match log_override {
            Some(p) => p.to_path_buf(),
            None => root.join(DEFAULT_LOG_DIR),
        };

        let marker = root.join(MARKER_FILE);
        let created: std::result::Result<(), (PathBuf, io::Error)> = async {
            for dir in [&root, &log_dir, &db_path] {
                tokio::fs::create_dir_all(dir)
                    .await
                    .map_err(|e| (dir.clone(), e))?;
            }
            tokio::fs::write(&marker, std::process::id().to_string())
                .await
                .map_err(|e| (marker.clone(), e))
        }
        .await;
        if let Err((path, source)) = created {
            if let Err(rm) = remove_dir_if_present(&root) {
                tracing::warn!(path = %root.display(), error = %rm, "failed to remove partially created workspace");
            }
            return Err(Error::Workspace { path, source });
        }

        Ok(Self {
            root,
            db_path,
            log_dir,
            log_override: log_override.map(Path::to_path_buf),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Log path handed to mongod, only when the caller chose one.
    pub fn log_override(&self) -> Option<&Path> {
        self.log_override.as_deref()
    }

    pub fn flush_db(&self) -> Result<()> {
        remove_dir_if_present(&self.db_path).map_err(|e| Error::Flush {
            path: self.db_path.clone(),
            source: e,
        })?;
        Ok(())
    }

    pub fn flush_logs(&self) -> Result<()> {
        remove_dir_if_present(&self.log_dir).map_err(|e| Error::Flush {
            path: self.log_dir.clone(),
            source: e,
        })?;
        if let Some(p) = &self.log_override {
            let file = PathBuf::from(format!("{}.log", p.display()));
            match std::fs::remove_file(&file) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(Error::Flush { path: file, source: e }),
            }
        }
        Ok(())
    }

    /// Deletes the whole tree. `Ok(false)` when it was already gone.
    pub fn remove(&self) -> io::Result<bool> {
        remove_dir_if_present(&self.root)
    }
}

/// Reads the owner pid recorded in a workspace marker.
pub fn read_owner(dir: &Path) -> Option<u32> {
    let raw = std::fs::read_to_string(dir.join(MARKER_FILE)).ok()?;
    raw.trim().parse().ok()
}

fn remove_dir_if_present(path: &Path) -> io::Result<bool> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
