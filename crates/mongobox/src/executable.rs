use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{
    error::{Error, Result},
    platform::Platform,
};

/// Where the mongod binary for an instance comes from.
///
/// Downloading and unpacking packages is someone else's job; by the time a
/// source is resolved the binary must already be on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutableSource {
    /// A pre-installed executable.
    Path(PathBuf),
    /// A directory of unpacked builds named `{os}.mongod_{major}_{arch}`.
    Bundle { dir: PathBuf, major: u32 },
}

impl ExecutableSource {
    /// `MONGOBOX_MONGOD_PATH`, then `MONGOBOX_BUNDLE_DIR`, then `mongod` in
    /// `PATH`, then `./mongod/mongod`.
    pub fn discover(platform: Platform) -> Self {
        if let Some(p) = std::env::var_os("MONGOBOX_MONGOD_PATH").filter(|v| !v.is_empty()) {
            return ExecutableSource::Path(PathBuf::from(p));
        }
        if let Some(dir) = std::env::var_os("MONGOBOX_BUNDLE_DIR").filter(|v| !v.is_empty()) {
            let major = std::env::var("MONGOBOX_BUNDLE_MAJOR")
                .ok()
                .and_then(|v| v.trim().parse::<u32>().ok())
                .unwrap_or(DEFAULT_BUNDLE_MAJOR);
            return ExecutableSource::Bundle {
                dir: PathBuf::from(dir),
                major,
            };
        }

        let exe = platform.staged_file_name("mongod");
        if let Some(found) = find_in_path(&exe) {
            return ExecutableSource::Path(found);
        }
        ExecutableSource::Path(PathBuf::from("mongod").join(exe))
    }

    /// Absolute path of an existing executable file.
    pub fn resolve(&self, platform: Platform) -> Result<PathBuf> {
        let path = match self {
            ExecutableSource::Path(p) => p.clone(),
            ExecutableSource::Bundle { dir, major } => dir.join(platform.bundled_name(*major)?),
        };
        let path = if path.is_relative() {
            std::env::current_dir()
                .map(|cwd| cwd.join(&path))
                .unwrap_or(path)
        } else {
            path
        };

        match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => Ok(path),
            _ => Err(Error::MissingExecutable(path)),
        }
    }
}

pub const DEFAULT_BUNDLE_MAJOR: u32 = 6;

fn find_in_path(bin: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(bin))
        .find(|candidate| is_executable_file(candidate))
}

pub(crate) fn is_executable_file(path: &Path) -> bool {
    let Ok(meta) = fs::metadata(path) else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o111 != 0
    }

    #[cfg(not(unix))]
    {
        true
    }
}
