use std::path::{Path, PathBuf};

use crate::{
    error::{Error, Result},
    platform::Platform,
};

/// Copies `source` into `workspace` as `<name>[.exe]` and makes it runnable.
///
/// On unix the copy is set to mode 0700 before first launch.
pub async fn stage(
    platform: Platform,
    workspace: &Path,
    name: &str,
    source: &Path,
) -> Result<PathBuf> {
    let staged = workspace.join(platform.staged_file_name(name));
    let staging_error = |e: std::io::Error| Error::Staging {
        from: source.to_path_buf(),
        to: staged.clone(),
        source: e,
    };

    tokio::fs::copy(source, &staged)
        .await
        .map_err(staging_error)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&staged, std::fs::Permissions::from_mode(0o700))
            .await
            .map_err(staging_error)?;
    }

    if !tokio::fs::try_exists(&staged).await.unwrap_or(false) {
        return Err(Error::MissingExecutable(staged));
    }
    Ok(staged)
}
