//! Best-effort termination of leftover mongod processes.
//!
//! Nothing in here returns an error: failures are logged and the caller moves on.

use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
    time::Duration,
};

use sysinfo::{
    Pid, Process, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, Signal, System, UpdateKind,
};
use tokio::time::Instant;

use crate::workspace;

/// Image names of the server across platforms.
pub const MONGOD_IMAGE_NAMES: [&str; 2] = ["mongod.exe", "mongod"];

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);
const KILL_GRACE: Duration = Duration::from_millis(500);

/// Which processes a new instance clears before it allocates a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReapPolicy {
    Off,
    /// Every process named like mongod, system wide.
    ImageName,
    /// Only processes running inside a workspace whose owner has died.
    Orphaned,
}

impl ReapPolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "off" | "none" | "false" | "0" => Some(ReapPolicy::Off),
            "image-name" | "image_name" | "name" => Some(ReapPolicy::ImageName),
            "orphaned" | "orphans" => Some(ReapPolicy::Orphaned),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReapReport {
    /// Live processes selected for termination.
    pub matched: usize,
    /// Matched processes confirmed gone.
    pub terminated: usize,
    /// Stale workspace directories deleted.
    pub workspaces_removed: usize,
}

/// Applies `policy`. `root` is scanned for abandoned workspaces under
/// [`ReapPolicy::Orphaned`].
pub async fn reap(policy: ReapPolicy, root: &Path, timeout: Duration) -> ReapReport {
    match policy {
        ReapPolicy::Off => ReapReport::default(),
        ReapPolicy::ImageName => reap_stale(&MONGOD_IMAGE_NAMES, timeout).await,
        ReapPolicy::Orphaned => reap_orphaned(root, timeout).await,
    }
}

/// Terminates every live process whose image name is one of `names`, waiting up
/// to `timeout` for each.
pub async fn reap_stale(names: &[&str], timeout: Duration) -> ReapReport {
    let system = snapshot();
    let me = sysinfo::get_current_pid().ok();

    let targets: Vec<(Pid, String)> = system
        .processes()
        .iter()
        .filter(|(pid, p)| {
            Some(**pid) != me
                && !has_exited(p)
                && names.iter().any(|n| p.name() == OsStr::new(n))
        })
        .map(|(pid, p)| (*pid, p.name().to_string_lossy().into_owned()))
        .collect();

    let mut report = ReapReport {
        matched: targets.len(),
        ..ReapReport::default()
    };
    for (pid, name) in targets {
        tracing::info!(pid = pid.as_u32(), %name, "killing stale mongod process");
        if terminate(&system, pid, timeout).await {
            report.terminated += 1;
        }
    }
    report
}

/// Terminates processes whose working directory is a workspace with a dead
/// owner, then deletes such workspaces found under `root`.
pub async fn reap_orphaned(root: &Path, timeout: Duration) -> ReapReport {
    let system = snapshot();
    let me = sysinfo::get_current_pid().ok();

    let mut stale_dirs: Vec<PathBuf> = Vec::new();
    let mut targets: Vec<Pid> = Vec::new();
    for (pid, p) in system.processes() {
        if Some(*pid) == me || has_exited(p) {
            continue;
        }
        let Some(cwd) = p.cwd() else {
            continue;
        };
        if owner_is_dead(&system, cwd) {
            targets.push(*pid);
            if !stale_dirs.iter().any(|d| d == cwd) {
                stale_dirs.push(cwd.to_path_buf());
            }
        }
    }

    if let Ok(entries) = std::fs::read_dir(root) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() && owner_is_dead(&system, &path) && !stale_dirs.contains(&path) {
                stale_dirs.push(path);
            }
        }
    }

    let mut report = ReapReport {
        matched: targets.len(),
        ..ReapReport::default()
    };
    for pid in targets {
        tracing::info!(pid = pid.as_u32(), "killing orphaned mongobox process");
        if terminate(&system, pid, timeout).await {
            report.terminated += 1;
        }
    }
    for dir in stale_dirs {
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => {
                tracing::info!(path = %dir.display(), "removed orphaned workspace");
                report.workspaces_removed += 1;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %dir.display(), error = %e, "could not remove orphaned workspace");
            }
        }
    }
    report
}

fn snapshot() -> System {
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::All,
        true,
        ProcessRefreshKind::nothing().with_cwd(UpdateKind::OnlyIfNotSet),
    );
    system
}

fn has_exited(p: &Process) -> bool {
    matches!(p.status(), ProcessStatus::Zombie | ProcessStatus::Dead)
}

fn owner_is_dead(system: &System, dir: &Path) -> bool {
    let Some(owner) = workspace::read_owner(dir) else {
        return false;
    };
    if owner == std::process::id() {
        return false;
    }
    system
        .process(Pid::from_u32(owner))
        .is_none_or(has_exited)
}

/// SIGTERM, wait up to `timeout`, then SIGKILL. Returns whether the process is gone.
async fn terminate(system: &System, pid: Pid, timeout: Duration) -> bool {
    let Some(process) = system.process(pid) else {
        return true;
    };

    let sent = process
        .kill_with(Signal::Term)
        .unwrap_or_else(|| process.kill());
    if !sent {
        tracing::warn!(pid = pid.as_u32(), "failed to signal process");
    }
    if wait_for_exit(pid, timeout).await {
        return true;
    }

    tracing::warn!(
        pid = pid.as_u32(),
        timeout_ms = timeout.as_millis() as u64,
        "process ignored termination; killing"
    );
    if !process.kill() {
        tracing::warn!(pid = pid.as_u32(), "failed to kill process");
    }
    wait_for_exit(pid, KILL_GRACE).await
}

async fn wait_for_exit(pid: Pid, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    let mut system = System::new();
    loop {
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing(),
        );
        match system.process(pid) {
            None => return true,
            Some(p) if has_exited(p) => return true,
            Some(_) => {}
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(EXIT_POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_policy_names() {
        assert_eq!(ReapPolicy::parse("off"), Some(ReapPolicy::Off));
        assert_eq!(ReapPolicy::parse(" Image-Name "), Some(ReapPolicy::ImageName));
        assert_eq!(ReapPolicy::parse("orphaned"), Some(ReapPolicy::Orphaned));
        assert_eq!(ReapPolicy::parse("everything"), None);
    }

    #[tokio::test]
    async fn off_policy_does_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let report = reap(ReapPolicy::Off, dir.path(), Duration::from_millis(10)).await;
        assert_eq!(report, ReapReport::default());
    }

    #[tokio::test]
    async fn unknown_names_match_nothing() {
        let report = reap_stale(&["mongobox-no-such-process-name"], Duration::from_millis(10)).await;
        assert_eq!(report.matched, 0);
        assert_eq!(report.terminated, 0);
    }

    #[tokio::test]
    async fn orphaned_scan_removes_dead_owner_workspaces_only() {
        let root = tempfile::tempdir().unwrap();

        let dead = root.path().join("deadowner123");
        std::fs::create_dir_all(&dead).unwrap();
        // Pids never reach u32::MAX - 1 on any supported platform.
        std::fs::write(dead.join(workspace::MARKER_FILE), (u32::MAX - 1).to_string()).unwrap();

        let mine = root.path().join("liveowner123");
        std::fs::create_dir_all(&mine).unwrap();
        std::fs::write(
            mine.join(workspace::MARKER_FILE),
            std::process::id().to_string(),
        )
        .unwrap();

        let unrelated = root.path().join("not-a-workspace");
        std::fs::create_dir_all(&unrelated).unwrap();

        let report = reap_orphaned(root.path(), Duration::from_millis(100)).await;
        assert_eq!(report.workspaces_removed, 1);
        assert!(!dead.exists());
        assert!(mine.exists());
        assert!(unrelated.exists());
    }
}
