#![allow(dead_code)]

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use mongobox::{ExecutableSource, ReapPolicy, ServerOptions};

/// How the stand-in mongod behaves once started.
#[derive(Debug, Clone, Copy)]
pub enum Behaviour {
    /// Prints the legacy readiness banner and keeps running.
    Ready,
    /// Prints a structured (JSON) readiness line and keeps running.
    ReadyJson,
    /// Writes a record into its data directory, then behaves like `Ready`.
    WritesData,
    /// Announces readiness after a one second delay.
    SlowReady,
    /// Never announces readiness.
    Silent,
    /// Announces readiness and exits immediately.
    ExitsAfterReady,
}

const PARSE_ARGS: &str = r#"#!/bin/sh
port=""
dbpath=""
while [ $# -gt 0 ]; do
  case "$1" in
    --port) port="$2"; shift 2 ;;
    --dbpath) dbpath="$2"; shift 2 ;;
    *) shift ;;
  esac
done
echo "fake mongod starting, dbpath=$dbpath"
"#;

/// Writes an executable shell script that accepts mongod's arguments.
pub fn fake_mongod(dir: &Path, behaviour: Behaviour) -> PathBuf {
    let body = match behaviour {
        Behaviour::Ready => "echo \"waiting for connections on port $port\"\nexec sleep 30\n",
        Behaviour::ReadyJson => {
            "printf '{\"s\":\"I\",\"c\":\"NETWORK\",\"msg\":\"Waiting for connections\",\"attr\":{\"port\":%s,\"ssl\":\"off\"}}\\n' \"$port\"\nexec sleep 30\n"
        }
        Behaviour::WritesData => {
            "echo record > \"$dbpath/collection-0.wt\"\necho \"waiting for connections on port $port\"\nexec sleep 30\n"
        }
        Behaviour::SlowReady => {
            "sleep 1\necho \"waiting for connections on port $port\"\nexec sleep 30\n"
        }
        Behaviour::Silent => "exec sleep 30\n",
        Behaviour::ExitsAfterReady => "echo \"waiting for connections on port $port\"\nexit 0\n",
    };

    let path = dir.join("mongod");
    std::fs::write(&path, format!("{PARSE_ARGS}{body}")).unwrap();
    make_executable(&path);
    path
}

pub fn make_executable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

/// Options for a test instance rooted in `root` that never touches other processes.
pub fn options(root: &Path, mongod: &Path) -> ServerOptions {
    ServerOptions::default()
        .root_dir(root)
        .executable(ExecutableSource::Path(mongod.to_path_buf()))
        .reap(ReapPolicy::Off)
        .ready_timeout(Duration::from_secs(10))
        .end_timeout(Duration::from_secs(5))
}

/// Polls `check` for up to two seconds.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..40 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    check()
}

/// Number of directories directly under `root`.
pub fn workspace_count(root: &Path) -> usize {
    std::fs::read_dir(root)
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.path().is_dir())
        .count()
}
