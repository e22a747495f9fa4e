use std::{fmt, path::PathBuf, time::Duration};

use crate::{
    executable::ExecutableSource,
    output::LogAction,
    platform::Platform,
    readiness::{self, ReadyPredicate},
    reaper::ReapPolicy,
    workspace::DEFAULT_DB_DIR,
};

const DEFAULT_OUTPUT_MAX_LINES: usize = 1000;
const DEFAULT_READY_TIMEOUT_MS: u64 = 8_000;
const DEFAULT_END_TIMEOUT_MS: u64 = 10_000;

pub(crate) fn env_usize(name: &str) -> Option<usize> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
}

pub(crate) fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
}

pub(crate) fn env_bool(name: &str) -> Option<bool> {
    let v = std::env::var(name).ok()?;
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub(crate) fn output_max_lines() -> usize {
    env_usize("MONGOBOX_OUTPUT_MAX_LINES")
        .map(|v| v.clamp(100, 50_000))
        .unwrap_or(DEFAULT_OUTPUT_MAX_LINES)
}

fn timeout_from_env(name: &str, default_ms: u64) -> Duration {
    Duration::from_millis(
        env_u64(name)
            .map(|v| v.clamp(100, 10 * 60 * 1000))
            .unwrap_or(default_ms),
    )
}

/// How an instance is built and supervised.
#[derive(Clone)]
pub struct ServerOptions {
    /// Log directory; when set, mongod also logs to `<log_path>.log`.
    pub log_path: Option<PathBuf>,
    /// Data directory name relative to the workspace.
    pub db_path: String,
    /// Mirror operational messages and mongod output to stderr.
    pub log_enabled: bool,
    /// Prepare everything but wait for [`crate::Server::start`] to spawn.
    pub init_only: bool,
    pub executable: ExecutableSource,
    /// Parent of the random workspace directory. `None` is the current directory.
    pub root_dir: Option<PathBuf>,
    /// 0 asks the OS for a free port.
    pub port: u16,
    pub ready_timeout: Duration,
    pub end_timeout: Duration,
    pub reap: ReapPolicy,
    pub log_action: Option<LogAction>,
    pub ready_predicate: ReadyPredicate,
}

impl fmt::Debug for ServerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerOptions")
            .field("log_path", &self.log_path)
            .field("db_path", &self.db_path)
            .field("log_enabled", &self.log_enabled)
            .field("init_only", &self.init_only)
            .field("executable", &self.executable)
            .field("root_dir", &self.root_dir)
            .field("port", &self.port)
            .field("ready_timeout", &self.ready_timeout)
            .field("end_timeout", &self.end_timeout)
            .field("reap", &self.reap)
            .field("log_action", &self.log_action.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for ServerOptions {
    fn default() -> Self {
        let executable = match Platform::current() {
            Ok(platform) => ExecutableSource::discover(platform),
            Err(_) => ExecutableSource::Path(PathBuf::from("mongod").join("mongod")),
        };
        Self {
            log_path: None,
            db_path: DEFAULT_DB_DIR.to_string(),
            log_enabled: false,
            init_only: false,
            executable,
            root_dir: None,
            port: 0,
            ready_timeout: Duration::from_millis(DEFAULT_READY_TIMEOUT_MS),
            end_timeout: Duration::from_millis(DEFAULT_END_TIMEOUT_MS),
            reap: ReapPolicy::ImageName,
            log_action: None,
            ready_predicate: readiness::is_ready_line,
        }
    }
}

impl ServerOptions {
    /// Defaults overridden by `MONGOBOX_*` variables. Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut opts = Self::default();
        if let Some(dir) = std::env::var_os("MONGOBOX_ROOT_DIR").filter(|v| !v.is_empty()) {
            opts.root_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = std::env::var_os("MONGOBOX_LOG_PATH").filter(|v| !v.is_empty()) {
            opts.log_path = Some(PathBuf::from(dir));
        }
        if let Ok(db) = std::env::var("MONGOBOX_DB_PATH") {
            let db = db.trim();
            if !db.is_empty() {
                opts.db_path = db.to_string();
            }
        }
        if let Some(port) = std::env::var("MONGOBOX_PORT")
            .ok()
            .and_then(|v| v.trim().parse::<u16>().ok())
        {
            opts.port = port;
        }
        opts.ready_timeout =
            timeout_from_env("MONGOBOX_READY_TIMEOUT_MS", DEFAULT_READY_TIMEOUT_MS);
        opts.end_timeout = timeout_from_env("MONGOBOX_END_TIMEOUT_MS", DEFAULT_END_TIMEOUT_MS);
        if let Some(enabled) = env_bool("MONGOBOX_LOG_ENABLED") {
            opts.log_enabled = enabled;
        }
        if let Some(policy) = std::env::var("MONGOBOX_REAP")
            .ok()
            .and_then(|v| ReapPolicy::parse(&v))
        {
            opts.reap = policy;
        }
        opts
    }

    pub fn executable(mut self, source: ExecutableSource) -> Self {
        self.executable = source;
        self
    }

    pub fn root_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.root_dir = Some(dir.into());
        self
    }

    pub fn log_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_path = Some(dir.into());
        self
    }

    pub fn db_path(mut self, name: impl Into<String>) -> Self {
        self.db_path = name.into();
        self
    }

    pub fn log_enabled(mut self, enabled: bool) -> Self {
        self.log_enabled = enabled;
        self
    }

    pub fn init_only(mut self, init_only: bool) -> Self {
        self.init_only = init_only;
        self
    }

    pub fn ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    pub fn end_timeout(mut self, timeout: Duration) -> Self {
        self.end_timeout = timeout;
        self
    }

    pub fn reap(mut self, policy: ReapPolicy) -> Self {
        self.reap = policy;
        self
    }

    pub fn log_action(mut self, action: LogAction) -> Self {
        self.log_action = Some(action);
        self
    }

    pub fn ready_predicate(mut self, predicate: ReadyPredicate) -> Self {
        self.ready_predicate = predicate;
        self
    }
}
