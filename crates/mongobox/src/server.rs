use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use mongobox_process::{InstanceId, InstanceStatus, LifecycleState, Readiness};
use tokio::process::Child;

use crate::{
    allocator,
    config::ServerOptions,
    error::{Error, Result},
    launcher::{self, ReadyWatch},
    output::OutputSink,
    platform::{self, LOOPBACK, Platform},
    readiness::{ReadinessGate, ReadyPredicate},
    reaper::{self, MONGOD_IMAGE_NAMES, ReapReport},
    stager,
    workspace::Workspace,
};

/// Where a client should connect.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ConnectionInfo {
    pub host: String,
    pub port: u16,
}

impl ConnectionInfo {
    pub fn uri(&self) -> String {
        format!("mongodb://{}:{}/?directConnection=true", self.host, self.port)
    }

    #[cfg(feature = "driver")]
    pub async fn client(&self) -> mongodb::error::Result<mongodb::Client> {
        mongodb::Client::with_uri_str(self.uri()).await
    }
}

#[derive(Debug, Clone, Copy)]
struct Lifecycle {
    state: LifecycleState,
    readiness: Readiness,
    pid: Option<u32>,
}

/// One throwaway mongod and its private workspace.
///
/// Dropping a `Server` without calling [`Server::shutdown`] still kills the
/// process and deletes the workspace, without waiting for the exit.
pub struct Server {
    id: InstanceId,
    port: u16,
    workspace: Workspace,
    program: PathBuf,
    args: Vec<String>,
    ready_timeout: Duration,
    end_timeout: Duration,
    ready_predicate: ReadyPredicate,
    sink: OutputSink,
    gate: Arc<ReadinessGate>,
    lifecycle: Mutex<Lifecycle>,
    child: tokio::sync::Mutex<Option<Child>>,
}

impl Server {
    /// Allocates, stages and (unless `init_only`) starts a new instance.
    ///
    /// Any failure before the process is spawned is returned and leaves nothing
    /// behind on disk.
    pub async fn new(options: ServerOptions) -> Result<Self> {
        let platform = Platform::current()?;
        let id = allocator::new_instance_id();
        let sink = OutputSink::new(id.clone(), options.log_enabled, options.log_action.clone());
        let mut lifecycle = Lifecycle {
            state: LifecycleState::Uninitialized,
            readiness: Readiness::Pending,
            pid: None,
        };

        advance(&mut lifecycle, LifecycleState::Allocating);
        let root = match &options.root_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().map_err(|e| Error::Workspace {
                path: PathBuf::from("."),
                source: e,
            })?,
        };
        let reaped = reaper::reap(options.reap, &root, options.end_timeout).await;
        if reaped.matched > 0 || reaped.workspaces_removed > 0 {
            sink.note(format!(
                "reaped stale state: matched={} terminated={} workspaces_removed={}",
                reaped.matched, reaped.terminated, reaped.workspaces_removed
            ));
        }

        let source = options.executable.resolve(platform)?;
        let port = allocator::allocate_tcp_port(options.port)?;
        let workspace =
            Workspace::create(&root, &options.db_path, options.log_path.as_deref()).await?;
        sink.note(format!("working path created: {}", workspace.root().display()));
        sink.note(format!("logging path created: {}", workspace.log_dir().display()));
        sink.note(format!("database path created: {}", workspace.db_path().display()));

        advance(&mut lifecycle, LifecycleState::Staging);
        let program = match stager::stage(platform, workspace.root(), id.as_str(), &source).await {
            Ok(p) => p,
            Err(e) => {
                if let Err(rm) = workspace.remove() {
                    tracing::warn!(path = %workspace.root().display(), error = %rm, "failed to remove workspace after staging error");
                }
                return Err(e);
            }
        };
        sink.note(format!("executable staged at: {}", program.display()));

        let args = platform::launch_args(
            platform.arch,
            workspace.db_path(),
            port,
            workspace.log_override(),
        );

        advance(&mut lifecycle, LifecycleState::Starting);
        let server = Self {
            id,
            port,
            workspace,
            program,
            args,
            ready_timeout: options.ready_timeout,
            end_timeout: options.end_timeout,
            ready_predicate: options.ready_predicate,
            sink,
            gate: Arc::new(ReadinessGate::new()),
            lifecycle: Mutex::new(lifecycle),
            child: tokio::sync::Mutex::new(None),
        };

        if !options.init_only {
            // On failure `server` drops here and removes the workspace.
            server.start().await?;
        }
        Ok(server)
    }

    /// Spawns mongod and waits for it to report readiness.
    ///
    /// A readiness timeout is not an error: the instance becomes `Active` with
    /// [`Readiness::TimedOut`] and clients may fail to connect. Calling this on
    /// a started instance is a no-op.
    pub async fn start(&self) -> Result<Readiness> {
        {
            let mut child = self.child.lock().await;
            let current = self.snapshot();
            if current.state == LifecycleState::Disposed {
                return Err(Error::Disposed);
            }
            if child.is_some() {
                if current.state == LifecycleState::Active {
                    return Ok(current.readiness);
                }
                // Another caller spawned it and is still waiting.
                drop(child);
                return Ok(self.gate.wait(self.ready_timeout).await);
            }

            let spawned = launcher::launch(
                &self.program,
                &self.args,
                self.workspace.root(),
                &self.sink,
                ReadyWatch {
                    gate: self.gate.clone(),
                    predicate: self.ready_predicate,
                    port: self.port,
                },
            )
            .await?;
            let pid = spawned.id();
            *child = Some(spawned);
            self.update(|l| l.pid = pid);
            self.sink.note(format!(
                "spawned {} {} (pid {:?})",
                self.program.display(),
                self.args.join(" "),
                pid
            ));
        }

        let readiness = self.gate.wait(self.ready_timeout).await;
        if readiness == Readiness::TimedOut {
            tracing::warn!(
                instance = %self.id,
                port = self.port,
                timeout_ms = self.ready_timeout.as_millis() as u64,
                "mongod did not report readiness in time; continuing"
            );
            self.sink.note(format!(
                "no readiness signal within {}ms; marking active anyway",
                self.ready_timeout.as_millis()
            ));
        }
        self.update(|l| {
            if l.state == LifecycleState::Starting {
                advance(l, LifecycleState::Active);
                l.readiness = readiness;
            }
        });
        Ok(readiness)
    }

    /// Kills the process and deletes the workspace. Never fails; safe to repeat.
    pub async fn shutdown(&self) {
        let mut child = self.child.lock().await;
        let already = self.update(|l| {
            let was = l.state;
            advance(l, LifecycleState::Disposed);
            was == LifecycleState::Disposed
        });
        if already {
            return;
        }

        if let Some(mut process) = child.take() {
            self.stop_process(&mut process).await;
        }
        drop(child);

        self.sink.note(format!(
            "deleting working path at {}",
            self.workspace.root().display()
        ));
        self.remove_workspace();
    }

    async fn stop_process(&self, process: &mut Child) {
        match process.try_wait() {
            Ok(Some(status)) => {
                self.sink.note(format!("mongod already exited: {status}"));
                return;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(instance = %self.id, error = %e, "could not poll mongod process");
            }
        }

        if let Err(e) = process.start_kill() {
            tracing::warn!(instance = %self.id, error = %e, "failed to kill mongod process");
            return;
        }
        match tokio::time::timeout(self.end_timeout, process.wait()).await {
            Ok(Ok(status)) => self.sink.note(format!("mongod stopped: {status}")),
            Ok(Err(e)) => {
                tracing::warn!(instance = %self.id, error = %e, "failed to wait for mongod exit");
            }
            Err(_) => {
                tracing::warn!(
                    instance = %self.id,
                    timeout_ms = self.end_timeout.as_millis() as u64,
                    "mongod did not exit in time"
                );
            }
        }
    }

    fn remove_workspace(&self) {
        if let Err(e) = self.workspace.remove() {
            tracing::warn!(
                instance = %self.id,
                path = %self.workspace.root().display(),
                error = %e,
                "failed to delete workspace"
            );
        }
    }

    /// Terminates every mongod on the host, not only this instance's.
    pub async fn kill(&self) -> ReapReport {
        reaper::reap_stale(&MONGOD_IMAGE_NAMES, self.end_timeout).await
    }

    /// Deletes the data directory. mongod should be stopped or tolerant of it.
    pub fn flush_db(&self) -> Result<()> {
        self.sink.note(format!(
            "flushing database at {}",
            self.workspace.db_path().display()
        ));
        self.workspace.flush_db()
    }

    pub fn flush_logs(&self) -> Result<()> {
        self.sink.note(format!(
            "flushing logs at {}",
            self.workspace.log_dir().display()
        ));
        self.workspace.flush_logs()
    }

    pub fn connection(&self) -> ConnectionInfo {
        ConnectionInfo {
            host: LOOPBACK.to_string(),
            port: self.port,
        }
    }

    #[cfg(feature = "driver")]
    pub async fn client(&self) -> mongodb::error::Result<mongodb::Client> {
        self.connection().client().await
    }

    pub fn id(&self) -> &InstanceId {
        &self.id
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn workspace(&self) -> &Path {
        self.workspace.root()
    }

    pub fn db_path(&self) -> &Path {
        self.workspace.db_path()
    }

    pub fn log_dir(&self) -> &Path {
        self.workspace.log_dir()
    }

    pub fn executable(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn state(&self) -> LifecycleState {
        self.snapshot().state
    }

    pub fn readiness(&self) -> Readiness {
        self.snapshot().readiness
    }

    pub fn is_active(&self) -> bool {
        self.state() == LifecycleState::Active
    }

    pub fn pid(&self) -> Option<u32> {
        self.snapshot().pid
    }

    pub fn status(&self) -> InstanceStatus {
        let l = self.snapshot();
        InstanceStatus {
            id: self.id.clone(),
            state: l.state,
            readiness: l.readiness,
            host: LOOPBACK.to_string(),
            port: self.port,
            pid: l.pid,
            workspace: self.workspace.root().to_path_buf(),
        }
    }

    /// Last `limit` lines of controller messages and mongod output.
    pub fn recent_output(&self, limit: usize) -> Vec<String> {
        self.sink.recent(limit)
    }

    /// Output recorded after `cursor` (0 for everything still buffered) and
    /// the cursor to pass next time.
    pub fn output_since(&self, cursor: u64, limit: usize) -> (Vec<String>, u64) {
        self.sink.since(cursor, limit)
    }

    fn snapshot(&self) -> Lifecycle {
        *self.lifecycle.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn update<T>(&self, f: impl FnOnce(&mut Lifecycle) -> T) -> T {
        let mut l = self.lifecycle.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut l)
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        let l = self.lifecycle.get_mut().unwrap_or_else(|e| e.into_inner());
        if l.state == LifecycleState::Disposed {
            return;
        }
        advance(l, LifecycleState::Disposed);

        if let Some(process) = self.child.get_mut().as_mut()
            && let Err(e) = process.start_kill()
        {
            tracing::debug!(instance = %self.id, error = %e, "mongod not killed on drop");
        }
        self.remove_workspace();
    }
}

fn advance(l: &mut Lifecycle, next: LifecycleState) {
    if l.state == next {
        return;
    }
    debug_assert!(
        l.state.can_advance_to(next),
        "illegal transition {:?} -> {:?}",
        l.state,
        next
    );
    tracing::debug!(from = ?l.state, to = ?next, "lifecycle transition");
    l.state = next;
}
