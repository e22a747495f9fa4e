//! Throwaway, test-scoped `mongod` instances.
//!
//! [`Server::new`] clears stale processes, picks a free port, stages the mongod
//! binary into a random workspace under the current directory, starts it and
//! waits for it to announce readiness. [`Server::shutdown`] (or dropping the
//! server) kills the process and deletes the workspace.

pub mod allocator;
pub mod config;
pub mod error;
pub mod executable;
pub mod launcher;
pub mod output;
pub mod platform;
pub mod readiness;
pub mod reaper;
pub mod server;
pub mod shared;
pub mod stager;
pub mod workspace;

pub use config::ServerOptions;
pub use error::{Error, Result, Stage};
pub use executable::ExecutableSource;
pub use mongobox_process::{InstanceId, InstanceStatus, LifecycleState, Readiness};
pub use output::LogAction;
pub use reaper::{ReapPolicy, ReapReport};
pub use server::{ConnectionInfo, Server};
pub use shared::SharedServer;
