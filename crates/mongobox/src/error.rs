use std::{io, path::PathBuf};

/// Step of instance construction or use that produced an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Platform,
    Allocating,
    Staging,
    Starting,
    Flushing,
    Lifecycle,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Platform => "platform",
            Stage::Allocating => "allocating",
            Stage::Staging => "staging",
            Stage::Starting => "starting",
            Stage::Flushing => "flushing",
            Stage::Lifecycle => "lifecycle",
        }
    }
}

/// Fatal failures surfaced to the caller.
///
/// A readiness timeout is not represented here: it leaves the instance usable
/// and is reported through [`mongobox_process::Readiness::TimedOut`]. Teardown
/// failures are logged and never returned.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("[platform] no mongod build is known for {os}/{arch}")]
    PlatformUnsupported { os: String, arch: String },

    #[error("[allocating] could not allocate a free tcp port: {0}")]
    PortAllocation(#[source] io::Error),

    #[error("[allocating] could not prepare workspace {}: {source}", path.display())]
    Workspace {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("[staging] could not stage {} into {}: {source}", from.display(), to.display())]
    Staging {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("[staging] mongod executable not found at {}", .0.display())]
    MissingExecutable(PathBuf),

    #[error("[starting] could not spawn {}: {source}", path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("[flushing] could not delete {}: {source}", path.display())]
    Flush {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("[lifecycle] instance has already been disposed")]
    Disposed,
}

impl Error {
    pub fn stage(&self) -> Stage {
        match self {
            Error::PlatformUnsupported { .. } => Stage::Platform,
            Error::PortAllocation(_) | Error::Workspace { .. } => Stage::Allocating,
            Error::Staging { .. } | Error::MissingExecutable(_) => Stage::Staging,
            Error::Spawn { .. } => Stage::Starting,
            Error::Flush { .. } => Stage::Flushing,
            Error::Disposed => Stage::Lifecycle,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
