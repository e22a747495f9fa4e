use std::{fmt, path::PathBuf};

/// Random token naming one instance's workspace and staged executable.
///
/// NOTE: Tokens are generated by the allocator; this type only carries them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct InstanceId(pub String);

impl InstanceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of one managed server.
///
/// `Uninitialized -> Allocating -> Staging -> Starting -> Active -> Disposed`.
/// An init-only instance parks in `Starting` without a process until started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Uninitialized,
    Allocating,
    Staging,
    Starting,
    Active,
    Disposed,
}

impl LifecycleState {
    pub fn is_terminal(self) -> bool {
        matches!(self, LifecycleState::Disposed)
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_advance_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        match (self, next) {
            (_, Disposed) => true,
            (Uninitialized, Allocating)
            | (Allocating, Staging)
            | (Staging, Starting)
            | (Starting, Active) => true,
            _ => false,
        }
    }
}

/// Outcome of waiting on the readiness gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    Pending,
    Ready,
    TimedOut,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct InstanceStatus {
    pub id: InstanceId,
    pub state: LifecycleState,
    pub readiness: Readiness,
    pub host: String,
    pub port: u16,
    pub pid: Option<u32>,
    pub workspace: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_advances_in_order() {
        use LifecycleState::*;
        let order = [Uninitialized, Allocating, Staging, Starting, Active, Disposed];
        for pair in order.windows(2) {
            assert!(pair[0].can_advance_to(pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn lifecycle_rejects_skips_and_regressions() {
        use LifecycleState::*;
        assert!(!Allocating.can_advance_to(Active));
        assert!(!Active.can_advance_to(Starting));
        assert!(!Disposed.can_advance_to(Active));
    }

    #[test]
    fn any_state_may_be_disposed() {
        use LifecycleState::*;
        for s in [Uninitialized, Allocating, Staging, Starting, Active, Disposed] {
            assert!(s.can_advance_to(Disposed));
        }
        assert!(Disposed.is_terminal());
        assert!(!Active.is_terminal());
    }

    #[test]
    fn status_serializes_snake_case_states() {
        let status = InstanceStatus {
            id: InstanceId("abc1234".to_string()),
            state: LifecycleState::Active,
            readiness: Readiness::TimedOut,
            host: "127.0.0.1".to_string(),
            port: 27017,
            pid: None,
            workspace: PathBuf::from("/tmp/ws"),
        };
        let v = serde_json::to_value(&status).unwrap();
        assert_eq!(v["state"], "active");
        assert_eq!(v["readiness"], "timed_out");
        assert_eq!(v["id"], "abc1234");
    }
}
