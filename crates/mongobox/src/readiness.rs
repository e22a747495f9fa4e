use std::time::Duration;

use mongobox_process::Readiness;
use tokio::sync::watch;

/// Decides whether one stdout line announces that mongod accepts connections.
pub type ReadyPredicate = fn(line: &str, port: u16) -> bool;

/// Matches the legacy text banner and the structured (JSON) log line.
pub fn is_ready_line(line: &str, port: u16) -> bool {
    if contains_port(line, &format!("waiting for connections on port {port}")) {
        return true;
    }
    line.contains("\"msg\":\"Waiting for connections\"")
        && contains_port(line, &format!("\"port\":{port}"))
}

// `needle` ends in the port number; reject matches that continue with a digit.
fn contains_port(line: &str, needle: &str) -> bool {
    line.match_indices(needle).any(|(i, m)| {
        !line[i + m.len()..].starts_with(|c: char| c.is_ascii_digit())
    })
}

/// One-shot gate released by the stdout reader when mongod reports ready.
///
/// Release is idempotent and safe from any number of reader tasks; exactly one
/// call observes the transition.
#[derive(Debug)]
pub struct ReadinessGate {
    tx: watch::Sender<bool>,
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessGate {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Returns `true` only for the call that opened the gate.
    pub fn release(&self) -> bool {
        self.tx.send_if_modified(|open| {
            if *open {
                false
            } else {
                *open = true;
                true
            }
        })
    }

    pub fn is_released(&self) -> bool {
        *self.tx.borrow()
    }

    /// Waits until released or `timeout` elapses.
    pub async fn wait(&self, timeout: Duration) -> Readiness {
        let mut rx = self.tx.subscribe();
        match tokio::time::timeout(timeout, rx.wait_for(|open| *open)).await {
            Ok(Ok(_)) => Readiness::Ready,
            // The sender lives in `self`, so the channel cannot close while we wait.
            Ok(Err(_)) | Err(_) => {
                if self.is_released() {
                    Readiness::Ready
                } else {
                    Readiness::TimedOut
                }
            }
        }
    }
}
