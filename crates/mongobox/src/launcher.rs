use std::{path::Path, sync::Arc, time::Duration};

use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::{Child, Command},
};

use crate::{
    error::{Error, Result},
    output::{OutputSink, Stream},
    readiness::{ReadinessGate, ReadyPredicate},
};

/// Everything a stdout reader needs to open the readiness gate.
#[derive(Clone)]
pub struct ReadyWatch {
    pub gate: Arc<ReadinessGate>,
    pub predicate: ReadyPredicate,
    pub port: u16,
}

#[cfg(target_os = "linux")]
fn set_parent_death_signal() -> std::io::Result<()> {
    // If the host process dies without tearing down, take mongod with it.
    let rc = unsafe { libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) };
    if rc == -1 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

const SPAWN_ATTEMPTS: u32 = 5;
const SPAWN_RETRY_DELAY: Duration = Duration::from_millis(50);

// A freshly staged binary can still be held open for writing by a fork in
// another thread; exec then fails with ETXTBSY until that child execs.
#[cfg(unix)]
fn is_text_busy(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(libc::ETXTBSY)
}

#[cfg(not(unix))]
fn is_text_busy(_e: &std::io::Error) -> bool {
    false
}

/// Spawns `program` without a shell or window, piping both output streams into
/// `sink`. Must be called inside a tokio runtime.
pub async fn launch(
    program: &Path,
    args: &[String],
    cwd: &Path,
    sink: &OutputSink,
    ready: ReadyWatch,
) -> Result<Child> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(cwd)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true);

    #[cfg(windows)]
    {
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }

    #[cfg(target_os = "linux")]
    {
        unsafe {
            cmd.pre_exec(set_parent_death_signal);
        }
    }

    let mut attempt = 1;
    let mut child = loop {
        match cmd.spawn() {
            Ok(child) => break child,
            Err(e) if is_text_busy(&e) && attempt < SPAWN_ATTEMPTS => {
                attempt += 1;
                tokio::time::sleep(SPAWN_RETRY_DELAY).await;
            }
            Err(e) => {
                return Err(Error::Spawn {
                    path: program.to_path_buf(),
                    source: e,
                });
            }
        }
    };

    if let Some(out) = child.stdout.take() {
        pump(out, Stream::Stdout, sink.clone(), Some(ready));
    }
    if let Some(err) = child.stderr.take() {
        pump(err, Stream::Stderr, sink.clone(), None);
    }

    Ok(child)
}

fn pump<R>(reader: R, stream: Stream, sink: OutputSink, ready: Option<ReadyWatch>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(stream = stream.label(), error = %e, "mongod output closed");
                    break;
                }
            }
            // mongod echoes paths verbatim; keep going past bytes that are not utf-8.
            let text = String::from_utf8_lossy(&buf);
            let line = text.trim_end_matches(['\n', '\r']);
            if line.is_empty() {
                continue;
            }
            if let Some(ready) = &ready
                && (ready.predicate)(line, ready.port)
                && ready.gate.release()
            {
                sink.note(format!(
                    "mongod is waiting for connections on port {}",
                    ready.port
                ));
            }
            sink.child_line(stream, line);
        }
    });
}
