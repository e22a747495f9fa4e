use std::{
    collections::VecDeque,
    fmt,
    sync::{Arc, Mutex},
};

use mongobox_process::InstanceId;

use crate::config;

/// Caller-supplied hook receiving every operational message and output line.
pub type LogAction = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    pub(crate) fn label(self) -> &'static str {
        match self {
            Stream::Stdout => "stdout",
            Stream::Stderr => "stderr",
        }
    }
}

/// Bounded ring of recent lines, numbered from 1.
#[derive(Debug)]
pub struct OutputLog {
    next_seq: u64,
    max_lines: usize,
    lines: VecDeque<(u64, String)>,
}

impl Default for OutputLog {
    fn default() -> Self {
        Self::with_capacity(config::output_max_lines())
    }
}

impl OutputLog {
    pub fn with_capacity(max_lines: usize) -> Self {
        Self {
            next_seq: 1,
            max_lines: max_lines.max(1),
            lines: VecDeque::new(),
        }
    }

    pub fn push_line(&mut self, line: String) {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.saturating_add(1);
        self.lines.push_back((seq, line));
        while self.lines.len() > self.max_lines {
            self.lines.pop_front();
        }
    }

    /// Most recent `limit` lines, oldest first.
    pub fn tail(&self, limit: usize) -> Vec<String> {
        let start = self.lines.len().saturating_sub(limit);
        self.lines
            .iter()
            .skip(start)
            .map(|(_, l)| l.clone())
            .collect()
    }

    /// Lines with a sequence number above `cursor`, plus the new cursor.
    pub fn after(&self, cursor: u64, limit: usize) -> (Vec<String>, u64) {
        let mut out = Vec::new();
        let mut last = cursor;
        for (seq, line) in self.lines.iter().filter(|(seq, _)| *seq > cursor) {
            if out.len() >= limit {
                break;
            }
            out.push(line.clone());
            last = *seq;
        }
        (out, last)
    }
}

/// Fan-out for everything an instance has to say.
#[derive(Clone)]
pub struct OutputSink {
    instance: InstanceId,
    buffer: Arc<Mutex<OutputLog>>,
    console: bool,
    action: Option<LogAction>,
}

impl fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputSink")
            .field("instance", &self.instance)
            .field("console", &self.console)
            .field("action", &self.action.is_some())
            .finish()
    }
}

impl OutputSink {
    pub fn new(instance: InstanceId, console: bool, action: Option<LogAction>) -> Self {
        Self {
            instance,
            buffer: Arc::new(Mutex::new(OutputLog::default())),
            console,
            action,
        }
    }

    /// Operational message from the controller itself.
    pub fn note(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(instance = %self.instance, "{message}");
        self.deliver(format!("[mongobox] {message}"));
    }

    /// One line written by the child. Empty lines are dropped.
    pub fn child_line(&self, stream: Stream, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        tracing::debug!(
            target: "mongobox::mongod",
            instance = %self.instance,
            stream = stream.label(),
            "{line}"
        );
        self.deliver(format!("[{}] {line}", stream.label()));
    }

    pub fn recent(&self, limit: usize) -> Vec<String> {
        self.buffer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .tail(limit)
    }

    pub fn since(&self, cursor: u64, limit: usize) -> (Vec<String>, u64) {
        self.buffer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .after(cursor, limit)
    }

    fn deliver(&self, line: String) {
        if self.console {
            eprintln!("[mongobox | INFO]: {line}");
        }
        if let Some(action) = &self.action {
            action(&line);
        }
        self.buffer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_line(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_keeps_only_newest_lines() {
        let mut log = OutputLog::with_capacity(3);
        for i in 1..=5 {
            log.push_line(format!("line {i}"));
        }
        assert_eq!(log.tail(10), vec!["line 3", "line 4", "line 5"]);
        assert_eq!(log.tail(1), vec!["line 5"]);
    }

    #[test]
    fn after_pages_by_sequence() {
        let mut log = OutputLog::with_capacity(10);
        for i in 1..=4 {
            log.push_line(format!("l{i}"));
        }
        let (page, cursor) = log.after(0, 2);
        assert_eq!(page, vec!["l1", "l2"]);
        assert_eq!(cursor, 2);
        let (page, cursor) = log.after(cursor, 10);
        assert_eq!(page, vec!["l3", "l4"]);
        assert_eq!(cursor, 4);
        let (page, same) = log.after(cursor, 10);
        assert!(page.is_empty());
        assert_eq!(same, 4);
    }

    #[test]
    fn after_with_zero_limit_returns_nothing() {
        let mut log = OutputLog::with_capacity(10);
        log.push_line("l1".to_string());
        let (page, cursor) = log.after(0, 0);
        assert!(page.is_empty());
        assert_eq!(cursor, 0);
    }

    #[test]
    fn sink_prefixes_and_forwards_to_action() {
        let seen = Arc::new(Mutex::new(Vec::<String>::new()));
        let captured = seen.clone();
        let action: LogAction = Arc::new(move |l: &str| captured.lock().unwrap().push(l.to_string()));
        let sink = OutputSink::new(InstanceId("abc1234".to_string()), false, Some(action));

        sink.note("working path created");
        sink.child_line(Stream::Stdout, "hello");
        sink.child_line(Stream::Stderr, "oops");
        sink.child_line(Stream::Stdout, "   ");

        let want = vec![
            "[mongobox] working path created".to_string(),
            "[stdout] hello".to_string(),
            "[stderr] oops".to_string(),
        ];
        assert_eq!(*seen.lock().unwrap(), want);
        assert_eq!(sink.recent(10), want);
    }
}
