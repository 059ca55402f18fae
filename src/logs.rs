use crate::effect::{Effect, Task};
use crate::message::{Outcome, Subject, TaskError};
use anyhow::{Context, Result};
use futures::StreamExt;
use futures::stream::BoxStream;
use std::collections::VecDeque;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const LOG_BUFFER_CAPACITY: usize = 10_000;

pub type LogLines = BoxStream<'static, std::io::Result<String>>;

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct LogRequest {
    pub namespace: String,
    pub pod: String,
    pub container: Option<String>,
    pub follow: bool,
    pub tail_lines: Option<i64>,
}

impl LogRequest {
    pub fn target_label(&self) -> String {
        match &self.container {
            Some(container) => format!("{}/{}:{}", self.namespace, self.pod, container),
            None => format!("{}/{}", self.namespace, self.pod),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogBuffer {
    lines: VecDeque<String>,
    capacity: usize,
    evicted: u64,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::with_capacity(LOG_BUFFER_CAPACITY)
    }
}

impl LogBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            capacity: capacity.max(1),
            evicted: 0,
        }
    }

    pub fn push(&mut self, line: String) {
        self.lines.push_back(line);
        while self.lines.len() > self.capacity {
            self.lines.pop_front();
            self.evicted += 1;
        }
    }

    pub fn extend(&mut self, lines: impl IntoIterator<Item = String>) {
        for line in lines {
            self.push(line);
        }
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.evicted = 0;
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    #[cfg(test)]
    pub fn lines(&self) -> impl Iterator<Item = &String> {
        self.lines.iter()
    }

    pub fn window(&self, offset: usize, height: usize) -> Vec<String> {
        self.lines.iter().skip(offset).take(height).cloned().collect()
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines.into()
    }
}

/// Shared slot around one open log stream. At most one reader holds the
/// lock; taking the stream out of the slot drops (closes) it, so it can only
/// ever be closed once.
#[derive(Clone)]
pub struct LogHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    label: String,
    reader: Mutex<Option<LogLines>>,
    closed: AtomicBool,
}

impl LogHandle {
    pub fn new(label: impl Into<String>, lines: LogLines) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                label: label.into(),
                reader: Mutex::new(Some(lines.fuse().boxed())),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Returns false when the handle was already closed. A reader holding
    /// the stream drops it as soon as its current read ends.
    pub fn close(&self) -> bool {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        if let Ok(mut slot) = self.inner.reader.try_lock()
            && slot.take().is_some()
        {
            debug!("closed log stream {}", self.inner.label);
        }
        true
    }
}

impl Debug for LogHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogHandle")
            .field("label", &self.inner.label)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum LogChunk {
    Lines(Vec<String>),
    Idle,
    Finished { lines: Vec<String>, evicted: u64 },
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct FollowPolicy {
    pub batch_lines: usize,
    pub flush_window: Duration,
    pub idle_window: Duration,
}

impl Default for FollowPolicy {
    fn default() -> Self {
        Self {
            batch_lines: 10,
            flush_window: Duration::from_millis(400),
            idle_window: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ReadMode {
    Snapshot,
    Follow(FollowPolicy),
}

enum Step {
    Continue(LogChunk),
    Done(LogChunk),
    Cancelled,
}

/// Runs one read attempt. `Ok(None)` means the read was cancelled or the
/// handle was closed underneath it; nothing should be reported.
pub async fn read_next(
    handle: &LogHandle,
    mode: ReadMode,
    cancel: &CancellationToken,
) -> Result<Option<LogChunk>> {
    let mut slot = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            handle.close();
            return Ok(None);
        }
        slot = handle.inner.reader.lock() => slot,
    };

    let Some(lines) = slot.as_mut() else {
        return Ok(None);
    };

    let step = match mode {
        ReadMode::Snapshot => read_snapshot(lines, cancel).await,
        ReadMode::Follow(policy) => read_follow(lines, policy, cancel).await,
    }
    .with_context(|| format!("failed reading logs for {}", handle.label()));

    let keep_open = matches!(step, Ok(Step::Continue(_)));
    if !keep_open || handle.is_closed() {
        handle.inner.closed.store(true, Ordering::SeqCst);
        if slot.take().is_some() {
            debug!("closed log stream {}", handle.label());
        }
        if keep_open {
            return Ok(None);
        }
    }

    match step? {
        Step::Continue(chunk) | Step::Done(chunk) => Ok(Some(chunk)),
        Step::Cancelled => Ok(None),
    }
}

async fn read_snapshot(lines: &mut LogLines, cancel: &CancellationToken) -> Result<Step> {
    let mut buffer = LogBuffer::default();
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(Step::Cancelled),
            next = lines.next() => match next {
                Some(Ok(line)) => buffer.push(line),
                Some(Err(error)) => return Err(error).context("log stream read error"),
                None => {
                    let evicted = buffer.evicted();
                    return Ok(Step::Done(LogChunk::Finished {
                        lines: buffer.into_lines(),
                        evicted,
                    }));
                }
            },
        }
    }
}

async fn read_follow(
    lines: &mut LogLines,
    policy: FollowPolicy,
    cancel: &CancellationToken,
) -> Result<Step> {
    let mut batch = Vec::new();
    loop {
        if batch.len() >= policy.batch_lines {
            return Ok(Step::Continue(LogChunk::Lines(batch)));
        }
        let window = if batch.is_empty() {
            policy.idle_window
        } else {
            policy.flush_window
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(Step::Cancelled),
            next = timeout(window, lines.next()) => match next {
                Ok(Some(Ok(line))) => batch.push(line),
                Ok(Some(Err(error))) => return Err(error).context("log stream read error"),
                Ok(None) | Err(_) => {
                    let chunk = if batch.is_empty() {
                        LogChunk::Idle
                    } else {
                        LogChunk::Lines(batch)
                    };
                    return Ok(Step::Continue(chunk));
                }
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SessionState {
    Starting,
    Streaming,
    Draining,
    Idle,
    Closed,
}

impl SessionState {
    pub fn label(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Streaming => "streaming",
            Self::Draining => "reading",
            Self::Idle => "waiting",
            Self::Closed => "closed",
        }
    }
}

#[derive(Debug)]
pub struct LogStreamSession {
    id: u64,
    request: LogRequest,
    cancel: CancellationToken,
    retry_delay: Duration,
    state: SessionState,
    buffer: LogBuffer,
    handle: Option<LogHandle>,
    error: Option<String>,
}

impl LogStreamSession {
    pub fn new(
        id: u64,
        request: LogRequest,
        cancel: CancellationToken,
        retry_delay: Duration,
    ) -> Self {
        Self {
            id,
            request,
            cancel,
            retry_delay,
            state: SessionState::Starting,
            buffer: LogBuffer::default(),
            handle: None,
            error: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn follow(&self) -> bool {
        self.request.follow
    }

    pub fn request(&self) -> &LogRequest {
        &self.request
    }

    pub fn buffer(&self) -> &LogBuffer {
        &self.buffer
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn start(&mut self) -> Effect {
        info!(
            "log session {} starting for {} (follow={})",
            self.id,
            self.request.target_label(),
            self.request.follow
        );
        self.state = SessionState::Starting;
        Effect::task(Task::OpenLogs {
            session: self.id,
            request: self.request.clone(),
            cancel: self.cancel.clone(),
        })
    }

    pub fn owns(&self, subject: Subject) -> bool {
        match subject {
            Subject::LogOpen { session } | Subject::LogRead { session } => session == self.id,
            _ => false,
        }
    }

    pub fn apply(&mut self, result: Result<Outcome, TaskError>) -> (bool, Effect) {
        if self.state == SessionState::Closed {
            if let Ok(Outcome::LogOpened(handle)) = result {
                handle.close();
            }
            return (false, Effect::None);
        }

        match result {
            Ok(Outcome::LogOpened(handle)) => {
                self.state = if self.request.follow {
                    SessionState::Streaming
                } else {
                    SessionState::Draining
                };
                self.handle = Some(handle.clone());
                (false, self.read_effect(handle))
            }
            Ok(Outcome::Log(LogChunk::Lines(lines))) => {
                let updated = !lines.is_empty();
                self.buffer.extend(lines);
                self.state = SessionState::Streaming;
                let effect = self
                    .handle
                    .clone()
                    .map(|handle| self.read_effect(handle))
                    .unwrap_or(Effect::None);
                (updated, effect)
            }
            Ok(Outcome::Log(LogChunk::Idle)) => {
                self.state = SessionState::Idle;
                let Some(handle) = self.handle.clone() else {
                    return (false, Effect::None);
                };
                (
                    false,
                    Effect::task(Task::RetryLogs {
                        session: self.id,
                        handle,
                        after: self.retry_delay,
                        cancel: self.cancel.clone(),
                    }),
                )
            }
            Ok(Outcome::Log(LogChunk::Finished { lines, evicted })) => {
                let updated = !lines.is_empty();
                self.buffer.extend(lines);
                if evicted > 0 {
                    debug!(
                        "log session {} dropped {evicted} lines past the buffer cap",
                        self.id
                    );
                }
                self.release();
                self.state = SessionState::Closed;
                info!(
                    "log session {} finished with {} lines",
                    self.id,
                    self.buffer.len()
                );
                (updated, Effect::None)
            }
            Ok(other) => {
                warn!("log session {} ignored unexpected outcome {other:?}", self.id);
                (false, Effect::None)
            }
            Err(error) => {
                if self.state == SessionState::Starting {
                    self.buffer.clear();
                }
                warn!("log session {} failed: {error}", self.id);
                self.error = Some(error.to_string());
                self.release();
                self.state = SessionState::Closed;
                (false, Effect::None)
            }
        }
    }

    pub fn cancel(&mut self) {
        if self.state != SessionState::Closed {
            debug!("log session {} cancelled", self.id);
        }
        self.cancel.cancel();
        self.release();
        self.state = SessionState::Closed;
    }

    fn release(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.close();
        }
    }

    fn read_effect(&self, handle: LogHandle) -> Effect {
        Effect::task(Task::ReadLogs {
            session: self.id,
            handle,
            follow: self.request.follow,
            cancel: self.cancel.clone(),
        })
    }
}

impl Drop for LogStreamSession {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.release();
    }
}
