//! Process-wide output hub and session redirection
//!
//! The hub is the crate's user-visible output facade: log lines, progress
//! updates, and stdout/stderr text all pass through whichever sinks are
//! currently installed. A [`RedirectGuard`] swaps all four sinks for
//! wire-forwarding ones for the duration of a session and restores the
//! originals when dropped, whatever path the session exits by. Internal
//! server diagnostics use `tracing` and are never redirected.

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use chrono::Utc;
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};

use crate::error::RedirectError;
use crate::wire::value::WireValue;
use crate::wire::{SharedWriter, tags, text_frame};

/// Receiver for log lines below the hub's verbosity threshold
pub trait LogSink: Send + Sync {
    /// Deliver one log line at the given verbosity level
    fn log(&self, level: u32, message: &str);
}

/// Receiver for raw stdout/stderr text
pub trait TextSink: Send + Sync {
    /// Deliver one chunk of text
    fn write_text(&self, text: &str);
}

/// Receiver for progress-bar lifecycle events
pub trait ProgressSink: Send + Sync {
    /// A bar started, with its total step count
    fn begin(&self, id: u64, title: &str, total: u64);
    /// A bar advanced to `position`
    fn advance(&self, id: u64, position: u64);
    /// A bar finished
    fn end(&self, id: u64);
    /// True if this sink intentionally discards progress reporting
    fn is_silent(&self) -> bool {
        false
    }
}

struct ConsoleLog;

impl LogSink for ConsoleLog {
    fn log(&self, _level: u32, message: &str) {
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "[{}] {}", Utc::now().format("%H:%M:%S"), message);
    }
}

enum StdChannel {
    Out,
    Err,
}

struct ConsoleText(StdChannel);

impl TextSink for ConsoleText {
    fn write_text(&self, text: &str) {
        match self.0 {
            StdChannel::Out => {
                let mut out = std::io::stdout().lock();
                let _ = out.write_all(text.as_bytes());
                let _ = out.flush();
            }
            StdChannel::Err => {
                let mut err = std::io::stderr().lock();
                let _ = err.write_all(text.as_bytes());
                let _ = err.flush();
            }
        }
    }
}

/// Progress sink that intentionally discards everything
///
/// When this is installed, session redirection leaves progress reporting
/// off rather than forcing it back on.
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn begin(&self, _id: u64, _title: &str, _total: u64) {}
    fn advance(&self, _id: u64, _position: u64) {}
    fn end(&self, _id: u64) {}
    fn is_silent(&self) -> bool {
        true
    }
}

/// Console progress sink printing decile steps to stderr
struct ConsoleProgress {
    bars: Mutex<std::collections::HashMap<u64, (String, u64, u64)>>,
}

impl ProgressSink for ConsoleProgress {
    fn begin(&self, id: u64, title: &str, total: u64) {
        self.bars
            .lock()
            .insert(id, (title.to_string(), total, 0));
    }

    fn advance(&self, id: u64, position: u64) {
        let mut bars = self.bars.lock();
        if let Some((title, total, printed)) = bars.get_mut(&id) {
            let decile = if *total == 0 { 10 } else { position * 10 / *total };
            if decile > *printed {
                *printed = decile;
                let mut stderr = std::io::stderr().lock();
                let _ = writeln!(stderr, "{}: {}0%", title, decile);
            }
        }
    }

    fn end(&self, id: u64) {
        if let Some((title, _, _)) = self.bars.lock().remove(&id) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}: done", title);
        }
    }
}

/// Process-wide registry of output sinks
pub struct OutputHub {
    log: RwLock<Arc<dyn LogSink>>,
    progress: RwLock<Arc<dyn ProgressSink>>,
    stdout: RwLock<Arc<dyn TextSink>>,
    stderr: RwLock<Arc<dyn TextSink>>,
    verbosity: AtomicU32,
    redirected: AtomicBool,
}

static HUB: Lazy<OutputHub> = Lazy::new(|| OutputHub {
    log: RwLock::new(Arc::new(ConsoleLog)),
    progress: RwLock::new(Arc::new(ConsoleProgress {
        bars: Mutex::new(std::collections::HashMap::new()),
    })),
    stdout: RwLock::new(Arc::new(ConsoleText(StdChannel::Out))),
    stderr: RwLock::new(Arc::new(ConsoleText(StdChannel::Err))),
    verbosity: AtomicU32::new(1),
    redirected: AtomicBool::new(false),
});

/// Access the global output hub
pub fn hub() -> &'static OutputHub {
    &HUB
}

impl OutputHub {
    /// Emit a log line if `level` is within the current verbosity
    pub fn log(&self, level: u32, message: &str) {
        if level <= self.verbosity.load(Ordering::Relaxed) {
            self.log.read().log(level, message);
        }
    }

    /// Write text to the hub's stdout sink
    pub fn write_stdout(&self, text: &str) {
        self.stdout.read().write_text(text);
    }

    /// Write text to the hub's stderr sink
    pub fn write_stderr(&self, text: &str) {
        self.stderr.read().write_text(text);
    }

    /// Clone the currently installed progress sink
    pub fn progress(&self) -> Arc<dyn ProgressSink> {
        self.progress.read().clone()
    }

    /// Replace the progress sink (e.g. install [`NullProgress`])
    pub fn set_progress(&self, sink: Arc<dyn ProgressSink>) {
        *self.progress.write() = sink;
    }

    /// Current verbosity threshold
    pub fn verbosity(&self) -> u32 {
        self.verbosity.load(Ordering::Relaxed)
    }

    /// Set the verbosity threshold
    pub fn set_verbosity(&self, level: u32) {
        self.verbosity.store(level, Ordering::Relaxed);
    }
}

struct WireLogSink {
    writer: SharedWriter,
}

impl LogSink for WireLogSink {
    fn log(&self, level: u32, message: &str) {
        let frame = text_frame(
            tags::LOG,
            &[
                WireValue::Int(i64::from(level)),
                WireValue::Str(Utc::now().to_rfc3339()),
                WireValue::Str(message.to_string()),
            ],
        );
        deliver(&self.writer, &frame);
    }
}

struct WireProgressSink {
    writer: SharedWriter,
}

impl ProgressSink for WireProgressSink {
    fn begin(&self, id: u64, title: &str, total: u64) {
        let frame = text_frame(
            tags::PROGRESS,
            &[
                WireValue::Str("begin".to_string()),
                WireValue::Int(id as i64),
                WireValue::Int(total as i64),
                WireValue::Str(title.to_string()),
            ],
        );
        deliver(&self.writer, &frame);
    }

    fn advance(&self, id: u64, position: u64) {
        let frame = text_frame(
            tags::PROGRESS,
            &[
                WireValue::Str("step".to_string()),
                WireValue::Int(id as i64),
                WireValue::Int(position as i64),
            ],
        );
        deliver(&self.writer, &frame);
    }

    fn end(&self, id: u64) {
        let frame = text_frame(
            tags::PROGRESS,
            &[WireValue::Str("end".to_string()), WireValue::Int(id as i64)],
        );
        deliver(&self.writer, &frame);
    }
}

struct WireTextSink {
    writer: SharedWriter,
    tag: u8,
}

impl TextSink for WireTextSink {
    fn write_text(&self, text: &str) {
        let frame = text_frame(self.tag, &[WireValue::Str(text.to_string())]);
        deliver(&self.writer, &frame);
    }
}

/// Forwarded output is best-effort: a peer that has gone away must not
/// fail the code that happened to be logging at the time.
fn deliver(writer: &SharedWriter, frame: &[u8]) {
    let mut guard = writer.lock();
    if let Err(err) = guard.write_all(frame).and_then(|_| guard.flush()) {
        tracing::debug!(%err, "dropping forwarded output frame");
    }
}

/// Scoped redirection of all four hub sinks into a wire stream
///
/// Installing the guard swaps the log, progress, stdout, and stderr sinks
/// for wire-forwarding ones; dropping it restores the previous sinks. At
/// most one guard may be live per process.
pub struct RedirectGuard {
    saved_log: Arc<dyn LogSink>,
    saved_progress: Arc<dyn ProgressSink>,
    saved_stdout: Arc<dyn TextSink>,
    saved_stderr: Arc<dyn TextSink>,
}

impl std::fmt::Debug for RedirectGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedirectGuard").finish_non_exhaustive()
    }
}

impl RedirectGuard {
    /// Install wire-forwarding sinks, saving the current ones
    pub fn install(writer: SharedWriter) -> Result<Self, RedirectError> {
        let hub = hub();
        hub.redirected
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| RedirectError::AlreadyActive)?;

        let saved_log = std::mem::replace(
            &mut *hub.log.write(),
            Arc::new(WireLogSink {
                writer: writer.clone(),
            }),
        );
        let saved_stdout = std::mem::replace(
            &mut *hub.stdout.write(),
            Arc::new(WireTextSink {
                writer: writer.clone(),
                tag: tags::STDOUT,
            }),
        );
        let saved_stderr = std::mem::replace(
            &mut *hub.stderr.write(),
            Arc::new(WireTextSink {
                writer: writer.clone(),
                tag: tags::STDERR,
            }),
        );

        // A host that explicitly silenced progress keeps it silenced.
        let saved_progress = {
            let mut progress = hub.progress.write();
            if progress.is_silent() {
                progress.clone()
            } else {
                std::mem::replace(&mut *progress, Arc::new(WireProgressSink { writer }))
            }
        };

        Ok(Self {
            saved_log,
            saved_progress,
            saved_stdout,
            saved_stderr,
        })
    }
}

impl Drop for RedirectGuard {
    fn drop(&mut self) {
        let hub = hub();
        *hub.log.write() = self.saved_log.clone();
        *hub.progress.write() = self.saved_progress.clone();
        *hub.stdout.write() = self.saved_stdout.clone();
        *hub.stderr.write() = self.saved_stderr.clone();
        hub.redirected.store(false, Ordering::Release);
    }
}

static NEXT_PROGRESS_ID: AtomicU64 = AtomicU64::new(1);

/// RAII progress reporter driving whatever sink is installed
pub struct ProgressBar {
    id: u64,
}

impl ProgressBar {
    /// Start a bar with a title and a total step count
    pub fn new(title: &str, total: u64) -> Self {
        let id = NEXT_PROGRESS_ID.fetch_add(1, Ordering::Relaxed);
        hub().progress().begin(id, title, total);
        Self { id }
    }

    /// Report the current position
    pub fn set(&self, position: u64) {
        hub().progress().advance(self.id, position);
    }
}

impl Drop for ProgressBar {
    fn drop(&mut self) {
        hub().progress().end(self.id);
    }
}
