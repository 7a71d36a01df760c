use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

type Slot = Arc<Mutex<Option<File>>>;

fn lock(slot: &Slot) -> MutexGuard<'_, Option<File>> {
    // A panic while holding the lock leaves the file usable.
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A `MakeWriter` that discards writes until an audit file is attached.
///
/// The subscriber is installed before we know whether the command mutates
/// anything; only mutating commands attach the file.
#[derive(Clone)]
pub struct AuditWriter {
    slot: Slot,
}

/// Attaches the audit file to its `AuditWriter`.
#[derive(Clone)]
pub struct AuditHandle {
    slot: Slot,
}

impl AuditWriter {
    pub fn new() -> (Self, AuditHandle) {
        let slot = Arc::new(Mutex::new(None));
        (Self { slot: slot.clone() }, AuditHandle { slot })
    }
}

impl AuditHandle {
    /// Open `path` in append mode and start writing to it.
    pub fn attach(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        *lock(&self.slot) = Some(file);
        Ok(())
    }

    pub fn is_attached(&self) -> bool {
        lock(&self.slot).is_some()
    }
}

pub struct AuditSink {
    slot: Slot,
}

impl std::io::Write for AuditSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match lock(&self.slot).as_mut() {
            Some(f) => f.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match lock(&self.slot).as_mut() {
            Some(f) => f.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for AuditWriter {
    type Writer = AuditSink;

    fn make_writer(&'a self) -> Self::Writer {
        AuditSink {
            slot: self.slot.clone(),
        }
    }
}

/// Install the global subscriber: stderr for the user, plus the deferred
/// audit file that always records `vboxkd=debug`.
pub fn init(verbose: bool) -> AuditHandle {
    let terminal_filter = if verbose {
        EnvFilter::new("vboxkd=debug")
    } else {
        EnvFilter::from_default_env().add_directive(
            "vboxkd=warn"
                .parse()
                .unwrap_or_else(|_| tracing_subscriber::filter::LevelFilter::WARN.into()),
        )
    };

    let terminal_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(terminal_filter);

    let (writer, handle) = AuditWriter::new();
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(writer)
        .with_filter(EnvFilter::new("vboxkd=debug"));

    tracing_subscriber::registry()
        .with(terminal_layer)
        .with(file_layer)
        .init();

    handle
}
