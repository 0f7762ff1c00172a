use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::Level;

/// A thread-safe writer that flushes and syncs every write to its file.
///
/// Log lines from a long-running `toolbelt watch` must be on disk as soon as
/// they are written so another process can tail the file. Each write takes the
/// lock, writes, flushes and calls `sync_all` before releasing it.
///
/// # Example
///
/// ```no_run
/// use std::io::Write;
/// use std::sync::{Arc, Mutex};
/// use std::fs::File;
/// use toolbelt_cli::logging::FileWriterGuard;
///
/// let file = File::create("toolbelt.log").unwrap();
/// let mut guard = FileWriterGuard::new(Arc::new(Mutex::new(file)));
///
/// guard.write_all(b"Log message\n").unwrap();
/// ```
#[derive(Clone)]
pub struct FileWriterGuard {
    file: Arc<Mutex<File>>,
}

impl FileWriterGuard {
    /// Creates a new `FileWriterGuard` wrapping the given file
    pub fn new(file: Arc<Mutex<File>>) -> Self {
        Self { file }
    }

    fn lock(&self) -> MutexGuard<'_, File> {
        // A panic mid-write leaves the file usable, so keep logging
        match self.file.lock() {
            Ok(file) => file,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Write for FileWriterGuard {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut file = self.lock();
        let written = file.write(buf)?;
        file.flush()?;
        file.sync_all()?;
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut file = self.lock();
        file.flush()?;
        file.sync_all()
    }
}

/// Pick the log level from the command line flags
pub fn log_level(quiet: bool, debug: bool, verbose: bool) -> Level {
    if quiet {
        Level::ERROR
    } else if debug {
        Level::DEBUG
    } else if verbose {
        Level::TRACE
    } else {
        Level::INFO
    }
}

/// Install the global tracing subscriber.
///
/// Logs go to `log_file` in append mode when given, and to stderr otherwise or
/// if the file cannot be opened.
pub fn init_logging(level: Level, log_file: Option<&Path>) {
    let file = log_file.map(|path| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| (path.to_path_buf(), e))
    });

    match file {
        Some(Ok(file)) => {
            let guard = FileWriterGuard::new(Arc::new(Mutex::new(file)));
            tracing_subscriber::fmt()
                .with_writer(move || guard.clone())
                .with_max_level(level)
                .with_ansi(false)
                .init();
        }
        Some(Err((path, e))) => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_max_level(level)
                .init();
            tracing::warn!("Failed to open log file {}, using stderr: {}", path.display(), e);
        }
        None => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_max_level(level)
                .init();
        }
    }
}
