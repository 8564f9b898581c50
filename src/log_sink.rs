//! Console transcript duplicated into a log file.
//!
//! [`LogSink`] is an explicit writer handed to the tracing subscriber
//! rather than a redirect of the process stdout, so tests can point it at
//! in-memory buffers.

use std::fmt;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

struct Targets {
    console: Box<dyn Write + Send>,
    file: Box<dyn Write + Send>,
}

impl Drop for Targets {
    fn drop(&mut self) {
        let _ = self.console.flush();
        let _ = self.file.flush();
    }
}

/// Writes every byte to both the console and the log file. Clones share the
/// same targets; the file is flushed and closed when the last clone drops.
#[derive(Clone)]
pub struct LogSink {
    targets: Arc<Mutex<Targets>>,
}

impl LogSink {
    /// Stdout plus a freshly truncated log file at `path`.
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self::new(io::stdout(), file))
    }

    pub fn new(console: impl Write + Send + 'static, file: impl Write + Send + 'static) -> Self {
        Self {
            targets: Arc::new(Mutex::new(Targets {
                console: Box::new(console),
                file: Box::new(file),
            })),
        }
    }

    fn lock(&self) -> io::Result<MutexGuard<'_, Targets>> {
        self.targets
            .lock()
            .map_err(|_| io::Error::other("log sink lock poisoned"))
    }
}

impl Write for LogSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut targets = self.lock()?;
        targets.console.write_all(buf)?;
        targets.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut targets = self.lock()?;
        targets.console.flush()?;
        targets.file.flush()
    }
}

impl<'a> MakeWriter<'a> for LogSink {
    type Writer = LogSink;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

impl fmt::Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogSink").finish_non_exhaustive()
    }
}

/// Default filter directive for the CLI verbosity flags.
/// `RUST_LOG` still takes precedence in [`init_tracing`].
pub fn default_level(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        return "error";
    }
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Installs the global subscriber writing through `sink`.
pub fn init_tracing(
    sink: LogSink,
    default_level: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(sink)
        .with_ansi(false)
        .with_target(false)
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl SharedBuf {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn writes_reach_both_targets() {
        let console = SharedBuf::default();
        let file = SharedBuf::default();
        let mut sink = LogSink::new(console.clone(), file.clone());

        writeln!(sink, "Crawling page 1...").unwrap();
        writeln!(sink.clone(), "Found 3 machines").unwrap();

        let expected = "Crawling page 1...\nFound 3 machines\n";
        assert_eq!(console.contents(), expected);
        assert_eq!(file.contents(), expected);
    }

    #[test]
    fn log_file_holds_transcript_after_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run_logs.txt");
        let console = SharedBuf::default();
        {
            let file = File::create(&path).unwrap();
            let mut sink = LogSink::new(console.clone(), file);
            write!(sink, "line one\nline two\n").unwrap();
        }
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "line one\nline two\n");
        assert_eq!(console.contents(), "line one\nline two\n");
    }

    #[test]
    fn tracing_events_are_duplicated() {
        let console = SharedBuf::default();
        let file = SharedBuf::default();
        let sink = LogSink::new(console.clone(), file.clone());

        let subscriber = tracing_subscriber::fmt()
            .with_writer(sink)
            .with_ansi(false)
            .with_target(false)
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(machine = "Alpha", "resolved");
        });

        assert!(console.contents().contains("resolved"));
        assert!(console.contents().contains("machine=\"Alpha\""));
        assert_eq!(console.contents(), file.contents());
    }

    #[test]
    fn verbosity_levels() {
        assert_eq!(default_level(0, false), "info");
        assert_eq!(default_level(1, false), "debug");
        assert_eq!(default_level(3, false), "trace");
        assert_eq!(default_level(2, true), "error");
    }
}
