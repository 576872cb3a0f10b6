// Container log capture at scope teardown
use crate::engine::{ContainerEngine, ContainerHandle};
use crate::errors::Result;
use chrono::{DateTime, Utc};
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

/// Where teardown writes container logs
///
/// Logs are always fetched; they are only printed when `verbose` is set.
#[derive(Clone)]
pub struct LogSink {
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
    verbose: bool,
}

impl LogSink {
    pub fn stdout(verbose: bool) -> Self {
        Self::to_writer(Box::new(io::stdout()), verbose)
    }

    pub fn to_writer(writer: Box<dyn Write + Send>, verbose: bool) -> Self {
        Self {
            writer: Arc::new(Mutex::new(writer)),
            verbose,
        }
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Fetch and emit logs for `containers` since `since`, sorted by name
    ///
    /// A failure for one container does not stop the others; the first
    /// error is returned after every container has been tried.
    pub fn flush(
        &self,
        engine: &dyn ContainerEngine,
        containers: &[ContainerHandle],
        since: DateTime<Utc>,
    ) -> Result<()> {
        let mut sorted: Vec<&ContainerHandle> = containers.iter().collect();
        sorted.sort_by(|a, b| a.name.cmp(&b.name));

        let mut first_error = None;
        for container in sorted {
            let result = engine
                .logs(container, Some(since))
                .and_then(|bytes| self.emit(&container.name, &bytes));

            if let Err(e) = result {
                warn!(container = %container.name, error = %e, "failed to capture container logs");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn emit(&self, name: &str, bytes: &[u8]) -> Result<()> {
        if !self.verbose {
            debug!(container = name, bytes = bytes.len(), "captured container logs");
            return Ok(());
        }

        let text = String::from_utf8_lossy(bytes);
        let header = format!("Logs from {}:", name);
        let body = if text.trim().is_empty() {
            "(no logs)"
        } else {
            text.trim_end()
        };

        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(writer, "{}", header)?;
        writeln!(writer, "{}", "=".repeat(header.len()))?;
        writeln!(writer, "{}", body)?;
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for LogSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogSink").field("verbose", &self.verbose).finish()
    }
}
