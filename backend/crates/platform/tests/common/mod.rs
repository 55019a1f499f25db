//! Shared helpers for platform integration tests

use std::io;
use std::sync::{Arc, Mutex};

use platform::logging::{LogConfig, Logger};
use tracing_subscriber::fmt::MakeWriter;

/// In-memory primary stream
#[derive(Clone, Default)]
pub struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    pub fn logger(&self) -> Logger {
        self.logger_with(&LogConfig::default())
    }

    pub fn logger_with(&self, config: &LogConfig) -> Logger {
        Logger::with_primary(config, self.clone())
    }

    /// Every line, parsed. Panics on a line that is not a JSON object,
    /// which is how interleaved writes would show up.
    pub fn lines(&self) -> Vec<serde_json::Value> {
        let bytes = self.0.lock().unwrap();
        String::from_utf8_lossy(&bytes)
            .lines()
            .map(|line| {
                serde_json::from_str::<serde_json::Value>(line)
                    .unwrap_or_else(|e| panic!("corrupted log line {line:?}: {e}"))
            })
            .collect()
    }

    /// Only the "request completed" records.
    pub fn completions(&self) -> Vec<serde_json::Value> {
        self.lines()
            .into_iter()
            .filter(|line| line["message"] == "request completed")
            .collect()
    }
}

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for Captured {
    type Writer = Captured;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
