//! Optional timing sink for forward attempts.
//!
//! The engine always times its attempts; without a configured benchmark file
//! the records go to [`NoopReporter`].

use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum TimerOutcome {
    Success { duration: u64 },
    Error { label: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BenchmarkRecord {
    pub timer: String,
    pub unit: String,
    #[serde(flatten)]
    pub outcome: TimerOutcome,
}

pub trait BenchmarkReporter: Send + Sync {
    fn record(&self, record: BenchmarkRecord);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReporter;

impl BenchmarkReporter for NoopReporter {
    fn record(&self, _record: BenchmarkRecord) {}
}

/// Appends one JSON line per record. Lines are buffered and reach the file
/// on `flush` or when the reporter is dropped.
#[derive(Debug)]
pub struct FileReporter {
    file: Mutex<BufWriter<File>>,
}

impl FileReporter {
    pub fn create(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        Ok(Self {
            file: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn flush(&self) -> std::io::Result<()> {
        self.file.lock().unwrap_or_else(|e| e.into_inner()).flush()
    }
}

impl BenchmarkReporter for FileReporter {
    fn record(&self, record: BenchmarkRecord) {
        let line = match serde_json::to_string(&record) {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to encode benchmark record: {}", e);
                return;
            }
        };
        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = writeln!(file, "{line}") {
            warn!("Failed to write benchmark record: {}", e);
        }
    }
}

/// Times one operation in microseconds and reports it on `end` or `error`.
pub struct AttemptTimer<'a> {
    reporter: &'a dyn BenchmarkReporter,
    name: &'static str,
    started: Instant,
}

impl<'a> AttemptTimer<'a> {
    pub fn start(reporter: &'a dyn BenchmarkReporter, name: &'static str) -> Self {
        Self {
            reporter,
            name,
            started: Instant::now(),
        }
    }

    pub fn end(self) {
        let duration = self.started.elapsed().as_micros() as u64;
        self.finish(TimerOutcome::Success { duration });
    }

    pub fn error(self, label: &str) {
        self.finish(TimerOutcome::Error {
            label: label.to_string(),
        });
    }

    fn finish(self, outcome: TimerOutcome) {
        self.reporter.record(BenchmarkRecord {
            timer: self.name.to_string(),
            unit: "us".to_string(),
            outcome,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_reporter_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bench.jsonl");
        let reporter = FileReporter::create(&path).unwrap();

        AttemptTimer::start(&reporter, "lambda request").end();
        AttemptTimer::start(&reporter, "lambda request").error("Request Failed");
        reporter.flush().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["timer"], "lambda request");
        assert_eq!(lines[0]["unit"], "us");
        assert_eq!(lines[0]["outcome"], "success");
        assert!(lines[0]["duration"].is_u64());
        assert_eq!(lines[1]["outcome"], "error");
        assert_eq!(lines[1]["label"], "Request Failed");
    }

    #[test]
    fn test_file_reporter_appends_to_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bench.jsonl");
        std::fs::write(&path, "{\"previous\":true}\n").unwrap();

        let reporter = FileReporter::create(&path).unwrap();
        AttemptTimer::start(&reporter, "lambda request").end();
        drop(reporter);

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.starts_with("{\"previous\":true}"));
    }

    #[test]
    fn test_file_reporter_buffers_until_flush() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bench.jsonl");
        let reporter = FileReporter::create(&path).unwrap();

        for _ in 0..3 {
            AttemptTimer::start(&reporter, "lambda request").end();
        }
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");

        reporter.flush().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 3);
    }
}
