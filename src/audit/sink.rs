//! Telemetry sinks the audit log mirrors into.

use chrono::Local;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Severity a record is mirrored at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warn => "WARNING",
            Severity::Error => "ERROR",
        }
    }
}

/// External push interface for formatted log lines.
pub trait TelemetrySink: Send + Sync {
    fn append(&self, level: Severity, line: &str) -> io::Result<()>;

    fn flush(&self) -> io::Result<()> {
        Ok(())
    }
}

/// Discards everything.
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn append(&self, _level: Severity, _line: &str) -> io::Result<()> {
        Ok(())
    }
}

/// Forwards lines to the `tracing` subscriber.
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn append(&self, level: Severity, line: &str) -> io::Result<()> {
        match level {
            Severity::Debug => tracing::debug!(target: "sensor_sweep::audit", "{line}"),
            Severity::Info => tracing::info!(target: "sensor_sweep::audit", "{line}"),
            Severity::Warn => tracing::warn!(target: "sensor_sweep::audit", "{line}"),
            Severity::Error => tracing::error!(target: "sensor_sweep::audit", "{line}"),
        }
        Ok(())
    }
}

/// Sends every line to each inner sink; reports the first failure.
pub struct FanoutSink(Vec<Box<dyn TelemetrySink>>);

impl FanoutSink {
    pub fn new(sinks: Vec<Box<dyn TelemetrySink>>) -> Self {
        Self(sinks)
    }
}

impl TelemetrySink for FanoutSink {
    fn append(&self, level: Severity, line: &str) -> io::Result<()> {
        let mut first_err = None;
        for sink in &self.0 {
            if let Err(e) = sink.append(level, line) {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    fn flush(&self) -> io::Result<()> {
        let mut first_err = None;
        for sink in &self.0 {
            if let Err(e) = sink.flush() {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

/// Size-rotated log file: `run.log`, `run.log.1` .. `run.log.N`.
pub struct RotatingFileSink {
    path: PathBuf,
    max_bytes: u64,
    backups: usize,
    file: Mutex<Option<(File, u64)>>,
}

impl RotatingFileSink {
    pub fn open(path: impl Into<PathBuf>, max_bytes: u64, backups: usize) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let (file, size) = open_append(&path)?;
        Ok(Self {
            path,
            max_bytes,
            backups,
            file: Mutex::new(Some((file, size))),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn backup_path(&self, n: usize) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".{n}"));
        PathBuf::from(name)
    }

    fn rotate(&self) -> io::Result<()> {
        if self.backups == 0 {
            return OpenOptions::new()
                .write(true)
                .truncate(true)
                .open(&self.path)
                .map(|_| ());
        }
        let oldest = self.backup_path(self.backups);
        if oldest.exists() {
            std::fs::remove_file(&oldest)?;
        }
        for n in (1..self.backups).rev() {
            let from = self.backup_path(n);
            if from.exists() {
                std::fs::rename(&from, self.backup_path(n + 1))?;
            }
        }
        std::fs::rename(&self.path, self.backup_path(1))
    }
}

impl TelemetrySink for RotatingFileSink {
    fn append(&self, level: Severity, line: &str) -> io::Result<()> {
        let formatted = format!(
            "{} - sensor-sweep - {} - {}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            level.as_str(),
            line
        );
        let len = formatted.len() as u64;

        let mut guard = self.file.lock();
        let needs_rotation = matches!(&*guard, Some((_, size)) if *size > 0 && size + len > self.max_bytes);
        if needs_rotation || guard.is_none() {
            if needs_rotation {
                // Close before renaming so the handle never points at a backup.
                *guard = None;
                self.rotate()?;
            }
            *guard = Some(open_append(&self.path)?);
        }

        if let Some((file, size)) = guard.as_mut() {
            file.write_all(formatted.as_bytes())?;
            *size += len;
        }
        Ok(())
    }

    fn flush(&self) -> io::Result<()> {
        match self.file.lock().as_mut() {
            Some((file, _)) => file.flush(),
            None => Ok(()),
        }
    }
}

fn open_append(path: &Path) -> io::Result<(File, u64)> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let size = file.metadata()?.len();
    Ok((file, size))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotating_sink_rotates_and_bounds_backups() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        let sink = RotatingFileSink::open(&path, 200, 2).unwrap();

        for i in 0..40 {
            sink.append(Severity::Info, &format!("line number {i}")).unwrap();
        }
        sink.flush().unwrap();

        assert!(path.exists());
        assert!(dir.path().join("run.log.1").exists());
        assert!(dir.path().join("run.log.2").exists());
        assert!(!dir.path().join("run.log.3").exists());
        assert!(std::fs::metadata(&path).unwrap().len() <= 200);

        let current = std::fs::read_to_string(&path).unwrap();
        assert!(current.contains("line number 39"));
        assert!(current.contains(" - INFO - "));
    }

    #[test]
    fn test_fanout_reports_failure_but_feeds_all() {
        struct Failing;
        impl TelemetrySink for Failing {
            fn append(&self, _level: Severity, _line: &str) -> io::Result<()> {
                Err(io::Error::other("disk full"))
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fan.log");
        let fan = FanoutSink::new(vec![
            Box::new(Failing),
            Box::new(RotatingFileSink::open(&path, 1024, 1).unwrap()),
        ]);

        assert!(fan.append(Severity::Warn, "still written").is_err());
        fan.flush().unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("still written"));
    }
}
