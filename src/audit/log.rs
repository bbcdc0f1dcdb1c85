//! Append-only audit log of producer lifecycle events.
//!
//! Records are kept in memory with a strictly increasing sequence number and
//! mirrored to a telemetry sink. A failing sink never loses an in-memory record.

use crate::audit::sink::{Severity, TelemetrySink};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Lifecycle phase of an audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Start,
    Success,
    Warning,
    Error,
    Stub,
    Complete,
}

impl Phase {
    pub fn severity(&self) -> Severity {
        match self {
            Phase::Start | Phase::Success | Phase::Complete => Severity::Info,
            Phase::Warning | Phase::Stub => Severity::Warn,
            Phase::Error => Severity::Error,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Start => "START",
            Phase::Success => "SUCCESS",
            Phase::Warning => "WARNING",
            Phase::Error => "ERROR",
            Phase::Stub => "STUB",
            Phase::Complete => "COMPLETE",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Position in the total order of the run
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub producer: String,
    pub phase: Phase,
    pub message: String,
}

impl EventRecord {
    /// One-line rendering used for the telemetry sink.
    pub fn line(&self) -> String {
        format!("[{}] {}: {}", self.producer, self.phase, self.message)
    }
}

#[derive(Default)]
struct Records {
    next_seq: u64,
    entries: Vec<EventRecord>,
}

/// Thread-safe audit log.
pub struct AuditLog {
    records: Mutex<Records>,
    sink: Box<dyn TelemetrySink>,
    sink_failures: AtomicU64,
    opened_at: DateTime<Utc>,
}

impl AuditLog {
    pub fn new(sink: Box<dyn TelemetrySink>) -> Self {
        Self {
            records: Mutex::new(Records::default()),
            sink,
            sink_failures: AtomicU64::new(0),
            opened_at: Utc::now(),
        }
    }

    /// Append a record and mirror it at the phase's severity.
    ///
    /// Returns the record's sequence number.
    pub fn record(&self, producer: &str, phase: Phase, message: impl Into<String>) -> u64 {
        let record = {
            let mut records = self.records.lock();
            let record = EventRecord {
                seq: records.next_seq,
                timestamp: Utc::now(),
                producer: producer.to_string(),
                phase,
                message: message.into(),
            };
            records.next_seq += 1;
            records.entries.push(record.clone());
            record
        };

        self.mirror(phase.severity(), &record.line());
        record.seq
    }

    /// Send a line to the sink only, without creating a record.
    ///
    /// For progress chatter (countdown ticks, per-second audio progress).
    pub fn note(&self, producer: &str, level: Severity, message: impl AsRef<str>) {
        self.mirror(level, &format!("[{producer}] {}", message.as_ref()));
    }

    fn mirror(&self, level: Severity, line: &str) {
        if self.sink.append(level, line).is_err() {
            self.sink_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Frozen, ordered view of every record appended so far.
    pub fn snapshot(&self) -> Snapshot {
        let entries = self.records.lock().entries.clone();
        Snapshot(entries.into_iter())
    }

    /// Number of records appended so far.
    pub fn len(&self) -> usize {
        self.records.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn flush(&self) {
        if self.sink.flush().is_err() {
            self.sink_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn stats(&self) -> AuditStats {
        let records = self.records.lock();
        let count = |phase: Phase| records.entries.iter().filter(|r| r.phase == phase).count() as u64;
        AuditStats {
            records: records.entries.len() as u64,
            warnings: count(Phase::Warning),
            errors: count(Phase::Error),
            stubs: count(Phase::Stub),
            sink_failures: self.sink_failures.load(Ordering::Relaxed),
            opened_at: self.opened_at,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Audit Summary:\n\
             - Records: {}\n\
             - Warnings: {}\n\
             - Errors: {}\n\
             - Stubs substituted: {}\n\
             - Telemetry sink failures: {}",
            stats.records, stats.warnings, stats.errors, stats.stubs, stats.sink_failures
        )
    }
}

/// Counters derived from the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditStats {
    pub records: u64,
    pub warnings: u64,
    pub errors: u64,
    pub stubs: u64,
    pub sink_failures: u64,
    pub opened_at: DateTime<Utc>,
}

/// Iterator over a frozen copy of the log. Later appends are not visible.
pub struct Snapshot(std::vec::IntoIter<EventRecord>);

impl Iterator for Snapshot {
    type Item = EventRecord;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.0.size_hint()
    }
}

impl ExactSizeIterator for Snapshot {}

/// Thread-safe shared audit log.
pub type SharedAuditLog = Arc<AuditLog>;

/// Create a shared audit log mirroring into `sink`.
pub fn create_shared_log(sink: Box<dyn TelemetrySink>) -> SharedAuditLog {
    Arc::new(AuditLog::new(sink))
}
