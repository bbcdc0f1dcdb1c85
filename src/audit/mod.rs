//! Audit trail for a collection run.
//!
//! Every producer and the orchestrator report lifecycle events here so the
//! cross-thread timeline of a run can be reconstructed afterwards.

pub mod log;
pub mod sink;

pub use log::{create_shared_log, AuditLog, AuditStats, EventRecord, Phase, SharedAuditLog, Snapshot};
pub use sink::{FanoutSink, NullSink, RotatingFileSink, Severity, TelemetrySink, TracingSink};
