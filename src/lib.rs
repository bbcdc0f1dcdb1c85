//! Sensor Sweep - fixed-window multi-sensor capture with stub fallback.
//!
//! One run opens a collection window, drives every capture producer
//! concurrently, and always ends with a complete artifact bundle: a device
//! that is missing or stalls is replaced by a placeholder instead of
//! aborting the run.
//!
//! # Guarantees
//!
//! - **Bounded**: a run finishes within the window plus its grace periods,
//!   whatever the devices do
//! - **Complete**: exactly one result per producer, never zero, never two
//! - **Audited**: every lifecycle step lands in a totally ordered audit log
//! - **Local**: bundles are archived to a local outbox, nothing is sent
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                         Sensor Sweep                          │
//! ├───────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌──────────────┐   ┌─────────────┐         │
//! │  │   Devices   │──▶│  Producers   │──▶│Orchestrator │         │
//! │  │(noop/script)│   │ (1 thread ea)│   │ (state mach)│         │
//! │  └─────────────┘   └──────────────┘   └─────────────┘         │
//! │                           │                  │                │
//! │                           ▼                  ▼                │
//! │  ┌─────────────┐   ┌──────────────┐   ┌─────────────┐         │
//! │  │  Publisher  │◀──│  Aggregator  │◀──│  Audit Log  │         │
//! │  │  (outbox)   │   │   (bundle)   │   │  (ordered)  │         │
//! │  └─────────────┘   └──────────────┘   └─────────────┘         │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use sensor_sweep::audit::{create_shared_log, TracingSink};
//! use sensor_sweep::{devices, Config, Orchestrator};
//!
//! let config = Config::default();
//! let audit = create_shared_log(Box::new(TracingSink));
//! let orchestrator = Orchestrator::new(config, devices::scripted::demo(), audit);
//!
//! let finished = orchestrator.run().expect("bundle could not be written");
//! println!("{}", finished.bundle.report_text());
//! ```

pub mod audit;
pub mod capture;
pub mod config;
pub mod core;
pub mod devices;
pub mod error;
pub mod producers;
pub mod publish;

// Re-export key types at crate root for convenience
pub use audit::{create_shared_log, AuditLog, EventRecord, Phase, SharedAuditLog};
pub use capture::{CancelToken, CaptureResult, CollectionWindow, Outcome, ProducerId, StubReason};
pub use config::{Config, ConfigError};
pub use crate::core::{FinishedRun, Orchestrator, ReportBundle, RunOutcome, RunState, StateHandle};
pub use devices::Devices;
pub use error::{AggregationError, DeviceError, PublishError, RunError};
pub use publish::{ArchivePublisher, OutboxTransport, Publisher, Receipt, Transport};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Notice shown before a collection run starts.
pub const COLLECTION_NOTICE: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║                SENSOR SWEEP - COLLECTION NOTICE                  ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  This run collects, for a fixed window:                          ║
║    • One webcam image                                            ║
║    • A microphone recording                                      ║
║    • One screenshot and the list of open windows                 ║
║    • Keyboard events and clipboard changes                       ║
║                                                                  ║
║  Only the device backend you select is used. The bundled         ║
║  backends are simulated: no real device is ever opened.          ║
║                                                                  ║
║  All artifacts stay on this machine. Publishing only copies      ║
║  the archive into the local outbox directory.                    ║
║                                                                  ║
║  Inspect the settings with:                                      ║
║    sensor-sweep config                                           ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_notice_contents() {
        assert!(COLLECTION_NOTICE.contains("COLLECTION NOTICE"));
        assert!(COLLECTION_NOTICE.contains("Keyboard events"));
        assert!(COLLECTION_NOTICE.contains("local outbox"));
    }
}
