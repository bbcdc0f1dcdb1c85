//! Hand-off of a finished bundle.
//!
//! Publishing is outside the collection core: it only ever sees a bundle
//! that was written completely. The archive is rebuilt from the bundle
//! directory and passed to a [`Transport`].

pub mod archive;
pub mod outbox;

pub use archive::{archive_entries, build_archive};
pub use outbox::{Manifest, OutboxTransport};

use crate::audit::{Phase, SharedAuditLog};
use crate::core::ReportBundle;
use crate::error::PublishError;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Producer name for publisher audit records.
pub const PUBLISHER: &str = "publisher";

/// What a transport is asked to deliver.
#[derive(Debug)]
pub struct Envelope<'a> {
    pub run_id: Uuid,
    pub subject: String,
    pub body: String,
    pub archive: &'a [u8],
    pub entries: usize,
}

/// Delivery channel for archives.
pub trait Transport: Send + Sync {
    fn name(&self) -> &str;

    /// False for any channel without authentication or encryption.
    fn is_secure(&self) -> bool;

    /// Deliver the envelope; returns where it ended up.
    fn deliver(&self, envelope: &Envelope<'_>) -> Result<PathBuf, PublishError>;
}

/// Proof of a completed hand-off.
#[derive(Debug, Clone, PartialEq)]
pub struct Receipt {
    pub run_id: Uuid,
    pub transport: String,
    pub archive_path: PathBuf,
    pub archive_bytes: u64,
    pub entries: usize,
    pub delivered_to: PathBuf,
}

pub trait Publisher {
    fn publish(&self, bundle: &ReportBundle, dir: &Path) -> Result<Receipt, PublishError>;
}

/// Zips the bundle directory and forwards it through a transport.
pub struct ArchivePublisher {
    transport: Box<dyn Transport>,
    archive_path: PathBuf,
    allow_insecure: bool,
    audit: SharedAuditLog,
}

impl ArchivePublisher {
    pub fn new(transport: Box<dyn Transport>, archive_path: PathBuf, audit: SharedAuditLog) -> Self {
        Self {
            transport,
            archive_path,
            allow_insecure: false,
            audit,
        }
    }

    pub fn allow_insecure(mut self, allow: bool) -> Self {
        self.allow_insecure = allow;
        self
    }

    fn check_transport(&self) -> Result<(), PublishError> {
        if self.transport.is_secure() {
            return Ok(());
        }
        let name = self.transport.name().to_string();
        if !self.allow_insecure {
            self.audit.record(
                PUBLISHER,
                Phase::Error,
                format!("refusing insecure transport '{name}'"),
            );
            return Err(PublishError::InsecureTransport(name));
        }
        self.audit.record(
            PUBLISHER,
            Phase::Warning,
            format!("publishing over insecure transport '{name}'"),
        );
        Ok(())
    }
}

impl Publisher for ArchivePublisher {
    fn publish(&self, bundle: &ReportBundle, dir: &Path) -> Result<Receipt, PublishError> {
        self.check_transport()?;
        self.audit.record(
            PUBLISHER,
            Phase::Start,
            format!("archiving {}", dir.display()),
        );

        let (bytes, entries) = build_archive(dir)?;
        if let Some(parent) = self.archive_path.parent() {
            fs::create_dir_all(parent).map_err(|source| PublishError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&self.archive_path, &bytes).map_err(|source| PublishError::Io {
            path: self.archive_path.clone(),
            source,
        })?;

        let envelope = Envelope {
            run_id: bundle.run_id(),
            subject: format!("data collection {}", bundle.run_id()),
            body: bundle.report_text().to_string(),
            archive: &bytes,
            entries,
        };
        let delivered_to = match self.transport.deliver(&envelope) {
            Ok(path) => path,
            Err(e) => {
                self.audit
                    .record(PUBLISHER, Phase::Error, format!("delivery failed: {e}"));
                return Err(e);
            }
        };

        self.audit.record(
            PUBLISHER,
            Phase::Success,
            format!(
                "{} entries ({} bytes) delivered via {} to {}",
                entries,
                bytes.len(),
                self.transport.name(),
                delivered_to.display()
            ),
        );

        Ok(Receipt {
            run_id: bundle.run_id(),
            transport: self.transport.name().to_string(),
            archive_path: self.archive_path.clone(),
            archive_bytes: bytes.len() as u64,
            entries,
            delivered_to,
        })
    }
}
