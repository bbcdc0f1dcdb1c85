//! Store-and-forward outbox on the local filesystem.
//!
//! Each delivery leaves `<run_id>.zip` and a `<run_id>.json` manifest in the
//! outbox directory. A separate process is expected to forward them.

use crate::error::PublishError;
use crate::publish::{Envelope, Transport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Manifest written next to every archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub run_id: Uuid,
    pub subject: String,
    pub body: String,
    pub attachment: String,
    pub size: u64,
    pub entries: usize,
    pub queued_at: DateTime<Utc>,
}

pub struct OutboxTransport {
    dir: PathBuf,
    max_bytes: u64,
}

impl OutboxTransport {
    pub fn new(dir: impl Into<PathBuf>, max_bytes: u64) -> Self {
        Self {
            dir: dir.into(),
            max_bytes,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write_atomic(&self, name: &str, bytes: &[u8]) -> Result<PathBuf, PublishError> {
        let target = self.dir.join(name);
        let temp = self.dir.join(format!(".{name}.partial"));
        fs::write(&temp, bytes).map_err(|source| PublishError::Io {
            path: temp.clone(),
            source,
        })?;
        if let Err(source) = fs::rename(&temp, &target) {
            let _ = fs::remove_file(&temp);
            return Err(PublishError::Io {
                path: target,
                source,
            });
        }
        Ok(target)
    }
}

impl Transport for OutboxTransport {
    fn name(&self) -> &str {
        "outbox"
    }

    /// Nothing leaves the machine.
    fn is_secure(&self) -> bool {
        true
    }

    fn deliver(&self, envelope: &Envelope<'_>) -> Result<PathBuf, PublishError> {
        let size = envelope.archive.len() as u64;
        if size > self.max_bytes {
            return Err(PublishError::TooLarge {
                size,
                limit: self.max_bytes,
            });
        }

        fs::create_dir_all(&self.dir).map_err(|source| PublishError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let attachment = format!("{}.zip", envelope.run_id);
        let archive = self.write_atomic(&attachment, envelope.archive)?;

        let manifest = Manifest {
            run_id: envelope.run_id,
            subject: envelope.subject.clone(),
            body: envelope.body.clone(),
            attachment,
            size,
            entries: envelope.entries,
            queued_at: Utc::now(),
        };
        let json = serde_json::to_vec_pretty(&manifest)?;
        if let Err(e) = self.write_atomic(&format!("{}.json", envelope.run_id), &json) {
            // A zip without its manifest would never be forwarded.
            let _ = fs::remove_file(&archive);
            return Err(e);
        }

        Ok(archive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn envelope(bytes: &[u8]) -> Envelope<'_> {
        Envelope {
            run_id: Uuid::nil(),
            subject: "collection".into(),
            body: "report".into(),
            archive: bytes,
            entries: 3,
        }
    }

    #[test]
    fn test_delivery_writes_archive_and_manifest() {
        let dir = TempDir::new().unwrap();
        let outbox = OutboxTransport::new(dir.path().join("outbox"), 1024);

        let path = outbox.deliver(&envelope(&[1, 2, 3])).unwrap();

        assert_eq!(fs::read(&path).unwrap(), vec![1, 2, 3]);
        let manifest_path = outbox.dir().join(format!("{}.json", Uuid::nil()));
        let manifest: Manifest =
            serde_json::from_slice(&fs::read(manifest_path).unwrap()).unwrap();
        assert_eq!(manifest.size, 3);
        assert_eq!(manifest.entries, 3);
        assert_eq!(manifest.attachment, format!("{}.zip", Uuid::nil()));
    }

    #[test]
    fn test_oversized_archive_rejected() {
        let dir = TempDir::new().unwrap();
        let outbox = OutboxTransport::new(dir.path(), 4);

        let err = outbox.deliver(&envelope(&[0; 5])).unwrap_err();

        assert!(matches!(err, PublishError::TooLarge { size: 5, limit: 4 }));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
