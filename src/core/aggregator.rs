//! Report bundle construction.
//!
//! `build` turns the per-producer results and the audit snapshot into the
//! fixed set of artifacts. It does no I/O; `ReportBundle::write_to` puts the
//! bundle on disk all-or-nothing.

use crate::audit::{EventRecord, Phase};
use crate::capture::{encode, CaptureResult, Outcome, Payload, ProducerId, StubReason};
use crate::core::report;
use crate::error::AggregationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

pub const REPORT_FILE: &str = "report.txt";
pub const METADATA_FILE: &str = "metadata.json";

/// Suffix of staged files during `write_to`.
const STAGING_SUFFIX: &str = ".partial";

// ============================================================================
// Inputs
// ============================================================================

/// Facts about the run that are not producer results.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Embedded in the report; the only non-deterministic input
    pub generated_at: DateTime<Utc>,
    pub configured: Duration,
    pub output_dir: PathBuf,
    pub screen_size: Option<(u32, u32)>,
    pub hostname: Option<String>,
    pub interrupted: bool,
    pub detached: Vec<ProducerId>,
}

/// Run statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub events: usize,
    pub warnings: usize,
    pub errors: usize,
    pub key_events: usize,
    pub key_downs: usize,
    pub clipboard_changes: usize,
    pub audio_chunks: usize,
}

impl Counters {
    fn collect(results: &BTreeMap<ProducerId, CaptureResult>, events: &[EventRecord]) -> Self {
        let mut counters = Counters {
            events: events.len(),
            warnings: events.iter().filter(|e| e.phase == Phase::Warning).count(),
            errors: events.iter().filter(|e| e.phase == Phase::Error).count(),
            ..Default::default()
        };

        for result in results.values() {
            match result.payload() {
                Some(Payload::Keys(keys)) => {
                    counters.key_events = keys.len();
                    counters.key_downs = keys
                        .iter()
                        .filter(|k| k.transition == crate::capture::KeyTransition::Down)
                        .count();
                }
                Some(Payload::Clipboard(history)) => counters.clipboard_changes = history.len(),
                Some(Payload::Audio(clip)) => counters.audio_chunks = clip.chunks,
                _ => {}
            }
        }
        counters
    }
}

// ============================================================================
// Metadata record
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub run_id: Uuid,
    pub collection: CollectionInfo,
    pub artifacts: BTreeMap<String, ArtifactEntry>,
    pub statistics: Counters,
    pub producers: BTreeMap<ProducerId, ProducerEntry>,
    pub environment: Environment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub started_at: DateTime<Utc>,
    pub generated_at: DateTime<Utc>,
    pub configured_secs: f64,
    /// Rounded to two decimals
    pub elapsed_secs: f64,
    pub output_dir: PathBuf,
    pub interrupted: bool,
    pub detached: Vec<ProducerId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    pub path: PathBuf,
    pub exists: bool,
    pub size: u64,
    pub status: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stub_reason: Option<StubReason>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProducerEntry {
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stub_reason: Option<StubReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl ProducerEntry {
    fn from_result(result: &CaptureResult) -> Self {
        let (error, attributes) = match result {
            CaptureResult::Success { attributes, .. } => (None, attributes.clone()),
            CaptureResult::Stub { .. } => (None, BTreeMap::new()),
            CaptureResult::Failed { error, detail } => {
                (Some(format!("{}: {detail}", error.kind())), BTreeMap::new())
            }
        };
        Self {
            outcome: result.outcome(),
            stub_reason: result.stub_reason(),
            error,
            attributes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screen_width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screen_height: Option<u32>,
    pub version: String,
    pub os: String,
    pub arch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

impl Environment {
    fn current(ctx: &RunContext) -> Self {
        Self {
            screen_width: ctx.screen_size.map(|(w, _)| w),
            screen_height: ctx.screen_size.map(|(_, h)| h),
            version: crate::VERSION.to_string(),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            hostname: ctx.hostname.clone(),
        }
    }
}

// ============================================================================
// Bundle
// ============================================================================

/// The finished, read-only set of artifacts for one run.
#[derive(Debug, Clone)]
pub struct ReportBundle {
    run_id: Uuid,
    artifacts: BTreeMap<&'static str, Vec<u8>>,
    counters: Counters,
    metadata: Metadata,
}

/// Build the bundle from resolved results.
pub fn build(
    results: &BTreeMap<ProducerId, CaptureResult>,
    events: &[EventRecord],
    elapsed: Duration,
    ctx: &RunContext,
) -> Result<ReportBundle, AggregationError> {
    let counters = Counters::collect(results, events);
    let mut artifacts: BTreeMap<&'static str, Vec<u8>> = BTreeMap::new();

    for id in ProducerId::ALL {
        let Some(payload) = results.get(&id).and_then(CaptureResult::payload) else {
            continue;
        };
        let bytes = render_payload(id, payload, ctx)?;
        artifacts.insert(id.artifact_name(), bytes);
    }

    let sizes: BTreeMap<&'static str, u64> = artifacts
        .iter()
        .map(|(name, bytes)| (*name, bytes.len() as u64))
        .collect();
    let report = report::report_text(results, &counters, &sizes, elapsed, ctx);
    artifacts.insert(REPORT_FILE, report.into_bytes());

    let mut entries = BTreeMap::new();
    for id in ProducerId::ALL {
        let name = id.artifact_name();
        let result = results.get(&id);
        let size = artifacts.get(name).map(|b| b.len() as u64).unwrap_or(0);
        entries.insert(
            name.to_string(),
            ArtifactEntry {
                path: ctx.output_dir.join(name),
                exists: artifacts.contains_key(name),
                size,
                status: result.map(CaptureResult::outcome).unwrap_or(Outcome::Failed),
                stub_reason: result.and_then(CaptureResult::stub_reason),
            },
        );
    }
    entries.insert(
        REPORT_FILE.to_string(),
        ArtifactEntry {
            path: ctx.output_dir.join(REPORT_FILE),
            exists: true,
            size: artifacts.get(REPORT_FILE).map(|b| b.len() as u64).unwrap_or(0),
            status: Outcome::Success,
            stub_reason: None,
        },
    );

    let metadata = Metadata {
        run_id: ctx.run_id,
        collection: CollectionInfo {
            started_at: ctx.started_at,
            generated_at: ctx.generated_at,
            configured_secs: ctx.configured.as_secs_f64(),
            elapsed_secs: (elapsed.as_secs_f64() * 100.0).round() / 100.0,
            output_dir: ctx.output_dir.clone(),
            interrupted: ctx.interrupted,
            detached: ctx.detached.clone(),
        },
        artifacts: entries,
        statistics: counters,
        producers: results
            .iter()
            .map(|(id, result)| (*id, ProducerEntry::from_result(result)))
            .collect(),
        environment: Environment::current(ctx),
    };
    artifacts.insert(METADATA_FILE, serde_json::to_vec_pretty(&metadata)?);

    Ok(ReportBundle {
        run_id: ctx.run_id,
        artifacts,
        counters,
        metadata,
    })
}

fn render_payload(
    id: ProducerId,
    payload: &Payload,
    ctx: &RunContext,
) -> Result<Vec<u8>, AggregationError> {
    let bytes = match payload {
        Payload::Image(image) => {
            if image.bytes.is_empty() {
                return Err(AggregationError::Encode {
                    artifact: id.artifact_name(),
                    reason: "image payload is empty".into(),
                });
            }
            image.bytes.clone()
        }
        Payload::Audio(clip) => encode::wav_file(clip),
        Payload::Keys(events) => report::keyboard_log(events).into_bytes(),
        Payload::Clipboard(history) => report::clipboard_log(history).into_bytes(),
        Payload::Windows(windows) => report::window_info(windows, &ctx.generated_at).into_bytes(),
    };
    Ok(bytes)
}

impl ReportBundle {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Artifact names with their contents, in name order.
    pub fn artifacts(&self) -> impl Iterator<Item = (&'static str, &[u8])> {
        self.artifacts.iter().map(|(name, bytes)| (*name, bytes.as_slice()))
    }

    pub fn artifact(&self, name: &str) -> Option<&[u8]> {
        self.artifacts.get(name).map(Vec::as_slice)
    }

    pub fn report_text(&self) -> &str {
        self.artifact(REPORT_FILE)
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
            .unwrap_or_default()
    }

    /// Write every artifact into `dir`.
    ///
    /// Files are staged under temporary names and renamed into place. On
    /// failure every staged or renamed file from this call is removed.
    /// Artifacts of earlier runs that this bundle does not contain are
    /// removed after a successful commit.
    pub fn write_to(&self, dir: &Path) -> Result<Vec<PathBuf>, AggregationError> {
        fs::create_dir_all(dir).map_err(|source| AggregationError::Write {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut staged: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(self.artifacts.len());
        for (name, bytes) in &self.artifacts {
            let temp = dir.join(format!(".{name}{STAGING_SUFFIX}"));
            let target = dir.join(name);
            if let Err(source) = fs::write(&temp, bytes) {
                let _ = fs::remove_file(&temp);
                rollback(&staged, &[]);
                return Err(AggregationError::Write { path: temp, source });
            }
            staged.push((temp, target));
        }

        let mut committed = Vec::with_capacity(staged.len());
        for (temp, target) in &staged {
            if let Err(source) = fs::rename(temp, target) {
                rollback(&staged, &committed);
                return Err(AggregationError::Write {
                    path: target.clone(),
                    source,
                });
            }
            committed.push(target.clone());
        }

        for id in ProducerId::ALL {
            let name = id.artifact_name();
            if !self.artifacts.contains_key(name) {
                let stale = dir.join(name);
                if stale.is_file() {
                    let _ = fs::remove_file(stale);
                }
            }
        }

        Ok(committed)
    }
}

fn rollback(staged: &[(PathBuf, PathBuf)], committed: &[PathBuf]) {
    for (temp, _) in staged {
        let _ = fs::remove_file(temp);
    }
    for path in committed {
        let _ = fs::remove_file(path);
    }
}
