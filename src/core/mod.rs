//! Core run coordination.
//!
//! This module contains:
//! - The orchestrator state machine that drives producers through one run
//! - The aggregator that turns results into the report bundle
//! - Plain-text renderers for the human-readable artifacts

pub mod aggregator;
pub mod orchestrator;
pub mod report;

pub use aggregator::{build, Counters, Metadata, ReportBundle, RunContext, METADATA_FILE, REPORT_FILE};
pub use orchestrator::{FinishedRun, Orchestrator, RunOutcome, RunState, StateHandle, ORCHESTRATOR};
