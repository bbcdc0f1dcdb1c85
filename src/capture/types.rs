//! Data model shared by producers, the orchestrator and the aggregator.

use crate::devices::WindowInfo;
use crate::error::DeviceError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The fixed time window a run collects over.
///
/// Built once when the run starts and never mutated afterwards.
#[derive(Debug, Clone, Copy)]
pub struct CollectionWindow {
    duration: Duration,
    started_at: DateTime<Utc>,
    started: Instant,
}

impl CollectionWindow {
    /// Open a window starting now.
    pub fn open(duration: Duration) -> Self {
        Self {
            duration,
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    /// Configured length of the window.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Wall-clock start time.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Time elapsed since the window opened, measured monotonically.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// A one-way stop flag shared between the orchestrator and producers.
///
/// Flips from false to true exactly once and never resets.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sleep for `duration`, waking early if the token is cancelled.
    ///
    /// Returns true when the sleep was cut short by cancellation.
    pub fn sleep(&self, duration: Duration) -> bool {
        const SLICE: Duration = Duration::from_millis(20);
        let until = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return true;
            }
            let left = until.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return false;
            }
            std::thread::sleep(left.min(SLICE));
        }
    }
}

/// Identity of each producer in a run, in report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProducerId {
    Image,
    Audio,
    Screenshot,
    Keyboard,
    Clipboard,
    Windows,
}

impl ProducerId {
    pub const ALL: [ProducerId; 6] = [
        ProducerId::Image,
        ProducerId::Audio,
        ProducerId::Screenshot,
        ProducerId::Keyboard,
        ProducerId::Clipboard,
        ProducerId::Windows,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ProducerId::Image => "image",
            ProducerId::Audio => "audio",
            ProducerId::Screenshot => "screenshot",
            ProducerId::Keyboard => "keyboard",
            ProducerId::Clipboard => "clipboard",
            ProducerId::Windows => "windows",
        }
    }

    /// Fixed file name of the artifact this producer feeds.
    pub fn artifact_name(&self) -> &'static str {
        match self {
            ProducerId::Image => "webcam_capture.jpg",
            ProducerId::Audio => "audio_record.wav",
            ProducerId::Screenshot => "screenshot.png",
            ProducerId::Keyboard => "keyboard_log.txt",
            ProducerId::Clipboard => "clipboard_log.txt",
            ProducerId::Windows => "screen_info.txt",
        }
    }
}

impl fmt::Display for ProducerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why a stub was substituted for real data.
///
/// Kept distinct here even though the human report collapses every
/// variant to "unavailable".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StubReason {
    NoDevice,
    Timeout,
    Detached,
    ReadFailure,
}

impl StubReason {
    pub fn describe(&self) -> &'static str {
        match self {
            StubReason::NoDevice => "no device found",
            StubReason::Timeout => "device timed out",
            StubReason::Detached => "producer detached at shutdown",
            StubReason::ReadFailure => "device read failed",
        }
    }
}

/// Encoded still image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

/// Recorded audio as 16-bit little-endian mono PCM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub sample_rate: u32,
    pub chunk_frames: usize,
    pub chunks: usize,
    pub pcm: Vec<u8>,
}

impl AudioClip {
    pub const BYTES_PER_FRAME: usize = 2;

    pub fn empty(sample_rate: u32, chunk_frames: usize) -> Self {
        Self {
            sample_rate,
            chunk_frames,
            chunks: 0,
            pcm: Vec::new(),
        }
    }

    /// Silence spanning `duration`, used when no microphone is available.
    pub fn silence(sample_rate: u32, chunk_frames: usize, duration: Duration) -> Self {
        let frames = (sample_rate as f64 * duration.as_secs_f64()) as usize;
        Self {
            sample_rate,
            chunk_frames,
            chunks: 0,
            pcm: vec![0; frames * Self::BYTES_PER_FRAME],
        }
    }

    pub fn chunk_bytes(&self) -> usize {
        self.chunk_frames * Self::BYTES_PER_FRAME
    }

    pub fn push_chunk(&mut self, chunk: &[u8]) {
        self.pcm.extend_from_slice(chunk);
        self.chunks += 1;
    }

    pub fn duration_secs(&self) -> f64 {
        let frames = self.pcm.len() / Self::BYTES_PER_FRAME;
        frames as f64 / self.sample_rate as f64
    }
}

/// Key state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyTransition {
    Down,
    Up,
}

impl fmt::Display for KeyTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyTransition::Down => f.write_str("down"),
            KeyTransition::Up => f.write_str("up"),
        }
    }
}

/// A single event delivered by the key hook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub timestamp: DateTime<Utc>,
    pub key: String,
    pub transition: KeyTransition,
}

impl KeyEvent {
    pub fn new(key: impl Into<String>, transition: KeyTransition) -> Self {
        Self {
            timestamp: Utc::now(),
            key: key.into(),
            transition,
        }
    }

    /// Named keys such as "shift" or "enter" rather than a printable char.
    pub fn is_special(&self) -> bool {
        self.key.chars().count() > 1
    }
}

/// One recorded clipboard value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipboardSample {
    pub timestamp: DateTime<Utc>,
    pub content: String,
}

/// Clipboard history that only grows on real, non-blank changes.
///
/// No two adjacent samples share content and no sample is blank.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClipboardHistory {
    samples: Vec<ClipboardSample>,
    last_seen: String,
}

impl ClipboardHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one poll result. Returns true if a sample was recorded.
    pub fn observe(&mut self, content: String, at: DateTime<Utc>) -> bool {
        if content == self.last_seen {
            return false;
        }
        let record = !content.trim().is_empty()
            && self.samples.last().map(|s| s.content != content).unwrap_or(true);
        if record {
            self.samples.push(ClipboardSample {
                timestamp: at,
                content: content.clone(),
            });
        }
        self.last_seen = content;
        record
    }

    pub fn samples(&self) -> &[ClipboardSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// The data a producer hands over.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Image(EncodedImage),
    Audio(AudioClip),
    Keys(Vec<KeyEvent>),
    Clipboard(ClipboardHistory),
    Windows(Vec<WindowInfo>),
}

/// Coarse outcome tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Stub,
    Failed,
}

/// Result of one producer for one run.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureResult {
    Success {
        payload: Payload,
        attributes: BTreeMap<String, String>,
    },
    Stub {
        reason: StubReason,
        payload: Payload,
    },
    Failed {
        error: DeviceError,
        detail: String,
    },
}

impl CaptureResult {
    pub fn success(payload: Payload) -> Self {
        CaptureResult::Success {
            payload,
            attributes: BTreeMap::new(),
        }
    }

    pub fn stub(reason: StubReason, payload: Payload) -> Self {
        CaptureResult::Stub { reason, payload }
    }

    pub fn failed(error: DeviceError, detail: impl Into<String>) -> Self {
        CaptureResult::Failed {
            error,
            detail: detail.into(),
        }
    }

    /// Attach an attribute to a Success result; ignored otherwise.
    pub fn with_attr(mut self, key: &str, value: impl ToString) -> Self {
        if let CaptureResult::Success { attributes, .. } = &mut self {
            attributes.insert(key.to_string(), value.to_string());
        }
        self
    }

    pub fn outcome(&self) -> Outcome {
        match self {
            CaptureResult::Success { .. } => Outcome::Success,
            CaptureResult::Stub { .. } => Outcome::Stub,
            CaptureResult::Failed { .. } => Outcome::Failed,
        }
    }

    pub fn payload(&self) -> Option<&Payload> {
        match self {
            CaptureResult::Success { payload, .. } | CaptureResult::Stub { payload, .. } => {
                Some(payload)
            }
            CaptureResult::Failed { .. } => None,
        }
    }

    pub fn stub_reason(&self) -> Option<StubReason> {
        match self {
            CaptureResult::Stub { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        match self {
            CaptureResult::Success { attributes, .. } => attributes.get(key).map(String::as_str),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observe_all(values: &[&str]) -> ClipboardHistory {
        let mut history = ClipboardHistory::new();
        for value in values {
            history.observe(value.to_string(), Utc::now());
        }
        history
    }

    #[test]
    fn test_clipboard_records_only_changes() {
        let history = observe_all(&["", "alpha", "alpha", "beta", "beta"]);
        let contents: Vec<_> = history.samples().iter().map(|s| s.content.as_str()).collect();
        assert_eq!(contents, vec!["alpha", "beta"]);
    }

    #[test]
    fn test_clipboard_skips_blank_values() {
        let history = observe_all(&["  ", "\n", "x"]);
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_clipboard_never_repeats_across_blank_gap() {
        let history = observe_all(&["alpha", " ", "alpha", "beta"]);
        let contents: Vec<_> = history.samples().iter().map(|s| s.content.as_str()).collect();
        assert_eq!(contents, vec!["alpha", "beta"]);
        for pair in history.samples().windows(2) {
            assert_ne!(pair[0].content, pair[1].content);
        }
    }

    #[test]
    fn test_cancel_token_sleep_wakes_early() {
        let token = CancelToken::new();
        let other = token.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            other.cancel();
        });
        let start = Instant::now();
        assert!(token.sleep(Duration::from_secs(5)));
        assert!(start.elapsed() < Duration::from_secs(2));
        handle.join().unwrap();
    }

    #[test]
    fn test_audio_silence_length() {
        let clip = AudioClip::silence(1000, 10, Duration::from_secs(2));
        assert_eq!(clip.pcm.len(), 4000);
        assert!((clip.duration_secs() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_special_keys() {
        assert!(KeyEvent::new("shift", KeyTransition::Down).is_special());
        assert!(!KeyEvent::new("a", KeyTransition::Down).is_special());
        assert!(!KeyEvent::new("ж", KeyTransition::Up).is_special());
    }

    #[test]
    fn test_attributes_only_on_success() {
        let stub = CaptureResult::stub(StubReason::NoDevice, Payload::Keys(vec![]))
            .with_attr("k", "v");
        assert_eq!(stub.attribute("k"), None);
        let ok = CaptureResult::success(Payload::Keys(vec![])).with_attr("k", 3);
        assert_eq!(ok.attribute("k"), Some("3"));
    }
}
