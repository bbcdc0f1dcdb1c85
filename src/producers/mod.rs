//! Producer adapters, one per sensor.
//!
//! One-shot producers (image, screenshot, window list) return as soon as they
//! have a result. Continuous producers (audio, clipboard, keyboard) run until
//! the context's cancel token fires, then hand over what they buffered.

pub mod audio;
pub mod camera;
pub mod clipboard;
pub mod keyboard;
pub mod screenshot;
pub mod windows;

pub use self::audio::AudioProducer;
pub use self::clipboard::ClipboardProducer;
pub use self::camera::ImageProducer;
pub use self::keyboard::KeyboardProducer;
pub use self::screenshot::ScreenshotProducer;
pub use self::windows::WindowListProducer;

use crate::audit::{Phase, SharedAuditLog};
use crate::capture::encode;
use crate::capture::{
    AudioClip, CancelToken, CaptureResult, ClipboardHistory, CollectionWindow, KeyEvent, Payload,
    ProducerId, StubReason,
};
use crate::config::Config;
use crate::devices::Devices;
use crate::error::DeviceError;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Label rendered onto the stub camera frame.
pub const CAMERA_STUB_LABEL: &str = "CAMERA UNAVAILABLE";

/// How a producer is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    OneShot,
    Continuous,
}

/// Everything a producer may read while running.
#[derive(Clone)]
pub struct ProducerContext {
    pub window: CollectionWindow,
    pub cancel: CancelToken,
    pub audit: SharedAuditLog,
}

/// A single sensor adapter.
pub trait Producer: Send {
    fn id(&self) -> ProducerId;

    fn mode(&self) -> Mode;

    /// Run until a usable result, a fatal device error, or cancellation.
    fn acquire(&mut self, ctx: &ProducerContext) -> CaptureResult;

    /// Buffer the orchestrator can salvage if this producer is detached.
    fn handoff(&self) -> Option<Arc<dyn Salvage>> {
        None
    }
}

/// Buffer a continuous producer fills while it runs.
///
/// Shared with the orchestrator. Whoever takes the contents first owns
/// them; every later take or update sees nothing.
pub struct Handoff<T>(Arc<Mutex<Option<T>>>);

impl<T> Clone for Handoff<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> Handoff<T> {
    pub fn new(initial: T) -> Self {
        Self(Arc::new(Mutex::new(Some(initial))))
    }

    /// Apply `f` to the contents unless they were already taken.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.0.lock().as_mut().map(f)
    }

    pub fn take(&self) -> Option<T> {
        self.0.lock().take()
    }
}

/// Data a continuous producer accumulates over the window.
pub trait Buffered: Send + 'static {
    fn has_data(&self) -> bool;

    fn into_payload(self) -> Payload;
}

impl Buffered for AudioClip {
    fn has_data(&self) -> bool {
        self.chunks > 0
    }

    fn into_payload(self) -> Payload {
        Payload::Audio(self)
    }
}

impl Buffered for Vec<KeyEvent> {
    fn has_data(&self) -> bool {
        !self.is_empty()
    }

    fn into_payload(self) -> Payload {
        Payload::Keys(self)
    }
}

impl Buffered for ClipboardHistory {
    fn has_data(&self) -> bool {
        !self.is_empty()
    }

    fn into_payload(self) -> Payload {
        Payload::Clipboard(self)
    }
}

/// Type-erased view of a [`Handoff`].
pub trait Salvage: Send + Sync {
    /// Take the buffered data, if there is any.
    fn salvage(&self) -> Option<Payload>;
}

impl<T: Buffered> Salvage for Handoff<T> {
    fn salvage(&self) -> Option<Payload> {
        self.take()
            .filter(Buffered::has_data)
            .map(Buffered::into_payload)
    }
}

/// Log the terminal phase for `result` and pass it through.
pub(crate) fn finish(ctx: &ProducerContext, id: ProducerId, result: CaptureResult) -> CaptureResult {
    let name = id.name();
    match &result {
        CaptureResult::Success { .. } => {
            ctx.audit.record(name, Phase::Success, "capture succeeded");
        }
        CaptureResult::Stub { reason, .. } => {
            ctx.audit
                .record(name, Phase::Stub, format!("stub substituted: {}", reason.describe()));
        }
        CaptureResult::Failed { error, detail } => {
            ctx.audit
                .record(name, Phase::Error, format!("capture failed: {error} ({detail})"));
        }
    }
    ctx.audit.record(name, Phase::Complete, "producer finished");
    result
}

/// Result used when a producer could not deliver within its grace window.
///
/// Producers whose artifact always exists get a stub payload; the screenshot
/// and window list have no legitimate placeholder and fail instead.
pub fn fallback(
    id: ProducerId,
    reason: StubReason,
    grace: Duration,
    window: &CollectionWindow,
    config: &Config,
) -> CaptureResult {
    match id {
        ProducerId::Image => match encode::stub_image(CAMERA_STUB_LABEL) {
            Ok(image) => CaptureResult::stub(reason, Payload::Image(image)),
            Err(e) => CaptureResult::failed(DeviceError::Timeout(grace), e),
        },
        ProducerId::Audio => CaptureResult::stub(
            reason,
            Payload::Audio(AudioClip::silence(
                config.audio.sample_rate,
                config.audio.chunk_frames,
                window.duration(),
            )),
        ),
        ProducerId::Keyboard => CaptureResult::stub(reason, Payload::Keys(Vec::new())),
        ProducerId::Clipboard => {
            CaptureResult::stub(reason, Payload::Clipboard(ClipboardHistory::new()))
        }
        ProducerId::Screenshot | ProducerId::Windows => CaptureResult::failed(
            DeviceError::Timeout(grace),
            reason.describe().to_string(),
        ),
    }
}

/// The six producers of a run, grouped by how the orchestrator drives them.
pub struct ProducerSet {
    pub image: Box<dyn Producer>,
    pub continuous: Vec<Box<dyn Producer>>,
    pub screenshot: Box<dyn Producer>,
    pub windows: Box<dyn Producer>,
}

impl ProducerSet {
    /// Build the producer set for a run from a device bundle.
    pub fn from_devices(devices: &Devices, config: &Config) -> Self {
        Self {
            image: Box::new(ImageProducer::new(devices.camera.clone(), config.camera_warmup)),
            continuous: vec![
                Box::new(AudioProducer::new(
                    devices.microphone.clone(),
                    config.audio.sample_rate,
                    config.audio.chunk_frames,
                )),
                Box::new(ClipboardProducer::new(
                    devices.clipboard.clone(),
                    config.clipboard_interval,
                )),
                Box::new(KeyboardProducer::new(devices.keyboard.clone())),
            ],
            screenshot: Box::new(ScreenshotProducer::new(devices.screen.clone())),
            windows: Box::new(WindowListProducer::new(devices.windows.clone())),
        }
    }
}
