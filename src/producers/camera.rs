//! One-shot camera capture with stub fallback.

use crate::audit::{Phase, Severity};
use crate::capture::encode;
use crate::capture::{CaptureResult, Payload, ProducerId, StubReason};
use crate::devices::{FrameReader, ImageSource};
use crate::error::DeviceError;
use crate::producers::{finish, Mode, Producer, ProducerContext, CAMERA_STUB_LABEL};
use std::sync::Arc;
use std::time::Duration;

/// Indices probed in order; the first that opens wins.
pub const CAMERA_INDICES: [u32; 3] = [0, 1, 2];

pub struct ImageProducer {
    source: Arc<dyn ImageSource>,
    warmup: Duration,
}

impl ImageProducer {
    pub fn new(source: Arc<dyn ImageSource>, warmup: Duration) -> Self {
        Self { source, warmup }
    }

    fn open_first(&self, ctx: &ProducerContext) -> Option<(u32, Box<dyn FrameReader>)> {
        for index in CAMERA_INDICES {
            if ctx.cancel.is_cancelled() {
                return None;
            }
            match self.source.open(index) {
                Ok(reader) => return Some((index, reader)),
                Err(e) => ctx.audit.note(
                    self.id().name(),
                    Severity::Debug,
                    format!("camera index {index}: {e}"),
                ),
            }
        }
        None
    }

    fn stub(&self, reason: StubReason) -> CaptureResult {
        match encode::stub_image(CAMERA_STUB_LABEL) {
            Ok(image) => CaptureResult::stub(reason, Payload::Image(image)),
            Err(e) => CaptureResult::failed(
                DeviceError::Unavailable("camera".into()),
                format!("stub image could not be encoded: {e}"),
            ),
        }
    }

    fn capture(&mut self, ctx: &ProducerContext) -> CaptureResult {
        let name = self.id().name();

        let Some((index, mut reader)) = self.open_first(ctx) else {
            ctx.audit.record(name, Phase::Warning, "no camera found at indices 0, 1, 2");
            return self.stub(StubReason::NoDevice);
        };
        ctx.audit
            .note(name, Severity::Info, format!("camera found at index {index}"));

        // Give the sensor time to settle before the first read.
        if ctx.cancel.sleep(self.warmup) {
            ctx.audit
                .note(name, Severity::Info, "warm-up abandoned, releasing camera");
            return self.stub(StubReason::Timeout);
        }

        let frame = match reader.read_frame() {
            Ok(frame) => frame,
            Err(e) => {
                ctx.audit
                    .record(name, Phase::Error, format!("failed to read a frame: {e}"));
                return self.stub(StubReason::ReadFailure);
            }
        };

        match encode::encode_jpeg(&frame) {
            Ok(image) => {
                ctx.audit.note(
                    name,
                    Severity::Info,
                    format!("frame captured: {}x{}", image.width, image.height),
                );
                CaptureResult::success(Payload::Image(image))
                    .with_attr("camera_index", index)
                    .with_attr("resolution", format!("{}x{}", frame.width, frame.height))
            }
            Err(e) => {
                ctx.audit
                    .record(name, Phase::Error, format!("failed to encode frame: {e}"));
                self.stub(StubReason::ReadFailure)
            }
        }
    }
}

impl Producer for ImageProducer {
    fn id(&self) -> ProducerId {
        ProducerId::Image
    }

    fn mode(&self) -> Mode {
        Mode::OneShot
    }

    fn acquire(&mut self, ctx: &ProducerContext) -> CaptureResult {
        ctx.audit.record(self.id().name(), Phase::Start, "opening camera");
        let result = self.capture(ctx);
        finish(ctx, self.id(), result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::Outcome;
    use crate::devices::scripted::ScriptedCamera;
    use crate::devices::Frame;
    use crate::producers::test_support::context;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_absent_camera_probes_three_indices_and_stubs() {
        let camera = ScriptedCamera::absent();
        let attempts = camera.attempts();
        let mut producer = ImageProducer::new(Arc::new(camera), Duration::ZERO);

        let result = producer.acquire(&context(Duration::from_secs(1)));

        assert_eq!(*attempts.lock(), vec![0, 1, 2]);
        assert_eq!(result.stub_reason(), Some(StubReason::NoDevice));
        assert_eq!(StubReason::NoDevice.describe(), "no device found");
        match result.payload() {
            Some(Payload::Image(image)) => assert!(!image.bytes.is_empty()),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn test_first_available_index_wins() {
        let camera = ScriptedCamera::at(1, Frame::solid(8, 6, [200, 10, 10]));
        let attempts = camera.attempts();
        let released = camera.released();
        let mut producer = ImageProducer::new(Arc::new(camera), Duration::ZERO);

        let result = producer.acquire(&context(Duration::from_secs(1)));

        assert_eq!(result.outcome(), Outcome::Success);
        assert_eq!(result.attribute("camera_index"), Some("1"));
        assert_eq!(*attempts.lock(), vec![0, 1]);
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_cancel_during_warmup_releases_camera() {
        let camera = ScriptedCamera::at(0, Frame::solid(8, 6, [0, 0, 0]));
        let released = camera.released();
        let mut producer = ImageProducer::new(Arc::new(camera), Duration::from_secs(5));
        let ctx = context(Duration::from_secs(1));
        let cancel = ctx.cancel.clone();
        let stopper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            cancel.cancel();
        });

        let started = std::time::Instant::now();
        let result = producer.acquire(&ctx);
        stopper.join().unwrap();

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(result.stub_reason(), Some(StubReason::Timeout));
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_read_failure_stubs() {
        let mut producer = ImageProducer::new(Arc::new(ScriptedCamera::broken(0)), Duration::ZERO);
        let result = producer.acquire(&context(Duration::from_secs(1)));
        assert_eq!(result.stub_reason(), Some(StubReason::ReadFailure));
    }
}
