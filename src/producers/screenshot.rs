//! End-of-window screen capture.

use crate::audit::{Phase, Severity};
use crate::capture::encode;
use crate::capture::{CaptureResult, Payload, ProducerId};
use crate::devices::ScreenSource;
use crate::error::DeviceError;
use crate::producers::{finish, Mode, Producer, ProducerContext};
use std::sync::Arc;

pub struct ScreenshotProducer {
    screen: Arc<dyn ScreenSource>,
}

impl ScreenshotProducer {
    pub fn new(screen: Arc<dyn ScreenSource>) -> Self {
        Self { screen }
    }

    fn capture(&mut self, ctx: &ProducerContext) -> CaptureResult {
        let frame = match self.screen.capture() {
            Ok(frame) => frame,
            Err(e) => return CaptureResult::failed(e, "screen capture failed"),
        };

        match encode::encode_png(&frame) {
            Ok(image) => {
                ctx.audit.note(
                    self.id().name(),
                    Severity::Info,
                    format!("screenshot size: {}x{}", image.width, image.height),
                );
                let resolution = format!("{}x{}", image.width, image.height);
                CaptureResult::success(Payload::Image(image)).with_attr("resolution", resolution)
            }
            Err(e) => CaptureResult::failed(
                DeviceError::ReadFailure("screen frame".into()),
                format!("could not encode screenshot: {e}"),
            ),
        }
    }
}

impl Producer for ScreenshotProducer {
    fn id(&self) -> ProducerId {
        ProducerId::Screenshot
    }

    fn mode(&self) -> Mode {
        Mode::OneShot
    }

    fn acquire(&mut self, ctx: &ProducerContext) -> CaptureResult {
        ctx.audit.record(self.id().name(), Phase::Start, "capturing screen");
        let result = self.capture(ctx);
        finish(ctx, self.id(), result)
    }
}
