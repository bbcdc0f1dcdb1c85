//! Window enumeration.

use crate::audit::{Phase, Severity};
use crate::capture::{CaptureResult, Payload, ProducerId};
use crate::devices::WindowSource;
use crate::producers::{finish, Mode, Producer, ProducerContext};
use std::sync::Arc;

pub struct WindowListProducer {
    source: Arc<dyn WindowSource>,
}

impl WindowListProducer {
    pub fn new(source: Arc<dyn WindowSource>) -> Self {
        Self { source }
    }

    fn enumerate(&mut self, ctx: &ProducerContext) -> CaptureResult {
        let name = self.id().name();
        let all = match self.source.list() {
            Ok(all) => all,
            Err(e) => return CaptureResult::failed(e, "window enumeration failed"),
        };

        let listed = all.len();
        let visible: Vec<_> = all.into_iter().filter(|w| w.is_visible()).collect();
        for win in &visible {
            ctx.audit.note(
                name,
                Severity::Debug,
                format!(
                    "window '{}' pos=({},{}) size=({}x{})",
                    win.title, win.left, win.top, win.width, win.height
                ),
            );
        }
        ctx.audit
            .note(name, Severity::Info, format!("windows found: {}", visible.len()));

        let count = visible.len();
        CaptureResult::success(Payload::Windows(visible))
            .with_attr("visible", count)
            .with_attr("listed", listed)
    }
}

impl Producer for WindowListProducer {
    fn id(&self) -> ProducerId {
        ProducerId::Windows
    }

    fn mode(&self) -> Mode {
        Mode::OneShot
    }

    fn acquire(&mut self, ctx: &ProducerContext) -> CaptureResult {
        ctx.audit.record(self.id().name(), Phase::Start, "enumerating windows");
        let result = self.enumerate(ctx);
        finish(ctx, self.id(), result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::Outcome;
    use crate::devices::scripted::ScriptedWindows;
    use crate::devices::WindowInfo;
    use crate::error::DeviceError;
    use crate::producers::test_support::context;
    use std::time::Duration;

    #[test]
    fn test_hidden_and_untitled_windows_skipped() {
        let win = |title: &str, width| WindowInfo {
            title: title.into(),
            left: 0,
            top: 0,
            width,
            height: 100,
        };
        let source = ScriptedWindows::new(vec![win("Editor", 500), win("", 500), win("Tray", 0)]);
        let result = WindowListProducer::new(Arc::new(source)).acquire(&context(Duration::from_secs(1)));

        assert_eq!(result.attribute("visible"), Some("1"));
        assert_eq!(result.attribute("listed"), Some("3"));
    }

    #[test]
    fn test_enumeration_failure() {
        let source = ScriptedWindows::failing(DeviceError::Unavailable("no display server".into()));
        let result = WindowListProducer::new(Arc::new(source)).acquire(&context(Duration::from_secs(1)));
        assert_eq!(result.outcome(), Outcome::Failed);
    }
}
