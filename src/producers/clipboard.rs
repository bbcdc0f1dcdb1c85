//! Clipboard polling.

use crate::audit::{Phase, Severity};
use crate::capture::{CaptureResult, ClipboardHistory, Payload, ProducerId};
use crate::devices::ClipboardSource;
use crate::producers::{finish, Handoff, Mode, Producer, ProducerContext, Salvage};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

const PREVIEW_CHARS: usize = 50;

pub struct ClipboardProducer {
    source: Arc<dyn ClipboardSource>,
    interval: Duration,
    history: Handoff<ClipboardHistory>,
}

impl ClipboardProducer {
    pub fn new(source: Arc<dyn ClipboardSource>, interval: Duration) -> Self {
        Self {
            source,
            interval,
            history: Handoff::new(ClipboardHistory::new()),
        }
    }

    fn monitor(&mut self, ctx: &ProducerContext) -> CaptureResult {
        let name = self.id().name();
        let mut poll_failures = 0usize;

        while !ctx.cancel.is_cancelled() {
            match self.source.poll() {
                Ok(content) => {
                    let chars = content.chars().count();
                    let preview = preview(&content);
                    let changed = self
                        .history
                        .update(|history| history.observe(content, Utc::now()))
                        .unwrap_or(false);
                    if changed {
                        ctx.audit.note(
                            name,
                            Severity::Debug,
                            format!("clipboard changed: {chars} characters, preview: {preview}"),
                        );
                    }
                }
                Err(e) => {
                    poll_failures += 1;
                    // Only the first failure is worth a record; the rest are counted.
                    if poll_failures == 1 {
                        ctx.audit
                            .record(name, Phase::Warning, format!("clipboard read failed: {e}"));
                    }
                }
            }
            ctx.cancel.sleep(self.interval);
        }

        let history = self.history.take().unwrap_or_default();
        ctx.audit.note(
            name,
            Severity::Info,
            format!("total clipboard changes: {}", history.len()),
        );

        let changes = history.len();
        CaptureResult::success(Payload::Clipboard(history))
            .with_attr("changes", changes)
            .with_attr("poll_failures", poll_failures)
    }
}

fn preview(content: &str) -> String {
    if content.chars().count() > PREVIEW_CHARS {
        let head: String = content.chars().take(PREVIEW_CHARS).collect();
        format!("{head}...")
    } else {
        content.to_string()
    }
}

impl Producer for ClipboardProducer {
    fn id(&self) -> ProducerId {
        ProducerId::Clipboard
    }

    fn mode(&self) -> Mode {
        Mode::Continuous
    }

    fn acquire(&mut self, ctx: &ProducerContext) -> CaptureResult {
        ctx.audit.record(self.id().name(), Phase::Start, "clipboard monitoring started");
        let result = self.monitor(ctx);
        finish(ctx, self.id(), result)
    }

    fn handoff(&self) -> Option<Arc<dyn Salvage>> {
        Some(Arc::new(self.history.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::scripted::ScriptedClipboard;
    use crate::error::DeviceError;
    use crate::producers::test_support::context;

    fn run(source: Arc<dyn ClipboardSource>, for_ms: u64) -> (CaptureResult, crate::audit::SharedAuditLog) {
        let ctx = context(Duration::from_secs(1));
        let cancel = ctx.cancel.clone();
        let stopper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(for_ms));
            cancel.cancel();
        });
        let mut producer = ClipboardProducer::new(source, Duration::from_millis(5));
        let result = producer.acquire(&ctx);
        stopper.join().unwrap();
        (result, ctx.audit)
    }

    #[test]
    fn test_records_distinct_non_blank_values() {
        let clipboard = ScriptedClipboard::new(vec![
            (Duration::ZERO, "one".into()),
            (Duration::from_millis(30), " ".into()),
            (Duration::from_millis(60), "one".into()),
            (Duration::from_millis(90), "two".into()),
        ]);
        let (result, _) = run(Arc::new(clipboard), 200);

        let Some(Payload::Clipboard(history)) = result.payload() else {
            panic!("expected clipboard payload");
        };
        let contents: Vec<_> = history.samples().iter().map(|s| s.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "two"]);
    }

    #[test]
    fn test_poll_failures_warn_once() {
        struct Failing;
        impl ClipboardSource for Failing {
            fn poll(&self) -> Result<String, DeviceError> {
                Err(DeviceError::ReadFailure("locked".into()))
            }
        }

        let (result, audit) = run(Arc::new(Failing), 60);

        assert!(result.attribute("poll_failures").unwrap().parse::<usize>().unwrap() > 1);
        assert_eq!(audit.stats().warnings, 1);
    }

    #[test]
    fn test_preview_truncates() {
        let long = "x".repeat(80);
        assert_eq!(preview(&long).len(), PREVIEW_CHARS + 3);
        assert_eq!(preview("short"), "short");
    }
}
