//! Keyboard event capture through a scoped hook subscription.

use crate::audit::{Phase, Severity};
use crate::capture::{CaptureResult, KeyEvent, KeyTransition, Payload, ProducerId, StubReason};
use crate::devices::KeyHook;
use crate::producers::{finish, Handoff, Mode, Producer, ProducerContext, Salvage};
use crossbeam_channel::{unbounded, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

/// How often the receive loop re-checks the stop flag.
const POLL: Duration = Duration::from_millis(25);

pub struct KeyboardProducer {
    hook: Arc<dyn KeyHook>,
    events: Handoff<Vec<KeyEvent>>,
}

impl KeyboardProducer {
    pub fn new(hook: Arc<dyn KeyHook>) -> Self {
        Self {
            hook,
            events: Handoff::new(Vec::new()),
        }
    }

    fn push(ctx: &ProducerContext, events: &Handoff<Vec<KeyEvent>>, event: KeyEvent) {
        if event.is_special() {
            ctx.audit.record(
                ProducerId::Keyboard.name(),
                Phase::Warning,
                format!("special key: {} ({})", event.key, event.transition),
            );
        }
        events.update(|events| events.push(event));
    }

    fn listen(&mut self, ctx: &ProducerContext) -> CaptureResult {
        let name = self.id().name();
        let (tx, rx) = unbounded();

        // Events that arrive after the stop flag are outside the window.
        let active = ctx.cancel.clone();
        let subscription = match self.hook.register(Box::new(move |event| {
            if !active.is_cancelled() {
                let _ = tx.send(event);
            }
        })) {
            Ok(subscription) => subscription,
            Err(e) => {
                ctx.audit
                    .record(name, Phase::Warning, format!("could not register key hook: {e}"));
                return CaptureResult::stub(StubReason::NoDevice, Payload::Keys(Vec::new()));
            }
        };
        ctx.audit.note(name, Severity::Info, "key hook registered");

        while !ctx.cancel.is_cancelled() {
            match rx.recv_timeout(POLL) {
                Ok(event) => Self::push(ctx, &self.events, event),
                Err(RecvTimeoutError::Timeout) => {}
                // The hook dropped its callback; keep the window open anyway.
                Err(RecvTimeoutError::Disconnected) => {
                    ctx.cancel.sleep(POLL);
                }
            }
        }

        drop(subscription);
        ctx.audit.note(name, Severity::Info, "key hook released");

        // Flush whatever the hook delivered before it was released.
        while let Ok(event) = rx.try_recv() {
            Self::push(ctx, &self.events, event);
        }
        let events = self.events.take().unwrap_or_default();

        let downs = events
            .iter()
            .filter(|e| e.transition == KeyTransition::Down)
            .count();
        let total = events.len();
        CaptureResult::success(Payload::Keys(events))
            .with_attr("events", total)
            .with_attr("key_downs", downs)
    }
}

impl Producer for KeyboardProducer {
    fn id(&self) -> ProducerId {
        ProducerId::Keyboard
    }

    fn mode(&self) -> Mode {
        Mode::Continuous
    }

    fn acquire(&mut self, ctx: &ProducerContext) -> CaptureResult {
        ctx.audit.record(self.id().name(), Phase::Start, "keyboard monitoring started");
        let result = self.listen(ctx);
        finish(ctx, self.id(), result)
    }

    fn handoff(&self) -> Option<Arc<dyn Salvage>> {
        Some(Arc::new(self.events.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::Outcome;
    use crate::devices::scripted::ScriptedKeyboard;
    use crate::devices::{KeyCallback, Subscription};
    use crate::error::DeviceError;
    use crate::producers::test_support::context;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_captures_all_events_and_warns_on_special_keys() {
        let keyboard = ScriptedKeyboard::typing(&["a", "shift", "b"], Duration::from_millis(10));
        let subscribed = keyboard.subscribed();
        let ctx = context(Duration::from_secs(1));
        let cancel = ctx.cancel.clone();
        let stopper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(200));
            cancel.cancel();
        });

        let mut producer = KeyboardProducer::new(Arc::new(keyboard));
        let result = producer.acquire(&ctx);
        stopper.join().unwrap();

        assert_eq!(result.outcome(), Outcome::Success);
        let Some(Payload::Keys(events)) = result.payload() else {
            panic!("expected key payload");
        };
        let keys: Vec<_> = events.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "a", "shift", "shift", "b", "b"]);
        assert_eq!(result.attribute("key_downs"), Some("3"));
        // shift down + shift up
        assert_eq!(ctx.audit.stats().warnings, 2);
        assert!(!subscribed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_hook_failure_stubs() {
        struct Refusing;
        impl KeyHook for Refusing {
            fn register(&self, _callback: KeyCallback) -> Result<Subscription, DeviceError> {
                Err(DeviceError::Unavailable("no input permission".into()))
            }
        }

        let ctx = context(Duration::from_secs(1));
        let result = KeyboardProducer::new(Arc::new(Refusing)).acquire(&ctx);
        assert_eq!(result.stub_reason(), Some(StubReason::NoDevice));
    }
}
