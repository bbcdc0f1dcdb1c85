//! Continuous microphone recording.

use crate::audit::{Phase, Severity};
use crate::capture::{AudioClip, CaptureResult, Payload, ProducerId, StubReason};
use crate::devices::AudioInput;
use crate::producers::{finish, Handoff, Mode, Producer, ProducerContext, Salvage};
use std::sync::Arc;

/// Consecutive failed reads after which the stream is considered lost.
const MAX_CONSECUTIVE_FAILURES: usize = 32;

pub struct AudioProducer {
    input: Arc<dyn AudioInput>,
    sample_rate: u32,
    chunk_frames: usize,
    buffer: Handoff<AudioClip>,
}

impl AudioProducer {
    pub fn new(input: Arc<dyn AudioInput>, sample_rate: u32, chunk_frames: usize) -> Self {
        Self {
            input,
            sample_rate,
            chunk_frames,
            buffer: Handoff::new(AudioClip::empty(sample_rate, chunk_frames)),
        }
    }

    fn record(&mut self, ctx: &ProducerContext) -> CaptureResult {
        let name = self.id().name();

        let mut stream = match self.input.open(self.sample_rate) {
            Ok(stream) => stream,
            Err(e) => {
                ctx.audit
                    .record(name, Phase::Warning, format!("could not open audio input: {e}"));
                return CaptureResult::stub(
                    StubReason::NoDevice,
                    Payload::Audio(AudioClip::silence(
                        self.sample_rate,
                        self.chunk_frames,
                        ctx.window.duration(),
                    )),
                );
            }
        };
        ctx.audit.note(name, Severity::Info, "recording started");

        let chunk_bytes = self.chunk_frames * AudioClip::BYTES_PER_FRAME;
        let chunks_per_second = (self.sample_rate as usize / self.chunk_frames).max(1);
        let mut recorded = 0usize;
        let mut read_failures = 0usize;
        let mut consecutive_failures = 0usize;
        let mut stream_lost = false;

        while !ctx.cancel.is_cancelled() {
            match stream.read_chunk(self.chunk_frames) {
                Ok(mut chunk) => {
                    consecutive_failures = 0;
                    chunk.resize(chunk_bytes, 0);
                    self.buffer.update(|clip| clip.push_chunk(&chunk));
                }
                Err(e) => {
                    read_failures += 1;
                    consecutive_failures += 1;
                    ctx.audit.record(
                        name,
                        Phase::Warning,
                        format!("read failed, substituting silence: {e}"),
                    );
                    self.buffer.update(|clip| clip.push_chunk(&vec![0; chunk_bytes]));

                    if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                        ctx.audit.record(
                            name,
                            Phase::Error,
                            format!("{consecutive_failures} consecutive read failures, stopping stream"),
                        );
                        stream_lost = true;
                        break;
                    }
                }
            }

            recorded += 1;
            if recorded % chunks_per_second == 0 {
                ctx.audit.note(
                    name,
                    Severity::Debug,
                    format!("recorded {} seconds of audio", recorded / chunks_per_second),
                );
            }
        }
        drop(stream);

        // Empty when the orchestrator already salvaged the buffer.
        let clip = self
            .buffer
            .take()
            .unwrap_or_else(|| AudioClip::empty(self.sample_rate, self.chunk_frames));

        ctx.audit.note(
            name,
            Severity::Info,
            format!("recording finished: {} chunks", clip.chunks),
        );

        let chunks = clip.chunks;
        CaptureResult::success(Payload::Audio(clip))
            .with_attr("chunks", chunks)
            .with_attr("read_failures", read_failures)
            .with_attr("stream_lost", stream_lost)
    }
}

impl Producer for AudioProducer {
    fn id(&self) -> ProducerId {
        ProducerId::Audio
    }

    fn mode(&self) -> Mode {
        Mode::Continuous
    }

    fn acquire(&mut self, ctx: &ProducerContext) -> CaptureResult {
        ctx.audit.record(self.id().name(), Phase::Start, "opening audio input");
        let result = self.record(ctx);
        finish(ctx, self.id(), result)
    }

    fn handoff(&self) -> Option<Arc<dyn Salvage>> {
        Some(Arc::new(self.buffer.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CancelToken, Outcome};
    use crate::devices::scripted::ScriptedMicrophone;
    use crate::devices::AudioStream;
    use crate::error::DeviceError;
    use crate::producers::test_support::context;
    use std::time::Duration;

    /// Stream that fails chosen reads and cancels the run after `limit` reads.
    struct CountedStream {
        reads: usize,
        limit: usize,
        failing: Vec<usize>,
        cancel: CancelToken,
    }

    impl AudioStream for CountedStream {
        fn read_chunk(&mut self, frames: usize) -> Result<Vec<u8>, DeviceError> {
            let index = self.reads;
            self.reads += 1;
            if self.reads >= self.limit {
                self.cancel.cancel();
            }
            if self.failing.contains(&index) {
                Err(DeviceError::ReadFailure("overflow".into()))
            } else {
                Ok(vec![7; frames * 2])
            }
        }
    }

    struct CountedInput {
        limit: usize,
        failing: Vec<usize>,
        cancel: CancelToken,
    }

    impl AudioInput for CountedInput {
        fn open(&self, _sample_rate: u32) -> Result<Box<dyn AudioStream>, DeviceError> {
            Ok(Box::new(CountedStream {
                reads: 0,
                limit: self.limit,
                failing: self.failing.clone(),
                cancel: self.cancel.clone(),
            }))
        }
    }

    #[test]
    fn test_single_read_failure_becomes_silence() {
        let ctx = context(Duration::from_secs(1));
        let input = CountedInput {
            limit: 6,
            failing: vec![2],
            cancel: ctx.cancel.clone(),
        };
        let mut producer = AudioProducer::new(Arc::new(input), 8000, 16);

        let result = producer.acquire(&ctx);

        assert_eq!(result.outcome(), Outcome::Success);
        assert_eq!(result.attribute("read_failures"), Some("1"));
        let Some(Payload::Audio(clip)) = result.payload() else {
            panic!("expected audio payload");
        };
        assert_eq!(clip.chunks, 6);
        assert_eq!(clip.pcm.len(), 6 * 32);
        assert!(clip.pcm[2 * 32..3 * 32].iter().all(|&b| b == 0));
        assert!(clip.pcm[3 * 32..4 * 32].iter().all(|&b| b == 7));
    }

    #[test]
    fn test_persistent_failure_stops_stream() {
        let ctx = context(Duration::from_secs(1));
        let input = CountedInput {
            limit: usize::MAX,
            failing: (0..1000).collect(),
            cancel: ctx.cancel.clone(),
        };
        let mut producer = AudioProducer::new(Arc::new(input), 8000, 16);

        let result = producer.acquire(&ctx);

        assert_eq!(result.attribute("stream_lost"), Some("true"));
        assert_eq!(
            result.attribute("chunks"),
            Some(MAX_CONSECUTIVE_FAILURES.to_string().as_str())
        );
    }

    #[test]
    fn test_missing_microphone_stubs_with_silence() {
        let ctx = context(Duration::from_secs(2));
        let mut producer = AudioProducer::new(Arc::new(ScriptedMicrophone::absent()), 1000, 10);

        let result = producer.acquire(&ctx);

        assert_eq!(result.stub_reason(), Some(StubReason::NoDevice));
        let Some(Payload::Audio(clip)) = result.payload() else {
            panic!("expected audio payload");
        };
        assert_eq!(clip.pcm.len(), 4000);
    }

    #[test]
    fn test_stops_on_cancel() {
        let ctx = context(Duration::from_secs(1));
        let mic = ScriptedMicrophone::new().with_read_delay(Duration::from_millis(5));
        let mut producer = AudioProducer::new(Arc::new(mic), 8000, 16);

        let cancel = ctx.cancel.clone();
        let stopper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(60));
            cancel.cancel();
        });
        let result = producer.acquire(&ctx);
        stopper.join().unwrap();

        let Some(Payload::Audio(clip)) = result.payload() else {
            panic!("expected audio payload");
        };
        assert!(clip.chunks > 0);
        assert_eq!(clip.pcm.len(), clip.chunks * 32);
    }
}
