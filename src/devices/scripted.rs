//! Scripted device backend.
//!
//! Every device replays a fixed script relative to the moment it is first
//! used, so runs are reproducible. Delays stand in for blocking driver calls.

use crate::capture::{KeyEvent, KeyTransition};
use crate::devices::{
    AudioInput, AudioStream, ClipboardSource, Devices, Frame, FrameReader, ImageSource,
    KeyCallback, KeyHook, ScreenSource, Subscription, WindowInfo, WindowSource,
};
use crate::error::DeviceError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Camera present at a chosen set of indices.
#[derive(Default)]
pub struct ScriptedCamera {
    indices: Vec<u32>,
    frame: Option<Frame>,
    open_delay: Duration,
    attempts: Arc<Mutex<Vec<u32>>>,
    released: Arc<AtomicBool>,
}

impl ScriptedCamera {
    /// A camera at `index` that yields `frame`.
    pub fn at(index: u32, frame: Frame) -> Self {
        Self {
            indices: vec![index],
            frame: Some(frame),
            ..Self::default()
        }
    }

    /// A camera that opens but fails every read.
    pub fn broken(index: u32) -> Self {
        Self {
            indices: vec![index],
            ..Self::default()
        }
    }

    /// No camera at any index.
    pub fn absent() -> Self {
        Self::default()
    }

    /// Make every open call block for `delay`.
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    /// Indices probed so far, in order.
    pub fn attempts(&self) -> Arc<Mutex<Vec<u32>>> {
        self.attempts.clone()
    }

    /// Set once an opened camera has been dropped.
    pub fn released(&self) -> Arc<AtomicBool> {
        self.released.clone()
    }
}

impl ImageSource for ScriptedCamera {
    fn open(&self, index: u32) -> Result<Box<dyn FrameReader>, DeviceError> {
        self.attempts.lock().push(index);
        if !self.open_delay.is_zero() {
            thread::sleep(self.open_delay);
        }
        if self.indices.contains(&index) {
            Ok(Box::new(ScriptedFrameReader {
                frame: self.frame.clone(),
                released: self.released.clone(),
            }))
        } else {
            Err(DeviceError::Unavailable(format!("no camera at index {index}")))
        }
    }
}

struct ScriptedFrameReader {
    frame: Option<Frame>,
    released: Arc<AtomicBool>,
}

impl FrameReader for ScriptedFrameReader {
    fn read_frame(&mut self) -> Result<Frame, DeviceError> {
        self.frame
            .clone()
            .ok_or_else(|| DeviceError::ReadFailure("camera returned no frame".into()))
    }
}

impl Drop for ScriptedFrameReader {
    fn drop(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

/// Microphone producing a square-wave tone, paced like real hardware.
#[derive(Clone)]
pub struct ScriptedMicrophone {
    available: bool,
    failing_reads: Vec<usize>,
    read_delay: Option<Duration>,
    stall: Option<(usize, Duration)>,
}

impl ScriptedMicrophone {
    pub fn new() -> Self {
        Self {
            available: true,
            failing_reads: Vec::new(),
            read_delay: None,
            stall: None,
        }
    }

    pub fn absent() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    /// Fail the reads with these zero-based indices.
    pub fn failing_at(mut self, reads: &[usize]) -> Self {
        self.failing_reads = reads.to_vec();
        self
    }

    /// Override the per-read blocking time (defaults to real time).
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = Some(delay);
        self
    }

    /// Block for `stall` on every read after the first `reads` succeed.
    pub fn stalling_after(mut self, reads: usize, stall: Duration) -> Self {
        self.stall = Some((reads, stall));
        self
    }
}

impl Default for ScriptedMicrophone {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioInput for ScriptedMicrophone {
    fn open(&self, sample_rate: u32) -> Result<Box<dyn AudioStream>, DeviceError> {
        if !self.available {
            return Err(DeviceError::Unavailable("no audio input device".into()));
        }
        Ok(Box::new(ScriptedAudioStream {
            sample_rate,
            reads: 0,
            failing_reads: self.failing_reads.clone(),
            read_delay: self.read_delay,
            stall: self.stall,
        }))
    }
}

struct ScriptedAudioStream {
    sample_rate: u32,
    reads: usize,
    failing_reads: Vec<usize>,
    read_delay: Option<Duration>,
    stall: Option<(usize, Duration)>,
}

impl AudioStream for ScriptedAudioStream {
    fn read_chunk(&mut self, frames: usize) -> Result<Vec<u8>, DeviceError> {
        let delay = match self.stall {
            Some((after, stall)) if self.reads >= after => stall,
            _ => self
                .read_delay
                .unwrap_or_else(|| Duration::from_secs_f64(frames as f64 / self.sample_rate as f64)),
        };
        thread::sleep(delay);

        let index = self.reads;
        self.reads += 1;
        if self.failing_reads.contains(&index) {
            return Err(DeviceError::ReadFailure(format!("input overflow on read {index}")));
        }

        let mut bytes = Vec::with_capacity(frames * 2);
        for i in 0..frames {
            let sample: i16 = if (i / 50) % 2 == 0 { 2000 } else { -2000 };
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        Ok(bytes)
    }
}

/// Clipboard whose value follows a timeline of (offset, content) entries.
pub struct ScriptedClipboard {
    timeline: Vec<(Duration, String)>,
    first_poll: Mutex<Option<Instant>>,
}

impl ScriptedClipboard {
    pub fn new(timeline: Vec<(Duration, String)>) -> Self {
        Self {
            timeline,
            first_poll: Mutex::new(None),
        }
    }
}

impl ClipboardSource for ScriptedClipboard {
    fn poll(&self) -> Result<String, DeviceError> {
        let started = *self.first_poll.lock().get_or_insert_with(Instant::now);
        let elapsed = started.elapsed();
        Ok(self
            .timeline
            .iter()
            .filter(|(offset, _)| *offset <= elapsed)
            .last()
            .map(|(_, content)| content.clone())
            .unwrap_or_default())
    }
}

/// Key hook that replays (offset, key, transition) events from its own thread.
pub struct ScriptedKeyboard {
    script: Vec<(Duration, String, KeyTransition)>,
    subscribed: Arc<AtomicBool>,
}

impl ScriptedKeyboard {
    pub fn new(script: Vec<(Duration, String, KeyTransition)>) -> Self {
        Self {
            script,
            subscribed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Press and release each key in turn, `gap` apart.
    pub fn typing(keys: &[&str], gap: Duration) -> Self {
        let mut script = Vec::new();
        for (i, key) in keys.iter().enumerate() {
            let at = gap * (i as u32 * 2 + 1);
            script.push((at, key.to_string(), KeyTransition::Down));
            script.push((at + gap / 2, key.to_string(), KeyTransition::Up));
        }
        Self::new(script)
    }

    /// True while a registration is live.
    pub fn subscribed(&self) -> Arc<AtomicBool> {
        self.subscribed.clone()
    }
}

impl KeyHook for ScriptedKeyboard {
    fn register(&self, callback: KeyCallback) -> Result<Subscription, DeviceError> {
        if self.subscribed.swap(true, Ordering::SeqCst) {
            return Err(DeviceError::Unavailable("hook already registered".into()));
        }

        let live = self.subscribed.clone();
        let script = self.script.clone();
        let started = Instant::now();
        thread::Builder::new()
            .name("scripted-key-hook".into())
            .spawn(move || {
                for (offset, key, transition) in script {
                    while started.elapsed() < offset {
                        if !live.load(Ordering::SeqCst) {
                            return;
                        }
                        thread::sleep(Duration::from_millis(5));
                    }
                    if !live.load(Ordering::SeqCst) {
                        return;
                    }
                    callback(KeyEvent::new(key, transition));
                }
            })
            .map_err(|e| DeviceError::Unavailable(format!("hook thread: {e}")))?;

        let live = self.subscribed.clone();
        Ok(Subscription::new(move || live.store(false, Ordering::SeqCst)))
    }
}

/// Screen returning a fixed frame after an optional delay.
pub struct ScriptedScreen {
    frame: Option<Frame>,
    delay: Duration,
}

impl ScriptedScreen {
    pub fn new(frame: Frame) -> Self {
        Self {
            frame: Some(frame),
            delay: Duration::ZERO,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            frame: None,
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl ScreenSource for ScriptedScreen {
    fn capture(&self) -> Result<Frame, DeviceError> {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        self.frame
            .clone()
            .ok_or_else(|| DeviceError::Unavailable("no display".into()))
    }

    fn size(&self) -> Option<(u32, u32)> {
        self.frame.as_ref().map(|f| (f.width, f.height))
    }
}

pub struct ScriptedWindows {
    windows: Result<Vec<WindowInfo>, DeviceError>,
}

impl ScriptedWindows {
    pub fn new(windows: Vec<WindowInfo>) -> Self {
        Self {
            windows: Ok(windows),
        }
    }

    pub fn failing(error: DeviceError) -> Self {
        Self {
            windows: Err(error),
        }
    }
}

impl WindowSource for ScriptedWindows {
    fn list(&self) -> Result<Vec<WindowInfo>, DeviceError> {
        self.windows.clone()
    }
}

/// A lively device set for demonstrations: every producer gets real data.
pub fn demo() -> Devices {
    let window = |title: &str, left, top, width, height| WindowInfo {
        title: title.to_string(),
        left,
        top,
        width,
        height,
    };

    Devices {
        camera: Arc::new(ScriptedCamera::at(1, Frame::solid(320, 240, [40, 90, 160]))),
        microphone: Arc::new(ScriptedMicrophone::new()),
        clipboard: Arc::new(ScriptedClipboard::new(vec![
            (Duration::from_millis(300), "first copied line".to_string()),
            (Duration::from_millis(900), "   ".to_string()),
            (Duration::from_millis(1500), "second copied line".to_string()),
        ])),
        keyboard: Arc::new(ScriptedKeyboard::typing(
            &["h", "e", "l", "l", "o", "space", "w", "o", "r", "l", "d", "enter"],
            Duration::from_millis(150),
        )),
        screen: Arc::new(ScriptedScreen::new(Frame::solid(800, 600, [230, 230, 230]))),
        windows: Arc::new(ScriptedWindows::new(vec![
            window("Terminal", 0, 0, 800, 400),
            window("", 0, 0, 100, 100),
            window("Notes", 400, 300, 400, 300),
            window("Minimised", 0, 0, 0, 0),
        ])),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_records_attempts() {
        let camera = ScriptedCamera::at(2, Frame::solid(1, 1, [0, 0, 0]));
        assert!(camera.open(0).is_err());
        assert!(camera.open(2).is_ok());
        assert_eq!(*camera.attempts().lock(), vec![0, 2]);
        assert!(camera.released().load(Ordering::SeqCst));
    }

    #[test]
    fn test_microphone_fails_scripted_reads() {
        let mic = ScriptedMicrophone::new()
            .failing_at(&[1])
            .with_read_delay(Duration::ZERO);
        let mut stream = mic.open(8000).unwrap();
        assert_eq!(stream.read_chunk(16).unwrap().len(), 32);
        assert!(stream.read_chunk(16).is_err());
        assert!(stream.read_chunk(16).is_ok());
    }

    #[test]
    fn test_microphone_stalls_after_scripted_reads() {
        let mic = ScriptedMicrophone::new()
            .with_read_delay(Duration::ZERO)
            .stalling_after(2, Duration::from_millis(200));
        let mut stream = mic.open(8000).unwrap();
        let started = Instant::now();
        stream.read_chunk(16).unwrap();
        stream.read_chunk(16).unwrap();
        assert!(started.elapsed() < Duration::from_millis(100));
        stream.read_chunk(16).unwrap();
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[test]
    fn test_clipboard_timeline() {
        let clipboard = ScriptedClipboard::new(vec![(Duration::ZERO, "a".into())]);
        assert_eq!(clipboard.poll().unwrap(), "a");
    }

    #[test]
    fn test_keyboard_stops_after_unsubscribe() {
        let keyboard = ScriptedKeyboard::typing(&["a"], Duration::from_millis(10));
        let (tx, rx) = crossbeam_channel::unbounded();
        let sub = keyboard
            .register(Box::new(move |event| {
                let _ = tx.send(event);
            }))
            .unwrap();
        assert!(keyboard.subscribed().load(Ordering::SeqCst));

        let first = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(first.transition, KeyTransition::Down);
        drop(sub);
        assert!(!keyboard.subscribed().load(Ordering::SeqCst));
    }
}
