//! Device interfaces consumed by the producer adapters.
//!
//! Drivers live outside this crate. Two backends ship here: [`noop`], where
//! every device is absent, and [`scripted`], a deterministic in-memory
//! backend for tests and demos.

pub mod noop;
pub mod scripted;

use crate::capture::KeyEvent;
use crate::error::DeviceError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Raw RGB8 pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

impl Frame {
    /// A frame filled with one colour.
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixels = (width * height) as usize;
        Self {
            width,
            height,
            rgb: rgb.iter().copied().cycle().take(pixels * 3).collect(),
        }
    }
}

/// A top-level window as reported by the window manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowInfo {
    pub title: String,
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
}

impl WindowInfo {
    pub fn right(&self) -> i32 {
        self.left.saturating_add(self.width)
    }

    pub fn bottom(&self) -> i32 {
        self.top.saturating_add(self.height)
    }

    /// Titled and with a positive area (not hidden or minimised).
    pub fn is_visible(&self) -> bool {
        !self.title.trim().is_empty() && self.width > 0 && self.height > 0
    }
}

/// Camera enumeration by index.
pub trait ImageSource: Send + Sync {
    fn open(&self, index: u32) -> Result<Box<dyn FrameReader>, DeviceError>;
}

/// An opened camera. Dropping it releases the device.
pub trait FrameReader: Send {
    fn read_frame(&mut self) -> Result<Frame, DeviceError>;
}

/// Default microphone.
pub trait AudioInput: Send + Sync {
    fn open(&self, sample_rate: u32) -> Result<Box<dyn AudioStream>, DeviceError>;
}

/// An open 16-bit mono input stream. Dropping it closes the stream.
pub trait AudioStream: Send {
    /// Block until `frames` samples are available and return them as bytes.
    fn read_chunk(&mut self, frames: usize) -> Result<Vec<u8>, DeviceError>;
}

pub trait ClipboardSource: Send + Sync {
    fn poll(&self) -> Result<String, DeviceError>;
}

/// Callback invoked from the hook's own thread for every key event.
pub type KeyCallback = Box<dyn Fn(KeyEvent) + Send + Sync + 'static>;

/// Process-wide keyboard hook.
pub trait KeyHook: Send + Sync {
    fn register(&self, callback: KeyCallback) -> Result<Subscription, DeviceError>;
}

/// Scoped hook registration; unregisters exactly once when dropped.
pub struct Subscription {
    unregister: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(unregister: impl FnOnce() + Send + 'static) -> Self {
        Self {
            unregister: Some(Box::new(unregister)),
        }
    }

    /// A subscription with nothing to release.
    pub fn detached() -> Self {
        Self { unregister: None }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(unregister) = self.unregister.take() {
            unregister();
        }
    }
}

pub trait ScreenSource: Send + Sync {
    fn capture(&self) -> Result<Frame, DeviceError>;

    /// Screen dimensions, if known without capturing.
    fn size(&self) -> Option<(u32, u32)>;
}

pub trait WindowSource: Send + Sync {
    fn list(&self) -> Result<Vec<WindowInfo>, DeviceError>;
}

/// The full set of devices a run draws from.
#[derive(Clone)]
pub struct Devices {
    pub camera: Arc<dyn ImageSource>,
    pub microphone: Arc<dyn AudioInput>,
    pub clipboard: Arc<dyn ClipboardSource>,
    pub keyboard: Arc<dyn KeyHook>,
    pub screen: Arc<dyn ScreenSource>,
    pub windows: Arc<dyn WindowSource>,
}

impl Devices {
    /// Every device absent or empty.
    pub fn noop() -> Self {
        Self {
            camera: Arc::new(noop::NoopCamera),
            microphone: Arc::new(noop::NoopMicrophone),
            clipboard: Arc::new(noop::NoopClipboard),
            keyboard: Arc::new(noop::NoopKeyHook),
            screen: Arc::new(noop::NoopScreen),
            windows: Arc::new(noop::NoopWindows),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_subscription_unregisters_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        {
            let _sub = Subscription::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_window_visibility() {
        let mut win = WindowInfo {
            title: "Editor".into(),
            left: 10,
            top: 20,
            width: 300,
            height: 200,
        };
        assert!(win.is_visible());
        assert_eq!((win.right(), win.bottom()), (310, 220));

        win.width = 0;
        assert!(!win.is_visible());
    }

    #[test]
    fn test_window_bounds_saturate() {
        let win = WindowInfo {
            title: "Offscreen".into(),
            left: i32::MAX - 5,
            top: i32::MAX,
            width: 100,
            height: 1,
        };
        assert_eq!(win.right(), i32::MAX);
        assert_eq!(win.bottom(), i32::MAX);
    }

    #[test]
    fn test_solid_frame_size() {
        let frame = Frame::solid(3, 2, [1, 2, 3]);
        assert_eq!(frame.rgb.len(), 18);
        assert_eq!(&frame.rgb[3..6], &[1, 2, 3]);
    }
}
