//! Noop device backend.
//!
//! Lets the binary run on hosts without driver integrations: cameras and
//! microphones are absent, the clipboard is empty, the key hook never fires,
//! the screen cannot be captured and no windows are listed.

use crate::devices::{
    AudioInput, AudioStream, ClipboardSource, Frame, FrameReader, ImageSource, KeyCallback,
    KeyHook, ScreenSource, Subscription, WindowInfo, WindowSource,
};
use crate::error::DeviceError;

pub struct NoopCamera;

impl ImageSource for NoopCamera {
    fn open(&self, index: u32) -> Result<Box<dyn FrameReader>, DeviceError> {
        Err(DeviceError::Unavailable(format!("no camera at index {index}")))
    }
}

pub struct NoopMicrophone;

impl AudioInput for NoopMicrophone {
    fn open(&self, _sample_rate: u32) -> Result<Box<dyn AudioStream>, DeviceError> {
        Err(DeviceError::Unavailable("no audio input device".into()))
    }
}

pub struct NoopClipboard;

impl ClipboardSource for NoopClipboard {
    fn poll(&self) -> Result<String, DeviceError> {
        Ok(String::new())
    }
}

pub struct NoopKeyHook;

impl KeyHook for NoopKeyHook {
    fn register(&self, _callback: KeyCallback) -> Result<Subscription, DeviceError> {
        Ok(Subscription::detached())
    }
}

pub struct NoopScreen;

impl ScreenSource for NoopScreen {
    fn capture(&self) -> Result<Frame, DeviceError> {
        Err(DeviceError::Unavailable("screen capture not supported".into()))
    }

    fn size(&self) -> Option<(u32, u32)> {
        None
    }
}

pub struct NoopWindows;

impl WindowSource for NoopWindows {
    fn list(&self) -> Result<Vec<WindowInfo>, DeviceError> {
        Ok(Vec::new())
    }
}
