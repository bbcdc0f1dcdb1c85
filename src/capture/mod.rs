//! Capture data model and artifact encoding.

pub mod encode;
pub mod types;

pub use types::{
    AudioClip, CancelToken, CaptureResult, ClipboardHistory, ClipboardSample, CollectionWindow,
    EncodedImage, KeyEvent, KeyTransition, Outcome, Payload, ProducerId, StubReason,
};
