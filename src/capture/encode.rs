//! Artifact encoders: JPEG/PNG stills, labelled stub frames and WAV files.

use crate::capture::types::{AudioClip, EncodedImage};
use crate::devices::Frame;
use image::{ImageFormat, Rgb, RgbImage};
use std::io::Cursor;

/// Size of the standard WAV RIFF header in bytes.
pub const WAV_HEADER_SIZE: usize = 44;

const STUB_WIDTH: u32 = 640;
const STUB_HEIGHT: u32 = 480;

pub fn encode_jpeg(frame: &Frame) -> Result<EncodedImage, String> {
    encode(frame, ImageFormat::Jpeg)
}

pub fn encode_png(frame: &Frame) -> Result<EncodedImage, String> {
    encode(frame, ImageFormat::Png)
}

fn encode(frame: &Frame, format: ImageFormat) -> Result<EncodedImage, String> {
    let img = RgbImage::from_raw(frame.width, frame.height, frame.rgb.clone()).ok_or_else(|| {
        format!(
            "frame buffer of {} bytes does not match {}x{}",
            frame.rgb.len(),
            frame.width,
            frame.height
        )
    })?;

    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), format)
        .map_err(|e| e.to_string())?;

    Ok(EncodedImage {
        width: frame.width,
        height: frame.height,
        bytes,
    })
}

/// The placeholder written when no camera frame is available.
pub fn stub_image(label: &str) -> Result<EncodedImage, String> {
    encode_jpeg(&stub_frame(STUB_WIDTH, STUB_HEIGHT, label))
}

/// A black frame with `label` rendered in white block letters, centred.
pub fn stub_frame(width: u32, height: u32, label: &str) -> Frame {
    const SCALE: u32 = 4;
    const GLYPH_W: u32 = 5;
    const GLYPH_H: u32 = 7;
    const ADVANCE: u32 = (GLYPH_W + 1) * SCALE;

    let mut img = RgbImage::new(width, height);
    let text: Vec<char> = label.to_ascii_uppercase().chars().collect();
    let text_w = (text.len() as u32 * ADVANCE).saturating_sub(SCALE);
    let origin_x = width.saturating_sub(text_w) / 2;
    let origin_y = height.saturating_sub(GLYPH_H * SCALE) / 2;

    for (i, ch) in text.iter().enumerate() {
        let rows = glyph(*ch);
        let gx = origin_x + i as u32 * ADVANCE;
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..GLYPH_W {
                if bits & (1 << (GLYPH_W - 1 - col)) == 0 {
                    continue;
                }
                for dy in 0..SCALE {
                    for dx in 0..SCALE {
                        let x = gx + col * SCALE + dx;
                        let y = origin_y + row as u32 * SCALE + dy;
                        if x < width && y < height {
                            img.put_pixel(x, y, Rgb([255, 255, 255]));
                        }
                    }
                }
            }
        }
    }

    Frame {
        width,
        height,
        rgb: img.into_raw(),
    }
}

/// 5x7 bitmaps, one byte per row, high bit on the left.
fn glyph(ch: char) -> [u8; 7] {
    match ch {
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1E],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x19, 0x15, 0x13, 0x11, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        ' ' => [0; 7],
        _ => [0x1F, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1F],
    }
}

/// Generate a 44-byte PCM WAV RIFF header.
///
/// Layout:
/// ```text
/// [0-3]    "RIFF"
/// [4-7]    36 + data_size
/// [8-11]   "WAVE"
/// [12-15]  "fmt "
/// [16-19]  16 (PCM format chunk size)
/// [20-21]  1 (PCM format code)
/// [22-23]  channels
/// [24-27]  sample_rate
/// [28-31]  byte_rate
/// [32-33]  block_align
/// [34-35]  bit_depth
/// [36-39]  "data"
/// [40-43]  data_size
/// ```
pub fn wav_header(sample_rate: u32, bit_depth: u16, channels: u16, data_size: u32) -> [u8; WAV_HEADER_SIZE] {
    let byte_rate = sample_rate * channels as u32 * bit_depth as u32 / 8;
    let block_align = channels * bit_depth / 8;

    let mut header = [0u8; WAV_HEADER_SIZE];
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&(36 + data_size).to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&1u16.to_le_bytes());
    header[22..24].copy_from_slice(&channels.to_le_bytes());
    header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&bit_depth.to_le_bytes());
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_size.to_le_bytes());
    header
}

/// Complete mono 16-bit WAV file for a clip.
pub fn wav_file(clip: &AudioClip) -> Vec<u8> {
    let header = wav_header(clip.sample_rate, 16, 1, clip.pcm.len() as u32);
    let mut out = Vec::with_capacity(WAV_HEADER_SIZE + clip.pcm.len());
    out.extend_from_slice(&header);
    out.extend_from_slice(&clip.pcm);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stub_image_is_labelled_jpeg() {
        let frame = stub_frame(640, 480, "camera unavailable");
        assert!(frame.rgb.iter().any(|&b| b == 255));

        let image = stub_image("camera unavailable").unwrap();
        assert_eq!((image.width, image.height), (640, 480));
        assert_eq!(&image.bytes[0..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_png_signature() {
        let frame = Frame {
            width: 2,
            height: 2,
            rgb: vec![10; 12],
        };
        let png = encode_png(&frame).unwrap();
        assert_eq!(&png.bytes[1..4], b"PNG");
    }

    #[test]
    fn test_mismatched_frame_is_rejected() {
        let frame = Frame {
            width: 4,
            height: 4,
            rgb: vec![0; 3],
        };
        assert!(encode_jpeg(&frame).is_err());
    }

    #[test]
    fn test_wav_header_fields() {
        let header = wav_header(44_100, 16, 1, 2048);
        assert_eq!(&header[0..4], b"RIFF");
        assert_eq!(&header[36..40], b"data");
        assert_eq!(u32::from_le_bytes(header[24..28].try_into().unwrap()), 44_100);
        assert_eq!(u32::from_le_bytes(header[28..32].try_into().unwrap()), 88_200);
        assert_eq!(u32::from_le_bytes(header[40..44].try_into().unwrap()), 2048);
    }

    #[test]
    fn test_wav_file_length() {
        let mut clip = AudioClip::empty(8000, 4);
        clip.push_chunk(&[1; 8]);
        assert_eq!(wav_file(&clip).len(), WAV_HEADER_SIZE + 8);
    }
}
