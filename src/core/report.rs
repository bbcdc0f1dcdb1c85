//! Plain-text renderers for the report bundle.
//!
//! Every renderer is a pure function of its inputs so that two builds over
//! the same results produce identical text.

use crate::capture::{
    AudioClip, CaptureResult, ClipboardHistory, KeyEvent, KeyTransition, Outcome, Payload,
    ProducerId,
};
use crate::core::aggregator::{Counters, RunContext};
use crate::devices::WindowInfo;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::time::Duration;

const RULE_WIDE: usize = 80;
const RULE: usize = 70;

fn rule(c: char, width: usize) -> String {
    std::iter::repeat(c).take(width).collect()
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

/// Human status for a producer outcome.
///
/// Absence and timeout both read as "unavailable"; the metadata keeps the
/// precise reason.
pub fn status_label(result: Option<&CaptureResult>) -> &'static str {
    match result.map(CaptureResult::outcome) {
        Some(Outcome::Success) => "captured",
        Some(Outcome::Stub) => "unavailable (placeholder written)",
        Some(Outcome::Failed) | None => "failed",
    }
}

/// Key-down keys joined by spaces.
pub fn reconstructed_text(events: &[KeyEvent]) -> String {
    events
        .iter()
        .filter(|e| e.transition == KeyTransition::Down)
        .map(|e| e.key.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn keyboard_log(events: &[KeyEvent]) -> String {
    let mut out = String::new();
    let downs = events
        .iter()
        .filter(|e| e.transition == KeyTransition::Down)
        .count();

    let _ = writeln!(out, "KEYBOARD HISTORY");
    let _ = writeln!(out, "{}", rule('=', RULE));
    let _ = writeln!(out, "Total events: {}", events.len());
    let _ = writeln!(out, "Key presses: {downs}");
    let _ = writeln!(out);

    if events.is_empty() {
        let _ = writeln!(out, "No keyboard events recorded");
        return out;
    }

    let _ = writeln!(out, "DETAILED EVENTS:");
    let _ = writeln!(out, "{}", rule('-', RULE));
    for event in events {
        let _ = writeln!(
            out,
            "{} - {}: {}",
            timestamp(&event.timestamp),
            event.transition,
            event.key
        );
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "RECONSTRUCTED TEXT:");
    let _ = writeln!(out, "{}", rule('-', RULE));
    let _ = writeln!(out, "{}", reconstructed_text(events));
    out
}

pub fn clipboard_log(history: &ClipboardHistory) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "CLIPBOARD HISTORY");
    let _ = writeln!(out, "{}", rule('=', RULE));
    let _ = writeln!(out, "Total changes: {}", history.len());
    let _ = writeln!(out);

    if history.is_empty() {
        let _ = writeln!(out, "No changes to the clipboard during collection");
        return out;
    }

    for sample in history.samples() {
        let _ = writeln!(out, "TIME: {}", timestamp(&sample.timestamp));
        let _ = writeln!(
            out,
            "CONTENT ({} characters):",
            sample.content.chars().count()
        );
        let _ = writeln!(out, "{}", rule('-', 50));
        let _ = writeln!(out, "{}", sample.content);
        let _ = writeln!(out, "{}", rule('=', RULE));
        let _ = writeln!(out);
    }
    out
}

pub fn window_info(windows: &[WindowInfo], generated_at: &DateTime<Utc>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "OPEN WINDOWS");
    let _ = writeln!(out, "{}", rule('=', 60));
    let _ = writeln!(out, "Enumerated at: {}", timestamp(generated_at));
    let _ = writeln!(out);

    if windows.is_empty() {
        let _ = writeln!(out, "No visible windows found.");
        return out;
    }

    for (n, win) in windows.iter().enumerate() {
        let _ = writeln!(out, "Window #{}", n + 1);
        let _ = writeln!(out, "  Title    : {}", win.title);
        let _ = writeln!(out, "  Position : x={}, y={}", win.left, win.top);
        let _ = writeln!(out, "  Size     : width={}, height={}", win.width, win.height);
        let _ = writeln!(
            out,
            "  Bounds   : left={}, top={}, right={}, bottom={}",
            win.left,
            win.top,
            win.right(),
            win.bottom()
        );
        let _ = writeln!(out, "{}", rule('-', 60));
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "Total visible windows: {}", windows.len());
    out
}

fn audio_clip(results: &BTreeMap<ProducerId, CaptureResult>) -> Option<&AudioClip> {
    match results.get(&ProducerId::Audio).and_then(CaptureResult::payload) {
        Some(Payload::Audio(clip)) => Some(clip),
        _ => None,
    }
}

/// The summary report, sections in fixed order.
pub fn report_text(
    results: &BTreeMap<ProducerId, CaptureResult>,
    counters: &Counters,
    sizes: &BTreeMap<&'static str, u64>,
    elapsed: Duration,
    ctx: &RunContext,
) -> String {
    let status = |id: ProducerId| status_label(results.get(&id));
    let size = |id: ProducerId| sizes.get(id.artifact_name()).copied().unwrap_or(0);
    let mut out = String::new();

    // Header
    let _ = writeln!(out, "{}", rule('=', RULE_WIDE));
    let _ = writeln!(out, "DATA COLLECTION REPORT");
    let _ = writeln!(out, "{}", rule('=', RULE_WIDE));
    let _ = writeln!(out);
    let _ = writeln!(out, "GENERAL INFORMATION:");
    let _ = writeln!(out, "- Run id: {}", ctx.run_id);
    let _ = writeln!(out, "- Started: {}", timestamp(&ctx.started_at));
    let _ = writeln!(out, "- Report generated: {}", timestamp(&ctx.generated_at));
    let _ = writeln!(
        out,
        "- Collection duration: {} seconds",
        ctx.configured.as_secs_f64()
    );
    let _ = writeln!(out, "- Actual duration: {:.2} seconds", elapsed.as_secs_f64());
    if ctx.interrupted {
        let _ = writeln!(out, "- Collection was interrupted before the deadline");
    }
    let _ = writeln!(out, "- Data directory: {}", ctx.output_dir.display());
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", rule('-', RULE_WIDE));

    let _ = writeln!(out, "1. WEBCAM IMAGE:");
    let _ = writeln!(out, "   - File: {}", ProducerId::Image.artifact_name());
    let _ = writeln!(out, "   - Status: {}", status(ProducerId::Image));
    if let Some(resolution) = results
        .get(&ProducerId::Image)
        .and_then(|r| r.attribute("resolution"))
    {
        let _ = writeln!(out, "   - Resolution: {resolution}");
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "2. MICROPHONE RECORDING:");
    let _ = writeln!(out, "   - File: {}", ProducerId::Audio.artifact_name());
    let _ = writeln!(out, "   - Status: {}", status(ProducerId::Audio));
    let _ = writeln!(out, "   - Size: {} bytes", size(ProducerId::Audio));
    if let Some(clip) = audio_clip(results) {
        let _ = writeln!(out, "   - Length: {:.2} seconds", clip.duration_secs());
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "3. SCREENSHOT:");
    let _ = writeln!(out, "   - File: {}", ProducerId::Screenshot.artifact_name());
    let _ = writeln!(out, "   - Status: {}", status(ProducerId::Screenshot));
    let _ = writeln!(out);

    let _ = writeln!(out, "4. KEYBOARD ACTIVITY:");
    let _ = writeln!(out, "   - File: {}", ProducerId::Keyboard.artifact_name());
    let _ = writeln!(out, "   - Status: {}", status(ProducerId::Keyboard));
    let _ = writeln!(out, "   - Total events: {}", counters.key_events);
    let _ = writeln!(out, "   - Key presses: {}", counters.key_downs);
    let _ = writeln!(out);

    let _ = writeln!(out, "5. CLIPBOARD HISTORY:");
    let _ = writeln!(out, "   - File: {}", ProducerId::Clipboard.artifact_name());
    let _ = writeln!(out, "   - Status: {}", status(ProducerId::Clipboard));
    let _ = writeln!(out, "   - Changes: {}", counters.clipboard_changes);
    let _ = writeln!(out);

    let _ = writeln!(out, "6. WINDOW INFORMATION:");
    let _ = writeln!(out, "   - File: {}", ProducerId::Windows.artifact_name());
    let _ = writeln!(out, "   - Status: {}", status(ProducerId::Windows));
    let _ = writeln!(out);

    let _ = writeln!(out, "{}", rule('-', RULE_WIDE));
    let _ = writeln!(out, "REVIEW CHECKLIST:");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "1. Open {} to locate the active window",
        ProducerId::Screenshot.artifact_name()
    );
    let _ = writeln!(
        out,
        "2. Check {} for clipboard contents",
        ProducerId::Clipboard.artifact_name()
    );
    let _ = writeln!(
        out,
        "3. Check {} for pressed keys",
        ProducerId::Keyboard.artifact_name()
    );
    let _ = writeln!(
        out,
        "4. Listen to {} to identify the recording",
        ProducerId::Audio.artifact_name()
    );
    let _ = writeln!(
        out,
        "5. Open {} for the webcam image",
        ProducerId::Image.artifact_name()
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", rule('=', RULE_WIDE));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, secs).unwrap()
    }

    fn key(key: &str, transition: KeyTransition, secs: u32) -> KeyEvent {
        KeyEvent {
            timestamp: at(secs),
            key: key.into(),
            transition,
        }
    }

    #[test]
    fn test_reconstructed_text_uses_key_downs_only() {
        let events = vec![
            key("h", KeyTransition::Down, 0),
            key("h", KeyTransition::Up, 0),
            key("i", KeyTransition::Down, 1),
            key("space", KeyTransition::Down, 2),
        ];
        assert_eq!(reconstructed_text(&events), "h i space");

        let log = keyboard_log(&events);
        assert!(log.contains("Total events: 4"));
        assert!(log.contains("Key presses: 3"));
        assert!(log.contains("2026-01-01 12:00:01.000 - down: i"));
    }

    #[test]
    fn test_empty_logs() {
        assert!(keyboard_log(&[]).contains("No keyboard events recorded"));
        assert!(clipboard_log(&ClipboardHistory::new()).contains("No changes"));
        assert!(window_info(&[], &at(0)).contains("No visible windows found."));
    }

    #[test]
    fn test_window_info_bounds() {
        let windows = vec![WindowInfo {
            title: "Terminal".into(),
            left: 10,
            top: 20,
            width: 300,
            height: 200,
        }];
        let text = window_info(&windows, &at(0));
        assert!(text.contains("Window #1"));
        assert!(text.contains("right=310, bottom=220"));
        assert!(text.contains("Total visible windows: 1"));
    }

    #[test]
    fn test_clipboard_sample_lengths() {
        let mut history = ClipboardHistory::new();
        history.observe("привет".into(), at(3));
        let text = clipboard_log(&history);
        assert!(text.contains("CONTENT (6 characters):"));
        assert!(text.contains("привет"));
    }
}
