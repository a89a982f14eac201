//! Progress parsing, throttling, and the in-chat progress message.
//!
//! yt-dlp reports progress as `[download]  NN.N%` lines on stdout. Editing a
//! chat message for every line would blow the messaging rate budget, so raw
//! readings pass through a [`ProgressGate`] that only admits a value when it
//! moved far enough and long enough since the previous emission. The
//! [`ProgressMessage`] owns the single chat message that gets edited in place.

use crate::telegram::markdown::escape_markdown;
use std::time::{Duration, Instant};
use teloxide::prelude::*;
use teloxide::types::{MessageId, ParseMode};

/// Extracts a percentage from one line of extractor output.
///
/// Only `[download]` lines carrying a percent token count; destination and
/// merge chatter is ignored. Values are clamped to 0..=100.
pub fn parse_progress_line(line: &str) -> Option<u8> {
    if !line.contains("[download]") || !line.contains('%') {
        return None;
    }
    let token = line.split_whitespace().find(|t| t.ends_with('%'))?;
    let value: f32 = token.trim_end_matches('%').parse().ok()?;
    Some(value.clamp(0.0, 100.0) as u8)
}

/// Rate gate for progress emissions.
///
/// A reading is admitted only when BOTH hold:
///
/// - it exceeds the last emitted value by at least `min_delta` points
/// - at least `min_interval` passed since the last emission
///
/// Non-increasing readings are dropped outright, and the terminal 100% is
/// reserved for [`ProgressGate::finish`] so it fires exactly once.
#[derive(Debug)]
pub struct ProgressGate {
    min_delta: u8,
    min_interval: Duration,
    last_progress: u8,
    last_update: Option<Instant>,
    finished: bool,
}

impl ProgressGate {
    pub fn new(min_delta: u8, min_interval: Duration) -> Self {
        Self {
            min_delta,
            min_interval,
            last_progress: 0,
            last_update: None,
            finished: false,
        }
    }

    /// Builds a gate from the environment-configured throttle parameters.
    pub fn from_config() -> Self {
        Self::new(
            *crate::config::PROGRESS_MIN_DELTA,
            Duration::from_millis(*crate::config::PROGRESS_MIN_INTERVAL_MS),
        )
    }

    /// Offers a raw reading to the gate; returns the percent to display if it
    /// passes.
    ///
    /// `now` is taken as an argument so tests can drive the clock.
    pub fn admit(&mut self, raw: u8, now: Instant) -> Option<u8> {
        if self.finished {
            return None;
        }
        let percent = raw.min(100);
        // Merged audio+video downloads report 100% once per fragment; hold an
        // early 100 back until the transfer is actually near the end.
        if percent == 100 && self.last_progress < 90 {
            return None;
        }
        if percent <= self.last_progress {
            return None;
        }
        if percent - self.last_progress < self.min_delta {
            return None;
        }
        if let Some(last) = self.last_update {
            if now.duration_since(last) < self.min_interval {
                return None;
            }
        }
        self.last_progress = percent;
        self.last_update = Some(now);
        Some(percent)
    }

    /// Forces the terminal 100% emission, bypassing both gates.
    ///
    /// Returns `Some(100)` the first time it is called on a gate that has not
    /// already emitted 100, `None` afterwards.
    pub fn finish(&mut self) -> Option<u8> {
        if self.finished {
            return None;
        }
        self.finished = true;
        if self.last_progress == 100 {
            None
        } else {
            self.last_progress = 100;
            Some(100)
        }
    }
}

/// The single chat message used for progress updates of one download.
///
/// Sent lazily on the first update, then edited in place. An edit that fails
/// because the content did not change is not an error; any other edit failure
/// falls back to sending a fresh message.
pub struct ProgressMessage {
    /// Chat the progress message lives in.
    pub chat_id: ChatId,
    /// Message being edited; `None` until the first update is sent.
    pub message_id: Option<MessageId>,
}

impl ProgressMessage {
    pub fn new(chat_id: ChatId) -> Self {
        Self {
            chat_id,
            message_id: None,
        }
    }

    /// Sends or edits the progress message to show `text`.
    pub async fn update(&mut self, bot: &Bot, text: &str) -> ResponseResult<()> {
        if let Some(msg_id) = self.message_id {
            match bot
                .edit_message_text(self.chat_id, msg_id, text.to_string())
                .parse_mode(ParseMode::MarkdownV2)
                .await
            {
                Ok(_) => return Ok(()),
                Err(e) => {
                    let error_str = e.to_string();
                    // The chat already shows exactly this content.
                    if error_str.contains("message is not modified") {
                        return Ok(());
                    }
                    log::warn!("Failed to edit progress message: {}. Sending a new one.", e);
                }
            }
        }

        let msg = bot
            .send_message(self.chat_id, text.to_string())
            .parse_mode(ParseMode::MarkdownV2)
            .await?;
        self.message_id = Some(msg.id);
        Ok(())
    }

    /// Deletes the progress message if one was sent. Best-effort.
    pub async fn clear(&mut self, bot: &Bot) {
        if let Some(msg_id) = self.message_id.take() {
            if let Err(e) = bot.delete_message(self.chat_id, msg_id).await {
                log::warn!(
                    "Failed to delete progress message {} in chat {}: {}",
                    msg_id.0,
                    self.chat_id,
                    e
                );
            }
        }
    }
}

/// Renders a ten-segment progress bar.
pub fn render_progress_bar(percent: u8) -> String {
    let percent = percent.min(100);
    let filled = (percent / 10) as usize;
    let empty = 10 - filled;
    format!("[{}{}]", "█".repeat(filled), "░".repeat(empty))
}

/// Renders the full progress message body in MarkdownV2.
pub fn render_progress_text(title: &str, platform: &str, percent: u8) -> String {
    let escaped_title = escape_markdown(title);
    let escaped_platform = escape_markdown(platform);
    let bar = render_progress_bar(percent);
    let mut s = String::with_capacity(escaped_title.len() + bar.len() + 64);
    s.push_str("⬇️ *Downloading from ");
    s.push_str(&escaped_platform);
    s.push_str("*\n");
    s.push_str(&escaped_title);
    s.push_str("\n\n`");
    s.push_str(&bar);
    s.push_str("` ");
    s.push_str(&percent.to_string());
    s.push('%');
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== parse_progress_line Tests ====================

    #[test]
    fn test_parse_standard_progress_line() {
        assert_eq!(
            parse_progress_line("[download]  42.0% of 3.00MiB at 1.00MiB/s ETA 00:02"),
            Some(42)
        );
        assert_eq!(parse_progress_line("[download] 100% of 3.00MiB"), Some(100));
        assert_eq!(parse_progress_line("[download]   0.3% of ~12.41MiB"), Some(0));
    }

    #[test]
    fn test_parse_ignores_non_progress_lines() {
        assert_eq!(parse_progress_line("[download] Destination: /tmp/track.mp3"), None);
        assert_eq!(parse_progress_line("[ffmpeg] Merging formats into clip.mp4"), None);
        assert_eq!(parse_progress_line("50% but not a download line"), None);
        assert_eq!(parse_progress_line(""), None);
    }

    #[test]
    fn test_parse_clamps_out_of_range_values() {
        assert_eq!(parse_progress_line("[download] 150.0% of something"), Some(100));
    }

    // ==================== ProgressGate Tests ====================

    #[test]
    fn test_gate_requires_minimum_delta() {
        let mut gate = ProgressGate::new(5, Duration::from_millis(0));
        let t = Instant::now();
        assert_eq!(gate.admit(3, t), None);
        assert_eq!(gate.admit(5, t), Some(5));
        assert_eq!(gate.admit(8, t), None);
        assert_eq!(gate.admit(10, t), Some(10));
    }

    #[test]
    fn test_gate_requires_minimum_interval() {
        let mut gate = ProgressGate::new(1, Duration::from_millis(3000));
        let t0 = Instant::now();
        assert_eq!(gate.admit(10, t0), Some(10));
        assert_eq!(gate.admit(50, t0 + Duration::from_millis(100)), None);
        assert_eq!(gate.admit(50, t0 + Duration::from_millis(3000)), Some(50));
    }

    #[test]
    fn test_gate_drops_non_increasing_readings() {
        let mut gate = ProgressGate::new(1, Duration::from_millis(0));
        let t = Instant::now();
        assert_eq!(gate.admit(40, t), Some(40));
        assert_eq!(gate.admit(40, t), None);
        assert_eq!(gate.admit(30, t), None);
    }

    #[test]
    fn test_gate_holds_back_early_hundred() {
        let mut gate = ProgressGate::new(5, Duration::from_millis(0));
        let t = Instant::now();
        // First fragment of a merged download finishing.
        assert_eq!(gate.admit(100, t), None);
        assert_eq!(gate.admit(95, t), Some(95));
        assert_eq!(gate.admit(100, t), Some(100));
    }

    #[test]
    fn test_finish_fires_exactly_once() {
        let mut gate = ProgressGate::new(5, Duration::from_millis(0));
        assert_eq!(gate.finish(), Some(100));
        assert_eq!(gate.finish(), None);

        let mut emitted = ProgressGate::new(5, Duration::from_millis(0));
        let t = Instant::now();
        assert_eq!(emitted.admit(95, t), Some(95));
        assert_eq!(emitted.admit(100, t), Some(100));
        // 100 already shown; no second terminal emission.
        assert_eq!(emitted.finish(), None);
    }

    #[test]
    fn test_gate_is_silent_after_finish() {
        let mut gate = ProgressGate::new(1, Duration::from_millis(0));
        gate.finish();
        assert_eq!(gate.admit(50, Instant::now()), None);
    }

    // ==================== Rendering Tests ====================

    #[test]
    fn test_progress_bar() {
        assert_eq!(render_progress_bar(0), "[░░░░░░░░░░]");
        assert_eq!(render_progress_bar(50), "[█████░░░░░]");
        assert_eq!(render_progress_bar(100), "[██████████]");
    }

    #[test]
    fn test_progress_bar_intermediate_values() {
        assert_eq!(render_progress_bar(10), "[█░░░░░░░░░]");
        assert_eq!(render_progress_bar(25), "[██░░░░░░░░]");
        assert_eq!(render_progress_bar(75), "[███████░░░]");
        assert_eq!(render_progress_bar(90), "[█████████░]");
    }

    #[test]
    fn test_progress_bar_overflow_is_capped() {
        assert_eq!(render_progress_bar(150), "[██████████]");
        assert_eq!(render_progress_bar(255), "[██████████]");
    }

    #[test]
    fn test_render_progress_text_escapes_title() {
        let text = render_progress_text("Song [2024]", "youtube", 40);
        assert!(text.contains("Song \\[2024\\]"));
        assert!(text.contains("youtube"));
        assert!(text.contains("40%"));
        assert!(text.contains("[████░░░░░░]"));
    }

    #[test]
    fn test_progress_message_new() {
        let pm = ProgressMessage::new(ChatId(12345));
        assert_eq!(pm.chat_id, ChatId(12345));
        assert!(pm.message_id.is_none());
    }
}
