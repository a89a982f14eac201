//! Format-tag to yt-dlp argument mapping.
//!
//! The mapping from a user's quality choice to extractor arguments is an
//! explicit table, not something inferred at runtime. Audio tags extract to
//! mp3 at the chosen bitrate; video tags cap the stream height and merge into
//! an mp4 container so the result plays inline in the chat client.

use crate::session::FormatTag;
use std::path::Path;
use url::Url;

/// Builds the yt-dlp `--format` selector for a quality choice.
///
/// Each selector falls back through progressively looser filters so an exotic
/// source without an mp4/m4a rendition still resolves to something.
pub fn format_filter(tag: &FormatTag) -> String {
    match tag {
        FormatTag::Audio { .. } => "bestaudio[ext=m4a]/bestaudio/best".to_string(),
        FormatTag::Video { height: Some(h) } => format!(
            "bestvideo[height<={h}][ext=mp4]+bestaudio[ext=m4a]/bestvideo[height<={h}]+bestaudio/best[height<={h}]"
        ),
        FormatTag::Video { height: None } => {
            "bestvideo[ext=mp4]+bestaudio[ext=m4a]/bestvideo+bestaudio/best".to_string()
        }
    }
}

/// Builds the full argument list for one download invocation.
///
/// `--newline` forces one progress report per line so the supervisor's line
/// reader can parse percentages as they arrive. The URL goes last.
pub fn download_args(tag: &FormatTag, url: &Url, dest: &Path) -> Vec<String> {
    let mut args = vec![
        "-o".to_string(),
        dest.to_string_lossy().into_owned(),
        "--format".to_string(),
        format_filter(tag),
        "--newline".to_string(),
        "--no-playlist".to_string(),
        "--no-warnings".to_string(),
    ];

    match tag {
        FormatTag::Audio { bitrate } => {
            args.push("-x".to_string());
            args.push("--audio-format".to_string());
            args.push("mp3".to_string());
            args.push("--audio-quality".to_string());
            args.push(format!("{bitrate}K"));
        }
        FormatTag::Video { .. } => {
            args.push("--merge-output-format".to_string());
            args.push("mp4".to_string());
        }
    }

    args.push(url.as_str().to_string());
    args
}
