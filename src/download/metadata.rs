//! Media metadata probing via the extraction tool.
//!
//! Before any menu is shown the bot asks yt-dlp what it is looking at:
//!
//! - Display title and duration
//! - Thumbnail URL (when the extractor reports one)
//! - The filename yt-dlp would pick, used to derive a container extension
//! - A platform label derived from the URL host
//!
//! Probing is strictly best-effort. Any failure (spawn error, timeout,
//! non-zero exit, unusable output) degrades to a deterministic fallback
//! record so the caller never has to handle a probe error.

use crate::config;
use std::path::Path;
use tokio::process::Command as TokioCommand;
use tokio::time::timeout;
use url::Url;

/// Everything the prober learns about one media URL.
#[derive(Debug, Clone)]
pub struct MediaInfo {
    /// Display title as reported by the extractor.
    pub title: String,
    /// Title with a trailing media extension stripped, for filenames and captions.
    pub clean_title: String,
    /// Platform label derived from the URL host ("youtube", "soundcloud", ...).
    pub platform: String,
    /// The filename the extractor would have chosen on its own.
    pub original_filename: String,
    /// Duration in whole seconds; 0 when unknown.
    pub duration: u32,
    /// Thumbnail URL when the extractor reports one.
    pub thumbnail: Option<String>,
    /// Container extension taken from `original_filename` ("mp4" when unknown).
    pub ext: String,
}

/// Probes metadata for a URL, degrading to a fallback record on any failure.
///
/// # Arguments
///
/// * `ytdlp_bin` - Extractor binary to invoke (usually `config::YTDLP_BIN`)
/// * `url` - Validated media URL
///
/// # Returns
///
/// A complete `MediaInfo`. This function cannot fail from the caller's point
/// of view; when the extractor is unusable the record carries a synthetic
/// timestamp title and default extension.
pub async fn probe(ytdlp_bin: &str, url: &Url) -> MediaInfo {
    match probe_with_ytdlp(ytdlp_bin, url).await {
        Some(info) => {
            log::info!(
                "Probed metadata for {}: title='{}', platform={}, duration={}s",
                url,
                info.title,
                info.platform,
                info.duration
            );
            info
        }
        None => {
            let info = fallback_info(url);
            log::warn!(
                "Metadata probe failed for {}, using fallback title '{}'",
                url,
                info.title
            );
            info
        }
    }
}

/// Runs one batched `--print` invocation and parses its four output lines.
///
/// Returns `None` on spawn failure, timeout, non-zero exit, or a missing
/// title line; the remaining fields degrade individually.
async fn probe_with_ytdlp(ytdlp_bin: &str, url: &Url) -> Option<MediaInfo> {
    let args = [
        "--print",
        "%(title)s",
        "--print",
        "%(duration)s",
        "--print",
        "%(thumbnail)s",
        "--print",
        "%(filename)s",
        "--no-playlist",
        "--skip-download",
        "--no-warnings",
        url.as_str(),
    ];

    log::debug!("Metadata probe command: {} {}", ytdlp_bin, args.join(" "));

    let output = timeout(
        config::probe::metadata_timeout(),
        TokioCommand::new(ytdlp_bin).args(args).output(),
    )
    .await;

    let output = match output {
        Ok(Ok(out)) => out,
        Ok(Err(e)) => {
            log::warn!("Failed to run {} for {}: {}", ytdlp_bin, url, e);
            return None;
        }
        Err(_) => {
            log::warn!(
                "Metadata probe timed out after {}s for {}",
                config::probe::METADATA_TIMEOUT_SECS,
                url
            );
            return None;
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        log::warn!(
            "Metadata probe exited with code {:?} for {}: {}",
            output.status.code(),
            url,
            stderr.trim()
        );
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut lines = stdout.lines();

    // The four lines mirror the four --print fields, in order. yt-dlp prints
    // "NA" for fields it cannot resolve.
    let title = non_na(lines.next())?.to_string();
    let duration = non_na(lines.next())
        .and_then(|s| s.parse::<f64>().ok())
        .map(|secs| secs.max(0.0).round() as u32)
        .unwrap_or(0);
    let thumbnail = non_na(lines.next()).map(str::to_string);
    let original_filename = non_na(lines.next())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{title}.mp4"));

    let ext = Path::new(&original_filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("mp4")
        .to_ascii_lowercase();
    let clean_title = strip_media_extension(&title).to_string();
    let platform = platform_name(url).to_string();

    Some(MediaInfo {
        title,
        clean_title,
        platform,
        original_filename,
        duration,
        thumbnail,
        ext,
    })
}

/// Builds the deterministic record used when probing fails.
///
/// The title is derived from the current UTC time so two failed probes in the
/// same second collide but are otherwise unique and filesystem-safe.
pub fn fallback_info(url: &Url) -> MediaInfo {
    let title = format!("media_{}", chrono::Utc::now().format("%Y%m%d_%H%M%S"));
    MediaInfo {
        clean_title: title.clone(),
        original_filename: format!("{title}.mp4"),
        platform: platform_name(url).to_string(),
        duration: 0,
        thumbnail: None,
        ext: "mp4".to_string(),
        title,
    }
}

/// Maps a URL host to a short platform label, falling back to "web".
pub fn platform_name(url: &Url) -> &'static str {
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    if host.contains("youtube.") || host.contains("youtu.be") {
        "youtube"
    } else if host.contains("soundcloud.") {
        "soundcloud"
    } else if host.contains("vimeo.") {
        "vimeo"
    } else if host.contains("twitter.") || host == "x.com" || host.ends_with(".x.com") {
        "twitter"
    } else if host.contains("instagram.") {
        "instagram"
    } else if host.contains("tiktok.") {
        "tiktok"
    } else {
        "web"
    }
}

/// Strips a trailing media-container extension from a title, if present.
///
/// Some extractors report titles that are really filenames ("Track.mp3");
/// captions and destination stems want the bare title.
fn strip_media_extension(title: &str) -> &str {
    const MEDIA_EXTENSIONS: [&str; 8] = [
        ".mp3", ".mp4", ".m4a", ".webm", ".mkv", ".opus", ".wav", ".flac",
    ];
    let lower = title.to_ascii_lowercase();
    for ext in MEDIA_EXTENSIONS {
        if lower.ends_with(ext) && title.len() > ext.len() {
            return &title[..title.len() - ext.len()];
        }
    }
    title
}

/// Filters out empty and "NA" print lines.
fn non_na(line: Option<&str>) -> Option<&str> {
    let value = line?.trim();
    if value.is_empty() || value == "NA" {
        None
    } else {
        Some(value)
    }
}
