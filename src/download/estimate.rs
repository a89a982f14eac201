//! Pre-flight transfer size estimation.
//!
//! Before spawning a full download the supervisor asks how big the result is
//! likely to be, so oversize requests can be rejected without wasting
//! bandwidth. Two probes run in order:
//!
//! 1. yt-dlp's own `%(filesize_approx)s` for the chosen format filter
//! 2. Resolving the stream URL with `--get-url` and issuing an HTTP HEAD
//!    request for its `Content-Length`
//!
//! Estimation is best-effort: every failure collapses to [`SizeEstimate::Unknown`],
//! which lets the download proceed and defers the real check to the
//! post-download file size.

use crate::config;
use crate::download::command::format_filter;
use crate::session::FormatTag;
use tokio::process::Command as TokioCommand;
use tokio::time::timeout;
use url::Url;

/// Outcome of a pre-flight size probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeEstimate {
    /// A byte count one of the probes resolved.
    Estimated { bytes: u64 },
    /// Neither probe produced a usable number.
    Unknown,
}

impl SizeEstimate {
    /// Returns the estimated byte count, if any.
    pub fn bytes(&self) -> Option<u64> {
        match self {
            SizeEstimate::Estimated { bytes } => Some(*bytes),
            SizeEstimate::Unknown => None,
        }
    }

    /// True when the estimate is strictly above the ceiling.
    ///
    /// An unknown estimate never blocks a download; a value exactly at the
    /// ceiling is still allowed through.
    pub fn exceeds(&self, ceiling: u64) -> bool {
        matches!(self, SizeEstimate::Estimated { bytes } if *bytes > ceiling)
    }
}

/// Estimates the transfer size for a URL and chosen format.
///
/// Never fails; any probe error maps to [`SizeEstimate::Unknown`].
pub async fn estimate_size(ytdlp_bin: &str, url: &Url, tag: &FormatTag) -> SizeEstimate {
    let filter = format_filter(tag);

    if let Some(bytes) = filesize_approx(ytdlp_bin, url, &filter).await {
        log::info!(
            "Estimated size for {} ({}): {} bytes via filesize_approx",
            url,
            tag.as_tag(),
            bytes
        );
        return SizeEstimate::Estimated { bytes };
    }

    if let Some(bytes) = head_content_length(ytdlp_bin, url, &filter).await {
        log::info!(
            "Estimated size for {} ({}): {} bytes via HEAD probe",
            url,
            tag.as_tag(),
            bytes
        );
        return SizeEstimate::Estimated { bytes };
    }

    log::debug!("Could not estimate size for {} ({})", url, tag.as_tag());
    SizeEstimate::Unknown
}

/// Asks the extractor for its own size approximation of the chosen format.
async fn filesize_approx(ytdlp_bin: &str, url: &Url, filter: &str) -> Option<u64> {
    let args = [
        "--print",
        "%(filesize_approx)s",
        "--format",
        filter,
        "--no-playlist",
        "--skip-download",
        "--no-warnings",
        url.as_str(),
    ];

    let output = timeout(
        config::probe::estimate_timeout(),
        TokioCommand::new(ytdlp_bin).args(args).output(),
    )
    .await;

    match output {
        Ok(Ok(result)) if result.status.success() => {
            let size_str = String::from_utf8_lossy(&result.stdout).trim().to_string();
            // yt-dlp prints "NA" when it has no approximation.
            if size_str == "NA" || size_str.is_empty() {
                return None;
            }
            match size_str.parse::<u64>() {
                Ok(bytes) => Some(bytes),
                Err(_) => {
                    log::debug!("Unparseable filesize_approx '{}' for {}", size_str, url);
                    None
                }
            }
        }
        Ok(Ok(result)) => {
            log::debug!(
                "filesize_approx probe exited with code {:?} for {}",
                result.status.code(),
                url
            );
            None
        }
        Ok(Err(e)) => {
            log::debug!("Failed to run {} for size probe: {}", ytdlp_bin, e);
            None
        }
        Err(_) => {
            log::debug!(
                "Size probe timed out after {}s for {}",
                config::probe::ESTIMATE_TIMEOUT_SECS,
                url
            );
            None
        }
    }
}

/// Resolves the direct stream URL and reads `Content-Length` from a HEAD request.
async fn head_content_length(ytdlp_bin: &str, url: &Url, filter: &str) -> Option<u64> {
    let args = [
        "--get-url",
        "--format",
        filter,
        "--no-playlist",
        "--no-warnings",
        url.as_str(),
    ];

    let output = timeout(
        config::probe::estimate_timeout(),
        TokioCommand::new(ytdlp_bin).args(args).output(),
    )
    .await
    .ok()?
    .ok()?;

    if !output.status.success() {
        log::debug!(
            "--get-url probe exited with code {:?} for {}",
            output.status.code(),
            url
        );
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    // Merged audio+video formats resolve to several URLs; the first stream
    // dominates the transfer size.
    let stream_url = stdout.lines().map(str::trim).find(|l| !l.is_empty())?.to_string();

    let client = match reqwest::Client::builder()
        .timeout(config::network::head_timeout())
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            log::warn!("Failed to build HTTP client for HEAD probe: {}", e);
            return None;
        }
    };

    match client.head(&stream_url).send().await {
        Ok(resp) => {
            let len = resp.content_length();
            if len.is_none() {
                log::debug!("HEAD response without Content-Length for {}", url);
            }
            len
        }
        Err(e) => {
            log::debug!("HEAD probe failed for {}: {}", url, e);
            None
        }
    }
}
