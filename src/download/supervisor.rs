//! Download supervision.
//!
//! One supervised run turns a (session, format) pair into a terminal outcome:
//!
//! 1. Size estimate, with a pre-flight rejection when it exceeds the ceiling
//! 2. Spawn yt-dlp with a line-oriented progress reader attached to stdout
//! 3. Throttled progress edits while the process runs, kill on request
//! 4. Classify the exit (success, failure, oversize, cancelled) and clean up
//!
//! Cleanup of the destination file and the session record runs on every
//! terminal path, including upload failure.

use crate::config;
use crate::core::error::{AppError, AppResult};
use crate::core::utils::{escape_filename, format_size_mb, remove_file_if_exists};
use crate::download::command::download_args;
use crate::download::estimate::{SizeEstimate, estimate_size};
use crate::download::progress::{
    ProgressGate, ProgressMessage, parse_progress_line, render_progress_text,
};
use crate::download::send;
use crate::session::{DownloadHandle, FormatTag, SessionStore};
use crate::telegram::markdown::escape_markdown;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command as TokioCommand};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Terminal result of one supervised download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// File landed on disk within the ceiling.
    Completed { size_bytes: u64 },
    /// Process or filesystem failure; `reason` is shown to the user.
    Failed { reason: String },
    /// File landed but is over the ceiling. Not a generic failure.
    TooLarge { estimated: Option<u64>, actual: u64 },
    /// Killed on user request.
    Cancelled,
}

/// How the child process ended, as observed by the supervising task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisedExit {
    Exited { success: bool, code: Option<i32> },
    Killed,
}

/// Builds the destination path for a session's download.
pub fn destination_path(dir: &Path, clean_title: &str, tag: &FormatTag) -> PathBuf {
    let stem = escape_filename(clean_title);
    dir.join(format!("{}.{}", stem, tag.file_ext()))
}

fn try_spawn(bin: &str, args: &[String]) -> std::io::Result<Child> {
    TokioCommand::new(bin)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
}

/// Spawns the extractor, falling back to `youtube-dl` when the configured
/// binary is not installed.
fn spawn_extractor(bin: &str, args: &[String]) -> AppResult<Child> {
    match try_spawn(bin, args) {
        Ok(child) => Ok(child),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::warn!("{} not found, retrying with youtube-dl", bin);
            try_spawn("youtube-dl", args).map_err(|e2| {
                AppError::Download(format!(
                    "extractor not found: {} ({}), youtube-dl fallback failed: {}",
                    bin, e, e2
                ))
            })
        }
        Err(e) => Err(AppError::Download(format!("failed to spawn {}: {}", bin, e))),
    }
}

/// Spawns the extractor and a supervising task that reads its stdout.
///
/// Returns a receiver of raw progress percentages and a handle resolving to
/// how the process ended. A message on `kill_rx` kills the process
/// immediately; dropping all kill senders does nothing.
pub fn spawn_supervised(
    bin: &str,
    args: &[String],
    mut kill_rx: mpsc::UnboundedReceiver<()>,
) -> AppResult<(mpsc::UnboundedReceiver<u8>, JoinHandle<SupervisedExit>)> {
    let mut child = spawn_extractor(bin, args)?;
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let (progress_tx, progress_rx) = mpsc::unbounded_channel();

    // Drain stderr so the child never blocks on a full pipe.
    if let Some(stderr) = stderr {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                log::debug!("extractor stderr: {}", line);
            }
        });
    }

    let exit_handle = tokio::spawn(async move {
        let mut cancelled = false;
        if let Some(stdout) = stdout {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                tokio::select! {
                    line = lines.next_line() => match line {
                        Ok(Some(line)) => {
                            if let Some(percent) = parse_progress_line(&line) {
                                let _ = progress_tx.send(percent);
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            log::warn!("Failed to read extractor output: {}", e);
                            break;
                        }
                    },
                    Some(_) = kill_rx.recv() => {
                        cancelled = true;
                        if let Err(e) = child.start_kill() {
                            log::warn!("Failed to kill extractor process: {}", e);
                        }
                        break;
                    }
                }
            }
        }

        match child.wait().await {
            Ok(status) if cancelled => {
                log::info!("Extractor killed on request (status code {:?})", status.code());
                SupervisedExit::Killed
            }
            Ok(status) => SupervisedExit::Exited {
                success: status.success(),
                code: status.code(),
            },
            Err(e) => {
                log::warn!("Failed to wait for extractor: {}", e);
                if cancelled {
                    SupervisedExit::Killed
                } else {
                    SupervisedExit::Exited {
                        success: false,
                        code: None,
                    }
                }
            }
        }
    });

    Ok((progress_rx, exit_handle))
}

/// Maps an observed exit plus the state of the destination file to an outcome.
pub fn classify_outcome(
    exit: SupervisedExit,
    file_size: Option<u64>,
    ceiling: u64,
    estimate: Option<u64>,
) -> DownloadOutcome {
    let SupervisedExit::Exited { success, code } = exit else {
        return DownloadOutcome::Cancelled;
    };
    if !success {
        let code_str = code.map(|c| c.to_string()).unwrap_or_else(|| "unknown".to_string());
        return DownloadOutcome::Failed {
            reason: format!("download failed with code {}", code_str),
        };
    }
    match file_size {
        None => DownloadOutcome::Failed {
            reason: "file not found after download".to_string(),
        },
        Some(0) => DownloadOutcome::Failed {
            reason: "downloaded file is empty".to_string(),
        },
        Some(actual) if actual > ceiling => DownloadOutcome::TooLarge {
            estimated: estimate,
            actual,
        },
        Some(actual) => DownloadOutcome::Completed { size_bytes: actual },
    }
}

/// Runs one download for a session to completion. Spawned as its own task
/// from the quality-pick callback.
///
/// Every early return either leaves the session untouched (pre-flight
/// rejection, duplicate start) or cleans up file and session together.
pub async fn start_download(
    bot: Bot,
    store: SessionStore,
    session_key: String,
    chat_id: ChatId,
    tag: FormatTag,
) {
    let Some(session) = store.get(&session_key).await else {
        notify_expired(&bot, chat_id).await;
        return;
    };

    let url = match url::Url::parse(&session.url) {
        Ok(url) => url,
        Err(e) => {
            log::error!("Session {} carries an unparseable URL: {}", session_key, e);
            store.remove(&session_key).await;
            let _ = bot
                .send_message(chat_id, "❌ That link could not be processed. Send it again.")
                .await;
            return;
        }
    };

    store.update(&session_key, |s| s.format = Some(tag)).await;

    let estimate = estimate_size(&config::YTDLP_BIN, &url, &tag).await;

    // Estimation awaited; the session may have been cancelled meanwhile.
    let Some(session) = store.get(&session_key).await else {
        log::info!("Session {} disappeared during size estimation", session_key);
        return;
    };

    let ceiling = *config::MAX_FILE_SIZE_BYTES;
    if let SizeEstimate::Estimated { bytes } = estimate {
        if bytes > ceiling {
            log::info!(
                "Pre-flight size rejection for session {}: estimated {} > ceiling {}",
                session_key,
                bytes,
                ceiling
            );
            let text = render_preflight_too_large_text(&session.title, bytes, ceiling);
            if let Err(e) = bot
                .send_message(chat_id, text)
                .parse_mode(ParseMode::MarkdownV2)
                .await
            {
                log::warn!("Failed to send size rejection to chat {}: {}", chat_id, e);
            }
            // The session stays so the user can pick a smaller format.
            return;
        }
    }

    let dest = destination_path(Path::new(config::DOWNLOAD_DIR.as_str()), &session.clean_title, &tag);
    let (handle, kill_rx) = DownloadHandle::channel();

    // A handle already present means another download is running for this
    // session; that is a bug state, never silently replaced.
    match store
        .update(&session_key, |s| {
            if s.handle.is_some() {
                false
            } else {
                s.handle = Some(handle);
                true
            }
        })
        .await
    {
        None => {
            notify_expired(&bot, chat_id).await;
            return;
        }
        Some(false) => {
            log::error!("Session {} already has a running download", session_key);
            let _ = bot
                .send_message(chat_id, "A download is already running for this link.")
                .await;
            return;
        }
        Some(true) => {}
    }

    let args = download_args(&tag, &url, &dest);
    log::info!(
        "Starting download for session {}: {} -> {}",
        session_key,
        url,
        dest.display()
    );

    let (mut progress_rx, mut exit_handle) = match spawn_supervised(&config::YTDLP_BIN, &args, kill_rx)
    {
        Ok(pair) => pair,
        Err(e) => {
            log::error!("Failed to start extractor for session {}: {}", session_key, e);
            cleanup(&store, &session_key, &dest).await;
            let _ = bot
                .send_message(chat_id, format!("❌ Could not start the download: {}", e))
                .await;
            return;
        }
    };

    let mut gate = ProgressGate::from_config();
    let mut progress = ProgressMessage::new(chat_id);
    let initial = render_progress_text(&session.title, &session.platform, 0);
    if let Err(e) = progress.update(&bot, &initial).await {
        log::warn!("Failed to send initial progress message: {}", e);
    }
    store
        .update(&session_key, |s| s.progress_message = progress.message_id)
        .await;

    let exit = loop {
        tokio::select! {
            Some(raw) = progress_rx.recv() => {
                if let Some(percent) = gate.admit(raw, Instant::now()) {
                    let text = render_progress_text(&session.title, &session.platform, percent);
                    if let Err(e) = progress.update(&bot, &text).await {
                        log::warn!("Failed to update progress message: {}", e);
                    }
                    store
                        .update(&session_key, |s| s.progress_message = progress.message_id)
                        .await;
                }
            }
            exit = &mut exit_handle => {
                break match exit {
                    Ok(exit) => exit,
                    Err(e) => {
                        log::error!("Supervision task failed for session {}: {}", session_key, e);
                        SupervisedExit::Exited { success: false, code: None }
                    }
                };
            }
        }
    };

    // The process is gone; clear the handle before anything else awaits so a
    // late /cancel sees no phantom download.
    store.update(&session_key, |s| s.handle = None).await;

    let file_size = match exit {
        SupervisedExit::Exited { .. } => tokio::fs::metadata(&dest).await.ok().map(|m| m.len()),
        SupervisedExit::Killed => None,
    };
    let outcome = classify_outcome(exit, file_size, ceiling, estimate.bytes());

    match outcome {
        DownloadOutcome::Completed { size_bytes } => {
            if gate.finish().is_some() {
                let text = render_progress_text(&session.title, &session.platform, 100);
                if let Err(e) = progress.update(&bot, &text).await {
                    log::warn!("Failed to render final progress: {}", e);
                }
            }
            let delivery = send::deliver(
                &bot,
                chat_id,
                &dest,
                &tag,
                &session.clean_title,
                &session.platform,
                session.duration,
                size_bytes,
            )
            .await;
            progress.clear(&bot).await;
            // Cleanup runs whether or not the upload went through.
            cleanup(&store, &session_key, &dest).await;
            match delivery {
                Ok(()) => log::info!(
                    "✅ Delivered session {}: '{}' ({})",
                    session_key,
                    session.clean_title,
                    format_size_mb(size_bytes)
                ),
                Err(e) => {
                    log::error!("Upload failed for session {}: {}", session_key, e);
                    let _ = bot
                        .send_message(chat_id, format!("❌ Upload failed: {}", e))
                        .await;
                }
            }
        }
        DownloadOutcome::TooLarge { estimated, actual } => {
            log::warn!(
                "Post-download size rejection for session {}: {} > ceiling {}",
                session_key,
                actual,
                ceiling
            );
            let text = render_too_large_text(&session.title, estimated, actual, ceiling);
            if let Err(e) = progress.update(&bot, &text).await {
                log::warn!("Failed to report oversize result: {}", e);
            }
            cleanup(&store, &session_key, &dest).await;
        }
        DownloadOutcome::Failed { reason } => {
            log::error!("Download failed for session {}: {}", session_key, reason);
            let text = render_failure_text(&session.title, &reason);
            if let Err(e) = progress.update(&bot, &text).await {
                log::warn!("Failed to report download failure: {}", e);
            }
            cleanup(&store, &session_key, &dest).await;
        }
        DownloadOutcome::Cancelled => {
            // The cancel initiator already confirmed to the user.
            log::info!("Download for session {} cancelled", session_key);
            progress.clear(&bot).await;
            cleanup(&store, &session_key, &dest).await;
        }
    }
}

/// Best-effort removal of the destination file and the session record.
async fn cleanup(store: &SessionStore, session_key: &str, dest: &Path) {
    remove_file_if_exists(dest).await;
    store.remove(session_key).await;
}

async fn notify_expired(bot: &Bot, chat_id: ChatId) {
    if let Err(e) = bot
        .send_message(chat_id, "This session has expired. Send the link again.")
        .await
    {
        log::warn!("Failed to send expiry notice to chat {}: {}", chat_id, e);
    }
}

fn render_failure_text(title: &str, reason: &str) -> String {
    format!(
        "❌ *Download failed*\n{}\n\n{}\nSend the link again to retry\\.",
        escape_markdown(title),
        escape_markdown(reason),
    )
}

fn render_too_large_text(title: &str, estimated: Option<u64>, actual: u64, ceiling: u64) -> String {
    let size_part = match estimated {
        Some(bytes) => format!(
            "Estimated {}, actual {}",
            format_size_mb(bytes),
            format_size_mb(actual)
        ),
        None => format!("Actual size {}", format_size_mb(actual)),
    };
    format!(
        "⚠️ *File too large*\n{}\n\n{} against a limit of {}\\. Try a lower quality\\.",
        escape_markdown(title),
        escape_markdown(&size_part),
        escape_markdown(&format_size_mb(ceiling)),
    )
}

fn render_preflight_too_large_text(title: &str, estimated: u64, ceiling: u64) -> String {
    format!(
        "⚠️ *File too large*\n{}\n\nEstimated {} against a limit of {}\\. Pick a lower quality from the menu\\.",
        escape_markdown(title),
        escape_markdown(&format_size_mb(estimated)),
        escape_markdown(&format_size_mb(ceiling)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB_50: u64 = 50 * 1024 * 1024;

    fn exited(success: bool, code: Option<i32>) -> SupervisedExit {
        SupervisedExit::Exited { success, code }
    }

    // ==================== Outcome Classification Tests ====================

    #[test]
    fn test_classify_killed_is_cancelled() {
        let outcome = classify_outcome(SupervisedExit::Killed, None, MIB_50, None);
        assert_eq!(outcome, DownloadOutcome::Cancelled);
    }

    #[test]
    fn test_classify_nonzero_exit_reports_code() {
        let outcome = classify_outcome(exited(false, Some(1)), Some(1024), MIB_50, None);
        assert_eq!(
            outcome,
            DownloadOutcome::Failed {
                reason: "download failed with code 1".to_string()
            }
        );
    }

    #[test]
    fn test_classify_signal_death_has_unknown_code() {
        let outcome = classify_outcome(exited(false, None), None, MIB_50, None);
        assert_eq!(
            outcome,
            DownloadOutcome::Failed {
                reason: "download failed with code unknown".to_string()
            }
        );
    }

    #[test]
    fn test_classify_missing_file() {
        let outcome = classify_outcome(exited(true, Some(0)), None, MIB_50, None);
        assert_eq!(
            outcome,
            DownloadOutcome::Failed {
                reason: "file not found after download".to_string()
            }
        );
    }

    #[test]
    fn test_classify_empty_file() {
        let outcome = classify_outcome(exited(true, Some(0)), Some(0), MIB_50, None);
        assert_eq!(
            outcome,
            DownloadOutcome::Failed {
                reason: "downloaded file is empty".to_string()
            }
        );
    }

    #[test]
    fn test_classify_oversize_file_keeps_estimate() {
        let outcome = classify_outcome(exited(true, Some(0)), Some(MIB_50 + 1), MIB_50, Some(80_000_000));
        assert_eq!(
            outcome,
            DownloadOutcome::TooLarge {
                estimated: Some(80_000_000),
                actual: MIB_50 + 1
            }
        );
    }

    #[test]
    fn test_classify_file_at_ceiling_is_completed() {
        let outcome = classify_outcome(exited(true, Some(0)), Some(MIB_50), MIB_50, None);
        assert_eq!(outcome, DownloadOutcome::Completed { size_bytes: MIB_50 });
    }

    // ==================== Destination Path Tests ====================

    #[test]
    fn test_destination_path_sanitizes_and_picks_extension() {
        let dir = Path::new("/tmp/downloads");
        let audio = destination_path(dir, "song/name", &FormatTag::Audio { bitrate: 192 });
        assert_eq!(audio, PathBuf::from("/tmp/downloads/song_name.mp3"));

        let video = destination_path(dir, "clip: part 1", &FormatTag::Video { height: None });
        assert_eq!(video, PathBuf::from("/tmp/downloads/clip_ part 1.mp4"));
    }

    // ==================== Message Rendering Tests ====================

    #[test]
    fn test_preflight_text_carries_sizes() {
        let text = render_preflight_too_large_text("Big File", 80_000_000, MIB_50);
        assert!(text.contains("Big File"));
        assert!(text.contains("76\\.29MB"));
        assert!(text.contains("50\\.00MB"));
    }

    #[test]
    fn test_too_large_text_with_and_without_estimate() {
        let with = render_too_large_text("Clip", Some(80_000_000), 60_000_000, MIB_50);
        assert!(with.contains("Estimated 76\\.29MB"));
        assert!(with.contains("actual 57\\.22MB"));

        let without = render_too_large_text("Clip", None, 60_000_000, MIB_50);
        assert!(without.contains("Actual size 57\\.22MB"));
        assert!(!without.contains("Estimated"));
    }

    #[test]
    fn test_failure_text_escapes_title_and_reason() {
        let text = render_failure_text("Song [2024]", "download failed with code 1");
        assert!(text.contains("Song \\[2024\\]"));
        assert!(text.contains("download failed with code 1"));
    }
}
