//! Delivery of finished downloads to the chat.
//!
//! Uploads the file as audio (with title/performer metadata) or video, with a
//! MarkdownV2 caption carrying title, quality, and final size. While the
//! upload runs, the "uploading" chat indicator is re-sent every few seconds
//! because the platform expires it after about five.

use crate::config;
use crate::core::error::AppResult;
use crate::core::utils::format_size_mb;
use crate::session::FormatTag;
use crate::telegram::markdown::escape_markdown;
use std::path::Path;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, InputFile, ParseMode};
use tokio::task::JoinHandle;

/// Builds the completion caption: bold title, then quality and size.
pub fn build_caption(title: &str, quality: &str, size_bytes: u64) -> String {
    format!(
        "✅ *{}*\n{} · {}",
        escape_markdown(title),
        escape_markdown(quality),
        escape_markdown(&format_size_mb(size_bytes))
    )
}

/// Re-sends the chat action until aborted so the indicator stays visible
/// through a long upload.
fn spawn_action_refresher(bot: Bot, chat_id: ChatId, action: ChatAction) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(config::upload::chat_action_refresh()).await;
            if let Err(e) = bot.send_chat_action(chat_id, action).await {
                log::debug!("Failed to refresh chat action: {}", e);
                break;
            }
        }
    })
}

/// Uploads the finished file with its caption.
///
/// The caller owns cleanup; this function only moves bytes and reports the
/// platform's answer.
#[allow(clippy::too_many_arguments)]
pub async fn deliver(
    bot: &Bot,
    chat_id: ChatId,
    path: &Path,
    tag: &FormatTag,
    title: &str,
    platform: &str,
    duration: u32,
    size_bytes: u64,
) -> AppResult<()> {
    let action = if tag.is_video() {
        ChatAction::UploadVideo
    } else {
        ChatAction::UploadVoice
    };

    if let Err(e) = bot.send_chat_action(chat_id, action).await {
        log::warn!("Failed to send chat action: {}", e);
        // Not critical, continue with the upload.
    }
    let refresher = spawn_action_refresher(bot.clone(), chat_id, action);

    let caption = build_caption(title, &tag.quality_label(), size_bytes);
    let input = InputFile::file(path.to_path_buf());

    log::info!(
        "Uploading {} ({}) to chat {}",
        path.display(),
        format_size_mb(size_bytes),
        chat_id
    );

    let result = if tag.is_video() {
        bot.send_video(chat_id, input)
            .caption(&caption)
            .parse_mode(ParseMode::MarkdownV2)
            .await
            .map(|_| ())
    } else {
        bot.send_audio(chat_id, input)
            .caption(&caption)
            .parse_mode(ParseMode::MarkdownV2)
            .duration(duration)
            .title(title)
            .performer(platform)
            .await
            .map(|_| ())
    };

    refresher.abort();
    result?;
    Ok(())
}
