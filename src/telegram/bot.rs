//! Bot construction and command surface
//!
//! This module contains:
//! - Command enum definition
//! - Bot instance creation with the configured HTTP timeout
//! - Registration of the command list shown in the chat UI
//! - The welcome text for /start and /help

use reqwest::ClientBuilder;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;

use crate::config;
use crate::core::utils::format_size_mb;
use crate::telegram::markdown::escape_markdown;

/// Bot commands enum with descriptions
#[derive(BotCommands, Clone, Debug)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    #[command(description = "show what this bot does")]
    Start,
    #[command(description = "show what this bot does")]
    Help,
    #[command(description = "stop the active download")]
    Cancel,
}

/// Creates the Bot instance from the configured token.
///
/// # Returns
/// * `Ok(Bot)` - Successfully created bot instance
/// * `Err(anyhow::Error)` - Token missing or HTTP client construction failed
pub fn create_bot() -> anyhow::Result<Bot> {
    let token = config::BOT_TOKEN.clone();
    if token.is_empty() {
        anyhow::bail!("BOT_TOKEN is not set. Put it in the environment or a .env file.");
    }

    let client = ClientBuilder::new().timeout(config::network::request_timeout()).build()?;
    Ok(Bot::with_client(token, client))
}

/// Registers the command list shown in the chat UI.
///
/// # Arguments
/// * `bot` - Bot instance to configure
///
/// # Returns
/// * `Ok(())` - Commands set successfully
/// * `Err(RequestError)` - Failed to set commands
pub async fn setup_bot_commands(bot: &Bot) -> Result<(), teloxide::RequestError> {
    use teloxide::types::BotCommand;

    bot.set_my_commands(vec![
        BotCommand::new("start", "show what this bot does"),
        BotCommand::new("help", "show what this bot does"),
        BotCommand::new("cancel", "stop the active download"),
    ])
    .await?;

    Ok(())
}

/// The MarkdownV2 welcome text for /start and /help.
pub fn welcome_text() -> String {
    let limit = escape_markdown(&format_size_mb(*config::MAX_FILE_SIZE_BYTES));
    format!(
        "👋 *Send me a media link and I will fetch it for you\\.*\n\n\
         I understand YouTube, SoundCloud, Vimeo, Twitter, Instagram, TikTok \
         and most other pages yt\\-dlp can read\\.\n\n\
         🎵 Audio comes back as mp3, 🎬 video as mp4\\.\n\
         📦 Files up to {} fit through; anything bigger is rejected\\.\n\n\
         /help shows this text again\\.\n\
         /cancel stops a running download\\.",
        limit
    )
}
