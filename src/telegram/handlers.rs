//! Telegram bot handler tree configuration
//!
//! This module provides the main dispatcher schema for the bot. The handlers
//! are organized in a testable way, allowing integration tests to use the
//! same handler tree as production code.

use teloxide::dispatching::{UpdateFilterExt, UpdateHandler};
use teloxide::prelude::*;
use teloxide::types::{CallbackQueryId, Message, ParseMode};

use crate::config;
use crate::core::validation::{extract_url, validate_url};
use crate::download::metadata;
use crate::session::{CallbackAction, DownloadSession, MenuState, SessionStore};
use crate::telegram::bot::{welcome_text, Command};
use crate::telegram::menu::{keyboard_for, menu_text, render_menu};

/// Error type for handlers
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Dependencies required by handlers
#[derive(Clone)]
pub struct HandlerDeps {
    pub store: SessionStore,
}

/// Builds the full update handler tree.
pub fn schema(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    let deps_commands = deps.clone();
    let deps_messages = deps.clone();
    let deps_callbacks = deps;

    dptree::entry()
        // Commands take precedence over the plain-text link path
        .branch(command_handler(deps_commands))
        // Message handler for links
        .branch(message_handler(deps_messages))
        // Callback query handler for menu buttons
        .branch(callback_handler(deps_callbacks))
}

/// Handler for bot commands
fn command_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message().branch(dptree::entry().filter_command::<Command>().endpoint(
        move |bot: Bot, msg: Message, cmd: Command| {
            let deps = deps.clone();
            async move {
                log::info!("Received command {:?} from chat {}", cmd, msg.chat.id);

                match cmd {
                    Command::Start | Command::Help => {
                        bot.send_message(msg.chat.id, welcome_text())
                            .parse_mode(ParseMode::MarkdownV2)
                            .await?;
                    }
                    Command::Cancel => {
                        handle_cancel_command(&bot, &msg, &deps.store).await?;
                    }
                }
                Ok(())
            }
        },
    ))
}

/// Handler for plain text messages carrying a media link
fn message_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message().endpoint(move |bot: Bot, msg: Message| {
        let deps = deps.clone();
        async move {
            let Some(text) = msg.text() else {
                return Ok(());
            };

            let Some(candidate) = extract_url(text) else {
                bot.send_message(
                    msg.chat.id,
                    "Send me a media link (https://...) to get started, or /help.",
                )
                .await?;
                return Ok(());
            };

            let url = match validate_url(candidate) {
                Ok(url) => url,
                Err(e) => {
                    log::warn!("Rejected link from chat {}: {}", msg.chat.id, e);
                    bot.send_message(msg.chat.id, format!("That link does not look right: {}", e))
                        .await?;
                    return Ok(());
                }
            };

            log::info!("Probing {} for chat {}", url, msg.chat.id);
            let info = metadata::probe(&config::YTDLP_BIN, &url).await;

            let session = DownloadSession::new(msg.chat.id, url.to_string(), &info);
            let key = deps.store.create(session).await;
            render_menu(&bot, &deps.store, &key).await?;
            Ok(())
        }
    })
}

/// Handler for callback queries (inline keyboard buttons)
fn callback_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_callback_query().endpoint(move |bot: Bot, q: CallbackQuery| {
        let deps = deps.clone();
        async move {
            handle_callback(&bot, q, &deps.store).await?;
            Ok(())
        }
    })
}

async fn handle_callback(bot: &Bot, q: CallbackQuery, store: &SessionStore) -> ResponseResult<()> {
    let callback_id = q.id.clone();
    let chat_id = q.message.as_ref().map(|m| m.chat().id);

    let Some(data) = q.data else {
        bot.answer_callback_query(callback_id).await?;
        return Ok(());
    };

    let Some((action, key)) = CallbackAction::parse(&data) else {
        log::warn!("Unparseable callback payload: {}", data);
        bot.answer_callback_query(callback_id).text("Unknown action.").await?;
        return Ok(());
    };

    let Some(chat_id) = chat_id else {
        // The originating message is too old for Telegram to include.
        bot.answer_callback_query(callback_id).await?;
        return Ok(());
    };

    let Some(session) = store.get(key).await else {
        bot.answer_callback_query(callback_id)
            .text("This session has expired. Send the link again.")
            .show_alert(true)
            .await?;
        return Ok(());
    };

    match action {
        CallbackAction::AudioMenu | CallbackAction::VideoMenu | CallbackAction::MainMenu => {
            let next = session.menu_state.apply(&action);
            store.update(key, |s| s.menu_state = next).await;
            bot.answer_callback_query(callback_id).await?;
            render_menu(bot, store, key).await?;
        }
        CallbackAction::Cancel => {
            handle_cancel_callback(bot, callback_id, chat_id, store, key, session).await?;
        }
        CallbackAction::Format(tag) => {
            log::info!("Chat {} picked {} for session {}", chat_id, tag.quality_label(), key);
            bot.answer_callback_query(callback_id).await?;
            tokio::spawn(crate::download::start_download(
                bot.clone(),
                store.clone(),
                key.to_string(),
                chat_id,
                tag,
            ));
        }
    }
    Ok(())
}

/// Cancels the chat's running download, if any.
async fn handle_cancel_command(
    bot: &Bot,
    msg: &Message,
    store: &SessionStore,
) -> ResponseResult<()> {
    match store.take_active_download(msg.chat.id).await {
        Some((key, session)) => {
            let signalled = session.handle.as_ref().is_some_and(|h| h.terminate());
            if signalled {
                log::info!("Cancel command stopped the download for session {}", key);
            } else {
                log::warn!("Cancel command raced a finished download for session {}", key);
            }
            bot.send_message(msg.chat.id, format!("❌ Download cancelled: {}", session.title))
                .await?;
        }
        None => {
            bot.send_message(msg.chat.id, "No active download to cancel.").await?;
        }
    }
    Ok(())
}

/// Cancels a session from its menu button, whether or not a download is
/// running yet. The session is removed first so the key cannot be reused.
async fn handle_cancel_callback(
    bot: &Bot,
    callback_id: CallbackQueryId,
    chat_id: ChatId,
    store: &SessionStore,
    key: &str,
    session: DownloadSession,
) -> ResponseResult<()> {
    store.remove(key).await;
    if let Some(handle) = session.handle.as_ref() {
        if handle.terminate() {
            log::info!("Cancel button stopped the download for session {}", key);
        }
    }
    bot.answer_callback_query(callback_id).await?;

    let text = menu_text(MenuState::Cancelled, &session.title, &session.platform, session.duration);
    if let Some(menu_id) = session.menu_message {
        match bot
            .edit_message_text(chat_id, menu_id, text)
            .parse_mode(ParseMode::MarkdownV2)
            .reply_markup(keyboard_for(MenuState::Cancelled, key))
            .await
        {
            Ok(_) => {}
            Err(e) if e.to_string().contains("message is not modified") => {}
            Err(e) => log::warn!("Failed to edit cancelled menu for session {}: {}", key, e),
        }
    } else {
        bot.send_message(chat_id, text).parse_mode(ParseMode::MarkdownV2).await?;
    }
    Ok(())
}
