//! The format/quality menu shown under a probed link.
//!
//! Each menu state maps 1:1 to a keyboard layout. The menu lives in one chat
//! message per session and is edited in place on every transition, never
//! duplicated.

use crate::core::utils::format_duration;
use crate::session::{CallbackAction, FormatTag, MenuState, SessionStore};
use crate::telegram::markdown::escape_markdown;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, ParseMode};

/// Bitrates offered in the audio menu, in button order.
pub const AUDIO_BITRATES: [u32; 3] = [128, 192, 320];

/// Builds the keyboard for a menu state, binding every button to the session.
pub fn keyboard_for(state: MenuState, session_key: &str) -> InlineKeyboardMarkup {
    let button = |label: &str, action: CallbackAction| {
        InlineKeyboardButton::callback(label.to_string(), action.encode(session_key))
    };

    match state {
        MenuState::AwaitingTopChoice => InlineKeyboardMarkup::new(vec![
            vec![
                button("🎵 Audio", CallbackAction::AudioMenu),
                button("🎬 Video", CallbackAction::VideoMenu),
            ],
            vec![button("❌ Cancel", CallbackAction::Cancel)],
        ]),
        MenuState::AudioMenu => {
            let bitrates = AUDIO_BITRATES
                .iter()
                .map(|b| {
                    button(
                        &format!("{} kbps", b),
                        CallbackAction::Format(FormatTag::Audio { bitrate: *b }),
                    )
                })
                .collect();
            InlineKeyboardMarkup::new(vec![
                bitrates,
                vec![
                    button("⬅️ Back", CallbackAction::MainMenu),
                    button("❌ Cancel", CallbackAction::Cancel),
                ],
            ])
        }
        MenuState::VideoMenu => InlineKeyboardMarkup::new(vec![
            vec![
                button("480p", CallbackAction::Format(FormatTag::Video { height: Some(480) })),
                button("720p", CallbackAction::Format(FormatTag::Video { height: Some(720) })),
            ],
            vec![
                button("1080p", CallbackAction::Format(FormatTag::Video { height: Some(1080) })),
                button("✨ Best", CallbackAction::Format(FormatTag::Video { height: None })),
            ],
            vec![
                button("⬅️ Back", CallbackAction::MainMenu),
                button("❌ Cancel", CallbackAction::Cancel),
            ],
        ]),
        // Terminal state: the message keeps its text, the buttons go away.
        MenuState::Cancelled => InlineKeyboardMarkup::new(Vec::<Vec<InlineKeyboardButton>>::new()),
    }
}

/// Renders the MarkdownV2 body above the keyboard.
pub fn menu_text(state: MenuState, title: &str, platform: &str, duration: u32) -> String {
    if state == MenuState::Cancelled {
        return "❌ Cancelled\\.".to_string();
    }

    let prompt = match state {
        MenuState::AudioMenu => "Pick an audio bitrate:",
        MenuState::VideoMenu => "Pick a video quality:",
        _ => "What should I fetch?",
    };

    let mut s = String::with_capacity(title.len() + 96);
    s.push_str("🎯 *");
    s.push_str(&escape_markdown(title));
    s.push_str("*\n");
    s.push_str(&escape_markdown(platform));
    if duration > 0 {
        s.push_str(" · ");
        s.push_str(&escape_markdown(&format_duration(duration)));
    }
    s.push_str("\n\n");
    s.push_str(prompt);
    s
}

/// Shows the session's current menu state, editing the existing menu message
/// in place when there is one.
///
/// A vanished session is not an error here; the caller already answered the
/// user elsewhere.
pub async fn render_menu(bot: &Bot, store: &SessionStore, session_key: &str) -> ResponseResult<()> {
    let Some(session) = store.get(session_key).await else {
        log::debug!("Menu render skipped, session {} is gone", session_key);
        return Ok(());
    };

    let text = menu_text(session.menu_state, &session.title, &session.platform, session.duration);
    let keyboard = keyboard_for(session.menu_state, session_key);

    if let Some(menu_id) = session.menu_message {
        match bot
            .edit_message_text(session.chat_id, menu_id, text)
            .parse_mode(ParseMode::MarkdownV2)
            .reply_markup(keyboard)
            .await
        {
            Ok(_) => {}
            Err(e) if e.to_string().contains("message is not modified") => {}
            Err(e) => log::warn!("Failed to edit menu message for session {}: {}", session_key, e),
        }
        return Ok(());
    }

    let msg = bot
        .send_message(session.chat_id, text)
        .parse_mode(ParseMode::MarkdownV2)
        .reply_markup(keyboard)
        .await?;
    store.update(session_key, |s| s.menu_message = Some(msg.id)).await;
    Ok(())
}
