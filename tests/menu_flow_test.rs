//! Integration tests for menu navigation and callback payloads
//!
//! Run with: cargo test --test menu_flow_test

use teloxide::types::{InlineKeyboardButtonKind, InlineKeyboardMarkup};
use tugboat::session::{CallbackAction, FormatTag, MenuState};
use tugboat::telegram::menu::{AUDIO_BITRATES, keyboard_for, menu_text};

const KEY: &str = "0f8fad5b-d9cb-469f-a165-70867728950e";

fn payloads(kb: &InlineKeyboardMarkup) -> Vec<String> {
    kb.inline_keyboard
        .iter()
        .flatten()
        .filter_map(|b| match &b.kind {
            InlineKeyboardButtonKind::CallbackData(data) => Some(data.clone()),
            _ => None,
        })
        .collect()
}

// ============================================================================
// State Transition Tests
// ============================================================================

mod transition_tests {
    use super::*;

    #[test]
    fn test_default_state_awaits_the_top_choice() {
        assert_eq!(MenuState::default(), MenuState::AwaitingTopChoice);
    }

    #[test]
    fn test_full_navigation_round_trip() {
        let mut state = MenuState::default();

        state = state.apply(&CallbackAction::AudioMenu);
        assert_eq!(state, MenuState::AudioMenu);

        state = state.apply(&CallbackAction::MainMenu);
        assert_eq!(state, MenuState::AwaitingTopChoice);

        state = state.apply(&CallbackAction::VideoMenu);
        assert_eq!(state, MenuState::VideoMenu);
    }

    #[test]
    fn test_format_pick_does_not_move_the_state() {
        let state = MenuState::AudioMenu;
        let after = state.apply(&CallbackAction::Format(FormatTag::Audio { bitrate: 320 }));
        assert_eq!(after, MenuState::AudioMenu);
    }

    #[test]
    fn test_cancelled_absorbs_every_action() {
        let state = MenuState::Cancelled;
        for action in [
            CallbackAction::AudioMenu,
            CallbackAction::VideoMenu,
            CallbackAction::MainMenu,
            CallbackAction::Cancel,
            CallbackAction::Format(FormatTag::Video { height: None }),
        ] {
            assert_eq!(state.apply(&action), MenuState::Cancelled);
        }
    }
}

// ============================================================================
// Payload Encoding Tests
// ============================================================================

mod payload_tests {
    use super::*;

    #[test]
    fn test_encode_parse_round_trip_for_every_action() {
        let actions = [
            CallbackAction::AudioMenu,
            CallbackAction::VideoMenu,
            CallbackAction::MainMenu,
            CallbackAction::Cancel,
            CallbackAction::Format(FormatTag::Audio { bitrate: 128 }),
            CallbackAction::Format(FormatTag::Audio { bitrate: 320 }),
            CallbackAction::Format(FormatTag::Video { height: Some(720) }),
            CallbackAction::Format(FormatTag::Video { height: None }),
        ];

        for action in actions {
            let payload = action.encode(KEY);
            let (parsed, key) = CallbackAction::parse(&payload)
                .unwrap_or_else(|| panic!("payload failed to parse: {}", payload));
            assert_eq!(parsed, action);
            assert_eq!(key, KEY);
        }
    }

    #[test]
    fn test_malformed_payloads_are_rejected() {
        for payload in [
            "",
            "menu_audio",
            "cancel",
            "|only-a-key",
            "bogus|some-key",
            "audio_abc|some-key",
            "video_|some-key",
        ] {
            assert!(
                CallbackAction::parse(payload).is_none(),
                "payload should be rejected: {:?}",
                payload
            );
        }
    }

    #[test]
    fn test_format_tag_labels_and_extensions() {
        let cases: [(FormatTag, &str, &str, bool); 4] = [
            (FormatTag::Audio { bitrate: 192 }, "192kbps", "mp3", false),
            (FormatTag::Audio { bitrate: 320 }, "320kbps", "mp3", false),
            (FormatTag::Video { height: Some(720) }, "720p", "mp4", true),
            (FormatTag::Video { height: None }, "best", "mp4", true),
        ];
        for (tag, label, ext, video) in cases {
            assert_eq!(tag.quality_label(), label);
            assert_eq!(tag.file_ext(), ext);
            assert_eq!(tag.is_video(), video);
        }
    }
}

// ============================================================================
// Keyboard Integrity Tests
// ============================================================================

mod keyboard_tests {
    use super::*;

    #[test]
    fn test_every_state_produces_parseable_payloads() {
        for state in [MenuState::AwaitingTopChoice, MenuState::AudioMenu, MenuState::VideoMenu] {
            let kb = keyboard_for(state, KEY);
            let found = payloads(&kb);
            assert!(!found.is_empty(), "state {:?} has no buttons", state);
            for payload in found {
                let (_, key) = CallbackAction::parse(&payload)
                    .unwrap_or_else(|| panic!("unparseable payload: {}", payload));
                assert_eq!(key, KEY);
            }
        }
    }

    #[test]
    fn test_payloads_fit_the_callback_data_limit() {
        // Telegram rejects callback data over 64 bytes
        for state in [MenuState::AwaitingTopChoice, MenuState::AudioMenu, MenuState::VideoMenu] {
            for payload in payloads(&keyboard_for(state, KEY)) {
                assert!(payload.len() <= 64, "payload too long: {} ({})", payload, payload.len());
            }
        }
    }

    #[test]
    fn test_audio_menu_matches_the_offered_bitrates() {
        let found = payloads(&keyboard_for(MenuState::AudioMenu, KEY));
        for bitrate in AUDIO_BITRATES {
            let expected = CallbackAction::Format(FormatTag::Audio { bitrate }).encode(KEY);
            assert!(found.contains(&expected), "missing bitrate button: {}", bitrate);
        }
    }

    #[test]
    fn test_video_menu_offers_best_and_fixed_heights() {
        let found = payloads(&keyboard_for(MenuState::VideoMenu, KEY));
        for height in [480, 720, 1080] {
            let expected = CallbackAction::Format(FormatTag::Video { height: Some(height) }).encode(KEY);
            assert!(found.contains(&expected), "missing height button: {}", height);
        }
        let best = CallbackAction::Format(FormatTag::Video { height: None }).encode(KEY);
        assert!(found.contains(&best));
    }

    #[test]
    fn test_cancelled_state_has_no_buttons() {
        assert!(keyboard_for(MenuState::Cancelled, KEY).inline_keyboard.is_empty());
    }
}

// ============================================================================
// Menu Text Tests
// ============================================================================

mod text_tests {
    use super::*;

    #[test]
    fn test_text_carries_title_platform_and_duration() {
        let text = menu_text(MenuState::AwaitingTopChoice, "A Song (live)", "youtube", 754);
        assert!(text.contains("A Song \\(live\\)"));
        assert!(text.contains("youtube"));
        assert!(text.contains("12:34"));
    }

    #[test]
    fn test_each_state_has_its_own_prompt() {
        let top = menu_text(MenuState::AwaitingTopChoice, "t", "web", 0);
        let audio = menu_text(MenuState::AudioMenu, "t", "web", 0);
        let video = menu_text(MenuState::VideoMenu, "t", "web", 0);

        assert!(top.contains("What should I fetch?"));
        assert!(audio.contains("Pick an audio bitrate:"));
        assert!(video.contains("Pick a video quality:"));
    }

    #[test]
    fn test_cancelled_text_is_terse() {
        assert_eq!(menu_text(MenuState::Cancelled, "t", "web", 10), "❌ Cancelled\\.");
    }
}
