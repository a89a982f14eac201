//! Download sessions and the inline-button protocol bound to them
//!
//! A session is created when a user sends a link and lives until delivery,
//! a terminal failure, or cancellation. All mutation goes through
//! [`SessionStore`]; handlers and the download supervisor re-fetch by key
//! after every await point instead of holding references.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use teloxide::types::{ChatId, MessageId};
use tokio::sync::{Mutex, mpsc};
use uuid::Uuid;

use crate::download::metadata::MediaInfo;

/// A user's quality choice, carried in button payloads as `audio_<bitrate>`
/// or `video_<height|best>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatTag {
    Audio { bitrate: u32 },
    /// `height: None` means "best available".
    Video { height: Option<u32> },
}

impl FormatTag {
    /// Parses a tag like `audio_192`, `video_480` or `video_best`. Zero
    /// bitrates and heights are rejected along with anything malformed.
    pub fn parse(tag: &str) -> Option<Self> {
        if let Some(bitrate) = tag.strip_prefix("audio_") {
            return bitrate
                .parse()
                .ok()
                .filter(|b| *b > 0)
                .map(|bitrate| FormatTag::Audio { bitrate });
        }
        if let Some(height) = tag.strip_prefix("video_") {
            if height == "best" {
                return Some(FormatTag::Video { height: None });
            }
            return height
                .parse()
                .ok()
                .filter(|h| *h > 0)
                .map(|height| FormatTag::Video { height: Some(height) });
        }
        None
    }

    /// The wire form, inverse of [`FormatTag::parse`].
    pub fn as_tag(&self) -> String {
        match self {
            FormatTag::Audio { bitrate } => format!("audio_{}", bitrate),
            FormatTag::Video { height: Some(height) } => format!("video_{}", height),
            FormatTag::Video { height: None } => "video_best".to_string(),
        }
    }

    /// Human-readable quality label used in captions and menus.
    pub fn quality_label(&self) -> String {
        match self {
            FormatTag::Audio { bitrate } => format!("{}kbps", bitrate),
            FormatTag::Video { height: Some(height) } => format!("{}p", height),
            FormatTag::Video { height: None } => "best".to_string(),
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self, FormatTag::Video { .. })
    }

    /// Container extension of the delivered file.
    pub fn file_ext(&self) -> &'static str {
        if self.is_video() { "mp4" } else { "mp3" }
    }
}

/// A parsed inline-button payload. The wire form is `<kind>|<session key>`;
/// unknown kinds are rejected at parse time so handlers never see them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    AudioMenu,
    VideoMenu,
    MainMenu,
    Cancel,
    Format(FormatTag),
}

impl CallbackAction {
    /// Parses `action|session_key` into an action and the key it targets.
    pub fn parse(data: &str) -> Option<(CallbackAction, &str)> {
        let (kind, session_key) = data.split_once('|')?;
        if session_key.is_empty() {
            return None;
        }
        let action = match kind {
            "menu_audio" => CallbackAction::AudioMenu,
            "menu_video" => CallbackAction::VideoMenu,
            "menu_main" => CallbackAction::MainMenu,
            "cancel" => CallbackAction::Cancel,
            tag => CallbackAction::Format(FormatTag::parse(tag)?),
        };
        Some((action, session_key))
    }

    /// Encodes the payload for an inline button. Stays well under the
    /// 64-byte callback-data limit with a UUID key.
    pub fn encode(&self, session_key: &str) -> String {
        let kind = match self {
            CallbackAction::AudioMenu => "menu_audio".to_string(),
            CallbackAction::VideoMenu => "menu_video".to_string(),
            CallbackAction::MainMenu => "menu_main".to_string(),
            CallbackAction::Cancel => "cancel".to_string(),
            CallbackAction::Format(tag) => tag.as_tag(),
        };
        format!("{}|{}", kind, session_key)
    }
}

/// Which set of choices the session's menu message currently shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MenuState {
    #[default]
    AwaitingTopChoice,
    AudioMenu,
    VideoMenu,
    Cancelled,
}

impl MenuState {
    /// Applies a navigation action. `Cancelled` is terminal and absorbs
    /// every action; a quality pick is a hand-off, not a state change.
    pub fn apply(self, action: &CallbackAction) -> MenuState {
        if self == MenuState::Cancelled {
            return self;
        }
        match action {
            CallbackAction::AudioMenu => MenuState::AudioMenu,
            CallbackAction::VideoMenu => MenuState::VideoMenu,
            CallbackAction::MainMenu => MenuState::AwaitingTopChoice,
            CallbackAction::Cancel => MenuState::Cancelled,
            CallbackAction::Format(_) => self,
        }
    }
}

/// Cancellation handle for a running download. Cloned freely with the
/// session; all clones signal the same supervising task.
#[derive(Debug, Clone)]
pub struct DownloadHandle {
    kill: mpsc::UnboundedSender<()>,
}

impl DownloadHandle {
    /// Creates the handle and the receiver the supervisor listens on.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<()>) {
        let (kill, rx) = mpsc::unbounded_channel();
        (Self { kill }, rx)
    }

    /// Signals the supervising task to kill the process immediately, with
    /// no grace period. Returns false when the download already reached a
    /// terminal state and nobody is listening.
    pub fn terminate(&self) -> bool {
        self.kill.send(()).is_ok()
    }
}

/// One user interaction with one media link, from URL receipt to delivery
/// or cancellation.
#[derive(Debug, Clone)]
pub struct DownloadSession {
    pub chat_id: ChatId,
    pub url: String,
    pub title: String,
    pub clean_title: String,
    pub platform: String,
    /// Duration in seconds; 0 when the probe could not tell.
    pub duration: u32,
    pub thumbnail: Option<String>,
    pub format: Option<FormatTag>,
    pub menu_state: MenuState,
    /// The menu message, edited in place on every state change.
    pub menu_message: Option<MessageId>,
    /// The progress message; at most one per session.
    pub progress_message: Option<MessageId>,
    /// Present only while an extraction process is running.
    pub handle: Option<DownloadHandle>,
    pub created_at: Instant,
}

impl DownloadSession {
    pub fn new(chat_id: ChatId, url: String, info: &MediaInfo) -> Self {
        Self {
            chat_id,
            url,
            title: info.title.clone(),
            clean_title: info.clean_title.clone(),
            platform: info.platform.clone(),
            duration: info.duration,
            thumbnail: info.thumbnail.clone(),
            format: None,
            menu_state: MenuState::default(),
            menu_message: None,
            progress_message: None,
            handle: None,
            created_at: Instant::now(),
        }
    }
}

/// Keyed in-memory session storage shared by handlers and supervisors.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    inner: Arc<Mutex<HashMap<String, DownloadSession>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a session under a freshly generated random key and returns
    /// the key. Keys are UUIDs, never derived from user input.
    pub async fn create(&self, session: DownloadSession) -> String {
        let key = Uuid::new_v4().to_string();
        self.inner.lock().await.insert(key.clone(), session);
        key
    }

    /// Returns a copy of the session, or `None` when the key is unknown
    /// (expired, cancelled, or never created).
    pub async fn get(&self, key: &str) -> Option<DownloadSession> {
        self.inner.lock().await.get(key).cloned()
    }

    /// Applies `apply` to the stored session and returns its result, or
    /// `None` when the session is gone. Callers treat `None` as expiry.
    pub async fn update<T, F>(&self, key: &str, apply: F) -> Option<T>
    where
        F: FnOnce(&mut DownloadSession) -> T,
    {
        self.inner.lock().await.get_mut(key).map(apply)
    }

    /// Removes the session. Idempotent: removing an unknown key is a no-op
    /// that returns `None`.
    pub async fn remove(&self, key: &str) -> Option<DownloadSession> {
        self.inner.lock().await.remove(key)
    }

    /// Removes and returns the chat's most recently created session that
    /// has a running download, for the /cancel command.
    pub async fn take_active_download(&self, chat_id: ChatId) -> Option<(String, DownloadSession)> {
        let mut sessions = self.inner.lock().await;
        let key = sessions
            .iter()
            .filter(|(_, s)| s.chat_id == chat_id && s.handle.is_some())
            .max_by_key(|(_, s)| s.created_at)
            .map(|(key, _)| key.clone())?;
        let session = sessions.remove(&key)?;
        Some((key, session))
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_tag_parse_audio() {
        assert_eq!(FormatTag::parse("audio_192"), Some(FormatTag::Audio { bitrate: 192 }));
        assert_eq!(FormatTag::parse("audio_320"), Some(FormatTag::Audio { bitrate: 320 }));
        assert_eq!(FormatTag::parse("audio_"), None);
        assert_eq!(FormatTag::parse("audio_0"), None);
        assert_eq!(FormatTag::parse("audio_x"), None);
    }

    #[test]
    fn test_format_tag_parse_video() {
        assert_eq!(FormatTag::parse("video_480"), Some(FormatTag::Video { height: Some(480) }));
        assert_eq!(FormatTag::parse("video_best"), Some(FormatTag::Video { height: None }));
        assert_eq!(FormatTag::parse("video_"), None);
        assert_eq!(FormatTag::parse("mp3_192"), None);
    }

    #[test]
    fn test_format_tag_round_trip() {
        for tag in ["audio_128", "audio_192", "video_720", "video_best"] {
            let parsed = FormatTag::parse(tag).unwrap();
            assert_eq!(parsed.as_tag(), tag);
        }
    }

    #[test]
    fn test_quality_labels() {
        assert_eq!(FormatTag::Audio { bitrate: 192 }.quality_label(), "192kbps");
        assert_eq!(FormatTag::Video { height: Some(480) }.quality_label(), "480p");
        assert_eq!(FormatTag::Video { height: None }.quality_label(), "best");
    }

    #[test]
    fn test_file_ext_follows_kind() {
        assert_eq!(FormatTag::Audio { bitrate: 128 }.file_ext(), "mp3");
        assert_eq!(FormatTag::Video { height: None }.file_ext(), "mp4");
    }

    #[test]
    fn test_callback_action_parse() {
        let key = "3f2a77f0-1111-2222-3333-444455556666";

        let data = format!("menu_audio|{}", key);
        let (action, parsed_key) = CallbackAction::parse(&data).unwrap();
        assert_eq!(action, CallbackAction::AudioMenu);
        assert_eq!(parsed_key, key);

        let (action, _) = CallbackAction::parse(&format!("audio_192|{}", key)).unwrap();
        assert_eq!(action, CallbackAction::Format(FormatTag::Audio { bitrate: 192 }));
    }

    #[test]
    fn test_callback_action_rejects_malformed() {
        assert_eq!(CallbackAction::parse("menu_audio"), None); // no separator
        assert_eq!(CallbackAction::parse("menu_audio|"), None); // empty key
        assert_eq!(CallbackAction::parse("withdraw_all|key"), None); // unknown kind
        assert_eq!(CallbackAction::parse("audio_abc|key"), None); // bad tag
    }

    #[test]
    fn test_callback_action_encode_round_trip() {
        let key = "some-session-key";
        let actions = [
            CallbackAction::AudioMenu,
            CallbackAction::VideoMenu,
            CallbackAction::MainMenu,
            CallbackAction::Cancel,
            CallbackAction::Format(FormatTag::Video { height: Some(1080) }),
        ];
        for action in actions {
            let encoded = action.encode(key);
            let (parsed, parsed_key) = CallbackAction::parse(&encoded).unwrap();
            assert_eq!(parsed, action);
            assert_eq!(parsed_key, key);
        }
    }

    #[test]
    fn test_menu_state_transitions() {
        let top = MenuState::AwaitingTopChoice;
        assert_eq!(top.apply(&CallbackAction::AudioMenu), MenuState::AudioMenu);
        assert_eq!(top.apply(&CallbackAction::VideoMenu), MenuState::VideoMenu);
        assert_eq!(MenuState::AudioMenu.apply(&CallbackAction::MainMenu), top);
        assert_eq!(MenuState::VideoMenu.apply(&CallbackAction::Cancel), MenuState::Cancelled);
    }

    #[test]
    fn test_cancelled_state_is_terminal() {
        let cancelled = MenuState::Cancelled;
        for action in [
            CallbackAction::AudioMenu,
            CallbackAction::VideoMenu,
            CallbackAction::MainMenu,
            CallbackAction::Cancel,
            CallbackAction::Format(FormatTag::Audio { bitrate: 192 }),
        ] {
            assert_eq!(cancelled.apply(&action), MenuState::Cancelled);
        }
    }

    #[test]
    fn test_quality_pick_is_not_a_menu_transition() {
        let pick = CallbackAction::Format(FormatTag::Audio { bitrate: 192 });
        assert_eq!(MenuState::AudioMenu.apply(&pick), MenuState::AudioMenu);
        assert_eq!(MenuState::VideoMenu.apply(&pick), MenuState::VideoMenu);
    }

    #[test]
    fn test_download_handle_terminate_after_drop() {
        let (handle, rx) = DownloadHandle::channel();
        drop(rx);
        assert!(!handle.terminate());
    }
}
