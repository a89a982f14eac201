//! Runtime configuration, read once from the environment.
//!
//! Values are resolved lazily on first use, after `main` has loaded `.env`.

use once_cell::sync::Lazy;
use std::env;
use std::time::Duration;

/// Bot API token. `BOT_TOKEN` wins, `TELOXIDE_TOKEN` is accepted as a
/// fallback. Empty means the bot cannot start.
pub static BOT_TOKEN: Lazy<String> = Lazy::new(|| {
    env::var("BOT_TOKEN")
        .or_else(|_| env::var("TELOXIDE_TOKEN"))
        .unwrap_or_default()
});

/// Extraction tool binary. A bare name is resolved through `PATH`.
pub static YTDLP_BIN: Lazy<String> =
    Lazy::new(|| env::var("YTDLP_BIN").unwrap_or_else(|_| "yt-dlp".to_string()));

/// Directory downloads are written to before delivery.
pub static DOWNLOAD_DIR: Lazy<String> = Lazy::new(|| {
    env::var("DOWNLOAD_DIR")
        .map(|path| shellexpand::tilde(&path).into_owned())
        .unwrap_or_else(|_| env::temp_dir().to_string_lossy().into_owned())
});

/// Log file next to the terminal logger.
pub static LOG_FILE_PATH: Lazy<String> =
    Lazy::new(|| env::var("LOG_FILE_PATH").unwrap_or_else(|_| "tugboat.log".to_string()));

/// Hard ceiling on delivered file size, in bytes. Default 50 MiB, the Bot
/// API upload limit.
pub static MAX_FILE_SIZE_BYTES: Lazy<u64> = Lazy::new(|| {
    env::var("MAX_FILE_SIZE_BYTES")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(50 * 1024 * 1024)
});

/// Minimum percentage-point change between two progress message edits.
pub static PROGRESS_MIN_DELTA: Lazy<u8> = Lazy::new(|| {
    env::var("PROGRESS_MIN_DELTA")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(5)
});

/// Minimum time between two progress message edits, in milliseconds.
pub static PROGRESS_MIN_INTERVAL_MS: Lazy<u64> = Lazy::new(|| {
    env::var("PROGRESS_MIN_INTERVAL_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000)
});

/// Timeouts for metadata and size probes.
pub mod probe {
    use super::Duration;

    pub const METADATA_TIMEOUT_SECS: u64 = 30;
    pub const ESTIMATE_TIMEOUT_SECS: u64 = 30;

    pub fn metadata_timeout() -> Duration {
        Duration::from_secs(METADATA_TIMEOUT_SECS)
    }

    pub fn estimate_timeout() -> Duration {
        Duration::from_secs(ESTIMATE_TIMEOUT_SECS)
    }
}

/// HTTP client timeouts.
pub mod network {
    use super::Duration;

    /// Bot API client timeout. Long because file uploads ride on it.
    pub const REQUEST_TIMEOUT_SECS: u64 = 900;
    /// Content-Length probe timeout.
    pub const HEAD_TIMEOUT_SECS: u64 = 15;

    pub fn request_timeout() -> Duration {
        Duration::from_secs(REQUEST_TIMEOUT_SECS)
    }

    pub fn head_timeout() -> Duration {
        Duration::from_secs(HEAD_TIMEOUT_SECS)
    }
}

/// Upload indicator cadence.
pub mod upload {
    use super::Duration;

    /// Telegram drops a chat action after ~5 s; refresh just under that.
    pub const CHAT_ACTION_REFRESH_SECS: u64 = 4;

    pub fn chat_action_refresh() -> Duration {
        Duration::from_secs(CHAT_ACTION_REFRESH_SECS)
    }
}
