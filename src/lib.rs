//! Tugboat - Telegram bot that fetches audio and video from media links
//!
//! This library provides all the functionality for the Tugboat bot:
//! link validation, metadata probing, the quality menu, supervised
//! yt-dlp downloads with progress reporting, and media delivery.
//!
//! # Module Structure
//!
//! - `core`: Errors, logging, utilities, and input validation
//! - `session`: Per-link session state and the in-memory store
//! - `download`: Probing, size estimation, supervision, and delivery
//! - `telegram`: Bot setup, handlers, menus, and message formatting

pub mod cli;
pub mod config;
pub mod core;
pub mod download;
pub mod session;
pub mod telegram;

// Re-export commonly used types for convenience
pub use self::core::{AppError, AppResult};
pub use self::download::{start_download, DownloadOutcome, MediaInfo};
pub use self::session::{DownloadSession, FormatTag, SessionStore};
pub use self::telegram::{create_bot, schema, HandlerDeps};
