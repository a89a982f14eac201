//! Telegram bot integration and handlers

pub mod bot;
pub mod handlers;
pub mod markdown;
pub mod menu;

// Re-exports for convenience
pub use bot::{create_bot, setup_bot_commands, welcome_text, Command};
pub use handlers::{schema, HandlerDeps, HandlerError};
pub use markdown::escape_markdown;
pub use menu::render_menu;
