use anyhow::Result;
use dotenvy::dotenv;
use std::path::{Path, PathBuf};
use std::time::Duration;
use teloxide::prelude::*;
use tokio::time::sleep;

use tugboat::cli::{Cli, Commands};
use tugboat::config;
use tugboat::core::utils::format_size_mb;
use tugboat::core::validation::validate_url;
use tugboat::core::{init_logger, log_extractor_configuration};
use tugboat::download::command::download_args;
use tugboat::download::metadata;
use tugboat::download::progress::render_progress_bar;
use tugboat::download::supervisor::{classify_outcome, destination_path, spawn_supervised};
use tugboat::download::DownloadOutcome;
use tugboat::session::{FormatTag, SessionStore};
use tugboat::telegram::{create_bot, schema, setup_bot_commands, HandlerDeps};

/// Main entry point for the Telegram bot
///
/// Parses CLI arguments and dispatches to the appropriate subcommand.
///
/// # Errors
/// Returns an error if initialization fails (logging, bot creation).
#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Load environment variables from .env before any config static is read
    let _ = dotenv();

    // Set up global panic handler to catch panics in dispatcher
    // This allows us to log the panic and continue working instead of terminating
    std::panic::set_hook(Box::new(|panic_info| {
        log::error!("Panic caught: {:?}", panic_info);
        if let Some(location) = panic_info.location() {
            log::error!("Panic at {}:{}:{}", location.file(), location.line(), location.column());
        }
        if let Some(msg) = panic_info.payload().downcast_ref::<&str>() {
            log::error!("Panic message: {}", msg);
        }
    }));

    // Initialize logger (console + file)
    init_logger(&config::LOG_FILE_PATH)?;

    // Dispatch to appropriate command
    match cli.command {
        Some(Commands::Run) | None => run_bot().await,
        Some(Commands::Download { url, format, output }) => {
            run_cli_download(url, format, output).await
        }
        Some(Commands::Info { url }) => run_cli_info(url).await,
    }
}

/// Run the Telegram bot
async fn run_bot() -> Result<()> {
    let bot_init_start = std::time::Instant::now();
    log::info!("Starting bot...");

    // Log extractor configuration at startup
    log_extractor_configuration();

    // Create bot instance
    let bot = create_bot()?;

    // Get bot information to confirm the token works.
    // Retry if the Bot API is still initializing or unreachable.
    let bot_info = {
        let startup_max_retries = 12; // one minute at 5s per attempt
        let mut startup_retry = 0;
        loop {
            match bot.get_me().await {
                Ok(info) => break info,
                Err(e) => {
                    startup_retry += 1;
                    if startup_retry >= startup_max_retries {
                        return Err(anyhow::anyhow!(
                            "Failed to connect to the Bot API after {} attempts: {}",
                            startup_retry,
                            e
                        ));
                    }
                    log::warn!(
                        "Bot API not ready (attempt {}/{}): {}. Retrying in 5 seconds...",
                        startup_retry,
                        startup_max_retries,
                        e
                    );
                    sleep(Duration::from_secs(5)).await;
                }
            }
        }
    };
    log::info!("Bot username: {:?}, Bot ID: {}", bot_info.username.as_deref(), bot_info.id);

    // Register the command list shown in the Telegram UI
    if let Err(e) = setup_bot_commands(&bot).await {
        log::warn!("Failed to set bot commands: {}. Continuing anyway.", e);
    }

    let store = SessionStore::new();
    let handler = schema(HandlerDeps { store });

    let init_elapsed = bot_init_start.elapsed();
    log::info!("================================================");
    log::info!("🎉 Bot initialization complete in {:.2}s", init_elapsed.as_secs_f64());
    log::info!("📡 Ready to receive updates!");
    log::info!("================================================");

    Dispatcher::builder(bot, handler)
        .dependencies(DependencyMap::new())
        .enable_ctrlc_handler()
        .default_handler(|upd| async move {
            log::warn!("Unhandled update: {:?}", upd);
        })
        .error_handler(LoggingErrorHandler::with_custom_text(
            "An error has occurred in the dispatcher",
        ))
        .build()
        .dispatch()
        .await;

    log::info!("Dispatcher shut down gracefully");
    Ok(())
}

/// Run CLI download command
async fn run_cli_download(url: String, format: String, output: Option<String>) -> Result<()> {
    use std::io::Write;

    let tag = FormatTag::parse(&format).ok_or_else(|| {
        anyhow::anyhow!(
            "Unknown format tag: {}. Use audio_<bitrate>, video_<height> or video_best.",
            format
        )
    })?;
    let url = validate_url(&url).map_err(|e| anyhow::anyhow!("Invalid link: {}", e))?;

    println!("🎬 Tugboat CLI Download");
    println!("=======================");
    println!("URL: {}", url);
    println!("Format: {}", tag.quality_label());

    let info = metadata::probe(&config::YTDLP_BIN, &url).await;
    println!("Title: {}", info.title);

    let dest = match output {
        Some(path) => PathBuf::from(path),
        None => destination_path(Path::new("."), &info.clean_title, &tag),
    };
    let args = download_args(&tag, &url, &dest);

    println!("📥 Downloading to {}...", dest.display());

    // The sender never fires here; the binding keeps the channel open for
    // the lifetime of the download.
    let (_kill_tx, kill_rx) = tokio::sync::mpsc::unbounded_channel();
    let (mut progress_rx, exit_handle) = spawn_supervised(&config::YTDLP_BIN, &args, kill_rx)
        .map_err(|e| anyhow::anyhow!("Could not start the download: {}", e))?;

    while let Some(percent) = progress_rx.recv().await {
        print!("\r{} {:>3}%", render_progress_bar(percent), percent);
        let _ = std::io::stdout().flush();
    }
    println!();

    let exit = match exit_handle.await {
        Ok(exit) => exit,
        Err(e) => {
            return Err(anyhow::anyhow!("Download task failed: {}", e));
        }
    };

    let file_size = tokio::fs::metadata(&dest).await.ok().map(|m| m.len());
    match classify_outcome(exit, file_size, *config::MAX_FILE_SIZE_BYTES, None) {
        DownloadOutcome::Completed { size_bytes } => {
            println!("✅ Download completed: {} ({})", dest.display(), format_size_mb(size_bytes));
            Ok(())
        }
        DownloadOutcome::TooLarge { actual, .. } => {
            // Nothing is uploaded here, so the file stays on disk.
            println!(
                "⚠️ File is {} which exceeds the bot's {} upload limit; kept on disk at {}",
                format_size_mb(actual),
                format_size_mb(*config::MAX_FILE_SIZE_BYTES),
                dest.display()
            );
            Ok(())
        }
        DownloadOutcome::Failed { reason } => Err(anyhow::anyhow!("Download failed: {}", reason)),
        DownloadOutcome::Cancelled => Err(anyhow::anyhow!("Download was interrupted")),
    }
}

/// Run CLI info command
async fn run_cli_info(url: String) -> Result<()> {
    let url = validate_url(&url).map_err(|e| anyhow::anyhow!("Invalid link: {}", e))?;

    println!("🎬 Media Information");
    println!("====================");
    println!("URL: {}\n", url);

    let info = metadata::probe(&config::YTDLP_BIN, &url).await;

    println!("Title: {}", info.title);
    println!("Platform: {}", info.platform);
    if info.duration > 0 {
        println!("Duration: {}", tugboat::core::utils::format_duration(info.duration));
    }
    println!("Extension: {}", info.ext);
    if let Some(thumbnail) = info.thumbnail {
        println!("Thumbnail: {}", thumbnail);
    }
    Ok(())
}
