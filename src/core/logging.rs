//! Logging initialization and startup diagnostics
//!
//! This module provides:
//! - Logger initialization (console + file)
//! - Extraction tool and download directory checks at startup

use anyhow::Result;
use simplelog::*;
use std::fs::File;
use std::path::Path;
use std::process::Command;

use crate::config;

/// Initialize logger for both console and file output
///
/// If the log file cannot be created the logger degrades to terminal-only
/// output instead of failing startup.
pub fn init_logger(log_file_path: &str) -> Result<()> {
    let term_logger = TermLogger::new(
        LevelFilter::Info,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    );

    match File::create(log_file_path) {
        Ok(log_file) => CombinedLogger::init(vec![
            term_logger,
            WriteLogger::new(LevelFilter::Info, Config::default(), log_file),
        ]),
        Err(e) => {
            eprintln!(
                "Could not create log file {}: {}. Logging to terminal only.",
                log_file_path, e
            );
            CombinedLogger::init(vec![term_logger])
        }
    }
    .map_err(|e| anyhow::anyhow!("Failed to initialize logger: {}", e))?;

    Ok(())
}

/// Logs extraction tool configuration at application startup
///
/// Verifies that the configured binary is runnable and that the download
/// directory exists and is writable, so misconfiguration shows up in the
/// log before the first user hits it.
pub fn log_extractor_configuration() {
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let bin = config::YTDLP_BIN.as_str();
    match Command::new(bin).arg("--version").output() {
        Ok(output) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
            log::info!("✅ Extractor: {} ({})", bin, version);
        }
        Ok(output) => {
            log::warn!("⚠️ Extractor {} exited with {}", bin, output.status);
        }
        Err(e) => {
            log::warn!(
                "⚠️ Extractor {} not runnable: {}. Downloads will fall back to youtube-dl.",
                bin,
                e
            );
        }
    }

    let dir = config::DOWNLOAD_DIR.as_str();
    if let Err(e) = std::fs::create_dir_all(dir) {
        log::error!("❌ Download directory {} is not usable: {}", dir, e);
    } else {
        let probe = Path::new(dir).join(".tugboat_write_check");
        match std::fs::write(&probe, b"ok") {
            Ok(()) => {
                let _ = std::fs::remove_file(&probe);
                log::info!("✅ Download directory: {}", dir);
            }
            Err(e) => log::error!("❌ Download directory {} is not writable: {}", dir, e),
        }
    }

    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}
