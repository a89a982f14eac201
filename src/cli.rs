use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tugboat")]
#[command(author, version, about = "Telegram bot that fetches audio and video from media links", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the bot in normal mode
    Run,

    /// Download a link straight to disk, without the bot
    Download {
        /// Media link to download
        url: String,

        /// Format tag, e.g. audio_192, video_720, video_best
        #[arg(short, long, default_value = "audio_192")]
        format: String,

        /// Output path override
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Probe a link and print its metadata
    Info {
        /// Media link to probe
        url: String,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
