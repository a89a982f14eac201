//! Download pipeline: probing, estimation, supervision, delivery

pub mod command;
pub mod estimate;
pub mod metadata;
pub mod progress;
pub mod send;
pub mod supervisor;

// Re-exports for convenience
pub use estimate::SizeEstimate;
pub use metadata::MediaInfo;
pub use progress::{ProgressGate, ProgressMessage};
pub use supervisor::{DownloadOutcome, SupervisedExit, start_download};
