// Download core - orchestration, progress tracking, metadata
// normalization, and artifact lifecycle

pub mod artifact;
pub mod errors;
pub mod formats;
pub mod models;
pub mod orchestrator;
pub mod progress;
pub mod traits;

pub use artifact::Artifact;
pub use errors::DownloadError;
pub use models::{AudioInfo, ProgressSnapshot, VideoInfo};
pub use orchestrator::Orchestrator;
pub use progress::JobRegistry;
pub use traits::{MediaProvider, ProviderEvent, TransferRequest};
