// Media provider trait definition
//
// The extraction engine is a black box behind this seam: the orchestrator
// only knows how to resolve a URL into metadata and how to run a transfer
// that reports progress over a channel. Keeping the seam narrow makes the
// orchestrator testable with an in-process mock.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use super::models::SourceMetadata;

/// Raw failure signal from the provider (typically collected stderr).
/// Classification into the caller-facing taxonomy happens at the
/// orchestrator boundary, not here.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ProviderFailure(pub String);

/// Progress events emitted during a transfer, in provider order.
#[derive(Debug, Clone)]
pub enum ProviderEvent {
    Downloading {
        /// Percent as printed by the provider (e.g., " 42.3%"); may be
        /// malformed or empty and must be parsed tolerantly
        percent_text: String,
        /// Transfer rate as printed by the provider (e.g., "420.30KiB/s")
        speed_text: String,
        downloaded_bytes: u64,
        total_bytes: Option<u64>,
    },
    /// The byte transfer is done; provider-side post-processing may follow.
    Finished,
}

/// Optional provider-side audio extraction step.
#[derive(Debug, Clone)]
pub struct AudioTranscode {
    /// Target codec (e.g., "mp3")
    pub codec: String,
    /// Target bitrate (e.g., "192K")
    pub bitrate: String,
}

impl AudioTranscode {
    pub fn mp3() -> Self {
        Self {
            codec: "mp3".to_string(),
            bitrate: "192K".to_string(),
        }
    }
}

/// Everything a transfer needs: source, format choice, and where the
/// artifact lands. `output_template` is a provider-style path template
/// (the extension placeholder is filled in by the provider).
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub url: String,
    pub format_spec: String,
    pub output_template: PathBuf,
    pub transcode: Option<AudioTranscode>,
}

/// Trait for media source provider implementations
#[async_trait]
pub trait MediaProvider: Send + Sync {
    /// Name of the provider (for logging)
    fn name(&self) -> &'static str;

    /// Resolve a source URL into metadata without transferring anything.
    async fn resolve(&self, url: &str) -> Result<SourceMetadata, ProviderFailure>;

    /// Run a transfer, emitting progress events on `events` as they occur.
    /// The sender is dropped when the call returns, closing the stream.
    async fn transfer(
        &self,
        request: TransferRequest,
        events: mpsc::UnboundedSender<ProviderEvent>,
    ) -> Result<(), ProviderFailure>;
}
