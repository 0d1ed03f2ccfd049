// Download orchestration
//
// Ties the provider, the job registry, and the artifact lifecycle
// together. Info requests resolve metadata and normalize it; download
// requests additionally run the provider's transfer while a consumer task
// turns its progress events into registry updates, then locate the
// artifact on disk and hand it off for streaming. Every failure path
// purges the job's registry entry before the error is classified, and
// leftover files carrying the job's id prefix are swept best-effort.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;

use super::artifact::Artifact;
use super::errors::DownloadError;
use super::formats::{self, format_file_size, SIZE_PLACEHOLDER};
use super::models::{AudioInfo, JobState, VideoInfo};
use super::progress::{JobRegistry, ProgressPatch};
use super::traits::{AudioTranscode, MediaProvider, ProviderEvent, TransferRequest};

/// Attachment titles are cut to this many characters.
const TITLE_MAX_CHARS: usize = 100;

pub struct Orchestrator {
    provider: Arc<dyn MediaProvider>,
    registry: Arc<JobRegistry>,
    config: Arc<Config>,
    /// Download admission control: no permit, no transfer.
    slots: Arc<Semaphore>,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn MediaProvider>,
        registry: Arc<JobRegistry>,
        config: Arc<Config>,
    ) -> Self {
        let slots = Arc::new(Semaphore::new(config.max_concurrent));
        Self {
            provider,
            registry,
            config,
            slots,
        }
    }

    /// Resolve a URL and normalize its video formats. No job is tracked.
    pub async fn video_info(&self, url: &str) -> Result<VideoInfo, DownloadError> {
        let url = validate_url(url)?;
        let meta = self.provider.resolve(&url).await?;
        Ok(VideoInfo {
            title: display_or(&meta.title, "Unknown"),
            duration: meta.duration_string.unwrap_or_else(|| "Unknown".to_string()),
            uploader: meta.uploader.unwrap_or_else(|| "Unknown".to_string()),
            thumbnail: meta.thumbnail.unwrap_or_default(),
            formats: formats::normalize_video(
                &meta.formats,
                meta.duration,
                self.config.video_format_cap,
            ),
        })
    }

    /// Resolve a URL and normalize its audio-only formats. No job is tracked.
    pub async fn audio_info(&self, url: &str) -> Result<AudioInfo, DownloadError> {
        let url = validate_url(url)?;
        let meta = self.provider.resolve(&url).await?;
        Ok(AudioInfo {
            title: display_or(&meta.title, "Unknown"),
            duration: meta.duration_string.unwrap_or_else(|| "Unknown".to_string()),
            uploader: meta.uploader.unwrap_or_else(|| "Unknown".to_string()),
            thumbnail: meta.thumbnail.unwrap_or_default(),
            audio_formats: formats::normalize_audio(
                &meta.formats,
                meta.duration,
                self.config.audio_format_cap,
            ),
        })
    }

    /// Download a video in the requested quality and return the artifact,
    /// tracked under `job_id` (or a fresh uuid) while in flight.
    pub async fn download_video(
        &self,
        url: &str,
        quality: Option<&str>,
        job_id: Option<String>,
    ) -> Result<Artifact, DownloadError> {
        let format_spec = self.video_format_spec(quality);
        self.download(url, format_spec, job_id, None).await
    }

    /// Download the best audio stream transcoded to mp3.
    pub async fn download_audio(
        &self,
        url: &str,
        job_id: Option<String>,
    ) -> Result<Artifact, DownloadError> {
        self.download(
            url,
            "bestaudio/best".to_string(),
            job_id,
            Some(AudioTranscode::mp3()),
        )
        .await
    }

    async fn download(
        &self,
        url: &str,
        format_spec: String,
        job_id: Option<String>,
        transcode: Option<AudioTranscode>,
    ) -> Result<Artifact, DownloadError> {
        let url = validate_url(url)?;
        let job_id = resolve_job_id(job_id)?;
        let audio = transcode.is_some();

        let _permit = self
            .slots
            .clone()
            .try_acquire_owned()
            .map_err(|_| DownloadError::Busy)?;

        // One metadata pass, solely for the attachment title. Nothing is
        // registered yet, so a resolve failure leaves no trace.
        let meta = self.provider.resolve(&url).await?;
        let fallback = if audio { "audio" } else { "video" };
        let title = sanitize_title(&meta.title, fallback);

        info!(%job_id, %url, %format_spec, "starting download");
        self.registry.create(&job_id);

        let request = TransferRequest {
            url: url.clone(),
            format_spec,
            output_template: self
                .config
                .download_dir
                .join(format!("{job_id}.%(ext)s")),
            transcode,
        };

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let consumer = spawn_event_consumer(
            self.registry.clone(),
            job_id.clone(),
            audio,
            events_rx,
        );
        let transferred = self.provider.transfer(request, events_tx).await;
        let _ = consumer.await;

        if let Err(failure) = transferred {
            self.abandon_job(&job_id).await;
            return Err(failure.into());
        }

        let required_ext = audio.then_some("mp3");
        let Some(path) = self.locate_artifact(&job_id, required_ext).await else {
            self.abandon_job(&job_id).await;
            return Err(DownloadError::LocalIo(format!(
                "no artifact found for job {job_id} after transfer"
            )));
        };

        if audio {
            self.sweep_job_files(&job_id, Some(&path)).await;
        }

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mp4")
            .to_string();

        self.registry.remove(&job_id);
        info!(%job_id, path = %path.display(), "download complete");
        Ok(Artifact::new(path, format!("{title}.{ext}")))
    }

    /// Translate the caller's quality choice into a provider format spec.
    /// Explicit specs pass through untouched; the "best" sentinel is
    /// bounded by the configured resolution ceiling.
    fn video_format_spec(&self, quality: Option<&str>) -> String {
        match quality.map(str::trim) {
            None | Some("") | Some("best") => {
                let h = self.config.max_best_height;
                format!("bv*[height<={h}]+ba/b[height<={h}]/bv*+ba/b")
            }
            Some(explicit) => explicit.to_string(),
        }
    }

    /// Find the transferred file: the unique entry named by the job id
    /// prefix, ignoring in-progress debris. Audio transfers must match the
    /// final extension so a pre-transcode intermediate is never picked.
    async fn locate_artifact(&self, job_id: &str, required_ext: Option<&str>) -> Option<PathBuf> {
        let prefix = format!("{job_id}.");
        let mut entries = tokio::fs::read_dir(&self.config.download_dir).await.ok()?;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.starts_with(&prefix) || name.ends_with(".part") || name.ends_with(".ytdl") {
                continue;
            }
            let path = entry.path();
            match required_ext {
                Some(ext) if path.extension().and_then(|e| e.to_str()) != Some(ext) => continue,
                _ => return Some(path),
            }
        }
        None
    }

    /// Remove every file carrying the job's prefix except `keep`.
    /// Best-effort only: failures are logged, never escalated.
    async fn sweep_job_files(&self, job_id: &str, keep: Option<&Path>) {
        let prefix = format!("{job_id}.");
        let Ok(mut entries) = tokio::fs::read_dir(&self.config.download_dir).await else {
            return;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.starts_with(&prefix) {
                continue;
            }
            let path = entry.path();
            if keep == Some(path.as_path()) {
                continue;
            }
            if let Err(err) = tokio::fs::remove_file(&path).await {
                warn!(path = %path.display(), %err, "failed to sweep job file");
            }
        }
    }

    /// Failure path bookkeeping: the registry entry goes away before the
    /// caller sees the error, and any partial files are swept.
    async fn abandon_job(&self, job_id: &str) {
        self.registry.remove(job_id);
        self.sweep_job_files(job_id, None).await;
    }
}

/// Apply provider progress events to the registry until the channel
/// closes. Runs concurrently with the transfer itself.
fn spawn_event_consumer(
    registry: Arc<JobRegistry>,
    job_id: String,
    audio: bool,
    mut events: mpsc::UnboundedReceiver<ProviderEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ProviderEvent::Downloading {
                    percent_text,
                    speed_text,
                    downloaded_bytes,
                    total_bytes,
                } => {
                    let speed = if speed_text.is_empty() {
                        "N/A".to_string()
                    } else {
                        speed_text
                    };
                    registry.update(
                        &job_id,
                        ProgressPatch {
                            percent: Some(parse_percent(&percent_text)),
                            state: Some(JobState::Downloading),
                            size: Some(transfer_size_display(downloaded_bytes, total_bytes)),
                            speed: Some(speed),
                        },
                    );
                }
                ProviderEvent::Finished => {
                    let (state, speed) = if audio {
                        (JobState::Converting, "Processing")
                    } else {
                        (JobState::Processing, "Complete")
                    };
                    registry.update(
                        &job_id,
                        ProgressPatch {
                            percent: Some(100.0),
                            state: Some(state),
                            size: None,
                            speed: Some(speed.to_string()),
                        },
                    );
                }
            }
        }
    })
}

fn validate_url(url: &str) -> Result<String, DownloadError> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(DownloadError::InvalidInput);
    }
    Ok(trimmed.to_string())
}

fn display_or(value: &str, fallback: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Use the caller's id when it is filesystem-safe, otherwise mint one.
/// Ids become filename prefixes, so anything that could escape the
/// download directory is rejected outright.
fn resolve_job_id(job_id: Option<String>) -> Result<String, DownloadError> {
    match job_id.map(|id| id.trim().to_string()).filter(|id| !id.is_empty()) {
        None => Ok(Uuid::new_v4().to_string()),
        Some(id) => {
            if id.contains('/') || id.contains('\\') || id.contains("..") || id.starts_with('.') {
                return Err(DownloadError::InvalidInput);
            }
            Ok(id)
        }
    }
}

/// Percent text comes straight from the provider ("  42.3%"). Anything
/// that does not look like a percentage counts as zero; progress parsing
/// must never fail a job.
fn parse_percent(text: &str) -> f64 {
    if !text.contains('%') {
        return 0.0;
    }
    text.trim()
        .trim_end_matches('%')
        .trim()
        .parse::<f64>()
        .unwrap_or(0.0)
        .clamp(0.0, 100.0)
}

/// Caller-facing size line for the progress endpoint.
fn transfer_size_display(downloaded_bytes: u64, total_bytes: Option<u64>) -> String {
    match total_bytes {
        Some(total) if total > 0 => format!(
            "{} / {}",
            format_file_size(Some(downloaded_bytes)),
            format_file_size(Some(total))
        ),
        _ if downloaded_bytes > 0 => format_file_size(Some(downloaded_bytes)),
        _ => SIZE_PLACEHOLDER.to_string(),
    }
}

/// Make a title safe to use as an attachment filename: strip path-unsafe
/// characters and bound the length. Falls back when nothing survives.
fn sanitize_title(title: &str, fallback: &str) -> String {
    let cleaned = sanitize_filename::sanitize(title.trim());
    let bounded: String = cleaned.chars().take(TITLE_MAX_CHARS).collect();
    let bounded = bounded.trim().to_string();
    if bounded.is_empty() {
        fallback.to_string()
    } else {
        bounded
    }
}
