// yt-dlp media provider
//
// Drives the yt-dlp binary as a subprocess. Metadata resolution uses
// --dump-json; transfers stream stdout line by line, where a custom
// --progress-template emits machine-readable progress frames that are
// forwarded as provider events. Both operations are bounded by timeouts
// and the child is killed on expiry.

use std::process::Stdio;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::downloader::models::SourceMetadata;
use crate::downloader::traits::{
    MediaProvider, ProviderEvent, ProviderFailure, TransferRequest,
};

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const SOCKET_TIMEOUT_SECS: u32 = 30;
const RETRIES: u32 = 3;

// Frames look like: progress| 42.3%|  1.20MiB/s|1234567|9876543
// The trailing fields are raw byte counts; total_bytes prints "NA" when
// the provider does not know the final size.
const PROGRESS_TEMPLATE: &str = "download:progress|%(progress._percent_str)s|%(progress._speed_str)s|%(progress.downloaded_bytes)s|%(progress.total_bytes)s";

lazy_static! {
    // Post-processing markers: once one of these shows up the byte
    // transfer itself is over.
    static ref POSTPROCESS_RE: Regex =
        Regex::new(r"^\[(ExtractAudio|Merger|VideoConvertor|VideoRemuxer|Fixup\w+)\]").unwrap();
}

pub struct YtDlpProvider {
    binary: String,
    proxy: Option<String>,
    resolve_timeout: Duration,
    transfer_timeout: Duration,
}

impl YtDlpProvider {
    pub fn new(config: &Config) -> Self {
        let binary = find_ytdlp();
        info!(%binary, "using yt-dlp provider");
        Self {
            binary,
            proxy: config.proxy.clone(),
            resolve_timeout: config.resolve_timeout,
            transfer_timeout: config.transfer_timeout,
        }
    }

    /// Flags shared by resolution and transfer invocations.
    fn common_args(&self) -> Vec<String> {
        let mut args = vec![
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--socket-timeout".to_string(),
            SOCKET_TIMEOUT_SECS.to_string(),
            "--retries".to_string(),
            RETRIES.to_string(),
            "--user-agent".to_string(),
            USER_AGENT.to_string(),
        ];
        if let Some(proxy) = &self.proxy {
            args.push("--proxy".to_string());
            args.push(proxy.clone());
        }
        args
    }
}

#[async_trait]
impl MediaProvider for YtDlpProvider {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn resolve(&self, url: &str) -> Result<SourceMetadata, ProviderFailure> {
        let mut args = vec!["--dump-json".to_string()];
        args.extend(self.common_args());
        args.push(url.to_string());

        debug!(url, "resolving source metadata");
        let output = run_output_with_timeout(&self.binary, &args, self.resolve_timeout).await?;
        if !output.status.success() {
            return Err(ProviderFailure(
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| ProviderFailure(format!("provider returned invalid metadata JSON: {e}")))
    }

    async fn transfer(
        &self,
        request: TransferRequest,
        events: mpsc::UnboundedSender<ProviderEvent>,
    ) -> Result<(), ProviderFailure> {
        let mut args = vec![
            "-f".to_string(),
            request.format_spec.clone(),
            "--newline".to_string(),
            "--progress-template".to_string(),
            PROGRESS_TEMPLATE.to_string(),
            "-o".to_string(),
            request.output_template.to_string_lossy().into_owned(),
        ];
        args.extend(self.common_args());
        if let Some(transcode) = &request.transcode {
            args.push("-x".to_string());
            args.push("--audio-format".to_string());
            args.push(transcode.codec.clone());
            args.push("--audio-quality".to_string());
            args.push(transcode.bitrate.clone());
        }
        args.push(request.url.clone());

        debug!(url = %request.url, format_spec = %request.format_spec, "starting transfer");
        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ProviderFailure(format!("failed to start {}: {}", self.binary, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ProviderFailure("failed to capture provider stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ProviderFailure("failed to capture provider stderr".to_string()))?;

        // Forward progress frames as they arrive; returns whether a
        // Finished event was already emitted via a post-processing marker.
        let event_tx = events.clone();
        let stdout_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            let mut finished_sent = false;
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(event) = parse_progress_line(&line) {
                    let _ = event_tx.send(event);
                } else if !finished_sent && POSTPROCESS_RE.is_match(line.trim()) {
                    finished_sent = true;
                    let _ = event_tx.send(ProviderEvent::Finished);
                }
            }
            finished_sent
        });

        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let mut reader = stderr;
            let _ = reader.read_to_end(&mut buf).await;
            String::from_utf8_lossy(&buf).into_owned()
        });

        let status = match timeout(self.transfer_timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                return Err(ProviderFailure(format!("failed to wait for provider: {e}")));
            }
            Err(_) => {
                let _ = child.kill().await;
                stdout_task.abort();
                stderr_task.abort();
                warn!(url = %request.url, "transfer timed out, provider killed");
                return Err(ProviderFailure(format!(
                    "transfer timed out after {}s",
                    self.transfer_timeout.as_secs()
                )));
            }
        };

        let finished_sent = stdout_task.await.unwrap_or(false);
        let stderr_output = stderr_task.await.unwrap_or_default();

        if !status.success() {
            return Err(ProviderFailure(stderr_output));
        }
        if !finished_sent {
            let _ = events.send(ProviderEvent::Finished);
        }
        Ok(())
    }
}

/// Find the yt-dlp binary in common install locations, falling back to
/// whatever the PATH resolves.
fn find_ytdlp() -> String {
    let common_paths = [
        "/opt/homebrew/bin/yt-dlp",
        "/usr/local/bin/yt-dlp",
        "/usr/bin/yt-dlp",
    ];

    for path in common_paths {
        if std::path::Path::new(path).exists() {
            return path.to_string();
        }
    }

    if let Ok(output) = std::process::Command::new("which").arg("yt-dlp").output() {
        if output.status.success() {
            if let Ok(path) = String::from_utf8(output.stdout) {
                let trimmed = path.trim();
                if !trimmed.is_empty() {
                    return trimmed.to_string();
                }
            }
        }
    }

    "yt-dlp".to_string()
}

/// Run a command to completion with a deadline, killing it on expiry.
async fn run_output_with_timeout(
    program: &str,
    args: &[String],
    deadline: Duration,
) -> Result<std::process::Output, ProviderFailure> {
    let mut child = Command::new(program)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| ProviderFailure(format!("failed to start {program}: {e}")))?;

    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| ProviderFailure(format!("failed to capture stdout from {program}")))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| ProviderFailure(format!("failed to capture stderr from {program}")))?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stdout_pipe.read_to_end(&mut buf).await;
        buf
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stderr_pipe.read_to_end(&mut buf).await;
        buf
    });

    match timeout(deadline, child.wait()).await {
        Ok(Ok(status)) => {
            let stdout = stdout_task.await.unwrap_or_default();
            let stderr = stderr_task.await.unwrap_or_default();
            Ok(std::process::Output {
                status,
                stdout,
                stderr,
            })
        }
        Ok(Err(e)) => Err(ProviderFailure(format!("failed to wait for {program}: {e}"))),
        Err(_) => {
            let _ = child.kill().await;
            stdout_task.abort();
            stderr_task.abort();
            Err(ProviderFailure(format!(
                "{program} timed out after {}s",
                deadline.as_secs()
            )))
        }
    }
}

/// Parse one progress frame produced by PROGRESS_TEMPLATE. Lines that are
/// not frames (destination notices, extractor chatter) return None.
fn parse_progress_line(line: &str) -> Option<ProviderEvent> {
    let rest = line.trim().strip_prefix("progress|")?;
    let mut parts = rest.split('|');
    let percent_text = parts.next().unwrap_or("").trim().to_string();
    let speed_text = parts.next().unwrap_or("").trim().to_string();
    let downloaded_bytes = parts.next().and_then(parse_byte_count).unwrap_or(0);
    let total_bytes = parts.next().and_then(parse_byte_count);

    Some(ProviderEvent::Downloading {
        percent_text,
        speed_text,
        downloaded_bytes,
        total_bytes,
    })
}

/// Byte counts in frames are plain numbers, but unknown values print as
/// "NA" and fractional counts show up during fragmented transfers.
fn parse_byte_count(text: &str) -> Option<u64> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(|v| v as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_frame_parsing() {
        let event = parse_progress_line("progress| 42.3%|  1.20MiB/s|1234567|9876543");
        match event {
            Some(ProviderEvent::Downloading {
                percent_text,
                speed_text,
                downloaded_bytes,
                total_bytes,
            }) => {
                assert_eq!(percent_text, "42.3%");
                assert_eq!(speed_text, "1.20MiB/s");
                assert_eq!(downloaded_bytes, 1_234_567);
                assert_eq!(total_bytes, Some(9_876_543));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_progress_frame_with_unknown_total() {
        match parse_progress_line("progress|  5.0%|500.00KiB/s|1024|NA") {
            Some(ProviderEvent::Downloading { total_bytes, .. }) => {
                assert_eq!(total_bytes, None);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_progress_frame_with_missing_fields() {
        match parse_progress_line("progress|garbage") {
            Some(ProviderEvent::Downloading {
                percent_text,
                speed_text,
                downloaded_bytes,
                total_bytes,
            }) => {
                assert_eq!(percent_text, "garbage");
                assert_eq!(speed_text, "");
                assert_eq!(downloaded_bytes, 0);
                assert_eq!(total_bytes, None);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_non_frame_lines_ignored() {
        assert!(parse_progress_line("[download] Destination: downloads/abc.mp4").is_none());
        assert!(parse_progress_line("[youtube] Extracting URL").is_none());
        assert!(parse_progress_line("").is_none());
    }

    #[test]
    fn test_postprocess_markers() {
        assert!(POSTPROCESS_RE.is_match("[ExtractAudio] Destination: downloads/a.mp3"));
        assert!(POSTPROCESS_RE.is_match("[Merger] Merging formats into \"a.mp4\""));
        assert!(POSTPROCESS_RE.is_match("[FixupM4a] Correcting container"));
        assert!(!POSTPROCESS_RE.is_match("[download] 100% of 3.00MiB"));
    }

    #[test]
    fn test_byte_count_parsing() {
        assert_eq!(parse_byte_count("1234"), Some(1234));
        assert_eq!(parse_byte_count("1234.7"), Some(1234));
        assert_eq!(parse_byte_count("NA"), None);
        assert_eq!(parse_byte_count(""), None);
        assert_eq!(parse_byte_count("-5"), None);
    }
}
