// Runtime configuration, environment-driven with sensible defaults
//
// Values that fail to parse fall back to their defaults instead of
// aborting startup; the service should come up even with a sloppy
// environment, and every knob is logged at boot.

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

/// All tunables for the service. The resolution ceiling applied to "best"
/// requests and the format-list caps are policy knobs, not hard limits.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    /// Transient storage for in-flight artifacts
    pub download_dir: PathBuf,
    /// Download slots; requests beyond this are rejected, not queued
    pub max_concurrent: usize,
    /// Height cap applied when the caller asks for "best"
    pub max_best_height: u32,
    /// Entries kept in the normalized video list
    pub video_format_cap: usize,
    /// Entries kept in the normalized audio list
    pub audio_format_cap: usize,
    pub resolve_timeout: Duration,
    pub transfer_timeout: Duration,
    /// Optional proxy URL handed to the provider
    pub proxy: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 5000,
            download_dir: PathBuf::from("downloads"),
            max_concurrent: 4,
            max_best_height: 2160,
            video_format_cap: 8,
            audio_format_cap: 3,
            resolve_timeout: Duration::from_secs(30),
            transfer_timeout: Duration::from_secs(1800),
            proxy: None,
        }
    }
}

impl Config {
    /// Build a config from MEDIAFETCH_* environment variables. The plain
    /// PORT variable is honored too, since hosting platforms commonly
    /// inject it.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: env_parsed("MEDIAFETCH_HOST").unwrap_or(defaults.host),
            port: env_parsed("MEDIAFETCH_PORT")
                .or_else(|| env_parsed("PORT"))
                .unwrap_or(defaults.port),
            download_dir: env_value("MEDIAFETCH_DOWNLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.download_dir),
            max_concurrent: env_parsed("MEDIAFETCH_MAX_CONCURRENT")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_concurrent),
            max_best_height: env_parsed("MEDIAFETCH_MAX_HEIGHT")
                .filter(|h| *h > 0)
                .unwrap_or(defaults.max_best_height),
            video_format_cap: env_parsed("MEDIAFETCH_VIDEO_FORMATS")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.video_format_cap),
            audio_format_cap: env_parsed("MEDIAFETCH_AUDIO_FORMATS")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.audio_format_cap),
            resolve_timeout: env_parsed("MEDIAFETCH_RESOLVE_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(defaults.resolve_timeout),
            transfer_timeout: env_parsed("MEDIAFETCH_TRANSFER_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(defaults.transfer_timeout),
            proxy: env_value("MEDIAFETCH_PROXY"),
        }
    }
}

/// Non-empty environment value, trimmed.
fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_value(key).and_then(|value| value.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.port, 5000);
        assert_eq!(config.max_concurrent, 4);
        assert_eq!(config.max_best_height, 2160);
        assert_eq!(config.video_format_cap, 8);
        assert_eq!(config.audio_format_cap, 3);
        assert_eq!(config.download_dir, PathBuf::from("downloads"));
        assert!(config.proxy.is_none());
    }
}
