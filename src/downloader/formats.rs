// Format normalization - turns raw provider descriptors into the
// caller-facing quality lists
//
// Handles:
// - Resolution-to-label mapping (8K down to 144p)
// - Sorting and per-label deduplication (highest variant per label wins)
// - Size resolution: exact -> approximate -> bitrate estimate -> placeholder
// - Human-readable size formatting (base 1024, two decimals)

use super::models::{AudioFormatOption, RawFormat, VideoFormatOption};

/// Rendered instead of a number when no size is known. Never "0".
pub const SIZE_PLACEHOLDER: &str = "Calculating...";

/// Map a vertical resolution onto the quality ladder. Falls back to the
/// provider's free-text note when no height is known, then to "Unknown".
pub fn quality_label(height: Option<u32>, format_note: Option<&str>) -> String {
    match height {
        Some(h) if h >= 4320 => "8K".to_string(),
        Some(h) if h >= 2160 => "4K".to_string(),
        Some(h) if h >= 1440 => "1440p".to_string(),
        Some(h) if h >= 1080 => "1080p".to_string(),
        Some(h) if h >= 720 => "720p".to_string(),
        Some(h) if h >= 480 => "480p".to_string(),
        Some(h) if h >= 360 => "360p".to_string(),
        Some(h) if h >= 240 => "240p".to_string(),
        Some(h) if h >= 144 => "144p".to_string(),
        Some(h) => format!("{}p", h),
        None => match format_note {
            Some(note) if !note.trim().is_empty() => note.trim().to_string(),
            _ => "Unknown".to_string(),
        },
    }
}

/// Best available size for a descriptor: reported bytes first, otherwise an
/// estimate from the audio bitrate and the source duration.
pub fn resolve_size(format: &RawFormat, duration_seconds: Option<f64>) -> Option<u64> {
    if let Some(reported) = format.reported_size() {
        return Some(reported);
    }
    match (format.abr, duration_seconds) {
        (Some(kbps), Some(duration)) if kbps > 0.0 && duration > 0.0 => {
            Some((kbps * 1000.0 * duration / 8.0) as u64)
        }
        _ => None,
    }
}

/// Format a byte count with the largest fitting unit out of B/KB/MB/GB,
/// rounded to two decimals with trailing zeros trimmed ("1.5 KB", "1.0 MB").
/// Unknown sizes render as the fixed placeholder, zero as "0 B".
pub fn format_file_size(size_bytes: Option<u64>) -> String {
    let bytes = match size_bytes {
        None => return SIZE_PLACEHOLDER.to_string(),
        Some(0) => return "0 B".to_string(),
        Some(b) => b,
    };

    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let exponent = ((bytes as f64).log(1024.0).floor() as usize).min(UNITS.len() - 1);
    if exponent == 0 {
        return format!("{} B", bytes);
    }

    let scaled = bytes as f64 / 1024f64.powi(exponent as i32);
    let rounded = (scaled * 100.0).round() / 100.0;
    let mut text = format!("{:.2}", rounded);
    while text.ends_with('0') {
        text.pop();
    }
    if text.ends_with('.') {
        text.push('0');
    }
    format!("{} {}", text, UNITS[exponent])
}

/// Build the caller-facing video quality list.
///
/// Only descriptors with a video stream participate. The list is sorted by
/// descending height (stable, so the provider's ordering breaks ties), one
/// entry survives per quality label (the highest-resolution representative),
/// unusable labels are dropped, and the result is capped.
pub fn normalize_video(
    formats: &[RawFormat],
    duration_seconds: Option<f64>,
    cap: usize,
) -> Vec<VideoFormatOption> {
    let mut candidates: Vec<&RawFormat> = formats.iter().filter(|f| f.has_video()).collect();
    candidates.sort_by(|a, b| b.height.unwrap_or(0).cmp(&a.height.unwrap_or(0)));

    let mut seen_labels: Vec<String> = Vec::new();
    let mut options = Vec::new();
    for format in candidates {
        let label = quality_label(format.height, format.format_note.as_deref());
        if label.is_empty() || label == "Unknown" || label == "none" {
            continue;
        }
        if seen_labels.iter().any(|seen| *seen == label) {
            continue;
        }
        seen_labels.push(label.clone());
        options.push(VideoFormatOption {
            format_id: format.format_id.clone(),
            ext: if format.ext.is_empty() {
                "mp4".to_string()
            } else {
                format.ext.clone()
            },
            quality: label,
            height: format.height.unwrap_or(0),
            filesize: format_file_size(resolve_size(format, duration_seconds)),
        });
        if options.len() == cap {
            break;
        }
    }
    options
}

/// Build the caller-facing audio list: audio-only descriptors sorted by
/// descending bitrate, deduplicated on the exact bitrate value, capped.
pub fn normalize_audio(
    formats: &[RawFormat],
    duration_seconds: Option<f64>,
    cap: usize,
) -> Vec<AudioFormatOption> {
    let mut candidates: Vec<&RawFormat> = formats
        .iter()
        .filter(|f| f.has_audio() && !f.has_video())
        .collect();
    candidates.sort_by(|a, b| {
        b.abr
            .unwrap_or(0.0)
            .partial_cmp(&a.abr.unwrap_or(0.0))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut seen_bitrates: Vec<Option<u64>> = Vec::new();
    let mut options = Vec::new();
    for format in candidates {
        let key = format.abr.map(f64::to_bits);
        if seen_bitrates.contains(&key) {
            continue;
        }
        seen_bitrates.push(key);
        options.push(AudioFormatOption {
            format_id: format.format_id.clone(),
            ext: if format.ext.is_empty() {
                "m4a".to_string()
            } else {
                format.ext.clone()
            },
            bitrate_kbps: format.abr.unwrap_or(0.0).round() as u32,
            filesize: format_file_size(resolve_size(format, duration_seconds)),
        });
        if options.len() == cap {
            break;
        }
    }
    options
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video_format(id: &str, height: u32, size: u64) -> RawFormat {
        RawFormat {
            format_id: id.to_string(),
            ext: "mp4".to_string(),
            vcodec: Some("avc1.4d401f".to_string()),
            acodec: Some("none".to_string()),
            height: Some(height),
            width: Some(height * 16 / 9),
            filesize: Some(size as f64),
            ..RawFormat::default()
        }
    }

    fn audio_format(id: &str, bitrate: f64) -> RawFormat {
        RawFormat {
            format_id: id.to_string(),
            ext: "m4a".to_string(),
            vcodec: Some("none".to_string()),
            acodec: Some("mp4a.40.2".to_string()),
            abr: Some(bitrate),
            ..RawFormat::default()
        }
    }

    #[test]
    fn test_quality_ladder_thresholds() {
        assert_eq!(quality_label(Some(4320), None), "8K");
        assert_eq!(quality_label(Some(2160), None), "4K");
        assert_eq!(quality_label(Some(1440), None), "1440p");
        assert_eq!(quality_label(Some(1080), None), "1080p");
        assert_eq!(quality_label(Some(720), None), "720p");
        assert_eq!(quality_label(Some(480), None), "480p");
        assert_eq!(quality_label(Some(360), None), "360p");
        assert_eq!(quality_label(Some(240), None), "240p");
        assert_eq!(quality_label(Some(144), None), "144p");
        assert_eq!(quality_label(Some(100), None), "100p");
    }

    #[test]
    fn test_quality_label_fallbacks() {
        assert_eq!(quality_label(None, Some("tiny")), "tiny");
        assert_eq!(quality_label(None, Some("  ")), "Unknown");
        assert_eq!(quality_label(None, None), "Unknown");
    }

    #[test]
    fn test_size_formatting() {
        assert_eq!(format_file_size(Some(0)), "0 B");
        assert_eq!(format_file_size(Some(512)), "512 B");
        assert_eq!(format_file_size(Some(1536)), "1.5 KB");
        assert_eq!(format_file_size(Some(1_048_576)), "1.0 MB");
        assert_eq!(format_file_size(Some(1_610_612_736)), "1.5 GB");
        assert_eq!(format_file_size(None), SIZE_PLACEHOLDER);
    }

    #[test]
    fn test_size_estimation_from_bitrate() {
        let format = RawFormat {
            abr: Some(500.0),
            ..RawFormat::default()
        };
        assert_eq!(resolve_size(&format, Some(120.0)), Some(7_500_000));
    }

    #[test]
    fn test_reported_size_beats_estimate() {
        let format = RawFormat {
            filesize: Some(42.0),
            abr: Some(500.0),
            ..RawFormat::default()
        };
        assert_eq!(resolve_size(&format, Some(120.0)), Some(42));
    }

    #[test]
    fn test_size_unknown_without_duration() {
        let format = RawFormat {
            abr: Some(500.0),
            ..RawFormat::default()
        };
        assert_eq!(resolve_size(&format, None), None);
    }

    #[test]
    fn test_video_dedup_keeps_one_entry_per_label() {
        let formats = vec![
            video_format("a", 2160, 1),
            video_format("b", 2160, 2),
            video_format("c", 1080, 3),
            video_format("d", 720, 4),
            video_format("e", 720, 5),
        ];
        let options = normalize_video(&formats, None, 8);
        let labels: Vec<&str> = options.iter().map(|o| o.quality.as_str()).collect();
        assert_eq!(labels, vec!["4K", "1080p", "720p"]);
        // Ties keep provider order, so the first 2160p descriptor survives.
        assert_eq!(options[0].format_id, "a");
    }

    #[test]
    fn test_video_list_skips_audio_only_and_caps() {
        let heights = [4320, 2160, 1440, 1080, 720, 480, 360, 240, 144, 100];
        let mut formats: Vec<RawFormat> =
            heights.iter().map(|&h| video_format("v", h, 1)).collect();
        formats.push(audio_format("a", 128.0));
        let options = normalize_video(&formats, None, 8);
        assert_eq!(options.len(), 8);
        assert_eq!(options[0].quality, "8K");
        assert_eq!(options[7].quality, "240p");
    }

    #[test]
    fn test_video_unknown_label_dropped() {
        let formats = vec![RawFormat {
            format_id: "x".to_string(),
            vcodec: Some("vp9".to_string()),
            ..RawFormat::default()
        }];
        assert!(normalize_video(&formats, None, 8).is_empty());
    }

    #[test]
    fn test_audio_sorted_and_deduped_by_bitrate() {
        let formats = vec![
            audio_format("low", 48.0),
            audio_format("mid", 128.0),
            audio_format("mid2", 128.0),
            audio_format("high", 160.0),
        ];
        let options = normalize_audio(&formats, None, 3);
        let ids: Vec<&str> = options.iter().map(|o| o.format_id.as_str()).collect();
        assert_eq!(ids, vec!["high", "mid", "low"]);
    }

    #[test]
    fn test_audio_cap_applies() {
        let formats: Vec<RawFormat> =
            (1..=6).map(|i| audio_format("a", i as f64 * 32.0)).collect();
        assert_eq!(normalize_audio(&formats, None, 3).len(), 3);
    }

    #[test]
    fn test_audio_excludes_muxed_streams() {
        let mut muxed = video_format("muxed", 720, 1);
        muxed.acodec = Some("mp4a.40.2".to_string());
        let formats = vec![muxed, audio_format("pure", 128.0)];
        let options = normalize_audio(&formats, None, 3);
        assert_eq!(options.len(), 1);
        assert_eq!(options[0].format_id, "pure");
    }
}
