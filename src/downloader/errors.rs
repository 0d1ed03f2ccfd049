// Error taxonomy for the download core
//
// Provider failures arrive as free-text (the extractor's stderr). They are
// classified by pattern matching into a small fixed set of categories so
// callers can tell a retryable condition (rate limiting, temporary outage)
// from a permanent one. Unrecognized failure text always lands in
// UnknownProvider rather than breaking the classifier.

use thiserror::Error;

use super::traits::ProviderFailure;

#[derive(Debug, Clone, Error)]
pub enum DownloadError {
    /// No usable source URL in the request
    #[error("no source URL provided")]
    InvalidInput,

    /// The source is throttling requests (429 or equivalent)
    #[error("the source is rate-limiting requests, try again later: {0}")]
    RateLimited(String),

    /// Sign-in required or automated access was detected
    #[error("the source restricted access to this content: {0}")]
    AccessRestricted(String),

    /// Content is missing, private, or removed
    #[error("the requested content is unavailable: {0}")]
    Unavailable(String),

    /// Provider failed in a way we do not recognize
    #[error("the media provider failed: {0}")]
    UnknownProvider(String),

    /// Artifact missing after a successful transfer, or other local I/O trouble
    #[error("local storage error: {0}")]
    LocalIo(String),

    /// All download slots are taken
    #[error("too many downloads in flight, try again later")]
    Busy,
}

impl DownloadError {
    /// Stable machine-readable category name for API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::RateLimited(_) => "rate_limited",
            Self::AccessRestricted(_) => "access_restricted",
            Self::Unavailable(_) => "unavailable",
            Self::UnknownProvider(_) => "provider_failure",
            Self::LocalIo(_) => "local_io",
            Self::Busy => "busy",
        }
    }
}

impl From<ProviderFailure> for DownloadError {
    fn from(failure: ProviderFailure) -> Self {
        classify(&failure.0)
    }
}

/// Map a provider failure description onto the error taxonomy.
///
/// Checks run in order of specificity: throttling markers first, then
/// content-gone markers (yt-dlp's "private video" messages also mention
/// signing in, so they must win over the auth patterns), then auth and bot
/// detection. Everything else is an unknown provider failure.
pub fn classify(description: &str) -> DownloadError {
    let lower = description.to_lowercase();
    let detail = summarize(description);

    if lower.contains("429")
        || lower.contains("too many requests")
        || lower.contains("rate limit")
    {
        return DownloadError::RateLimited(detail);
    }

    if lower.contains("private video")
        || lower.contains("video unavailable")
        || lower.contains("no longer available")
        || lower.contains("has been removed")
        || lower.contains("content isn't available")
        || lower.contains("account associated with this video has been terminated")
    {
        return DownloadError::Unavailable(detail);
    }

    if lower.contains("sign in")
        || lower.contains("bot")
        || lower.contains("captcha")
        || lower.contains("unusual traffic")
        || lower.contains("automated")
    {
        return DownloadError::AccessRestricted(detail);
    }

    DownloadError::UnknownProvider(detail)
}

/// Reduce multi-line provider stderr to its first useful line, bounded.
fn summarize(description: &str) -> String {
    let line = description
        .lines()
        .map(str::trim)
        .find(|l| l.to_lowercase().starts_with("error:"))
        .or_else(|| description.lines().map(str::trim).find(|l| !l.is_empty()))
        .unwrap_or("no details");
    line.chars().take(200).collect()
}
