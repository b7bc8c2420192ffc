use std::time::Duration;

/// Bot service error variants.
///
/// Every variant is non-fatal to the poll loop; the worker logs it and retries the
/// cycle. Only startup configuration errors terminate the process.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error("telegram api error {code}: {description}")]
    Telegram { code: i64, description: String },
    #[error("rate limited, retry after {retry_after}s")]
    RateLimited { retry_after: u64 },
    #[error("firestore error {status}: {message}")]
    Firestore { status: u16, message: String },
    #[error("credentials rejected: {0}")]
    Credentials(String),
    #[error("request timed out")]
    Timeout,
    #[error("internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl BotError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Telegram { .. } => "TELEGRAM",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::Firestore { .. } => "FIRESTORE",
            Self::Credentials(_) => "CREDENTIALS",
            Self::Timeout => "TIMEOUT",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Upstream-requested pause before the next attempt, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => Some(Duration::from_secs(*retry_after)),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for BotError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Internal(e.without_url().into())
        }
    }
}
