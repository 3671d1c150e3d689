//! Error types for alert delivery.

use thiserror::Error;

/// Errors that can occur when delivering a notification to a channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// HTTP request failed before a response arrived
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Channel has no webhook configured
    #[error("Channel not configured: {0}")]
    NotConfigured(String),

    /// Webhook answered with a non-success status
    #[error("{channel} returned {status}: {body}")]
    Rejected {
        channel: &'static str,
        status: u16,
        body: String,
    },

    /// Rate limited by the service
    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
}
