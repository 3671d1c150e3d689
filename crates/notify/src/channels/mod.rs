//! Notification channel implementations.

pub mod discord;
pub mod slack;

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Response, StatusCode};

use crate::error::ChannelError;
use crate::events::NotifyEvent;

/// Trait for notification channels (Discord, Slack, etc.).
#[async_trait]
pub trait NotifyChannel: Send + Sync {
    /// Get the name of this channel.
    fn name(&self) -> &'static str;

    /// Check if this channel is enabled/configured.
    fn enabled(&self) -> bool;

    /// Send a notification event to this channel.
    async fn send(&self, event: &NotifyEvent) -> Result<(), ChannelError>;
}

/// Map a webhook response onto the channel error taxonomy.
pub(crate) async fn check_response(
    channel: &'static str,
    response: Response,
) -> Result<(), ChannelError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<f64>().ok())
            .map_or(1, |secs| secs.ceil() as u64);
        return Err(ChannelError::RateLimited { retry_after_secs });
    }

    let body = response.text().await.unwrap_or_default();
    Err(ChannelError::Rejected {
        channel,
        status: status.as_u16(),
        body,
    })
}
