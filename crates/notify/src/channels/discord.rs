//! Discord webhook notification channel.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use super::check_response;
use crate::error::ChannelError;
use crate::events::NotifyEvent;
use crate::NotifyChannel;

/// Discord limits embed descriptions to 4096 characters.
const MAX_DESCRIPTION_LEN: usize = 4096;

/// Discord webhook channel rendering events as embeds.
pub struct DiscordChannel {
    webhook_url: Option<String>,
    client: reqwest::Client,
}

impl DiscordChannel {
    /// Create a Discord channel; `None` leaves it disabled.
    #[must_use]
    pub fn new(webhook_url: Option<String>) -> Self {
        let webhook_url = webhook_url.filter(|url| !url.is_empty());
        if webhook_url.is_none() {
            debug!("Discord notifications disabled (no webhook configured)");
        }

        Self {
            webhook_url,
            client: reqwest::Client::new(),
        }
    }

    fn format_payload(event: &NotifyEvent) -> DiscordPayload {
        let mut description = event.description();
        if description.len() > MAX_DESCRIPTION_LEN {
            let mut cut = MAX_DESCRIPTION_LEN - 3;
            while !description.is_char_boundary(cut) {
                cut -= 1;
            }
            description.truncate(cut);
            description.push_str("...");
        }

        let fields = event
            .fields()
            .into_iter()
            .map(|(name, value)| EmbedField {
                name,
                value,
                inline: true,
            })
            .collect();

        DiscordPayload {
            username: "Sentinel".to_string(),
            embeds: vec![Embed {
                title: event.title(),
                description,
                color: event.severity().color(),
                fields,
                timestamp: event.timestamp().to_rfc3339(),
            }],
        }
    }
}

#[async_trait]
impl NotifyChannel for DiscordChannel {
    fn name(&self) -> &'static str {
        "discord"
    }

    fn enabled(&self) -> bool {
        self.webhook_url.is_some()
    }

    async fn send(&self, event: &NotifyEvent) -> Result<(), ChannelError> {
        let webhook_url = self
            .webhook_url
            .as_ref()
            .ok_or_else(|| ChannelError::NotConfigured("discord webhook".to_string()))?;

        debug!(channel = "discord", event_type = ?event.title(), "Sending notification");

        let response = self
            .client
            .post(webhook_url)
            .json(&Self::format_payload(event))
            .send()
            .await?;

        let result = check_response(self.name(), response).await;
        if let Err(e) = &result {
            warn!(channel = "discord", error = %e, "Discord webhook request failed");
        }
        result
    }
}

#[derive(Debug, Serialize)]
struct DiscordPayload {
    username: String,
    embeds: Vec<Embed>,
}

#[derive(Debug, Serialize)]
struct Embed {
    title: String,
    description: String,
    color: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<EmbedField>,
    timestamp: String,
}

#[derive(Debug, Serialize)]
struct EmbedField {
    name: String,
    value: String,
    inline: bool,
}
