use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use tracing::{info, warn};

use crate::orchestrator::notices;
use crate::store::types::ConversationId;

/// How the transport should render a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageFormat {
    /// Sent verbatim; markdown in the text is rendered.
    Markdown,
    /// Markdown and mentions are escaped.
    Plain,
}

/// Outbound side of the chat transport.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_message(
        &self,
        conversation: ConversationId,
        text: &str,
        format: MessageFormat,
    ) -> Result<()>;
}

/// Send a message, logging instead of failing.
pub async fn send_safe(
    transport: &dyn Transport,
    conversation: ConversationId,
    text: &str,
    format: MessageFormat,
) {
    if let Err(e) = transport.send_message(conversation, text, format).await {
        warn!(conversation, "Error sending message: {:#}", e);
    }
}

/// Discord channels as conversations.
pub struct DiscordTransport {
    http: Arc<serenity::Http>,
}

impl DiscordTransport {
    pub fn new(http: Arc<serenity::Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Transport for DiscordTransport {
    async fn send_message(
        &self,
        conversation: ConversationId,
        text: &str,
        format: MessageFormat,
    ) -> Result<()> {
        serenity::ChannelId::new(conversation)
            .send_message(&self.http, outgoing_message(text, format))
            .await?;
        Ok(())
    }
}

/// Message builder for `text`. Mentions never notify anyone, whatever the answer contains.
fn outgoing_message(text: &str, format: MessageFormat) -> serenity::CreateMessage {
    let content = match format {
        MessageFormat::Markdown => text.to_string(),
        MessageFormat::Plain => serenity::MessageBuilder::new().push_safe(text).build(),
    };
    serenity::CreateMessage::new()
        .content(content)
        .allowed_mentions(serenity::CreateAllowedMentions::new())
}

/// Post a liveness message to `channel` every `every` until the process exits.
pub fn spawn_health_ping(
    transport: Arc<dyn Transport>,
    channel: ConversationId,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    info!(channel, interval_secs = every.as_secs(), "Health ping enabled");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick completes immediately; skip it so the ping starts after one period.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            send_safe(transport.as_ref(), channel, notices::HEALTH_PING, MessageFormat::Plain).await;
        }
    })
}
