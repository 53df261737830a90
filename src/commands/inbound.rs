//! Plain (non-command) messages: validation and hand-off to the orchestrator.

use std::sync::Arc;

use poise::serenity_prelude as serenity;
use tracing::{debug, info, warn};

use crate::orchestrator::{notices, Orchestrator, UserRequest};
use crate::state::AppState;

pub const MIN_PROMPT_CHARS: usize = 2;
pub const MAX_PROMPT_CHARS: usize = 1000;

/// Why an inbound message was refused before reaching the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputRejection {
    /// Nothing left after removing emoji.
    OnlyText,
    /// Attachment without any text.
    Unsupported,
    TooShort,
    TooLong,
}

impl InputRejection {
    pub fn notice(self) -> &'static str {
        match self {
            InputRejection::OnlyText => notices::ONLY_TEXT_INPUT,
            InputRejection::Unsupported => notices::ONLY_TEXT_SUPPORT,
            InputRejection::TooShort => notices::INPUT_MIN_LENGTH,
            InputRejection::TooLong => notices::INPUT_MAX_LENGTH,
        }
    }
}

fn is_emoji(c: char) -> bool {
    matches!(c,
        '\u{00A9}' | '\u{00AE}' | '\u{FE0F}'
        | '\u{2000}'..='\u{3300}'
        | '\u{1F000}'..='\u{1FBFF}')
}

/// Remove a leading or embedded mention of `bot_id`. `None` if the bot is not mentioned.
pub fn strip_mention(content: &str, bot_id: u64) -> Option<String> {
    let plain = format!("<@{}>", bot_id);
    let nick = format!("<@!{}>", bot_id);
    if !content.contains(&plain) && !content.contains(&nick) {
        return None;
    }
    Some(content.replace(&plain, "").replace(&nick, "").trim().to_string())
}

/// Clean a prompt and check its length, counted in characters.
pub fn validate_prompt(raw: &str, has_attachments: bool) -> Result<String, InputRejection> {
    if raw.trim().is_empty() && has_attachments {
        return Err(InputRejection::Unsupported);
    }
    let cleaned: String = raw.chars().filter(|c| !is_emoji(*c)).collect();
    let cleaned = cleaned.trim();
    match cleaned.chars().count() {
        0 => Err(InputRejection::OnlyText),
        n if n < MIN_PROMPT_CHARS => Err(InputRejection::TooShort),
        n if n > MAX_PROMPT_CHARS => Err(InputRejection::TooLong),
        _ => Ok(cleaned.to_string()),
    }
}

pub async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    framework: poise::FrameworkContext<'_, AppState, anyhow::Error>,
    data: &AppState,
) -> Result<(), anyhow::Error> {
    let serenity::FullEvent::Message { new_message: msg } = event else {
        return Ok(());
    };
    if msg.author.bot {
        return Ok(());
    }

    // In guilds only messages addressed to the bot are questions
    let content = if msg.guild_id.is_some() {
        match strip_mention(&msg.content, framework.bot_id.get()) {
            Some(content) => content,
            None => return Ok(()),
        }
    } else {
        msg.content.clone()
    };
    if content.trim_start().starts_with('/') {
        return Ok(());
    }

    let prompt = match validate_prompt(&content, !msg.attachments.is_empty()) {
        Ok(prompt) => prompt,
        Err(rejection) => {
            debug!(conversation = msg.channel_id.get(), ?rejection, "Inbound message rejected");
            if let Err(e) = msg.channel_id.say(&ctx.http, rejection.notice()).await {
                warn!("Error sending message: {:#}", e);
            }
            return Ok(());
        }
    };

    let request = UserRequest {
        conversation: msg.channel_id.get(),
        owner: msg.author.id.get(),
        prompt,
    };
    info!(
        conversation = request.conversation,
        owner = request.owner,
        user = msg.author.name,
        chars = request.prompt.chars().count(),
        "Question received"
    );
    spawn_request(data.orchestrator.clone(), request);
    Ok(())
}

/// Each request runs on its own task so the gateway loop keeps dispatching.
fn spawn_request(orchestrator: Arc<Orchestrator>, request: UserRequest) {
    tokio::spawn(async move {
        let outcome = orchestrator.handle_user_request(&request).await;
        let slots = orchestrator.slots();
        debug!(
            conversation = request.conversation,
            ?outcome,
            active = slots.active_count(),
            releases = slots.release_count(),
            "Request finished"
        );
    });
}
