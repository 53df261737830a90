use anyhow::Result;
use tracing::{info, warn};

use crate::assistant::ReasoningBackend;
use crate::orchestrator::notices;
use crate::orchestrator::slots::ConversationSlots;
use crate::state::Context;
use crate::store::types::ConversationId;
use crate::store::SessionStore;

/// Introduce the assistant
#[poise::command(slash_command)]
pub async fn start(ctx: Context<'_>) -> Result<(), anyhow::Error> {
    ctx.say(notices::START_MESSAGE).await?;
    Ok(())
}

/// How to use the assistant
#[poise::command(slash_command)]
pub async fn help(ctx: Context<'_>) -> Result<(), anyhow::Error> {
    ctx.say(notices::HELP_MESSAGE).await?;
    Ok(())
}

/// Forget this channel's conversation and start over
#[poise::command(slash_command)]
pub async fn new(ctx: Context<'_>) -> Result<(), anyhow::Error> {
    let conversation = ctx.channel_id().get();
    let data = ctx.data();

    let outcome = reset_conversation(
        data.orchestrator.slots(),
        data.store.as_ref(),
        data.backend.as_ref(),
        conversation,
    )
    .await?;
    if let ResetOutcome::Reset { thread_id: Some(thread_id) } = &outcome {
        info!(conversation, thread_id, user = ctx.author().name, "Conversation reset");
    }

    ctx.say(outcome.notice()).await?;
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
pub enum ResetOutcome {
    /// A request is in flight; nothing was touched.
    Busy,
    /// The binding is gone; carries the thread that was dropped, if any.
    Reset { thread_id: Option<String> },
}

impl ResetOutcome {
    pub fn notice(&self) -> &'static str {
        match self {
            ResetOutcome::Busy => notices::WAIT_FOR_PREVIOUS_REQUEST,
            ResetOutcome::Reset { .. } => notices::NEW_THREAD,
        }
    }
}

/// Drop the conversation's thread from the store, then from the backend.
/// Remote deletion failures are only logged.
pub async fn reset_conversation(
    slots: &ConversationSlots,
    store: &dyn SessionStore,
    backend: &dyn ReasoningBackend,
    conversation: ConversationId,
) -> Result<ResetOutcome> {
    // A run in flight still reads the old thread
    if slots.is_busy(conversation) {
        return Ok(ResetOutcome::Busy);
    }

    let Some(thread_id) = store.thread_for_conversation(conversation).await? else {
        return Ok(ResetOutcome::Reset { thread_id: None });
    };
    store.delete_thread(&thread_id).await?;
    if let Err(e) = backend.delete_thread(&thread_id).await {
        warn!(thread_id, "Failed to delete remote thread: {:#}", e);
    }
    Ok(ResetOutcome::Reset {
        thread_id: Some(thread_id),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::testing::{MemoryStore, ScriptedBackend};

    const CONV: ConversationId = 100;

    fn backend() -> ScriptedBackend {
        ScriptedBackend::new(vec![], &[])
    }

    #[tokio::test]
    async fn test_busy_channel_keeps_thread() {
        let slots = ConversationSlots::new();
        let store = MemoryStore::with_thread(CONV, "thread_a");
        let backend = backend();
        let _held = slots.try_acquire(CONV).unwrap();

        let outcome = reset_conversation(&slots, &store, &backend, CONV).await.unwrap();

        assert_eq!(outcome, ResetOutcome::Busy);
        assert_eq!(outcome.notice(), notices::WAIT_FOR_PREVIOUS_REQUEST);
        assert_eq!(store.thread(CONV).as_deref(), Some("thread_a"));
        assert!(backend.threads_deleted().is_empty());
    }

    #[tokio::test]
    async fn test_idle_channel_drops_thread_everywhere() {
        let slots = ConversationSlots::new();
        let store = MemoryStore::with_thread(CONV, "thread_a");
        let backend = backend();

        let outcome = reset_conversation(&slots, &store, &backend, CONV).await.unwrap();

        assert_eq!(
            outcome,
            ResetOutcome::Reset {
                thread_id: Some("thread_a".to_string())
            }
        );
        assert_eq!(outcome.notice(), notices::NEW_THREAD);
        assert_eq!(store.thread(CONV), None);
        assert_eq!(backend.threads_deleted(), vec!["thread_a".to_string()]);
    }

    #[tokio::test]
    async fn test_remote_delete_failure_still_confirms() {
        let slots = ConversationSlots::new();
        let store = MemoryStore::with_thread(CONV, "thread_a");
        let mut backend = backend();
        backend.fail_delete_thread = true;

        let outcome = reset_conversation(&slots, &store, &backend, CONV).await.unwrap();

        assert_eq!(outcome.notice(), notices::NEW_THREAD);
        assert_eq!(store.thread(CONV), None);
        assert_eq!(backend.threads_deleted(), vec!["thread_a".to_string()]);
    }

    #[tokio::test]
    async fn test_channel_without_thread() {
        let slots = ConversationSlots::new();
        let store = MemoryStore::default();
        let backend = backend();

        let outcome = reset_conversation(&slots, &store, &backend, CONV).await.unwrap();

        assert_eq!(outcome, ResetOutcome::Reset { thread_id: None });
        assert!(backend.threads_deleted().is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_is_reported() {
        let slots = ConversationSlots::new();
        let mut store = MemoryStore::with_thread(CONV, "thread_a");
        store.fail = true;
        let backend = backend();

        assert!(reset_conversation(&slots, &store, &backend, CONV).await.is_err());
        assert!(backend.threads_deleted().is_empty());
    }
}
