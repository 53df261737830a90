//! Per-conversation single-flight guard.
//!
//! A conversation is busy while a [`SlotGuard`] for it is alive. The guard
//! releases the slot on drop, so every accepted request releases exactly once
//! however its processing ends.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::store::types::ConversationId;

#[derive(Default)]
struct SlotTable {
    /// Conversation -> id of its in-flight run (None until the run exists).
    slots: Mutex<HashMap<ConversationId, Option<String>>>,
    releases: AtomicU64,
}

impl SlotTable {
    fn release(&self, conversation: ConversationId) {
        let run_id = self.slots.lock().remove(&conversation).flatten();
        self.releases.fetch_add(1, Ordering::SeqCst);
        debug!(conversation, run_id = ?run_id, "conversation slot released");
    }
}

/// Tracks which conversations have a request in flight.
#[derive(Clone, Default)]
pub struct ConversationSlots {
    table: Arc<SlotTable>,
}

impl ConversationSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the conversation. Returns `None` if it is already busy.
    ///
    /// The check and the reservation happen under one lock, so concurrent
    /// callers for the same conversation get exactly one guard.
    pub fn try_acquire(&self, conversation: ConversationId) -> Option<SlotGuard> {
        let mut slots = self.table.slots.lock();
        if slots.contains_key(&conversation) {
            return None;
        }
        slots.insert(conversation, None);
        Some(SlotGuard {
            table: self.table.clone(),
            conversation,
        })
    }

    pub fn is_busy(&self, conversation: ConversationId) -> bool {
        self.table.slots.lock().contains_key(&conversation)
    }

    /// Run currently registered for a conversation.
    pub fn current_run(&self, conversation: ConversationId) -> Option<String> {
        self.table.slots.lock().get(&conversation).cloned().flatten()
    }

    /// Number of busy conversations.
    pub fn active_count(&self) -> usize {
        self.table.slots.lock().len()
    }

    /// Total releases since startup.
    pub fn release_count(&self) -> u64 {
        self.table.releases.load(Ordering::SeqCst)
    }
}

/// Exclusive hold on one conversation's slot.
pub struct SlotGuard {
    table: Arc<SlotTable>,
    conversation: ConversationId,
}

impl SlotGuard {
    pub fn conversation(&self) -> ConversationId {
        self.conversation
    }

    /// Record the run now in flight, replacing any previous one.
    pub fn register_run(&self, run_id: &str) {
        if let Some(slot) = self.table.slots.lock().get_mut(&self.conversation) {
            *slot = Some(run_id.to_string());
        }
    }

    /// Release the slot now rather than at end of scope.
    pub fn release(self) {}
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.table.release(self.conversation);
    }
}

impl std::fmt::Debug for SlotGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotGuard")
            .field("conversation", &self.conversation)
            .finish()
    }
}
