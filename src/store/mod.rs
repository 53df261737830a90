pub mod types;

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{FixedOffset, Utc};
use cnidarium::{StateDelta, StateRead, StateWrite, Storage};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use types::{ConversationId, OwnerId, QuotaRecord, ThreadRecord};

/// Persistence for conversation threads and per-user token quota.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Thread bound to a conversation, if it exists and has not expired.
    async fn thread_for_conversation(&self, conversation: ConversationId) -> Result<Option<String>>;
    /// Create the binding or refresh its expiry.
    async fn upsert_thread(&self, thread_id: &str, conversation: ConversationId, owner: OwnerId) -> Result<()>;
    async fn delete_thread(&self, thread_id: &str) -> Result<()>;
    async fn decrease_quota(&self, owner: OwnerId, tokens: u64) -> Result<()>;
    async fn is_quota_exhausted(&self, owner: OwnerId) -> Result<bool>;
    async fn remaining_quota(&self, owner: OwnerId) -> Result<i64>;
}

// Key prefixes (no trailing slashes — cnidarium convention)
const THREAD_PREFIX: &str = "thread";
const QUOTA_PREFIX: &str = "quota";

fn conversation_key(conversation: ConversationId) -> String {
    format!("{}/conversation/{}", THREAD_PREFIX, conversation)
}
fn thread_index_key(thread_id: &str) -> String {
    format!("{}/id/{}", THREAD_PREFIX, thread_id)
}
fn quota_key(owner: OwnerId) -> String {
    format!("{}/{}", QUOTA_PREFIX, owner)
}

/// cnidarium-backed [`SessionStore`].
pub struct ChatStore {
    storage: Storage,
    /// Offset whose local midnight resets quotas.
    quota_offset: FixedOffset,
    /// Serializes read-modify-write sequences against the latest snapshot.
    write_lock: tokio::sync::Mutex<()>,
}

impl ChatStore {
    pub async fn new(data_dir: &Path, quota_offset: FixedOffset) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let prefixes = vec![THREAD_PREFIX.to_string(), QUOTA_PREFIX.to_string()];
        let storage = Storage::load(data_dir.to_path_buf(), prefixes)
            .await
            .context("Failed to init cnidarium storage")?;
        Ok(Self {
            storage,
            quota_offset,
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let snapshot = self.storage.latest_snapshot();
        let Some(bytes) = snapshot.get_raw(key).await? else {
            return Ok(None);
        };
        let value = serde_json::from_slice(&bytes).with_context(|| format!("decode {}", key))?;
        Ok(Some(value))
    }

    async fn quota(&self, owner: OwnerId) -> Result<QuotaRecord> {
        let now = Utc::now();
        Ok(match self.get_json::<QuotaRecord>(&quota_key(owner)).await? {
            Some(record) => record.current(now, self.quota_offset),
            None => QuotaRecord::fresh(now, self.quota_offset),
        })
    }

    /// Remove a thread record and its id index in one commit.
    async fn remove_thread(&self, record: &ThreadRecord) -> Result<()> {
        let mut delta = StateDelta::new(self.storage.latest_snapshot());
        delta.delete(conversation_key(record.conversation_id));
        delta.delete(thread_index_key(&record.id));
        self.storage.commit(delta).await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for ChatStore {
    async fn thread_for_conversation(&self, conversation: ConversationId) -> Result<Option<String>> {
        let Some(record) = self
            .get_json::<ThreadRecord>(&conversation_key(conversation))
            .await?
        else {
            return Ok(None);
        };

        if record.is_expired(Utc::now()) {
            debug!(conversation, thread_id = %record.id, "thread expired");
            let _guard = self.write_lock.lock().await;
            if let Err(e) = self.remove_thread(&record).await {
                warn!("Failed to remove expired thread {}: {}", record.id, e);
            }
            return Ok(None);
        }

        Ok(Some(record.id))
    }

    async fn upsert_thread(&self, thread_id: &str, conversation: ConversationId, owner: OwnerId) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let record = ThreadRecord::new(thread_id, conversation, owner, Utc::now());

        let mut delta = StateDelta::new(self.storage.latest_snapshot());
        delta.put_raw(
            conversation_key(conversation),
            serde_json::to_vec(&record).context("serialize ThreadRecord")?,
        );
        delta.put_raw(thread_index_key(thread_id), conversation.to_be_bytes().to_vec());
        self.storage.commit(delta).await?;
        debug!(thread_id, conversation, owner, "thread upserted");
        Ok(())
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let snapshot = self.storage.latest_snapshot();
        let Some(bytes) = snapshot.get_raw(&thread_index_key(thread_id)).await? else {
            return Ok(());
        };
        let conversation = ConversationId::from_be_bytes(
            bytes
                .as_slice()
                .try_into()
                .context("corrupt thread index entry")?,
        );

        let mut delta = StateDelta::new(snapshot);
        delta.delete(thread_index_key(thread_id));
        // Only drop the binding if it still points at this thread.
        if let Some(record) = self
            .get_json::<ThreadRecord>(&conversation_key(conversation))
            .await?
        {
            if record.id == thread_id {
                delta.delete(conversation_key(conversation));
            }
        }
        self.storage.commit(delta).await?;
        debug!(thread_id, conversation, "thread deleted");
        Ok(())
    }

    async fn decrease_quota(&self, owner: OwnerId, tokens: u64) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut record = self.quota(owner).await?;
        record.tokens_left -= i64::try_from(tokens).unwrap_or(i64::MAX);

        let mut delta = StateDelta::new(self.storage.latest_snapshot());
        delta.put_raw(
            quota_key(owner),
            serde_json::to_vec(&record).context("serialize QuotaRecord")?,
        );
        self.storage.commit(delta).await?;
        debug!(owner, tokens, tokens_left = record.tokens_left, "quota decreased");
        Ok(())
    }

    async fn is_quota_exhausted(&self, owner: OwnerId) -> Result<bool> {
        Ok(self.quota(owner).await?.is_exhausted())
    }

    async fn remaining_quota(&self, owner: OwnerId) -> Result<i64> {
        Ok(self.quota(owner).await?.tokens_left)
    }
}
