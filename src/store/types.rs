use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Discord channel a conversation lives in.
pub type ConversationId = u64;
/// Discord user who owns a conversation and its quota.
pub type OwnerId = u64;

/// Daily token allowance per user.
pub const TOKENS_PER_DAY: i64 = 100_000;
/// A user with this many tokens or fewer left cannot start a request.
pub const MIN_TOKENS_FOR_REQUEST: i64 = 2_000;
/// Threads unused for this long are forgotten.
pub const THREAD_TTL_DAYS: i64 = 7;

/// Binding between a conversation and its backend thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadRecord {
    pub id: String,
    pub conversation_id: ConversationId,
    pub owner_id: OwnerId,
    /// Unix seconds after which the record is treated as absent.
    pub expires_at: i64,
}

impl ThreadRecord {
    pub fn new(id: &str, conversation_id: ConversationId, owner_id: OwnerId, now: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            conversation_id,
            owner_id,
            expires_at: (now + Duration::days(THREAD_TTL_DAYS)).timestamp(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.expires_at
    }
}

/// Remaining tokens for one user until the next daily reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaRecord {
    /// May go negative when a run consumed more than was left.
    pub tokens_left: i64,
    /// Unix seconds of the next reset.
    pub resets_at: i64,
}

impl QuotaRecord {
    pub fn fresh(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        Self {
            tokens_left: TOKENS_PER_DAY,
            resets_at: next_local_midnight(now, offset).timestamp(),
        }
    }

    /// The record as of `now`: a fresh allowance once the reset time has passed.
    pub fn current(self, now: DateTime<Utc>, offset: FixedOffset) -> Self {
        if now.timestamp() >= self.resets_at {
            Self::fresh(now, offset)
        } else {
            self
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.tokens_left <= MIN_TOKENS_FOR_REQUEST
    }
}

/// Next midnight in the given UTC offset, strictly after `now`.
pub fn next_local_midnight(now: DateTime<Utc>, offset: FixedOffset) -> DateTime<Utc> {
    let local_date = now.with_timezone(&offset).date_naive();
    let tomorrow = local_date.succ_opt().unwrap_or(local_date);
    let midnight = tomorrow.and_hms_opt(0, 0, 0).unwrap_or_default();
    offset
        .from_local_datetime(&midnight)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| now + Duration::days(1))
}
