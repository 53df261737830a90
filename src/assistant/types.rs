use serde::{Deserialize, Serialize};

/// Error code the backend reports when a run was rejected for rate limiting.
pub const RATE_LIMIT_CODE: &str = "rate_limit_exceeded";

/// One remote reasoning invocation against a thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub thread_id: String,
    pub status: RunStatus,
    #[serde(default)]
    pub last_error: Option<RunError>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

impl Run {
    /// Total tokens consumed by the run, 0 when the backend reported none.
    pub fn total_tokens(&self) -> u64 {
        self.usage.as_ref().map(|u| u.total_tokens).unwrap_or(0)
    }

    pub fn is_rate_limited(&self) -> bool {
        self.last_error
            .as_ref()
            .is_some_and(|e| e.code == RATE_LIMIT_CODE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
    #[serde(other)]
    Unknown,
}

/// Collapsed view of a run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Pending,
    Succeeded,
    FailedTerminal,
}

impl RunStatus {
    pub fn class(self) -> StatusClass {
        match self {
            RunStatus::Completed => StatusClass::Succeeded,
            RunStatus::Failed
            | RunStatus::Cancelled
            | RunStatus::Cancelling
            | RunStatus::Expired
            | RunStatus::RequiresAction
            | RunStatus::Incomplete => StatusClass::FailedTerminal,
            // Unclassifiable statuses keep polling and end up on the stall path.
            RunStatus::Queued | RunStatus::InProgress | RunStatus::Unknown => StatusClass::Pending,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.class() != StatusClass::Pending
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunError {
    pub code: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// A backend thread: the persistent history of one conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A message stored in a backend thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub content: Vec<MessageContent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text { text: TextContent },
    /// Images, attachments and anything else the transport cannot render.
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextContent {
    pub value: String,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

/// A span of `TextContent::value` the backend annotated, e.g. a file citation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Annotation {
    #[serde(rename = "type")]
    pub kind: String,
    /// Placeholder text inside the message value, e.g. `【4:0†source】`.
    pub text: String,
    #[serde(default)]
    pub file_citation: Option<FileCitation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileCitation {
    #[serde(default)]
    pub file_id: String,
    #[serde(default)]
    pub quote: Option<String>,
}

/// One page of `GET /threads/{id}/messages`.
#[derive(Debug, Clone, Deserialize)]
pub struct MessagePage {
    pub data: Vec<ThreadMessage>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub last_id: Option<String>,
}
