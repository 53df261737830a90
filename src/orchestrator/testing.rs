//! In-memory collaborators for orchestrator tests.

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::assistant::types::{
    MessageContent, Role, Run, RunError, RunStatus, TextContent, Thread, ThreadMessage, Usage,
};
use crate::assistant::ReasoningBackend;
use crate::store::types::{ConversationId, OwnerId, MIN_TOKENS_FOR_REQUEST, TOKENS_PER_DAY};
use crate::store::SessionStore;
use crate::transport::{MessageFormat, Transport};

/// How a created run behaves when polled.
#[derive(Debug, Clone)]
pub enum Script {
    /// Pending for this many polls, then completed.
    CompleteAfter { polls: u32, tokens: Option<u64> },
    /// Terminal failure with this error code on the first poll.
    Fail(&'static str),
    /// Never leaves `in_progress`.
    Stall,
}

#[derive(Default)]
struct BackendState {
    threads_created: u32,
    threads_deleted: Vec<String>,
    messages_created: Vec<(String, String)>,
    runs: HashMap<String, (Script, u32)>,
    run_created_at: Vec<Instant>,
    cancelled: Vec<String>,
    polls: u32,
}

/// Backend whose runs follow a fixed script: run `n` uses `scripts[n]`
/// (the last script repeats).
pub struct ScriptedBackend {
    scripts: Vec<Script>,
    reply: Vec<String>,
    state: Mutex<BackendState>,
    pub fail_create_message: bool,
    pub fail_create_run: bool,
    pub fail_get_run: bool,
    pub fail_list_messages: bool,
    pub fail_cancel: bool,
    pub fail_delete_thread: bool,
}

impl ScriptedBackend {
    pub fn new(scripts: Vec<Script>, reply: &[&str]) -> Self {
        Self {
            scripts,
            reply: reply.iter().map(|s| s.to_string()).collect(),
            state: Mutex::new(BackendState::default()),
            fail_create_message: false,
            fail_create_run: false,
            fail_get_run: false,
            fail_list_messages: false,
            fail_cancel: false,
            fail_delete_thread: false,
        }
    }

    pub fn runs_created(&self) -> usize {
        self.state.lock().run_created_at.len()
    }

    pub fn run_created_at(&self) -> Vec<Instant> {
        self.state.lock().run_created_at.clone()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.state.lock().cancelled.clone()
    }

    pub fn threads_created(&self) -> u32 {
        self.state.lock().threads_created
    }

    pub fn threads_deleted(&self) -> Vec<String> {
        self.state.lock().threads_deleted.clone()
    }

    pub fn messages_created(&self) -> Vec<(String, String)> {
        self.state.lock().messages_created.clone()
    }

    pub fn polls(&self) -> u32 {
        self.state.lock().polls
    }
}

fn run(id: &str, thread_id: &str, status: RunStatus) -> Run {
    Run {
        id: id.to_string(),
        thread_id: thread_id.to_string(),
        status,
        last_error: None,
        usage: None,
    }
}

fn text_message(id: &str, role: Role, value: &str) -> ThreadMessage {
    ThreadMessage {
        id: id.to_string(),
        role,
        content: vec![MessageContent::Text {
            text: TextContent {
                value: value.to_string(),
                annotations: vec![],
            },
        }],
    }
}

#[async_trait]
impl ReasoningBackend for ScriptedBackend {
    async fn create_thread(&self) -> Result<Thread> {
        let mut state = self.state.lock();
        state.threads_created += 1;
        Ok(Thread {
            id: format!("thread_{}", state.threads_created),
        })
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        self.state.lock().threads_deleted.push(thread_id.to_string());
        if self.fail_delete_thread {
            return Err(anyhow!("delete thread: 404 No thread found"));
        }
        Ok(())
    }

    async fn create_message(&self, thread_id: &str, text: &str) -> Result<String> {
        if self.fail_create_message {
            return Err(anyhow!("create message: 500 Internal Server Error"));
        }
        let mut state = self.state.lock();
        state
            .messages_created
            .push((thread_id.to_string(), text.to_string()));
        Ok(format!("msg_{}", state.messages_created.len()))
    }

    async fn create_run(&self, thread_id: &str) -> Result<Run> {
        if self.fail_create_run {
            return Err(anyhow!("create run: 429 Too Many Requests"));
        }
        let mut state = self.state.lock();
        let n = state.run_created_at.len();
        let script = self
            .scripts
            .get(n)
            .or(self.scripts.last())
            .cloned()
            .unwrap_or(Script::Stall);
        let id = format!("run_{}", n + 1);
        state.runs.insert(id.clone(), (script, 0));
        state.run_created_at.push(Instant::now());
        Ok(run(&id, thread_id, RunStatus::Queued))
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run> {
        let mut state = self.state.lock();
        state.polls += 1;
        if self.fail_get_run {
            return Err(anyhow!("retrieve run: connection reset"));
        }
        let (script, polls) = state
            .runs
            .get_mut(run_id)
            .ok_or_else(|| anyhow!("unknown run {}", run_id))?;
        *polls += 1;
        let (script, polls) = (script.clone(), *polls);

        Ok(match script {
            Script::CompleteAfter { polls: after, tokens } if polls > after => Run {
                usage: tokens.map(|total_tokens| Usage {
                    total_tokens,
                    ..Usage::default()
                }),
                ..run(run_id, thread_id, RunStatus::Completed)
            },
            Script::CompleteAfter { .. } | Script::Stall => {
                run(run_id, thread_id, RunStatus::InProgress)
            }
            Script::Fail(code) => Run {
                last_error: Some(RunError {
                    code: code.to_string(),
                    message: "scripted failure".to_string(),
                }),
                ..run(run_id, thread_id, RunStatus::Failed)
            },
        })
    }

    async fn cancel_run(&self, _thread_id: &str, run_id: &str) -> Result<()> {
        self.state.lock().cancelled.push(run_id.to_string());
        if self.fail_cancel {
            return Err(anyhow!("cancel run: 400 already completed"));
        }
        Ok(())
    }

    async fn list_messages_since(
        &self,
        _thread_id: &str,
        message_id: &str,
    ) -> Result<Vec<ThreadMessage>> {
        if self.fail_list_messages {
            return Err(anyhow!("list messages: 502 Bad Gateway"));
        }
        Ok(self
            .reply
            .iter()
            .enumerate()
            .map(|(i, text)| {
                text_message(&format!("{}_reply_{}", message_id, i), Role::Assistant, text)
            })
            .collect())
    }
}

#[derive(Default)]
struct StoreState {
    threads: HashMap<ConversationId, String>,
    spent: HashMap<OwnerId, i64>,
    upserts: Vec<(String, ConversationId, OwnerId)>,
}

/// Store kept in a hash map; `fail` makes every call error, `fail_writes`
/// only the bookkeeping writes.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
    pub fail: bool,
    pub fail_writes: bool,
}

impl MemoryStore {
    pub fn with_thread(conversation: ConversationId, thread_id: &str) -> Self {
        let store = Self::default();
        store
            .state
            .lock()
            .threads
            .insert(conversation, thread_id.to_string());
        store
    }

    pub fn exhausted(owner: OwnerId) -> Self {
        let store = Self::default();
        store
            .state
            .lock()
            .spent
            .insert(owner, TOKENS_PER_DAY - MIN_TOKENS_FOR_REQUEST);
        store
    }

    pub fn spent(&self, owner: OwnerId) -> i64 {
        self.state.lock().spent.get(&owner).copied().unwrap_or(0)
    }

    pub fn upserts(&self) -> Vec<(String, ConversationId, OwnerId)> {
        self.state.lock().upserts.clone()
    }

    pub fn thread(&self, conversation: ConversationId) -> Option<String> {
        self.state.lock().threads.get(&conversation).cloned()
    }

    fn check(&self) -> Result<()> {
        if self.fail {
            Err(anyhow!("store unavailable"))
        } else {
            Ok(())
        }
    }

    fn check_write(&self) -> Result<()> {
        self.check()?;
        if self.fail_writes {
            return Err(anyhow!("store is read-only"));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn thread_for_conversation(&self, conversation: ConversationId) -> Result<Option<String>> {
        self.check()?;
        Ok(self.thread(conversation))
    }

    async fn upsert_thread(&self, thread_id: &str, conversation: ConversationId, owner: OwnerId) -> Result<()> {
        self.check_write()?;
        let mut state = self.state.lock();
        state.threads.insert(conversation, thread_id.to_string());
        state.upserts.push((thread_id.to_string(), conversation, owner));
        Ok(())
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        self.check()?;
        self.state.lock().threads.retain(|_, t| t != thread_id);
        Ok(())
    }

    async fn decrease_quota(&self, owner: OwnerId, tokens: u64) -> Result<()> {
        self.check_write()?;
        *self.state.lock().spent.entry(owner).or_default() += tokens as i64;
        Ok(())
    }

    async fn is_quota_exhausted(&self, owner: OwnerId) -> Result<bool> {
        Ok(self.remaining_quota(owner).await? <= MIN_TOKENS_FOR_REQUEST)
    }

    async fn remaining_quota(&self, owner: OwnerId) -> Result<i64> {
        self.check()?;
        Ok(TOKENS_PER_DAY - self.spent(owner))
    }
}

/// Transport that records what it sent; texts listed in `failing` error instead.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(ConversationId, String)>>,
    failing: Vec<String>,
}

impl RecordingTransport {
    pub fn failing_on(texts: &[&str]) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failing: texts.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn sent(&self) -> Vec<(ConversationId, String)> {
        self.sent.lock().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent.lock().iter().map(|(_, t)| t.clone()).collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_message(
        &self,
        conversation: ConversationId,
        text: &str,
        _format: MessageFormat,
    ) -> Result<()> {
        if self.failing.iter().any(|f| f == text) {
            return Err(anyhow!("transport rejected message"));
        }
        self.sent.lock().push((conversation, text.to_string()));
        Ok(())
    }
}
