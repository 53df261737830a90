pub mod chunk;
pub mod delivery;
pub mod notices;
pub mod poll;
pub mod slots;
#[cfg(test)]
pub mod testing;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::assistant::annotations::answer_texts;
use crate::assistant::types::{Run, StatusClass};
use crate::assistant::ReasoningBackend;
use crate::store::types::{ConversationId, OwnerId};
use crate::store::SessionStore;
use crate::transport::{send_safe, MessageFormat, Transport};

use delivery::{deliver, DeliveryReport};
use poll::{poll, IntervalPolicy, PollOutcome};
use slots::{ConversationSlots, SlotGuard};

/// Tunable limits of the run lifecycle (admins can modify at runtime).
#[derive(Debug, Clone, PartialEq)]
pub struct RunPolicy {
    pub poll_interval: IntervalPolicy,
    pub max_poll_attempts: u32,
    /// Cancel-and-resubmit cycles allowed after a stall.
    pub max_timeout_retries: u32,
    /// Resubmissions allowed after rate-limit failures.
    pub max_rate_limit_retries: u32,
    pub rate_limit_backoff: Duration,
    /// Transport ceiling for one answer segment, in characters.
    pub max_message_len: usize,
}

impl Default for RunPolicy {
    fn default() -> Self {
        Self {
            poll_interval: IntervalPolicy::Fixed(Duration::from_millis(2000)),
            max_poll_attempts: 25,
            max_timeout_retries: 1,
            max_rate_limit_retries: 3,
            rate_limit_backoff: Duration::from_secs(60),
            max_message_len: 1990,
        }
    }
}

fn env_value<T: FromStr>(key: &str) -> Option<T> {
    dotenv::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl RunPolicy {
    /// Defaults, overridden by any `POLL_INTERVAL_MS`, `POLL_MAX_ATTEMPTS`,
    /// `RATE_LIMIT_BACKOFF_SECS` or `MAX_MESSAGE_LEN` set in the environment.
    pub fn from_env() -> Self {
        let mut policy = Self::default();
        if let Some(ms) = env_value::<u64>("POLL_INTERVAL_MS") {
            policy.poll_interval = IntervalPolicy::Fixed(Duration::from_millis(ms));
        }
        if let Some(n) = env_value("POLL_MAX_ATTEMPTS") {
            policy.max_poll_attempts = n;
        }
        if let Some(secs) = env_value::<u64>("RATE_LIMIT_BACKOFF_SECS") {
            policy.rate_limit_backoff = Duration::from_secs(secs);
        }
        if let Some(len) = env_value::<usize>("MAX_MESSAGE_LEN").filter(|l| *l > 0) {
            policy.max_message_len = len;
        }
        policy
    }
}

/// One inbound user message that passed transport validation.
#[derive(Debug, Clone)]
pub struct UserRequest {
    pub conversation: ConversationId,
    pub owner: OwnerId,
    pub prompt: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// A run is already in flight for this conversation.
    Busy,
    QuotaExhausted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Stalled again after the allowed cancel-and-resubmit cycles.
    TimedOut,
    /// Still rate limited after the allowed resubmissions.
    RateLimited,
    /// Terminal failure that is not retried; carries the backend error code.
    RunFailed(Option<String>),
    /// A remote or storage call errored outside the poll loop.
    Internal,
}

/// How a request ended. Every variant has already been reported to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    Answered {
        segments: usize,
        delivery: DeliveryReport,
    },
    Rejected(Rejection),
    Failed(FailureReason),
}

/// Retry bookkeeping for one request. The two budgets are independent.
#[derive(Debug, Clone, Copy, Default)]
struct RetryContext {
    timeout_retries: u32,
    rate_limit_retries: u32,
}

enum DriveOutcome {
    Succeeded(Run),
    Failed(Run),
    TimedOut,
}

/// First run of a request, with the thread and message it answers.
struct Submission {
    thread_id: String,
    message_id: String,
    run: Run,
}

/// Drives user requests through remote reasoning runs and delivers the answers.
pub struct Orchestrator {
    backend: Arc<dyn ReasoningBackend>,
    store: Arc<dyn SessionStore>,
    transport: Arc<dyn Transport>,
    slots: ConversationSlots,
    policy: Arc<RwLock<RunPolicy>>,
}

impl Orchestrator {
    pub fn new(
        backend: Arc<dyn ReasoningBackend>,
        store: Arc<dyn SessionStore>,
        transport: Arc<dyn Transport>,
        policy: Arc<RwLock<RunPolicy>>,
    ) -> Self {
        Self {
            backend,
            store,
            transport,
            slots: ConversationSlots::new(),
            policy,
        }
    }

    pub fn slots(&self) -> &ConversationSlots {
        &self.slots
    }

    async fn notify(&self, conversation: ConversationId, text: &str) {
        send_safe(self.transport.as_ref(), conversation, text, MessageFormat::Plain).await;
    }

    /// Guard-check, submit, drive and deliver one request.
    ///
    /// Never fails: every terminal condition is turned into a user-visible
    /// message, and the conversation slot is released before returning.
    pub async fn handle_user_request(&self, req: &UserRequest) -> RequestOutcome {
        let conversation = req.conversation;

        let Some(slot) = self.slots.try_acquire(conversation) else {
            info!(conversation, owner = req.owner, "request rejected, previous run in flight");
            self.notify(conversation, notices::WAIT_FOR_PREVIOUS_REQUEST).await;
            return RequestOutcome::Rejected(Rejection::Busy);
        };

        match self.store.is_quota_exhausted(req.owner).await {
            Ok(false) => {}
            Ok(true) => {
                info!(conversation, owner = req.owner, "request rejected, quota exhausted");
                self.notify(conversation, notices::LIMIT_REACHED).await;
                return RequestOutcome::Rejected(Rejection::QuotaExhausted);
            }
            Err(e) => {
                error!(conversation, owner = req.owner, "Error checking quota: {:#}", e);
                self.notify(conversation, notices::ERROR_PROCESSING_REQUEST).await;
                return RequestOutcome::Failed(FailureReason::Internal);
            }
        }

        let policy = self.policy.read().await.clone();
        let outcome = match self.process(req, &slot, &policy).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    conversation,
                    run_id = ?self.slots.current_run(conversation),
                    "Error processing user prompt: {:#}",
                    e
                );
                self.notify(conversation, notices::ERROR_PROCESSING_REQUEST).await;
                RequestOutcome::Failed(FailureReason::Internal)
            }
        };
        slot.release();
        outcome
    }

    /// The run lifecycle: submit, then poll until success, a terminal
    /// failure, or the retry budgets are spent.
    async fn process(
        &self,
        req: &UserRequest,
        slot: &SlotGuard,
        policy: &RunPolicy,
    ) -> Result<RequestOutcome> {
        let conversation = req.conversation;
        let Submission {
            thread_id,
            message_id,
            mut run,
        } = self.submit(req, slot).await?;

        self.notify(conversation, notices::TAKEN_INTO_PROCESSING).await;

        let mut retry = RetryContext::default();
        loop {
            match self.drive(&run, policy).await {
                DriveOutcome::Succeeded(done) => {
                    return self
                        .on_success(req, &thread_id, &message_id, done, policy)
                        .await;
                }
                DriveOutcome::TimedOut => {
                    if retry.timeout_retries >= policy.max_timeout_retries {
                        warn!(
                            conversation,
                            run_id = %run.id,
                            timeout_retries = retry.timeout_retries,
                            "run stalled again, giving up"
                        );
                        self.notify(conversation, notices::ERROR_PROCESSING_REQUEST).await;
                        return Ok(RequestOutcome::Failed(FailureReason::TimedOut));
                    }
                    retry.timeout_retries += 1;
                    info!(
                        conversation,
                        run_id = %run.id,
                        timeout_retries = retry.timeout_retries,
                        "run stalled, cancelling and resubmitting"
                    );
                    self.notify(conversation, notices::PROCESSING_TIMEOUT).await;
                    self.cancel_quietly(&run).await;
                    run = self.resubmit(&thread_id, slot).await?;
                }
                DriveOutcome::Failed(failed) => {
                    let rate_limited = failed.is_rate_limited();
                    if rate_limited && retry.rate_limit_retries < policy.max_rate_limit_retries {
                        retry.rate_limit_retries += 1;
                        warn!(
                            conversation,
                            run_id = %failed.id,
                            rate_limit_retries = retry.rate_limit_retries,
                            backoff_secs = policy.rate_limit_backoff.as_secs(),
                            "run rate limited, backing off"
                        );
                        self.notify(conversation, notices::RATE_LIMIT_EXCEEDED).await;
                        tokio::time::sleep(policy.rate_limit_backoff).await;
                        run = self.resubmit(&thread_id, slot).await?;
                        continue;
                    }

                    let code = failed.last_error.as_ref().map(|e| e.code.clone());
                    error!(
                        conversation,
                        run_id = %failed.id,
                        status = ?failed.status,
                        code = ?code,
                        error_message = ?failed.last_error.as_ref().map(|e| e.message.as_str()),
                        rate_limit_retries = retry.rate_limit_retries,
                        "run failed"
                    );
                    self.notify(conversation, notices::ERROR_PROCESSING_REQUEST).await;
                    let reason = if rate_limited {
                        FailureReason::RateLimited
                    } else {
                        FailureReason::RunFailed(code)
                    };
                    return Ok(RequestOutcome::Failed(reason));
                }
            }
        }
    }

    /// Thread for the conversation, creating and recording one if needed.
    async fn thread_for(&self, req: &UserRequest) -> Result<String> {
        if let Some(thread_id) = self
            .store
            .thread_for_conversation(req.conversation)
            .await
            .context("Failed to look up conversation thread")?
        {
            return Ok(thread_id);
        }

        let thread = self
            .backend
            .create_thread()
            .await
            .context("Failed to create thread")?;
        if let Err(e) = self
            .store
            .upsert_thread(&thread.id, req.conversation, req.owner)
            .await
        {
            warn!(conversation = req.conversation, thread_id = %thread.id, "Failed to record thread: {:#}", e);
        }
        info!(conversation = req.conversation, thread_id = %thread.id, "new thread");
        Ok(thread.id)
    }

    async fn submit(&self, req: &UserRequest, slot: &SlotGuard) -> Result<Submission> {
        let thread_id = self.thread_for(req).await?;
        let message_id = self
            .backend
            .create_message(&thread_id, &req.prompt)
            .await
            .context("Failed to create message")?;
        let run = self.resubmit(&thread_id, slot).await?;
        Ok(Submission {
            thread_id,
            message_id,
            run,
        })
    }

    /// Start a run on the thread and make it the conversation's in-flight run.
    async fn resubmit(&self, thread_id: &str, slot: &SlotGuard) -> Result<Run> {
        let run = self
            .backend
            .create_run(thread_id)
            .await
            .context("Failed to create run")?;
        slot.register_run(&run.id);
        debug!(conversation = slot.conversation(), thread_id, run_id = %run.id, "run submitted");
        Ok(run)
    }

    async fn drive(&self, run: &Run, policy: &RunPolicy) -> DriveOutcome {
        let backend = self.backend.as_ref();
        let (thread_id, run_id) = (run.thread_id.as_str(), run.id.as_str());

        let outcome = poll(
            move || backend.get_run(thread_id, run_id),
            &policy.poll_interval,
            policy.max_poll_attempts,
            |r: &Run| r.status.is_terminal(),
        )
        .await;

        match outcome {
            PollOutcome::Ready(done) if done.status.class() == StatusClass::Succeeded => {
                DriveOutcome::Succeeded(done)
            }
            PollOutcome::Ready(done) => DriveOutcome::Failed(done),
            PollOutcome::Exhausted { last } => {
                debug!(run_id, last_status = ?last.map(|r| r.status), "polling exhausted");
                DriveOutcome::TimedOut
            }
        }
    }

    async fn cancel_quietly(&self, run: &Run) {
        if let Err(e) = self.backend.cancel_run(&run.thread_id, &run.id).await {
            warn!(run_id = %run.id, "Failed to cancel run: {:#}", e);
        }
    }

    async fn on_success(
        &self,
        req: &UserRequest,
        thread_id: &str,
        message_id: &str,
        run: Run,
        policy: &RunPolicy,
    ) -> Result<RequestOutcome> {
        let conversation = req.conversation;
        let tokens = run.total_tokens();
        info!(conversation, run_id = %run.id, tokens, "run completed");

        if let Err(e) = self.store.decrease_quota(req.owner, tokens).await {
            warn!(owner = req.owner, tokens, "Failed to record usage: {:#}", e);
        }
        if let Err(e) = self
            .store
            .upsert_thread(thread_id, conversation, req.owner)
            .await
        {
            warn!(conversation, thread_id, "Failed to refresh thread: {:#}", e);
        }

        let messages = self
            .backend
            .list_messages_since(thread_id, message_id)
            .await
            .context("Failed to list reply messages")?;

        let segments: Vec<String> = answer_texts(&messages)
            .iter()
            .flat_map(|text| chunk::chunk(text, policy.max_message_len))
            .collect();

        let delivery = deliver(self.transport.as_ref(), conversation, &segments).await;
        Ok(RequestOutcome::Answered {
            segments: segments.len(),
            delivery,
        })
    }
}
