pub mod annotations;
pub mod types;

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use types::{MessagePage, Run, Thread, ThreadMessage};

/// Remote assistant that performs reasoning runs against persistent threads.
#[async_trait]
pub trait ReasoningBackend: Send + Sync {
    async fn create_thread(&self) -> Result<Thread>;
    async fn delete_thread(&self, thread_id: &str) -> Result<()>;
    /// Append a user message; returns the created message id.
    async fn create_message(&self, thread_id: &str, text: &str) -> Result<String>;
    async fn create_run(&self, thread_id: &str) -> Result<Run>;
    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run>;
    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<()>;
    /// All messages created after `message_id`, oldest first.
    async fn list_messages_since(
        &self,
        thread_id: &str,
        message_id: &str,
    ) -> Result<Vec<ThreadMessage>>;
}

const PAGE_LIMIT: usize = 100;

/// HTTP client for the OpenAI Assistants v2 API.
pub struct AssistantClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    assistant_id: String,
}

impl AssistantClient {
    pub fn from_env() -> Result<Self> {
        let base_url = dotenv::var("OPENAI_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let api_key = dotenv::var("OPENAI_API_KEY").context("OPENAI_API_KEY required")?;
        let assistant_id =
            dotenv::var("OPENAI_ASSISTANT_ID").context("OPENAI_ASSISTANT_ID required")?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5 * 60))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url,
            api_key,
            assistant_id,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.url(path))
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", "assistants=v2")
    }

    /// Send a request and decode the JSON body, turning non-2xx replies into errors.
    async fn send<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder, what: &str) -> Result<T> {
        let resp = req
            .send()
            .await
            .with_context(|| format!("{} request failed", what))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .with_context(|| format!("Failed to read {} response", what))?;
        if !status.is_success() {
            return Err(anyhow!("{} returned {}: {}", what, status, text));
        }
        serde_json::from_str(&text).with_context(|| format!("Failed to parse {} JSON", what))
    }
}

#[async_trait]
impl ReasoningBackend for AssistantClient {
    async fn create_thread(&self) -> Result<Thread> {
        let req = self
            .request(reqwest::Method::POST, "threads")
            .json(&serde_json::json!({}));
        let thread: Thread = self.send(req, "create thread").await?;
        debug!(thread_id = %thread.id, "thread created");
        Ok(thread)
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let req = self.request(reqwest::Method::DELETE, &format!("threads/{}", thread_id));
        let _: serde_json::Value = self.send(req, "delete thread").await?;
        debug!(thread_id, "thread deleted");
        Ok(())
    }

    async fn create_message(&self, thread_id: &str, text: &str) -> Result<String> {
        let req = self
            .request(reqwest::Method::POST, &format!("threads/{}/messages", thread_id))
            .json(&serde_json::json!({
                "role": "user",
                "content": text,
            }));
        let message: ThreadMessage = self.send(req, "create message").await?;
        Ok(message.id)
    }

    async fn create_run(&self, thread_id: &str) -> Result<Run> {
        let req = self
            .request(reqwest::Method::POST, &format!("threads/{}/runs", thread_id))
            .json(&serde_json::json!({
                "assistant_id": self.assistant_id,
            }));
        let run: Run = self.send(req, "create run").await?;
        debug!(thread_id, run_id = %run.id, "run created");
        Ok(run)
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run> {
        let req = self.request(
            reqwest::Method::GET,
            &format!("threads/{}/runs/{}", thread_id, run_id),
        );
        let run: Run = self.send(req, "retrieve run").await?;
        debug!(run_id, status = ?run.status, "run status");
        Ok(run)
    }

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<()> {
        let req = self.request(
            reqwest::Method::POST,
            &format!("threads/{}/runs/{}/cancel", thread_id, run_id),
        );
        let _: Run = self.send(req, "cancel run").await?;
        Ok(())
    }

    async fn list_messages_since(
        &self,
        thread_id: &str,
        message_id: &str,
    ) -> Result<Vec<ThreadMessage>> {
        let mut messages = Vec::new();
        let mut cursor = message_id.to_string();

        loop {
            let req = self
                .request(reqwest::Method::GET, &format!("threads/{}/messages", thread_id))
                .query(&[
                    ("order", "asc".to_string()),
                    ("after", cursor.clone()),
                    ("limit", PAGE_LIMIT.to_string()),
                ]);
            let page: MessagePage = self.send(req, "list messages").await?;
            messages.extend(page.data);

            match next_page(page.has_more, page.last_id, &cursor) {
                PageStep::Next(last) => cursor = last,
                PageStep::Done => break,
                PageStep::Stalled => {
                    warn!(thread_id, cursor, "message pagination did not advance, stopping");
                    break;
                }
            }
        }

        Ok(messages)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum PageStep {
    Next(String),
    Done,
    /// More pages claimed but the cursor would not move.
    Stalled,
}

fn next_page(has_more: bool, last_id: Option<String>, cursor: &str) -> PageStep {
    match (has_more, last_id) {
        (false, _) => PageStep::Done,
        (true, Some(last)) if last != cursor => PageStep::Next(last),
        (true, _) => PageStep::Stalled,
    }
}
