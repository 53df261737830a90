use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use chrono::FixedOffset;
use tokio::sync::RwLock;

use crate::assistant::ReasoningBackend;
use crate::orchestrator::{Orchestrator, RunPolicy};
use crate::store::SessionStore;

/// Process-level settings read once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub discord_token: String,
    /// Register commands in this guild instead of globally.
    pub guild_id: Option<u64>,
    pub admin_ids: HashSet<u64>,
    pub health_ping_channel: Option<u64>,
    pub data_dir: PathBuf,
    pub quota_offset: FixedOffset,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let discord_token = dotenv::var("DISCORD_TOKEN").context("DISCORD_TOKEN required")?;
        let guild_id = dotenv::var("DISCORD_GUILD_ID")
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok());
        let admin_ids = parse_id_list(&dotenv::var("ADMIN_USER_IDS").unwrap_or_default());
        let health_ping_channel = dotenv::var("HEALTH_PING_CHANNEL_ID")
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
            .filter(|id| *id != 0);
        let data_dir = PathBuf::from(
            dotenv::var("DATA_DIR").unwrap_or_else(|_| "./data/store".to_string()),
        );
        let offset_hours = match dotenv::var("QUOTA_UTC_OFFSET_HOURS") {
            Ok(raw) => raw
                .trim()
                .parse::<i32>()
                .with_context(|| format!("invalid QUOTA_UTC_OFFSET_HOURS: {}", raw))?,
            Err(_) => 5,
        };
        let quota_offset = FixedOffset::east_opt(offset_hours * 3600)
            .with_context(|| format!("QUOTA_UTC_OFFSET_HOURS out of range: {}", offset_hours))?;

        Ok(Self {
            discord_token,
            guild_id,
            admin_ids,
            health_ping_channel,
            data_dir,
            quota_offset,
        })
    }
}

/// Comma separated ids; blanks and malformed entries are skipped.
fn parse_id_list(raw: &str) -> HashSet<u64> {
    raw.split(',')
        .filter_map(|s| s.trim().parse::<u64>().ok())
        .collect()
}

pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub store: Arc<dyn SessionStore>,
    pub backend: Arc<dyn ReasoningBackend>,
    pub admin_ids: HashSet<u64>,
    pub policy: Arc<RwLock<RunPolicy>>,
}

impl AppState {
    pub fn is_admin(&self, user_id: u64) -> bool {
        self.admin_ids.contains(&user_id)
    }
}

pub type Context<'a> = poise::Context<'a, AppState, anyhow::Error>;
