mod assistant;
mod commands;
mod orchestrator;
mod state;
mod store;
mod transport;

use std::sync::Arc;
use std::time::Duration;

use poise::serenity_prelude as serenity;
use poise::{Framework, FrameworkOptions};
use tokio::sync::RwLock;
use tracing::{error, info, Level};

use assistant::{AssistantClient, ReasoningBackend};
use orchestrator::{Orchestrator, RunPolicy};
use state::{AppState, Settings};
use store::{ChatStore, SessionStore};
use transport::{DiscordTransport, Transport};

const HEALTH_PING_EVERY: Duration = Duration::from_secs(30 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load env
    let _ = dotenv::dotenv();
    let level = dotenv::var("LOG_LEVEL")
        .ok()
        .and_then(|l| l.trim().parse::<Level>().ok())
        .unwrap_or(Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();

    let settings = Settings::from_env()?;

    // Init storage
    let store: Arc<dyn SessionStore> =
        Arc::new(ChatStore::new(&settings.data_dir, settings.quota_offset).await?);
    info!(
        data_dir = ?settings.data_dir,
        quota_offset = %settings.quota_offset,
        "Session store initialized"
    );

    // Init assistant client
    let backend: Arc<dyn ReasoningBackend> = Arc::new(AssistantClient::from_env()?);
    info!("Assistant client initialized");

    if !settings.admin_ids.is_empty() {
        info!(count = settings.admin_ids.len(), "Admin users configured");
    }

    let policy = Arc::new(RwLock::new(RunPolicy::from_env()));
    info!(policy = ?*policy.read().await, "Run policy loaded");

    let intents = serenity::GatewayIntents::GUILDS
        | serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::DIRECT_MESSAGES
        | serenity::GatewayIntents::MESSAGE_CONTENT;

    let token = settings.discord_token.clone();
    let framework = Framework::builder()
        .options(FrameworkOptions {
            commands: vec![commands::consult()],
            event_handler: |ctx, event, framework, data| {
                Box::pin(commands::inbound::event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                info!("Bot connected as: {} ({})", ready.user.name, ready.user.id);

                let transport: Arc<dyn Transport> = Arc::new(DiscordTransport::new(ctx.http.clone()));
                let orchestrator = Arc::new(Orchestrator::new(
                    backend.clone(),
                    store.clone(),
                    transport.clone(),
                    policy.clone(),
                ));

                if let Some(channel) = settings.health_ping_channel {
                    transport::spawn_health_ping(transport, channel, HEALTH_PING_EVERY);
                }

                let commands = &framework.options().commands;
                info!("Registering {} top-level command(s):", commands.len());
                for cmd in commands {
                    info!("  /{} ({} subcommands)", cmd.name, cmd.subcommands.len());
                    for sub in &cmd.subcommands {
                        info!("    /{} {}", cmd.name, sub.name);
                    }
                }

                if let Some(gid) = settings.guild_id.map(serenity::GuildId::new) {
                    info!("Registering to guild {} (instant)", gid);
                    poise::builtins::register_in_guild(ctx, &framework.options().commands, gid)
                        .await?;
                } else {
                    info!("Registering globally (up to 1 hour delay)");
                    poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                }

                Ok(AppState {
                    orchestrator,
                    store,
                    backend,
                    admin_ids: settings.admin_ids,
                    policy,
                })
            })
        })
        .build();

    info!("Starting legal consultation bot...");

    let mut client = serenity::ClientBuilder::new(&token, intents)
        .framework(framework)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create client: {}", e))?;

    if let Err(e) = client.start().await {
        error!("Client error: {}", e);
    }

    Ok(())
}
