mod config;
pub mod inbound;
mod limit;
mod manage;

use crate::state::Context;

/// Legal consultation assistant
#[poise::command(
    slash_command,
    subcommands(
        "manage::start",
        "manage::help",
        "manage::new",
        "limit::limit",
        "config::config"
    )
)]
pub async fn consult(_ctx: Context<'_>) -> Result<(), anyhow::Error> {
    Ok(())
}
