use crate::orchestrator::notices;
use crate::state::Context;

/// Show your remaining daily token quota
#[poise::command(slash_command)]
pub async fn limit(ctx: Context<'_>) -> Result<(), anyhow::Error> {
    let remaining = ctx.data().store.remaining_quota(ctx.author().id.get()).await?;
    ctx.say(limit_message(remaining)).await?;
    Ok(())
}

/// Overruns are stored as negative balances but shown as zero.
fn limit_message(remaining: i64) -> String {
    notices::CHECK_LIMIT.replace("{limit}", &remaining.max(0).to_string())
}
