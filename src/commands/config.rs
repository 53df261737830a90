use std::time::Duration;

use tracing::info;

use crate::orchestrator::poll::IntervalPolicy;
use crate::orchestrator::RunPolicy;
use crate::state::Context;

const PARAMS: &str = "`poll_interval_ms`, `poll_attempts`, `timeout_retries`, \
     `rate_limit_retries`, `rate_limit_backoff_secs`, `max_message_len`";

/// Show or change the run policy (admin only)
#[poise::command(slash_command)]
pub async fn config(
    ctx: Context<'_>,
    #[description = "poll_interval_ms | poll_attempts | timeout_retries | rate_limit_retries | rate_limit_backoff_secs | max_message_len"]
    param: Option<String>,
    #[description = "New value"] value: Option<u64>,
) -> Result<(), anyhow::Error> {
    let user_id = ctx.author().id.get();
    if !ctx.data().is_admin(user_id) {
        ctx.say("This command is admin-only.").await?;
        return Ok(());
    }

    match (param.as_deref(), value) {
        (None, _) => {
            let policy = ctx.data().policy.read().await;
            ctx.say(describe(&policy)).await?;
        }
        (Some(key), Some(val)) => {
            let mut policy = ctx.data().policy.write().await;
            match apply_setting(&mut policy, key, val) {
                Ok(()) => {
                    info!(user_id, key, val, "Run policy updated");
                    ctx.say(format!("`{}` set to {}", key, val)).await?;
                }
                Err(reason) => {
                    ctx.say(reason).await?;
                }
            }
        }
        (Some(_), None) => {
            ctx.say("Provide both `param` and `value`. Example: `/consult config poll_attempts 30`")
                .await?;
        }
    }

    Ok(())
}

fn describe(policy: &RunPolicy) -> String {
    let interval = match &policy.poll_interval {
        IntervalPolicy::Fixed(d) => format!("{}", d.as_millis()),
        IntervalPolicy::Schedule(steps) => format!("{:?}", steps),
    };
    format!(
        "**Run policy:**\n\
         `poll_interval_ms`: {}\n\
         `poll_attempts`: {}\n\
         `timeout_retries`: {}\n\
         `rate_limit_retries`: {}\n\
         `rate_limit_backoff_secs`: {}\n\
         `max_message_len`: {}",
        interval,
        policy.max_poll_attempts,
        policy.max_timeout_retries,
        policy.max_rate_limit_retries,
        policy.rate_limit_backoff.as_secs(),
        policy.max_message_len
    )
}

/// Apply one `/consult config` change; the error is the reply for the admin.
fn apply_setting(policy: &mut RunPolicy, key: &str, val: u64) -> Result<(), String> {
    let as_u32 = || u32::try_from(val).map_err(|_| format!("`{}` is too large", key));
    match key {
        "poll_interval_ms" => policy.poll_interval = IntervalPolicy::Fixed(Duration::from_millis(val)),
        "poll_attempts" => {
            if val == 0 {
                return Err("`poll_attempts` must be at least 1".to_string());
            }
            policy.max_poll_attempts = as_u32()?;
        }
        "timeout_retries" => policy.max_timeout_retries = as_u32()?,
        "rate_limit_retries" => policy.max_rate_limit_retries = as_u32()?,
        "rate_limit_backoff_secs" => policy.rate_limit_backoff = Duration::from_secs(val),
        "max_message_len" => {
            if val == 0 {
                return Err("`max_message_len` must be at least 1".to_string());
            }
            policy.max_message_len = usize::try_from(val).map_err(|_| format!("`{}` is too large", key))?;
        }
        _ => return Err(format!("Unknown param `{}`. Valid: {}", key, PARAMS)),
    }
    Ok(())
}
