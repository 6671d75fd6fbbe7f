use crate::moderation::denylist::DenylistSnapshot;
use crate::{Data, Error};
use poise::{Context, command};

/// Describe a denylist snapshot for moderators
#[must_use]
pub fn describe_denylist(snapshot: &DenylistSnapshot, pending_suppressions: usize) -> String {
    let refreshed = snapshot.refreshed_at().map_or_else(
        || "never".to_string(),
        |at| format!("<t:{}:R>", at.timestamp()),
    );
    format!(
        "Scam link denylist: {} entries (version {}), last refreshed {refreshed}. \
         {pending_suppressions} user(s) with pending role restorations.",
        snapshot.len(),
        snapshot.version(),
    )
}

/// Show the state of the scam link denylist.
#[command(slash_command, guild_only, required_permissions = "MANAGE_CHANNELS")]
pub async fn denylist(ctx: Context<'_, Data, Error>) -> Result<(), Error> {
    let data = ctx.data();
    let summary = describe_denylist(&data.denylist.snapshot(), data.suppressions.len());
    ctx.say(summary).await?;
    Ok(())
}
