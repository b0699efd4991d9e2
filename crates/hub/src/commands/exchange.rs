//! Exchange command - finish a social login.

use anyhow::Result;
use clap::Args;

use super::Context;

/// Arguments for the exchange command.
#[derive(Args, Debug)]
pub struct ExchangeArgs {}

/// Run the exchange command.
///
/// The backend identifies the social login by the cookie it set earlier, so
/// this only works when the same cookie jar made the social-login request.
pub async fn run(_args: ExchangeArgs, ctx: &Context) -> Result<()> {
    ctx.client.auth().exchange_social_login_cookie().await?;
    let user = ctx.client.users().current().await?;

    if ctx.json_output {
        ctx.print_json(&user)?;
    } else {
        println!("Signed in as {}", user.username);
    }
    Ok(())
}
