//! Logout command.

use anyhow::Result;
use clap::Args;

use super::Context;

/// Arguments for the logout command.
#[derive(Args, Debug)]
pub struct LogoutArgs {}

/// Run the logout command.
pub async fn run(_args: LogoutArgs, ctx: &Context) -> Result<()> {
    ctx.client.auth().logout().await?;

    if ctx.json_output {
        ctx.print_json(&serde_json::json!({ "logged_out": true }))?;
    } else {
        println!("Signed out. The device key has been destroyed.");
    }
    Ok(())
}
