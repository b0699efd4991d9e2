//! Check-username command.

use anyhow::Result;
use clap::Args;

use super::Context;

/// Arguments for the check-username command.
#[derive(Args, Debug)]
pub struct CheckUsernameArgs {
    /// Username to check
    pub username: String,
}

/// Run the check-username command.
pub async fn run(args: CheckUsernameArgs, ctx: &Context) -> Result<()> {
    let available = ctx
        .client
        .users()
        .check_username_available(&args.username)
        .await?;

    if ctx.json_output {
        ctx.print_json(&serde_json::json!({
            "username": args.username,
            "available": available,
        }))?;
    } else if available {
        println!("{} is available", args.username);
    } else {
        println!("{} is taken", args.username);
    }
    Ok(())
}
