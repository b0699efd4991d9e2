//! Whoami command - show the signed-in user.

use anyhow::Result;
use clap::Args;

use super::Context;

/// Arguments for the whoami command.
#[derive(Args, Debug)]
pub struct WhoamiArgs {
    /// Print the cached profile without contacting the server
    #[arg(long)]
    pub offline: bool,
}

/// Run the whoami command.
pub async fn run(args: WhoamiArgs, ctx: &Context) -> Result<()> {
    let user = if args.offline {
        ctx.client.auth_state().user()
    } else if ctx.client.auth_state().is_logged_in() {
        match ctx.client.users().current().await {
            Ok(user) => Some(user),
            // The account is gone; `current` has already cleared the marker.
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e.into()),
        }
    } else {
        None
    };

    let Some(user) = user else {
        if ctx.json_output {
            ctx.print_json(&serde_json::Value::Null)?;
        } else {
            println!("Not signed in");
        }
        return Ok(());
    };

    if ctx.json_output {
        ctx.print_json(&user)?;
        return Ok(());
    }

    println!("Username: {}", user.username);
    if let Some(nickname) = &user.nickname {
        println!("Nickname: {}", nickname);
    }
    if let Some(email) = &user.email {
        println!("Email:    {}", email);
    }
    if let Some(social) = &user.social {
        println!("Social:   {}", social);
    }
    Ok(())
}
