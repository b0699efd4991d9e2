//! Register command - account creation.

use anyhow::Result;
use clap::Args;
use hub_client::RegisterRequest;

use super::Context;

/// Arguments for the register command.
#[derive(Args, Debug)]
pub struct RegisterArgs {
    /// Desired username
    pub username: String,

    /// Display name
    #[arg(long)]
    pub nickname: Option<String>,

    /// Contact email
    #[arg(long)]
    pub email: Option<String>,

    /// Password (prompted for when omitted)
    #[arg(long, env = "HUB_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

/// Run the register command.
pub async fn run(args: RegisterArgs, ctx: &Context) -> Result<()> {
    let password = match args.password {
        Some(password) => password,
        None => {
            let first = rpassword::prompt_password("Password: ")?;
            let second = rpassword::prompt_password("Confirm password: ")?;
            if first != second {
                anyhow::bail!("Passwords do not match");
            }
            first
        }
    };

    let request = RegisterRequest {
        username: args.username.clone(),
        password,
        nickname: args.nickname,
        email: args.email,
    };
    ctx.client.users().register(&request).await?;

    if ctx.json_output {
        ctx.print_json(&serde_json::json!({ "registered": args.username }))?;
    } else {
        println!("Registered {}. Run 'hub login {}' to sign in.", args.username, args.username);
    }
    Ok(())
}
