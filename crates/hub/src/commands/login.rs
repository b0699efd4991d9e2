//! Login command - password sign-in.

use anyhow::Result;
use clap::Args;

use super::Context;

/// Arguments for the login command.
#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Account username
    pub username: String,

    /// Password (prompted for when omitted)
    #[arg(long, env = "HUB_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

/// Run the login command.
pub async fn run(args: LoginArgs, ctx: &Context) -> Result<()> {
    let password = match args.password {
        Some(password) => password,
        None => rpassword::prompt_password("Password: ")?,
    };

    ctx.client.auth().login(&args.username, &password).await?;
    let user = ctx.client.users().current().await?;

    if ctx.json_output {
        ctx.print_json(&user)?;
    } else {
        println!("Signed in as {}", user.username);
        if ctx.verbose
            && let Some(thumbprint) = ctx.client.key_thumbprint()
        {
            println!("Device key: {}", thumbprint);
        }
    }
    Ok(())
}
