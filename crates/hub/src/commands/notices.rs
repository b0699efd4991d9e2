//! Notices command - notification history.

use anyhow::Result;
use clap::{Args, Subcommand};

use super::Context;

/// Arguments for the notices command.
#[derive(Args, Debug)]
pub struct NoticesArgs {
    #[command(subcommand)]
    pub command: Option<NoticesCommand>,
}

#[derive(Subcommand, Debug)]
pub enum NoticesCommand {
    /// List notifications, newest first (default)
    List,

    /// Mark every notification as read
    Read,

    /// Delete all notifications
    Clear,
}

/// Run the notices command.
pub async fn run(args: NoticesArgs, ctx: &Context) -> Result<()> {
    let notices = ctx.client.notices();
    match args.command.unwrap_or(NoticesCommand::List) {
        NoticesCommand::List => {
            let history = notices.history();
            if ctx.json_output {
                return ctx.print_json(&history);
            }
            if history.is_empty() {
                println!("No notifications");
                return Ok(());
            }
            for notice in &history {
                let marker = if notice.read { " " } else { "*" };
                println!(
                    "{} {}  {}",
                    marker,
                    notice.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    notice.message
                );
            }
            println!();
            println!("{} unread", notices.unread_count());
        }
        NoticesCommand::Read => {
            notices.mark_all_as_read();
            if !ctx.json_output {
                println!("All notifications marked as read");
            }
        }
        NoticesCommand::Clear => {
            notices.clear_history();
            if !ctx.json_output {
                println!("Notifications cleared");
            }
        }
    }
    Ok(())
}
