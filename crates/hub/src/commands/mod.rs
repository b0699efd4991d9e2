//! CLI command handlers.

pub mod call;
pub mod check_username;
pub mod exchange;
pub mod login;
pub mod logout;
pub mod notices;
pub mod proof;
pub mod register;
pub mod whoami;

use hub_client::{HubClient, NoticeLevel};

/// Notification history, next to the session file.
pub const NOTICES_FILE: &str = "notices.json";

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Client with the persisted session already restored.
    pub client: HubClient,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// Print `value` as pretty JSON.
    pub fn print_json<T: serde::Serialize + ?Sized>(&self, value: &T) -> anyhow::Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}

/// Print and dismiss the toasts raised while a command ran.
pub fn print_toasts(ctx: &Context) {
    let notices = ctx.client.notices();
    for toast in notices.toasts() {
        let tag = match toast.level {
            NoticeLevel::Info => "info",
            NoticeLevel::Success => "ok",
            NoticeLevel::Error => "error",
        };
        eprintln!("[{}] {}", tag, toast.message);
        notices.hide(toast.id);
    }
}
