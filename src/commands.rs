// src/commands.rs
//! Chat command layer: `/help`, `/game`, `/open`, `/close`.

use once_cell::sync::OnceCell;
use regex::Regex;
use std::sync::Arc;

use crate::gate::{BroadcastGate, GateChange};
use crate::notice::GameCatalog;

pub const HELP_TEXT: &str = "Available commands:\n\
• /help - show this help\n\
• /game - show the current game\n\
• /open - enable auto broadcast (admins)\n\
• /close - disable auto broadcast (admins)";

pub const PERMISSION_DENIED: &str = "Permission denied: only administrators can run this command.";
pub const UNKNOWN_COMMAND: &str = "Unknown command, try /help.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Game,
    Open,
    Close,
    Unknown(String),
}

/// Parse a chat line. Commands match exactly (`/opened` is not `/open`);
/// text that does not start with `/` is not a command.
pub fn parse(text: &str) -> Option<Command> {
    static RE_KNOWN: OnceCell<Regex> = OnceCell::new();
    let re = RE_KNOWN.get_or_init(|| {
        Regex::new(r"^/(help|game|open|close)$").expect("command regex")
    });

    let t = text.trim();
    if let Some(caps) = re.captures(t) {
        return Some(match &caps[1] {
            "help" => Command::Help,
            "game" => Command::Game,
            "open" => Command::Open,
            _ => Command::Close,
        });
    }
    t.starts_with('/').then(|| Command::Unknown(t.to_string()))
}

/// A chat message addressed to the bot.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// `None` for private messages.
    pub group_id: Option<i64>,
    pub user_id: i64,
    pub text: String,
}

#[derive(Clone)]
pub struct CommandHandler {
    gate: BroadcastGate,
    catalog: Arc<dyn GameCatalog>,
    groups: Vec<i64>,
    admins: Vec<i64>,
}

impl CommandHandler {
    pub fn new(
        gate: BroadcastGate,
        catalog: Arc<dyn GameCatalog>,
        groups: Vec<i64>,
        admins: Vec<i64>,
    ) -> Self {
        Self {
            gate,
            catalog,
            groups,
            admins,
        }
    }

    /// Reply for `msg`, or `None` when the bot stays silent
    /// (not a command, or sent outside a bound group).
    pub async fn handle(&self, msg: &IncomingMessage) -> Option<String> {
        let cmd = parse(&msg.text)?;
        let group = msg.group_id?;
        if !self.groups.contains(&group) {
            tracing::debug!(target: "commands", group, "ignoring command from unbound group");
            return None;
        }
        tracing::info!(target: "commands", group, user = msg.user_id, command = ?cmd, "command received");

        let reply = match cmd {
            Command::Help => HELP_TEXT.to_string(),
            Command::Game => match self.catalog.game_title().await {
                Ok(title) => format!("Current game: {title}"),
                Err(e) => {
                    tracing::warn!(target: "commands", error = %e, "game query failed");
                    "Failed to query game info!".to_string()
                }
            },
            Command::Open | Command::Close if !self.admins.contains(&msg.user_id) => {
                PERMISSION_DENIED.to_string()
            }
            Command::Open => match self.gate.enable() {
                GateChange::Changed => "Auto broadcast enabled.".to_string(),
                GateChange::Unchanged => "Auto broadcast is already enabled.".to_string(),
            },
            Command::Close => match self.gate.disable() {
                GateChange::Changed => "Auto broadcast disabled.".to_string(),
                GateChange::Unchanged => "Auto broadcast is already disabled.".to_string(),
            },
            Command::Unknown(_) => UNKNOWN_COMMAND.to_string(),
        };
        Some(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_exact() {
        assert_eq!(parse("/open"), Some(Command::Open));
        assert_eq!(parse("  /close "), Some(Command::Close));
        assert_eq!(parse("/help"), Some(Command::Help));
        assert_eq!(parse("/game"), Some(Command::Game));
        assert_eq!(parse("/opened"), Some(Command::Unknown("/opened".into())));
        assert_eq!(parse("/rank"), Some(Command::Unknown("/rank".into())));
        assert_eq!(parse("hello /open"), None);
        assert_eq!(parse(""), None);
    }
}
