// Copyright (C) 2026 StarHuntingGames
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use serde::{Deserialize, Serialize};
use theorose_common::{ChannelId, UserId};
use tracing::{info, warn};
use uuid::Uuid;

use crate::orchestrator::RoundOrchestrator;

/// A slash command as forwarded by the platform bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandInvocation {
    pub command: String,
    pub channel_id: ChannelId,
    pub user_id: UserId,
    /// Platform administrator flag of the invoking member.
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub channel_arg: Option<ChannelId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandReply {
    pub content: String,
    /// Only the invoking user sees the reply.
    pub ephemeral: bool,
}

impl CommandReply {
    fn private(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ephemeral: true,
        }
    }

    fn public(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ephemeral: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Ping,
    Round,
    Score,
    /// `leaderboard` and `lifetime` are two names for the same reply.
    Leaderboard,
    Reset,
    SetChannel(ChannelId),
}

const ADMIN_COMMANDS: [&str; 2] = ["reset", "setchannel"];

fn command_name(invocation: &CommandInvocation) -> String {
    invocation
        .command
        .trim()
        .trim_start_matches('/')
        .to_ascii_lowercase()
}

impl Command {
    pub fn parse(invocation: &CommandInvocation) -> Result<Self, CommandReply> {
        let name = command_name(invocation);
        match name.as_str() {
            "ping" => Ok(Self::Ping),
            "round" => Ok(Self::Round),
            "score" => Ok(Self::Score),
            "leaderboard" | "lifetime" => Ok(Self::Leaderboard),
            "reset" => Ok(Self::Reset),
            "setchannel" => invocation
                .channel_arg
                .map(Self::SetChannel)
                .ok_or_else(|| CommandReply::private("Usage: /setchannel <channel>")),
            _ => Err(CommandReply::private(format!("Unknown command `{name}`."))),
        }
    }

    /// Judged on the name alone, before any argument is looked at.
    pub fn requires_admin(invocation: &CommandInvocation) -> bool {
        ADMIN_COMMANDS.contains(&command_name(invocation).as_str())
    }
}

/// Runs one command. Never fails: handler errors become a generic reply that
/// carries a reference to the detailed log line.
pub async fn dispatch(
    orchestrator: &RoundOrchestrator,
    invocation: &CommandInvocation,
) -> CommandReply {
    if Command::requires_admin(invocation) && !invocation.is_admin {
        info!(
            user_id = invocation.user_id,
            command = %invocation.command,
            "rejected admin command from non-admin"
        );
        return CommandReply::private("⛔ Only server administrators can use that command.");
    }

    let command = match Command::parse(invocation) {
        Ok(command) => command,
        Err(reply) => return reply,
    };

    match execute(orchestrator, invocation, command).await {
        Ok(reply) => reply,
        Err(error) => {
            let error_id = Uuid::new_v4();
            warn!(
                %error_id,
                command = ?command,
                user_id = invocation.user_id,
                channel_id = invocation.channel_id,
                error = ?error,
                "command handler failed"
            );
            CommandReply::private(format!(
                "⚠️ Command error (ref `{error_id}`), see the service log."
            ))
        }
    }
}

async fn execute(
    orchestrator: &RoundOrchestrator,
    invocation: &CommandInvocation,
    command: Command,
) -> anyhow::Result<CommandReply> {
    match command {
        Command::Ping => Ok(CommandReply::private("Pong! ✅")),
        Command::Round => {
            let round = orchestrator.force_new_round(invocation.channel_id).await?;
            Ok(CommandReply::private(format!("Starting Round {round}…")))
        }
        Command::Score => Ok(CommandReply::public(orchestrator.score_summary().await?)),
        Command::Leaderboard => Ok(CommandReply::public(
            orchestrator.lifetime_summary().await?,
        )),
        Command::Reset => {
            let state = orchestrator.reset().await?;
            Ok(CommandReply::public(format!(
                "Game {} was reset to 0-0. Lifetime stats are unchanged.",
                state.game_id
            )))
        }
        Command::SetChannel(channel_id) => {
            orchestrator.set_announce_channel(channel_id).await;
            Ok(CommandReply::private(format!(
                "Announcements will go to <#{channel_id}> until the next restart."
            )))
        }
    }
}
