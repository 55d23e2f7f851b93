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

use std::net::SocketAddr;

use anyhow::Context;
use serde::Deserialize;
use theorose_common::{ChannelId, expand_env_vars};
use tracing::warn;

const DEFAULT_HISTORY_LIMIT: usize = 50;
const DEFAULT_BIND: &str = "0.0.0.0:8080";

/// Optional YAML overlay. Environment variables win over anything set here.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    gateway_base_url: Option<String>,
    gateway_token: Option<String>,
    state_channel_id: Option<ChannelId>,
    announce_channel_id: Option<ChannelId>,
    history_limit: Option<usize>,
    bind: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub gateway_base_url: String,
    pub gateway_token: String,
    /// Channel holding the pinned state message.
    pub state_channel_id: ChannelId,
    pub announce_channel_id: Option<ChannelId>,
    /// How many recent messages to scan when the state message is not pinned.
    pub history_limit: usize,
    pub bind_addr: SocketAddr,
}

impl ServiceConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let file = load_config_file().unwrap_or_default();
        Self::resolve(file, |name| std::env::var(name).ok())
    }

    fn resolve(file: ConfigFile, env: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let lookup = |name: &str| {
            env(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let gateway_token = lookup("CHAT_GATEWAY_TOKEN")
            .or(file.gateway_token)
            .context("CHAT_GATEWAY_TOKEN is required")?;
        let state_channel_id = match lookup("STATE_CHANNEL_ID") {
            Some(value) => parse_id("STATE_CHANNEL_ID", &value)?,
            None => file
                .state_channel_id
                .context("STATE_CHANNEL_ID is required")?,
        };
        let announce_channel_id = match lookup("BOT_ANNOUNCE_CHANNEL_ID") {
            Some(value) => Some(parse_id("BOT_ANNOUNCE_CHANNEL_ID", &value)?),
            None => file.announce_channel_id,
        };
        let history_limit = match lookup("STATE_HISTORY_LIMIT") {
            Some(value) => value
                .parse::<usize>()
                .context("invalid STATE_HISTORY_LIMIT")?,
            None => file.history_limit.unwrap_or(DEFAULT_HISTORY_LIMIT),
        }
        .max(1);
        let bind_addr = lookup("ROUND_SERVICE_BIND")
            .or(file.bind)
            .unwrap_or_else(|| DEFAULT_BIND.to_string())
            .parse()
            .context("invalid ROUND_SERVICE_BIND")?;

        Ok(Self {
            gateway_base_url: lookup("CHAT_GATEWAY_BASE_URL")
                .or(file.gateway_base_url)
                .unwrap_or_else(|| "http://chat-gateway:8070".to_string()),
            gateway_token,
            state_channel_id,
            announce_channel_id,
            history_limit,
            bind_addr,
        })
    }
}

fn parse_id(name: &str, value: &str) -> anyhow::Result<ChannelId> {
    value
        .parse::<ChannelId>()
        .with_context(|| format!("invalid {name}: {value}"))
}

fn load_config_file() -> Option<ConfigFile> {
    let path = std::env::var("ROUND_SERVICE_CONFIG_PATH")
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())?;

    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(error) => {
            warn!(path = %path, error = %error, "failed to read round-service config file");
            return None;
        }
    };

    match serde_yaml::from_str::<ConfigFile>(&expand_env_vars(&raw)) {
        Ok(file) => Some(file),
        Err(error) => {
            warn!(path = %path, error = %error, "failed to parse round-service config yaml");
            None
        }
    }
}
