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

//! Outbound side of the chat platform.
//!
//! The service never talks to the chat platform directly. A gateway bridge
//! exposes a small REST surface for the handful of operations a round needs.

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use theorose_common::{ChannelId, MessageId};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelMessage {
    pub id: MessageId,
    pub content: String,
    /// Authored by the account this service posts as.
    #[serde(default)]
    pub from_self: bool,
}

#[async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn send_message(&self, channel_id: ChannelId, content: &str)
    -> anyhow::Result<MessageId>;

    async fn edit_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        content: &str,
    ) -> anyhow::Result<()>;

    async fn add_reaction(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        selector: &str,
    ) -> anyhow::Result<()>;

    async fn clear_reactions(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> anyhow::Result<()>;

    async fn pin_message(&self, channel_id: ChannelId, message_id: MessageId)
    -> anyhow::Result<()>;

    async fn fetch_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> anyhow::Result<Option<ChannelMessage>>;

    async fn pinned_messages(&self, channel_id: ChannelId) -> anyhow::Result<Vec<ChannelMessage>>;

    /// Newest first, at most `limit` entries.
    async fn recent_messages(
        &self,
        channel_id: ChannelId,
        limit: usize,
    ) -> anyhow::Result<Vec<ChannelMessage>>;
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    id: MessageId,
}

#[derive(Clone)]
pub struct HttpChatGateway {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpChatGateway {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            token: token.into(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        operation: &str,
    ) -> anyhow::Result<reqwest::Response> {
        request
            .bearer_auth(&self.token)
            .send()
            .await
            .with_context(|| format!("chat gateway {operation} request failed"))
    }

    async fn checked(
        &self,
        request: reqwest::RequestBuilder,
        operation: &str,
    ) -> anyhow::Result<reqwest::Response> {
        let response = self.send(request, operation).await?;
        Self::ensure_success(response, operation).await
    }

    /// Turns a non-2xx response into an error carrying its status and body.
    async fn ensure_success(
        response: reqwest::Response,
        operation: &str,
    ) -> anyhow::Result<reqwest::Response> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<response body unavailable>".to_string());
            anyhow::bail!("chat gateway {operation} returned {status}: {body}");
        }

        debug!(operation, status = %response.status(), "chat gateway call succeeded");
        Ok(response)
    }
}

#[async_trait]
impl ChatPlatform for HttpChatGateway {
    async fn send_message(
        &self,
        channel_id: ChannelId,
        content: &str,
    ) -> anyhow::Result<MessageId> {
        let url = self.endpoint(&format!("v1/channels/{channel_id}/messages"));
        let request = self
            .client
            .post(url)
            .json(&serde_json::json!({ "content": content }));
        let sent = self
            .checked(request, "send message")
            .await?
            .json::<SentMessage>()
            .await
            .context("invalid chat gateway send message response")?;
        Ok(sent.id)
    }

    async fn edit_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        content: &str,
    ) -> anyhow::Result<()> {
        let url = self.endpoint(&format!("v1/channels/{channel_id}/messages/{message_id}"));
        let request = self
            .client
            .patch(url)
            .json(&serde_json::json!({ "content": content }));
        self.checked(request, "edit message").await?;
        Ok(())
    }

    async fn add_reaction(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        selector: &str,
    ) -> anyhow::Result<()> {
        let url = self.endpoint(&format!(
            "v1/channels/{channel_id}/messages/{message_id}/reactions"
        ));
        let request = self
            .client
            .post(url)
            .json(&serde_json::json!({ "selector": selector }));
        self.checked(request, "add reaction").await?;
        Ok(())
    }

    async fn clear_reactions(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> anyhow::Result<()> {
        let url = self.endpoint(&format!(
            "v1/channels/{channel_id}/messages/{message_id}/reactions"
        ));
        self.checked(self.client.delete(url), "clear reactions").await?;
        Ok(())
    }

    async fn pin_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> anyhow::Result<()> {
        let url = self.endpoint(&format!("v1/channels/{channel_id}/pins/{message_id}"));
        self.checked(self.client.put(url), "pin message").await?;
        Ok(())
    }

    async fn fetch_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> anyhow::Result<Option<ChannelMessage>> {
        let url = self.endpoint(&format!("v1/channels/{channel_id}/messages/{message_id}"));
        let response = self.send(self.client.get(url), "fetch message").await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::ensure_success(response, "fetch message")
            .await?
            .json::<ChannelMessage>()
            .await
            .map(Some)
            .context("invalid chat gateway message response")
    }

    async fn pinned_messages(&self, channel_id: ChannelId) -> anyhow::Result<Vec<ChannelMessage>> {
        let url = self.endpoint(&format!("v1/channels/{channel_id}/pins"));
        self.checked(self.client.get(url), "list pins")
            .await?
            .json::<Vec<ChannelMessage>>()
            .await
            .context("invalid chat gateway pins response")
    }

    async fn recent_messages(
        &self,
        channel_id: ChannelId,
        limit: usize,
    ) -> anyhow::Result<Vec<ChannelMessage>> {
        let url = self.endpoint(&format!("v1/channels/{channel_id}/messages"));
        let request = self.client.get(url).query(&[("limit", limit)]);
        self.checked(request, "read history")
            .await?
            .json::<Vec<ChannelMessage>>()
            .await
            .context("invalid chat gateway history response")
    }
}
