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

//! Durable game state kept in a single text blob.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use theorose_common::{
    ChannelId, GameState, LifetimeStats, MessageId,
    envelope::{self, Envelope, EnvelopeError, SchemaVersion},
};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::platform::{ChannelMessage, ChatPlatform};

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn read(&self) -> anyhow::Result<Option<String>>;
    async fn write(&self, blob: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
    #[error("failed to encode state: {0}")]
    Encode(#[from] EnvelopeError),
}

/// Blob stored as the body of one pinned message in the storage channel.
///
/// The message is discovered once and its id cached for the rest of the
/// process lifetime.
pub struct PinnedMessageBlob {
    platform: Arc<dyn ChatPlatform>,
    channel_id: ChannelId,
    history_limit: usize,
    handle: Mutex<Option<MessageId>>,
}

impl PinnedMessageBlob {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        channel_id: ChannelId,
        history_limit: usize,
    ) -> Self {
        Self {
            platform,
            channel_id,
            history_limit,
            handle: Mutex::new(None),
        }
    }

    fn is_state_message(message: &ChannelMessage) -> bool {
        message.from_self && envelope::contains_marker(&message.content)
    }

    async fn discover(&self) -> anyhow::Result<Option<ChannelMessage>> {
        let pinned = self
            .platform
            .pinned_messages(self.channel_id)
            .await
            .context("failed to list pinned messages")?;
        if let Some(message) = pinned.into_iter().find(Self::is_state_message) {
            info!(
                channel_id = self.channel_id,
                message_id = message.id,
                "found pinned state message"
            );
            return Ok(Some(message));
        }

        let recent = self
            .platform
            .recent_messages(self.channel_id, self.history_limit)
            .await
            .context("failed to read channel history")?;
        let Some(message) = recent.into_iter().find(Self::is_state_message) else {
            return Ok(None);
        };

        info!(
            channel_id = self.channel_id,
            message_id = message.id,
            "found unpinned state message in channel history"
        );
        if let Err(error) = self.platform.pin_message(self.channel_id, message.id).await {
            warn!(message_id = message.id, error = %error, "failed to pin state message");
        }
        Ok(Some(message))
    }
}

#[async_trait]
impl BlobStore for PinnedMessageBlob {
    async fn read(&self) -> anyhow::Result<Option<String>> {
        let mut handle = self.handle.lock().await;
        if let Some(message_id) = *handle {
            match self
                .platform
                .fetch_message(self.channel_id, message_id)
                .await
                .context("failed to fetch state message")?
            {
                Some(message) => return Ok(Some(message.content)),
                None => {
                    warn!(message_id, "state message disappeared; searching again");
                    *handle = None;
                }
            }
        }

        let found = self.discover().await?;
        *handle = found.as_ref().map(|message| message.id);
        Ok(found.map(|message| message.content))
    }

    async fn write(&self, blob: &str) -> anyhow::Result<()> {
        let mut handle = self.handle.lock().await;
        if handle.is_none() {
            *handle = self.discover().await?.map(|message| message.id);
        }

        if let Some(message_id) = *handle {
            return self
                .platform
                .edit_message(self.channel_id, message_id, blob)
                .await
                .context("failed to update state message");
        }

        let message_id = self
            .platform
            .send_message(self.channel_id, blob)
            .await
            .context("failed to create state message")?;
        if let Err(error) = self.platform.pin_message(self.channel_id, message_id).await {
            warn!(message_id, error = %error, "failed to pin new state message");
        }
        info!(channel_id = self.channel_id, message_id, "created state message");
        *handle = Some(message_id);
        Ok(())
    }
}

/// Read-modify-write access to the persisted [`Envelope`].
///
/// Every mutation holds one in-process lock across its load and save, so two
/// overlapping handlers can no longer overwrite each other's changes.
pub struct StateStore {
    blob: Arc<dyn BlobStore>,
    lock: Mutex<()>,
}

impl StateStore {
    pub fn new(blob: Arc<dyn BlobStore>) -> Self {
        Self {
            blob,
            lock: Mutex::new(()),
        }
    }

    pub async fn load(&self) -> Result<Envelope, StoreError> {
        let _guard = self.lock.lock().await;
        self.read_or_create().await
    }

    pub async fn save(&self, envelope: &Envelope) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        self.write(envelope).await
    }

    pub async fn update<F, R>(&self, mutate: F) -> Result<(Envelope, R), StoreError>
    where
        F: FnOnce(&mut GameState, &mut LifetimeStats) -> R,
    {
        let _guard = self.lock.lock().await;
        let mut envelope = self.read_or_create().await?;
        let result = mutate(&mut envelope.state, &mut envelope.lifetime);
        self.write(&envelope).await?;
        Ok((envelope, result))
    }

    /// Like [`StateStore::update`], but only saves when `mutate` returns `Ok`.
    pub async fn try_update<F, R, E>(
        &self,
        mutate: F,
    ) -> Result<(Envelope, Result<R, E>), StoreError>
    where
        F: FnOnce(&mut GameState, &mut LifetimeStats) -> Result<R, E>,
    {
        let _guard = self.lock.lock().await;
        let mut envelope = self.read_or_create().await?;
        let result = mutate(&mut envelope.state, &mut envelope.lifetime);
        if result.is_ok() {
            self.write(&envelope).await?;
        }
        Ok((envelope, result))
    }

    async fn read_or_create(&self) -> Result<Envelope, StoreError> {
        match self.blob.read().await? {
            Some(content) => Ok(Self::decode_or_default(&content)),
            None => {
                info!("no state blob found; starting from a fresh game");
                let envelope = Envelope::default();
                self.write(&envelope).await?;
                Ok(envelope)
            }
        }
    }

    fn decode_or_default(content: &str) -> Envelope {
        match envelope::decode(content) {
            Ok((envelope, version)) => {
                if version < SchemaVersion::LATEST {
                    info!(?version, "read state blob in a previous schema; next save upgrades it");
                }
                envelope
            }
            Err(error) => {
                warn!(error = %error, "state blob is unreadable; continuing with a fresh game");
                Envelope::default()
            }
        }
    }

    async fn write(&self, envelope: &Envelope) -> Result<(), StoreError> {
        let blob = envelope::encode(envelope)?;
        self.blob.write(&blob).await?;
        debug!(
            game_id = envelope.state.game_id,
            round = envelope.state.round,
            bytes = blob.len(),
            "state saved"
        );
        Ok(())
    }
}
