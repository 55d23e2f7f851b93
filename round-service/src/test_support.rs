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

use std::{
    collections::BTreeMap,
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use theorose_common::{ChannelId, MessageId};

use crate::{
    platform::{ChannelMessage, ChatPlatform},
    store::BlobStore,
};

#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub channel_id: ChannelId,
    pub content: String,
    pub from_self: bool,
    pub pinned: bool,
    pub reactions: Vec<String>,
}

/// In-memory chat channel that records every call made against it.
pub struct RecordingPlatform {
    next_id: AtomicU64,
    pub messages: Mutex<BTreeMap<MessageId, StoredMessage>>,
    pub sent: Mutex<Vec<(ChannelId, MessageId, String)>>,
    pub edits: Mutex<Vec<(MessageId, String)>>,
    pub fail_reactions: AtomicBool,
    pub fail_sends: AtomicBool,
}

impl Default for RecordingPlatform {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1000),
            messages: Mutex::new(BTreeMap::new()),
            sent: Mutex::new(Vec::new()),
            edits: Mutex::new(Vec::new()),
            fail_reactions: AtomicBool::new(false),
            fail_sends: AtomicBool::new(false),
        }
    }
}

impl RecordingPlatform {
    pub fn seed(
        &self,
        channel_id: ChannelId,
        content: &str,
        from_self: bool,
        pinned: bool,
    ) -> MessageId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.messages.lock().unwrap().insert(
            id,
            StoredMessage {
                channel_id,
                content: content.to_string(),
                from_self,
                pinned,
                reactions: Vec::new(),
            },
        );
        id
    }

    pub fn message(&self, id: MessageId) -> StoredMessage {
        self.messages
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .unwrap_or_else(|| panic!("message {id} was never posted"))
    }

    pub fn sent_contents(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, content)| content.clone())
            .collect()
    }

    pub fn last_sent(&self) -> (ChannelId, MessageId, String) {
        self.sent
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("nothing was sent")
    }

    fn to_channel_message(id: MessageId, message: &StoredMessage) -> ChannelMessage {
        ChannelMessage {
            id,
            content: message.content.clone(),
            from_self: message.from_self,
        }
    }
}

#[async_trait]
impl ChatPlatform for RecordingPlatform {
    async fn send_message(
        &self,
        channel_id: ChannelId,
        content: &str,
    ) -> anyhow::Result<MessageId> {
        if self.fail_sends.load(Ordering::Relaxed) {
            anyhow::bail!("send rejected by test platform");
        }
        let id = self.seed(channel_id, content, true, false);
        self.sent
            .lock()
            .unwrap()
            .push((channel_id, id, content.to_string()));
        Ok(id)
    }

    async fn edit_message(
        &self,
        _channel_id: ChannelId,
        message_id: MessageId,
        content: &str,
    ) -> anyhow::Result<()> {
        let mut messages = self.messages.lock().unwrap();
        let message = messages
            .get_mut(&message_id)
            .ok_or_else(|| anyhow::anyhow!("unknown message {message_id}"))?;
        message.content = content.to_string();
        self.edits
            .lock()
            .unwrap()
            .push((message_id, content.to_string()));
        Ok(())
    }

    async fn add_reaction(
        &self,
        _channel_id: ChannelId,
        message_id: MessageId,
        selector: &str,
    ) -> anyhow::Result<()> {
        if self.fail_reactions.load(Ordering::Relaxed) {
            anyhow::bail!("reactions disabled in test platform");
        }
        let mut messages = self.messages.lock().unwrap();
        let message = messages
            .get_mut(&message_id)
            .ok_or_else(|| anyhow::anyhow!("unknown message {message_id}"))?;
        message.reactions.push(selector.to_string());
        Ok(())
    }

    async fn clear_reactions(
        &self,
        _channel_id: ChannelId,
        message_id: MessageId,
    ) -> anyhow::Result<()> {
        if let Some(message) = self.messages.lock().unwrap().get_mut(&message_id) {
            message.reactions.clear();
        }
        Ok(())
    }

    async fn pin_message(
        &self,
        _channel_id: ChannelId,
        message_id: MessageId,
    ) -> anyhow::Result<()> {
        let mut messages = self.messages.lock().unwrap();
        let message = messages
            .get_mut(&message_id)
            .ok_or_else(|| anyhow::anyhow!("unknown message {message_id}"))?;
        message.pinned = true;
        Ok(())
    }

    async fn fetch_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> anyhow::Result<Option<ChannelMessage>> {
        Ok(self
            .messages
            .lock()
            .unwrap()
            .get(&message_id)
            .filter(|message| message.channel_id == channel_id)
            .map(|message| Self::to_channel_message(message_id, message)))
    }

    async fn pinned_messages(&self, channel_id: ChannelId) -> anyhow::Result<Vec<ChannelMessage>> {
        Ok(self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, message)| message.channel_id == channel_id && message.pinned)
            .map(|(id, message)| Self::to_channel_message(*id, message))
            .collect())
    }

    async fn recent_messages(
        &self,
        channel_id: ChannelId,
        limit: usize,
    ) -> anyhow::Result<Vec<ChannelMessage>> {
        Ok(self
            .messages
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|(_, message)| message.channel_id == channel_id)
            .take(limit)
            .map(|(id, message)| Self::to_channel_message(*id, message))
            .collect())
    }
}

/// Blob held in memory. Reads yield to the scheduler so interleavings between
/// concurrent store updates actually happen.
pub struct MemoryBlob {
    pub content: Mutex<Option<String>>,
    pub writes: AtomicUsize,
    /// Writes beyond this count are rejected.
    pub write_budget: AtomicUsize,
}

impl Default for MemoryBlob {
    fn default() -> Self {
        Self {
            content: Mutex::new(None),
            writes: AtomicUsize::new(0),
            write_budget: AtomicUsize::new(usize::MAX),
        }
    }
}

impl MemoryBlob {
    pub fn with_content(content: impl Into<String>) -> Self {
        Self {
            content: Mutex::new(Some(content.into())),
            ..Self::default()
        }
    }

    /// Accepts `count` more writes, then fails every later one.
    pub fn fail_writes_after(&self, count: usize) {
        let written = self.writes.load(Ordering::Relaxed);
        self.write_budget
            .store(written.saturating_add(count), Ordering::Relaxed);
    }

    pub fn current(&self) -> Option<String> {
        self.content.lock().unwrap().clone()
    }
}

#[async_trait]
impl BlobStore for MemoryBlob {
    async fn read(&self) -> anyhow::Result<Option<String>> {
        let content = self.current();
        tokio::task::yield_now().await;
        Ok(content)
    }

    async fn write(&self, blob: &str) -> anyhow::Result<()> {
        tokio::task::yield_now().await;
        if self.writes.load(Ordering::Relaxed) >= self.write_budget.load(Ordering::Relaxed) {
            anyhow::bail!("write rejected by test blob");
        }
        *self.content.lock().unwrap() = Some(blob.to_string());
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
