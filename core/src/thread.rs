/// In-memory index of the messages rendered into the open chat thread
use crate::sync_types::WireMessage;
use crate::utils::time::format_timestamp;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedMessage {
    pub id: u64,
    /// Right-hand placement when true
    pub from_me: bool,
    pub content: String,
    pub created_at: Option<String>,
    /// `dd/MM HH:mm`, empty when `created_at` is unusable
    pub display_time: String,
}

impl RenderedMessage {
    fn from_wire(id: u64, msg: &WireMessage) -> Self {
        Self {
            id,
            from_me: msg.from_me,
            content: msg.content.clone().unwrap_or_default(),
            created_at: msg.created_at.clone(),
            display_time: format_timestamp(msg.created_at.as_deref()),
        }
    }
}

/// Messages of one conversation, kept in id order with a rendered-id index.
#[derive(Debug, Clone)]
pub struct ChatThread {
    peer_id: u64,
    messages: Vec<RenderedMessage>,
    rendered: HashSet<u64>,
    last_message_id: u64,
    scroll_requested: bool,
}

impl ChatThread {
    /// Thread seeded from the page render; `last_message_id` is the starting watermark
    pub fn new(peer_id: u64, last_message_id: u64) -> Self {
        Self {
            peer_id,
            messages: Vec::new(),
            rendered: HashSet::new(),
            last_message_id,
            scroll_requested: true,
        }
    }

    pub fn peer_id(&self) -> u64 {
        self.peer_id
    }

    /// Watermark sent as `after` on the next poll
    pub fn last_message_id(&self) -> u64 {
        self.last_message_id
    }

    pub fn messages(&self) -> &[RenderedMessage] {
        &self.messages
    }

    pub fn contains(&self, id: u64) -> bool {
        self.rendered.contains(&id)
    }

    /// True while the "no messages yet" placeholder would be shown
    pub fn is_empty_state(&self) -> bool {
        self.messages.is_empty()
    }

    /// Render every message of `batch` that is not on screen yet.
    ///
    /// Returns the ids actually appended. Messages without a usable id are
    /// dropped; duplicates are skipped.
    pub fn append(&mut self, batch: &[WireMessage]) -> Vec<u64> {
        let mut appended = Vec::new();
        for msg in batch {
            let Some(id) = msg.id else { continue };
            if !self.rendered.insert(id) {
                continue;
            }
            let pos = self.messages.partition_point(|m| m.id < id);
            self.messages.insert(pos, RenderedMessage::from_wire(id, msg));
            self.last_message_id = self.last_message_id.max(id);
            appended.push(id);
        }
        if !appended.is_empty() {
            self.scroll_requested = true;
        }
        appended
    }

    /// Fold in the server-reported `last_id`; never moves backwards.
    pub fn advance_watermark(&mut self, server_last_id: Option<u64>) {
        if let Some(last_id) = server_last_id {
            self.last_message_id = self.last_message_id.max(last_id);
        }
    }

    /// Consume a pending scroll-to-bottom request
    pub fn take_scroll_request(&mut self) -> bool {
        std::mem::take(&mut self.scroll_requested)
    }
}

/// Most recent message in `batch` written by the other party
pub fn latest_incoming(batch: &[WireMessage]) -> Option<(u64, Option<String>)> {
    batch
        .iter()
        .filter(|m| !m.from_me)
        .filter_map(|m| m.id.map(|id| (id, m.created_at.clone())))
        .max_by_key(|(id, _)| *id)
}
