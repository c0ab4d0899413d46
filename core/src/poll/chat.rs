/// Chat loop: keeps the open conversation's thread live
use super::notifications::{NotificationBatch, NotificationSubscriber};
use super::{LoopHandle, LoopSettings, Poller, ResumePolicy};
use crate::error::Result;
use crate::sync_types::{MessagePayload, MessageQuery, ReadReceipt, SyncEvent};
use crate::thread::{latest_incoming, ChatThread};
use crate::transport::SyncTransport;
use crate::utils::event_emitter::EventBus;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Told when the open conversation has been read up to its latest message
#[async_trait]
pub trait ReadListener: Send + Sync {
    async fn on_conversation_read(&self, contact_id: u64);
}

pub struct ChatPoller {
    peer_id: u64,
    transport: Arc<dyn SyncTransport>,
    thread: Arc<RwLock<ChatThread>>,
    hold: Duration,
    read_listener: Option<Arc<dyn ReadListener>>,
    events: EventBus,
}

impl ChatPoller {
    pub fn new(
        transport: Arc<dyn SyncTransport>,
        thread: Arc<RwLock<ChatThread>>,
        peer_id: u64,
        hold: Duration,
        events: EventBus,
    ) -> Self {
        Self {
            peer_id,
            transport,
            thread,
            hold,
            read_listener: None,
            events,
        }
    }

    pub fn with_read_listener(mut self, listener: Arc<dyn ReadListener>) -> Self {
        self.read_listener = Some(listener);
        self
    }

    /// Best effort: failures are logged and dropped
    fn send_read_receipt(&self, receipt: ReadReceipt) {
        let transport = self.transport.clone();
        let peer_id = self.peer_id;
        tokio::spawn(async move {
            if let Err(e) = transport.send_read_receipt(peer_id, &receipt).await {
                debug!("Read receipt for {} up to {} dropped: {}", peer_id, receipt.last_message_id, e);
            }
        });
    }
}

#[async_trait]
impl Poller for ChatPoller {
    type Response = MessagePayload;

    fn name(&self) -> &'static str {
        "chat"
    }

    async fn fetch(&self, wait: bool, cancel: &CancellationToken) -> Result<MessagePayload> {
        let after = self.thread.read().await.last_message_id();
        let query = MessageQuery {
            after,
            hold: wait.then_some(self.hold),
            active: true,
        };
        self.transport.fetch_messages(self.peer_id, &query, cancel).await
    }

    async fn apply(&mut self, payload: MessagePayload, active: bool) {
        let appended = {
            let mut thread = self.thread.write().await;
            let appended = thread.append(&payload.messages);
            thread.advance_watermark(payload.last_id);
            appended
        };

        if !appended.is_empty() {
            debug!("Rendered {} new messages from {}", appended.len(), self.peer_id);
            self.events.emit(SyncEvent::MessagesAppended {
                peer_id: self.peer_id,
                message_ids: appended,
            });
            self.events.emit(SyncEvent::ScrollRequested {
                peer_id: self.peer_id,
            });
        }

        if !active {
            return;
        }
        if let Some((last_message_id, last_message_at)) = latest_incoming(&payload.messages) {
            self.send_read_receipt(ReadReceipt {
                last_message_id,
                last_message_at,
            });
            if let Some(listener) = &self.read_listener {
                listener.on_conversation_read(self.peer_id).await;
            }
        }
    }
}

/// A running chat loop and the thread it feeds
#[derive(Clone)]
pub struct ChatLoop {
    peer_id: u64,
    handle: LoopHandle,
    thread: Arc<RwLock<ChatThread>>,
}

impl ChatLoop {
    /// Start long-polling `peer_id` after `last_message_id`
    pub fn open(
        transport: Arc<dyn SyncTransport>,
        peer_id: u64,
        last_message_id: u64,
        hold: Duration,
        retry_delay: Duration,
        read_listener: Option<Arc<dyn ReadListener>>,
        events: EventBus,
    ) -> Self {
        let thread = Arc::new(RwLock::new(ChatThread::new(peer_id, last_message_id)));
        let mut poller = ChatPoller::new(transport, thread.clone(), peer_id, hold, events);
        if let Some(listener) = read_listener {
            poller = poller.with_read_listener(listener);
        }
        let handle = LoopHandle::spawn(
            poller,
            LoopSettings {
                retry_delay,
                resume: ResumePolicy::ForceRefresh,
                initial_wait: true,
            },
        );
        info!("Opened conversation with {} after message {}", peer_id, last_message_id);
        Self {
            peer_id,
            handle,
            thread,
        }
    }

    pub fn peer_id(&self) -> u64 {
        self.peer_id
    }

    pub fn handle(&self) -> &LoopHandle {
        &self.handle
    }

    pub fn thread(&self) -> Arc<RwLock<ChatThread>> {
        self.thread.clone()
    }

    pub fn force_refresh(&self) {
        self.handle.force_refresh();
    }

    pub fn pause(&self) {
        self.handle.pause();
    }

    pub fn resume(&self) {
        self.handle.resume();
    }
}

#[derive(Default)]
struct SlotState {
    chat: Option<ChatLoop>,
    /// Set while the page is hidden or unloading
    hidden: bool,
}

/// The at-most-one open conversation
///
/// Page pause and resume take the write lock, notification fan-out the read
/// lock, so a refresh triggered by a notification is either ordered before
/// the pause (and aborted by it) or skipped.
#[derive(Clone, Default)]
pub struct ChatSlot {
    state: Arc<RwLock<SlotState>>,
}

impl ChatSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `chat`, stopping whatever was open before. A chat opened while
    /// the page is hidden starts paused.
    pub async fn open(&self, chat: ChatLoop) {
        let previous = {
            let mut state = self.state.write().await;
            if state.hidden {
                chat.pause();
            }
            state.chat.replace(chat)
        };
        if let Some(previous) = previous {
            previous.handle.shutdown().await;
        }
    }

    pub async fn close(&self) {
        let previous = self.state.write().await.chat.take();
        if let Some(previous) = previous {
            info!("Closing conversation with {}", previous.peer_id);
            previous.handle.shutdown().await;
        }
    }

    pub async fn current(&self) -> Option<ChatLoop> {
        self.state.read().await.chat.clone()
    }

    pub async fn is_hidden(&self) -> bool {
        self.state.read().await.hidden
    }

    /// Page hidden or unloading
    pub async fn pause(&self) {
        let mut state = self.state.write().await;
        state.hidden = true;
        if let Some(chat) = state.chat.as_ref() {
            chat.pause();
        }
    }

    /// Page visible again
    pub async fn resume(&self) {
        let mut state = self.state.write().await;
        state.hidden = false;
        if let Some(chat) = state.chat.as_ref() {
            chat.resume();
        }
    }

    /// Explicit refresh; wakes the loop even while hidden
    pub async fn force_refresh(&self) {
        if let Some(chat) = self.state.read().await.chat.as_ref() {
            chat.force_refresh();
        }
    }
}

#[async_trait]
impl NotificationSubscriber for ChatSlot {
    async fn on_notifications(&self, batch: &NotificationBatch) {
        let state = self.state.read().await;
        let Some(chat) = state.chat.as_ref() else {
            return;
        };
        if !batch.mentions(chat.peer_id) {
            return;
        }
        if state.hidden {
            debug!("New message from {} while hidden, leaving chat paused", chat.peer_id);
        } else {
            debug!("New message from open conversation {}, refreshing", chat.peer_id);
            chat.force_refresh();
        }
    }
}
