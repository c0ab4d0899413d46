/// Notification loop: follower/message badges and cross-feature fan-out
use super::{LoopHandle, LoopSettings, Poller, ResumePolicy};
use crate::badge::{message_badge_count, BadgeBoard};
use crate::error::Result;
use crate::sync_types::{NewMessageEntry, NotificationPayload, NotificationQuery, SyncEvent};
use crate::transport::SyncTransport;
use crate::utils::event_emitter::EventBus;
use crate::utils::time::{now_iso, parse_timestamp};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// One successful notification response, digested
#[derive(Debug, Clone, Default)]
pub struct NotificationBatch {
    pub server_time: Option<String>,
    pub follower_count: u32,
    pub message_count: u32,
    pub new_messages: Vec<NewMessageEntry>,
}

impl NotificationBatch {
    pub fn from_payload(payload: NotificationPayload) -> Self {
        let follower_count = u32::try_from(payload.new_followers.len()).unwrap_or(u32::MAX);
        let message_count =
            message_badge_count(&payload.new_messages, payload.total_unread_messages);
        Self {
            server_time: payload.server_time,
            follower_count,
            message_count,
            new_messages: payload.new_messages,
        }
    }

    /// Whether any new message comes from `contact_id`
    pub fn mentions(&self, contact_id: u64) -> bool {
        self.new_messages
            .iter()
            .any(|entry| entry.contact_id() == Some(contact_id))
    }
}

/// Anything that reacts to new notifications (contact list, open chat)
#[async_trait]
pub trait NotificationSubscriber: Send + Sync {
    async fn on_notifications(&self, batch: &NotificationBatch);
}

/// `since` cursor. Local time only until the server has answered once.
#[derive(Debug, Clone)]
pub struct NotificationWatermark {
    since: String,
    server_confirmed: bool,
}

impl NotificationWatermark {
    pub fn new(start: impl Into<String>) -> Self {
        Self {
            since: start.into(),
            server_confirmed: false,
        }
    }

    pub fn since(&self) -> &str {
        &self.since
    }

    pub fn advance(&mut self, server_time: Option<&str>) {
        match server_time {
            Some(server_time) => {
                let rewinds = match (parse_timestamp(server_time), parse_timestamp(&self.since)) {
                    (Some(new), Some(current)) => new < current,
                    _ => false,
                };
                // Local start time may run ahead of the server clock
                if !rewinds || !self.server_confirmed {
                    self.since = server_time.to_string();
                }
                self.server_confirmed = true;
            }
            None if !self.server_confirmed => self.since = now_iso(),
            None => {}
        }
    }
}

pub struct NotificationPoller {
    transport: Arc<dyn SyncTransport>,
    watermark: NotificationWatermark,
    unread_snapshot: u32,
    hold: Duration,
    badges: Arc<RwLock<BadgeBoard>>,
    subscribers: Vec<Arc<dyn NotificationSubscriber>>,
    events: EventBus,
}

impl NotificationPoller {
    pub fn new(
        transport: Arc<dyn SyncTransport>,
        unread_snapshot: u32,
        hold: Duration,
        badges: Arc<RwLock<BadgeBoard>>,
        events: EventBus,
    ) -> Self {
        Self {
            transport,
            watermark: NotificationWatermark::new(now_iso()),
            unread_snapshot,
            hold,
            badges,
            subscribers: Vec::new(),
            events,
        }
    }

    pub fn with_watermark(mut self, watermark: NotificationWatermark) -> Self {
        self.watermark = watermark;
        self
    }

    pub fn subscribe(mut self, subscriber: Arc<dyn NotificationSubscriber>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    /// Spawn with the notification loop's behavior: start immediately, and
    /// resume only from a pause.
    pub fn spawn(self, retry_delay: Duration) -> LoopHandle {
        LoopHandle::spawn(
            self,
            LoopSettings {
                retry_delay,
                resume: ResumePolicy::IfPaused,
                initial_wait: false,
            },
        )
    }
}

#[async_trait]
impl Poller for NotificationPoller {
    type Response = NotificationPayload;

    fn name(&self) -> &'static str {
        "notifications"
    }

    async fn fetch(&self, wait: bool, cancel: &CancellationToken) -> Result<NotificationPayload> {
        let query = NotificationQuery {
            since: self.watermark.since().to_string(),
            unread_snapshot: self.unread_snapshot,
            hold: wait.then_some(self.hold),
        };
        self.transport.fetch_notifications(&query, cancel).await
    }

    async fn apply(&mut self, payload: NotificationPayload, _active: bool) {
        self.watermark.advance(payload.server_time.as_deref());
        let batch = NotificationBatch::from_payload(payload);
        self.unread_snapshot = batch.message_count;
        debug!(
            "Notifications: {} followers, {} unread, {} conversations",
            batch.follower_count,
            batch.message_count,
            batch.new_messages.len()
        );

        let (follow, message) = {
            let mut badges = self.badges.write().await;
            badges.set(batch.follower_count, batch.message_count);
            (badges.follow.clone(), badges.message.clone())
        };
        self.events.emit(SyncEvent::BadgesUpdated { follow, message });

        for subscriber in &self.subscribers {
            subscriber.on_notifications(&batch).await;
        }
    }
}
