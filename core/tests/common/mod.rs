#![allow(dead_code)]
// Shared fixtures for the integration tests: a scripted in-memory transport
// and payload builders

use async_trait::async_trait;
use groovesync_core::config::Config;
use groovesync_core::error::{Result, SyncError};
use groovesync_core::sync_types::{
    MessagePayload, MessageQuery, NewMessageEntry, NotificationPayload, NotificationQuery,
    ReactionPayload, ReadReceipt, SyncEvent, UserReaction, UserRef, WireMessage,
};
use groovesync_core::transport::SyncTransport;
use reqwest::StatusCode;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;

pub const RETRY: Duration = Duration::from_millis(30);
pub const HOLD: Duration = Duration::from_secs(30);

/// Scripted answer for one request. An empty script hangs until cancelled,
/// like a long poll with nothing to report.
pub enum Reply<T> {
    Ok(T),
    Fail,
    Hang,
    Slow(Duration, T),
}

#[derive(Default)]
pub struct ScriptedTransport {
    notifications: Mutex<VecDeque<Reply<NotificationPayload>>>,
    messages: Mutex<VecDeque<Reply<MessagePayload>>>,
    reactions: Mutex<VecDeque<Reply<ReactionPayload>>>,
    notification_calls: Mutex<Vec<NotificationQuery>>,
    message_calls: Mutex<Vec<(u64, MessageQuery)>>,
    receipts: Mutex<Vec<(u64, ReadReceipt)>>,
    reaction_calls: Mutex<Vec<(String, Vec<(String, String)>)>>,
    cancelled: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_notifications(&self, reply: Reply<NotificationPayload>) {
        self.notifications.lock().unwrap().push_back(reply);
    }

    pub fn push_messages(&self, reply: Reply<MessagePayload>) {
        self.messages.lock().unwrap().push_back(reply);
    }

    pub fn push_reaction(&self, reply: Reply<ReactionPayload>) {
        self.reactions.lock().unwrap().push_back(reply);
    }

    pub fn notification_calls(&self) -> Vec<NotificationQuery> {
        self.notification_calls.lock().unwrap().clone()
    }

    pub fn message_calls(&self) -> Vec<(u64, MessageQuery)> {
        self.message_calls.lock().unwrap().clone()
    }

    pub fn receipts(&self) -> Vec<(u64, ReadReceipt)> {
        self.receipts.lock().unwrap().clone()
    }

    pub fn reaction_calls(&self) -> Vec<(String, Vec<(String, String)>)> {
        self.reaction_calls.lock().unwrap().clone()
    }

    /// Requests that ended because their token fired
    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    async fn answer<T>(&self, reply: Option<Reply<T>>, cancel: &CancellationToken) -> Result<T> {
        match reply {
            Some(Reply::Ok(payload)) => Ok(payload),
            Some(Reply::Fail) => Err(server_error()),
            Some(Reply::Slow(delay, payload)) => {
                tokio::select! {
                    _ = cancel.cancelled() => self.on_cancel(),
                    _ = sleep(delay) => Ok(payload),
                }
            }
            Some(Reply::Hang) | None => {
                cancel.cancelled().await;
                self.on_cancel()
            }
        }
    }

    fn on_cancel<T>(&self) -> Result<T> {
        self.cancelled.fetch_add(1, Ordering::SeqCst);
        Err(SyncError::Cancelled)
    }
}

fn server_error() -> SyncError {
    SyncError::Status {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: "scripted failure".to_string(),
    }
}

#[async_trait]
impl SyncTransport for ScriptedTransport {
    async fn fetch_notifications(
        &self,
        query: &NotificationQuery,
        cancel: &CancellationToken,
    ) -> Result<NotificationPayload> {
        self.notification_calls.lock().unwrap().push(query.clone());
        let reply = self.notifications.lock().unwrap().pop_front();
        self.answer(reply, cancel).await
    }

    async fn fetch_messages(
        &self,
        peer_id: u64,
        query: &MessageQuery,
        cancel: &CancellationToken,
    ) -> Result<MessagePayload> {
        self.message_calls.lock().unwrap().push((peer_id, query.clone()));
        let reply = self.messages.lock().unwrap().pop_front();
        self.answer(reply, cancel).await
    }

    async fn send_read_receipt(&self, peer_id: u64, receipt: &ReadReceipt) -> Result<()> {
        self.receipts.lock().unwrap().push((peer_id, receipt.clone()));
        Ok(())
    }

    async fn submit_reaction(
        &self,
        action: &str,
        fields: &[(String, String)],
    ) -> Result<ReactionPayload> {
        self.reaction_calls
            .lock()
            .unwrap()
            .push((action.to_string(), fields.to_vec()));
        let reply = self.reactions.lock().unwrap().pop_front();
        match reply {
            Some(Reply::Ok(payload)) => Ok(payload),
            Some(Reply::Slow(delay, payload)) => {
                sleep(delay).await;
                Ok(payload)
            }
            Some(Reply::Fail) | Some(Reply::Hang) | None => Err(server_error()),
        }
    }

    fn resolve_action(&self, action: &str) -> Result<String> {
        Ok(format!("http://groovesync.test/{}", action.trim_start_matches('/')))
    }
}

pub fn test_config() -> Config {
    Config {
        base_url: "http://groovesync.test".to_string(),
        long_poll_timeout: HOLD,
        retry_delay: RETRY,
        ..Default::default()
    }
}

// ─── Payload builders ────────────────────────────────────────────────────────

pub fn entry(contact_id: u64, unread: Option<u32>, created_at: &str) -> NewMessageEntry {
    NewMessageEntry {
        from_user: Some(UserRef {
            id: Some(contact_id),
        }),
        unread_count: unread,
        created_at: Some(created_at.to_string()),
    }
}

pub fn notifications(
    server_time: &str,
    followers: usize,
    entries: Vec<NewMessageEntry>,
) -> NotificationPayload {
    NotificationPayload {
        server_time: Some(server_time.to_string()),
        new_followers: (0..followers)
            .map(|i| serde_json::json!({ "id": i + 1 }))
            .collect(),
        new_messages: entries,
        total_unread_messages: None,
    }
}

pub fn message(id: u64, from_me: bool, content: &str, created_at: &str) -> WireMessage {
    WireMessage {
        id: Some(id),
        from_me,
        content: Some(content.to_string()),
        created_at: Some(created_at.to_string()),
    }
}

pub fn messages(batch: Vec<WireMessage>, last_id: Option<u64>) -> MessagePayload {
    MessagePayload {
        messages: batch,
        last_id,
    }
}

pub fn reaction(target_type: &str, target_id: &str, likes: u64, dislikes: u64, mine: UserReaction) -> ReactionPayload {
    ReactionPayload {
        target_type: target_type.to_string(),
        target_id: target_id.to_string(),
        likes,
        dislikes,
        user_reaction: mine,
    }
}

// ─── Waiting ─────────────────────────────────────────────────────────────────

/// Poll `check` until it holds or two seconds pass
pub async fn eventually(what: &str, check: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !check() {
        if Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        sleep(Duration::from_millis(5)).await;
    }
}

/// Next event matching `want`, skipping everything else
pub async fn next_event(
    rx: &mut broadcast::Receiver<SyncEvent>,
    want: impl Fn(&SyncEvent) -> bool,
) -> SyncEvent {
    timeout(Duration::from_secs(2), async {
        loop {
            match rx.recv().await {
                Ok(event) if want(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event bus closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}
