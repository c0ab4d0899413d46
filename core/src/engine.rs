/// Synchronization engine: wires the loops, shared view state and lifecycle
use crate::badge::{BadgeBoard, BadgeState};
use crate::config::Config;
use crate::contact_sync::{Contact, ContactListSync};
use crate::poll::chat::{ChatLoop, ChatSlot, ReadListener};
use crate::poll::notifications::NotificationPoller;
use crate::poll::{LoopHandle, LoopStatus};
use crate::reactions::ReactionSync;
use crate::sync_types::SyncEvent;
use crate::thread::RenderedMessage;
use crate::transport::SyncTransport;
use crate::utils::event_emitter::EventBus;
use crate::visibility::{PageSignal, VisibilityController};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{broadcast, RwLock};
use tracing::{error, info};
use uuid::Uuid;

/// Conversation open at page load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSeed {
    pub peer_id: u64,
    pub last_message_id: u64,
}

/// Values embedded in the initial page render
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageSeed {
    pub unread_snapshot: u32,
    pub contacts: Vec<Contact>,
    pub conversation: Option<ConversationSeed>,
}

/// Everything a renderer needs for one frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub follow: BadgeState,
    pub message: BadgeState,
    pub contacts: Vec<Contact>,
    pub conversation: Option<u64>,
    pub thread: Vec<RenderedMessage>,
    /// New messages arrived since the last snapshot; the view should jump to the bottom
    pub scroll_to_bottom: bool,
    pub notification_status: LoopStatus,
    pub chat_status: Option<LoopStatus>,
}

#[derive(Clone)]
pub struct SyncEngine {
    /// Identifies this engine instance in logs
    pub id: String,
    config: Config,
    transport: Arc<dyn SyncTransport>,
    events: EventBus,
    badges: Arc<RwLock<BadgeBoard>>,
    contacts: ContactListSync,
    chat: ChatSlot,
    notifications: LoopHandle,
    reactions: ReactionSync,
    visibility: VisibilityController,
}

impl SyncEngine {
    /// Start the notification loop, and the chat loop if the page had a conversation open
    pub async fn start(config: Config, transport: Arc<dyn SyncTransport>, seed: PageSeed) -> Self {
        let id = Uuid::new_v4().to_string();
        let events = EventBus::new();
        let badges = Arc::new(RwLock::new(BadgeBoard::default()));
        let contacts = ContactListSync::new(seed.contacts, events.clone());
        let chat = ChatSlot::new();
        let reactions = ReactionSync::new(transport.clone(), events.clone());

        let notifications = NotificationPoller::new(
            transport.clone(),
            seed.unread_snapshot,
            config.long_poll_timeout,
            badges.clone(),
            events.clone(),
        )
        .subscribe(Arc::new(contacts.clone()))
        .subscribe(Arc::new(chat.clone()))
        .spawn(config.retry_delay);

        let visibility = VisibilityController::new(notifications.clone(), chat.clone());

        info!("Created sync engine with ID: {}", id);
        let engine = Self {
            id,
            config,
            transport,
            events,
            badges,
            contacts,
            chat,
            notifications,
            reactions,
            visibility,
        };

        if let Some(conversation) = seed.conversation {
            engine
                .open_conversation(conversation.peer_id, conversation.last_message_id)
                .await;
        }
        engine
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn contacts(&self) -> &ContactListSync {
        &self.contacts
    }

    pub fn reactions(&self) -> &ReactionSync {
        &self.reactions
    }

    pub fn visibility(&self) -> &VisibilityController {
        &self.visibility
    }

    pub fn notifications(&self) -> &LoopHandle {
        &self.notifications
    }

    pub fn chat(&self) -> &ChatSlot {
        &self.chat
    }

    pub async fn badges(&self) -> BadgeBoard {
        self.badges.read().await.clone()
    }

    /// Switch the chat loop to `peer_id`; any previously open conversation stops.
    pub async fn open_conversation(&self, peer_id: u64, last_message_id: u64) {
        let listener: Arc<dyn ReadListener> = Arc::new(self.contacts.clone());
        let chat = ChatLoop::open(
            self.transport.clone(),
            peer_id,
            last_message_id,
            self.config.long_poll_timeout,
            self.config.retry_delay,
            Some(listener),
            self.events.clone(),
        );
        self.chat.open(chat).await;
    }

    pub async fn close_conversation(&self) {
        self.chat.close().await;
    }

    /// Current view state. Consumes the open thread's pending scroll request.
    pub async fn snapshot(&self) -> PageSnapshot {
        let badges = self.badges().await;
        let chat = self.chat.current().await;
        let (conversation, thread, scroll_to_bottom, chat_status) = match &chat {
            Some(chat) => {
                let shared = chat.thread();
                let mut thread = shared.write().await;
                let scroll = thread.take_scroll_request();
                (
                    Some(chat.peer_id()),
                    thread.messages().to_vec(),
                    scroll,
                    Some(chat.handle().status()),
                )
            }
            None => (None, Vec::new(), false, None),
        };
        PageSnapshot {
            follow: badges.follow,
            message: badges.message,
            contacts: self.contacts.contacts().await,
            conversation,
            thread,
            scroll_to_bottom,
            notification_status: self.notifications.status(),
            chat_status,
        }
    }

    /// Unload: pause everything, then stop the loop tasks
    pub async fn shutdown(&self) {
        self.visibility.handle(PageSignal::Unload).await;
        self.chat.close().await;
        self.notifications.shutdown().await;
        info!("Sync engine {} stopped", self.id);
    }

    /// Run until Ctrl+C or SIGTERM, then shut down
    pub async fn run_until_shutdown(&self) {
        wait_for_shutdown().await;
        self.shutdown().await;
    }
}

async fn wait_for_shutdown() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Ctrl+C received"),
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("SIGTERM received");
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
