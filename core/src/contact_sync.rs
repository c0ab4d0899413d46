/// Chat list state: per-contact unread badges and last-activity ordering
use crate::badge::{capped_text, CONTACT_BADGE_CAP};
use crate::poll::chat::ReadListener;
use crate::poll::notifications::{NotificationBatch, NotificationSubscriber};
use crate::sync_types::{NewMessageEntry, SyncEvent};
use crate::utils::event_emitter::EventBus;
use crate::utils::time::parse_timestamp;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: u64,
    pub unread: u32,
    pub last_activity: Option<DateTime<Utc>>,
}

impl Contact {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            unread: 0,
            last_activity: None,
        }
    }

    pub fn with_activity(id: u64, last_activity: DateTime<Utc>) -> Self {
        Self {
            id,
            unread: 0,
            last_activity: Some(last_activity),
        }
    }

    /// Badge text, `None` hides the badge
    pub fn badge_text(&self) -> Option<String> {
        capped_text(self.unread, CONTACT_BADGE_CAP)
    }

    /// Screen-reader label; always the exact count
    pub fn badge_label(&self) -> Option<String> {
        match self.unread {
            0 => None,
            1 => Some("1 unread message".to_string()),
            n => Some(format!("{} unread messages", n)),
        }
    }
}

/// Most recent activity first, then lowest id; contacts never active go last.
fn display_order(a: &Contact, b: &Contact) -> Ordering {
    match (a.last_activity, b.last_activity) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.id.cmp(&b.id))
}

/// The visible chat list, always held in display order
#[derive(Debug, Clone, Default)]
pub struct ContactList {
    contacts: Vec<Contact>,
}

impl ContactList {
    pub fn new(contacts: Vec<Contact>) -> Self {
        let mut list = Self { contacts };
        list.contacts.sort_by_key(|c| c.id);
        list.contacts.dedup_by_key(|c| c.id);
        list.resort();
        list
    }

    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    pub fn get(&self, id: u64) -> Option<&Contact> {
        self.contacts.iter().find(|c| c.id == id)
    }

    pub fn order(&self) -> Vec<u64> {
        self.contacts.iter().map(|c| c.id).collect()
    }

    /// Apply notification entries and re-sort. Returns how many entries matched.
    pub fn apply_entries(&mut self, entries: &[NewMessageEntry]) -> usize {
        let mut matched = 0;
        for entry in entries {
            let Some(id) = entry.contact_id() else { continue };
            let Some(contact) = self.contacts.iter_mut().find(|c| c.id == id) else {
                continue;
            };
            contact.unread = entry.unread();
            if let Some(at) = entry.created_at.as_deref().and_then(parse_timestamp) {
                contact.last_activity = Some(contact.last_activity.map_or(at, |prev| prev.max(at)));
            }
            matched += 1;
        }
        self.resort();
        matched
    }

    /// Zero one contact's badge. Returns false for unknown ids.
    pub fn clear_unread(&mut self, id: u64) -> bool {
        match self.contacts.iter_mut().find(|c| c.id == id) {
            Some(contact) => {
                contact.unread = 0;
                true
            }
            None => false,
        }
    }

    fn resort(&mut self) {
        self.contacts.sort_by(display_order);
    }
}

/// Shared chat list wired to the notification and chat loops
#[derive(Clone)]
pub struct ContactListSync {
    list: Arc<RwLock<ContactList>>,
    events: EventBus,
}

impl ContactListSync {
    pub fn new(contacts: Vec<Contact>, events: EventBus) -> Self {
        Self {
            list: Arc::new(RwLock::new(ContactList::new(contacts))),
            events,
        }
    }

    pub async fn update_from_notifications(&self, entries: &[NewMessageEntry]) {
        let order = {
            let mut list = self.list.write().await;
            let matched = list.apply_entries(entries);
            debug!("Contact list updated: {} of {} entries matched", matched, entries.len());
            list.order()
        };
        self.events.emit(SyncEvent::ContactsReordered { order });
    }

    /// Optimistic: the next notification poll reconciles with the server.
    pub async fn mark_as_read(&self, contact_id: u64) {
        let cleared = self.list.write().await.clear_unread(contact_id);
        if cleared {
            self.events.emit(SyncEvent::ContactRead { contact_id });
        }
    }

    pub async fn contacts(&self) -> Vec<Contact> {
        self.list.read().await.contacts().to_vec()
    }

    pub async fn contact(&self, id: u64) -> Option<Contact> {
        self.list.read().await.get(id).cloned()
    }
}

#[async_trait]
impl NotificationSubscriber for ContactListSync {
    async fn on_notifications(&self, batch: &NotificationBatch) {
        self.update_from_notifications(&batch.new_messages).await;
    }
}

#[async_trait]
impl ReadListener for ContactListSync {
    async fn on_conversation_read(&self, contact_id: u64) {
        self.mark_as_read(contact_id).await;
    }
}
