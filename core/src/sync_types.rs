/// Wire shapes for the long-poll endpoints and the events streamed to the view layer
use crate::badge::BadgeState;
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;

// ─── Requests ────────────────────────────────────────────────────────────────

/// Query for `GET notifications`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationQuery {
    /// Watermark: everything up to this instant has been seen
    pub since: String,
    pub unread_snapshot: u32,
    /// Hold-open directive, `None` for an immediate answer
    pub hold: Option<Duration>,
}

impl NotificationQuery {
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("since", self.since.clone()),
            ("unread_snapshot", self.unread_snapshot.to_string()),
        ];
        push_hold(&mut pairs, self.hold);
        pairs
    }
}

/// Query for `GET conversations/{peer}/messages`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageQuery {
    pub after: u64,
    pub hold: Option<Duration>,
    /// The thread is on screen, so the server may mark it read
    pub active: bool,
}

impl MessageQuery {
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("after", self.after.to_string())];
        push_hold(&mut pairs, self.hold);
        if self.active {
            pairs.push(("active", "1".to_string()));
        }
        pairs
    }
}

fn push_hold(pairs: &mut Vec<(&'static str, String)>, hold: Option<Duration>) {
    if let Some(hold) = hold {
        pairs.push(("wait", "1".to_string()));
        pairs.push(("timeout", hold.as_secs().to_string()));
    }
}

/// Body of `POST conversations/{peer}/read`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadReceipt {
    pub last_message_id: u64,
    pub last_message_at: Option<String>,
}

// ─── Responses ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationPayload {
    #[serde(default)]
    pub server_time: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub new_followers: Vec<serde_json::Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub new_messages: Vec<NewMessageEntry>,
    #[serde(default)]
    pub total_unread_messages: Option<u32>,
}

/// One conversation with unseen activity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewMessageEntry {
    #[serde(default)]
    pub from_user: Option<UserRef>,
    #[serde(default)]
    pub unread_count: Option<u32>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl NewMessageEntry {
    /// Contact id of the sender, if the payload carries a usable one
    pub fn contact_id(&self) -> Option<u64> {
        self.from_user.as_ref().and_then(|u| u.id)
    }

    /// Unread messages this entry stands for; older servers omit the count
    pub fn unread(&self) -> u32 {
        self.unread_count.unwrap_or(1)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserRef {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessagePayload {
    #[serde(default, deserialize_with = "null_as_default")]
    pub messages: Vec<WireMessage>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub last_id: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<u64>,
    #[serde(default)]
    pub from_me: bool,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// The local user's reaction, `-1 | 0 | 1` on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i8", into = "i8")]
pub enum UserReaction {
    Dislike,
    Neutral,
    Like,
}

impl TryFrom<i8> for UserReaction {
    type Error = String;

    fn try_from(value: i8) -> std::result::Result<Self, Self::Error> {
        match value {
            -1 => Ok(UserReaction::Dislike),
            0 => Ok(UserReaction::Neutral),
            1 => Ok(UserReaction::Like),
            other => Err(format!("invalid user_reaction: {}", other)),
        }
    }
}

impl From<UserReaction> for i8 {
    fn from(value: UserReaction) -> Self {
        match value {
            UserReaction::Dislike => -1,
            UserReaction::Neutral => 0,
            UserReaction::Like => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionPayload {
    pub target_type: String,
    #[serde(deserialize_with = "id_as_string")]
    pub target_id: String,
    pub likes: u64,
    pub dislikes: u64,
    pub user_reaction: UserReaction,
}

// ─── Events ──────────────────────────────────────────────────────────────────

/// Real-time events for whatever renders the page
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    /// Follower and message badges were recomputed
    BadgesUpdated { follow: BadgeState, message: BadgeState },
    /// New messages were rendered into the open thread
    MessagesAppended { peer_id: u64, message_ids: Vec<u64> },
    /// The thread should be scrolled to the bottom on the next frame
    ScrollRequested { peer_id: u64 },
    /// The chat list was re-sorted
    ContactsReordered { order: Vec<u64> },
    /// A contact's unread badge was zeroed
    ContactRead { contact_id: u64 },
    /// A reaction result was patched into every widget occurrence
    ReactionApplied {
        target_type: String,
        target_id: String,
        widgets: usize,
    },
}

// ─── Lenient decoding ────────────────────────────────────────────────────────

/// Accept ids as numbers or numeric strings; zero and garbage resolve to `None`.
fn lenient_id<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(id_from_value).filter(|id| *id > 0))
}

fn id_from_value(value: &serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 0.0)
                .map(|f| f as u64)
        }),
        serde_json::Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}

fn id_as_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "target_id must be a string or number, got {}",
            other
        ))),
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
