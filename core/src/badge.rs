/// Badge counters for the navigation bar
use crate::sync_types::NewMessageEntry;
use serde::{Deserialize, Serialize};

/// Navigation badges show at most one digit
pub const NAV_BADGE_CAP: u32 = 9;

/// Chat-list badges show at most two digits
pub const CONTACT_BADGE_CAP: u32 = 99;

/// Display text for a count, `None` when the badge should be empty
pub fn capped_text(count: u32, cap: u32) -> Option<String> {
    match count {
        0 => None,
        n if n > cap => Some(format!("{}+", cap)),
        n => Some(n.to_string()),
    }
}

/// Rendered state of one navigation badge
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeState {
    pub count: u32,
    pub text: String,
    /// Drives the "has notification" highlight on the nav item
    pub has_notification: bool,
}

impl BadgeState {
    pub fn with_count(count: u32) -> Self {
        let text = capped_text(count, NAV_BADGE_CAP);
        Self {
            count,
            has_notification: text.is_some(),
            text: text.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeBoard {
    pub follow: BadgeState,
    pub message: BadgeState,
}

impl BadgeBoard {
    pub fn set(&mut self, follower_count: u32, message_count: u32) {
        self.follow = BadgeState::with_count(follower_count);
        self.message = BadgeState::with_count(message_count);
    }
}

/// Message badge count for one notification response.
///
/// The server total wins when present. Otherwise the per-conversation counts
/// are summed, an entry without a count standing for one unread message.
pub fn message_badge_count(entries: &[NewMessageEntry], server_total: Option<u32>) -> u32 {
    match server_total {
        Some(total) => total,
        None => entries
            .iter()
            .fold(0u32, |acc, entry| acc.saturating_add(entry.unread())),
    }
}
