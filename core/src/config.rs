/// Configuration management
use crate::contact_sync::Contact;
use crate::engine::{ConversationSeed, PageSeed};
use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_HOLD_SECS: u64 = 30;
const DEFAULT_RETRY_SECS: u64 = 4;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 45;

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// API root, e.g. `http://127.0.0.1:8000/api`
    pub base_url: String,

    /// Raw `Cookie` header value carrying the session
    pub session_cookie: Option<String>,

    /// How long the server may hold a waiting request open
    pub long_poll_timeout: Duration,

    /// Delay before retrying after a failed poll
    pub retry_delay: Duration,

    /// Client-side ceiling for a single request (must exceed the hold)
    pub request_timeout: Duration,

    /// Conversation open at startup
    pub peer_id: Option<u64>,

    /// Last message id rendered for `peer_id` at startup
    pub last_message_id: u64,

    /// Unread total rendered at startup
    pub unread_snapshot: u32,

    /// Contacts visible in the chat list at startup
    pub contacts: Vec<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000/api".to_string(),
            session_cookie: None,
            long_poll_timeout: Duration::from_secs(DEFAULT_HOLD_SECS),
            retry_delay: Duration::from_secs(DEFAULT_RETRY_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            peer_id: None,
            last_message_id: 0,
            unread_snapshot: 0,
            contacts: Vec::new(),
        }
    }
}

impl Config {
    /// Create config from command line arguments
    pub fn from_args(args: &[String]) -> Result<Self> {
        if args.len() < 2 {
            return Err(SyncError::Config(format!(
                "Usage: {} <base_url> [--peer <id>] [--after <id>] [--unread <n>] [--contact <id>]... [--cookie <value>] [--hold-secs <n>] [--retry-secs <n>]",
                args.first().map(String::as_str).unwrap_or("groovesync")
            )));
        }

        let base_url = args[1].trim_end_matches('/').to_string();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(SyncError::Config(format!(
                "Base URL must start with http:// or https://, got {}",
                base_url
            )));
        }

        let mut config = Self {
            base_url,
            ..Default::default()
        };

        let mut i = 2;
        while i < args.len() {
            let flag = args[i].as_str();
            match flag {
                "--peer" => {
                    config.peer_id = Some(parse_flag::<u64>(args, i)?);
                    i += 2;
                }
                "--after" => {
                    config.last_message_id = parse_flag::<u64>(args, i)?;
                    i += 2;
                }
                "--unread" => {
                    config.unread_snapshot = parse_flag::<u32>(args, i)?;
                    i += 2;
                }
                "--contact" => {
                    config.contacts.push(parse_flag::<u64>(args, i)?);
                    i += 2;
                }
                "--cookie" => {
                    let value = args.get(i + 1).ok_or_else(|| {
                        SyncError::Config("--cookie requires a value".to_string())
                    })?;
                    config.session_cookie = Some(value.clone());
                    i += 2;
                }
                "--hold-secs" => {
                    config.long_poll_timeout = Duration::from_secs(parse_flag::<u64>(args, i)?);
                    i += 2;
                }
                "--retry-secs" => {
                    config.retry_delay = Duration::from_secs(parse_flag::<u64>(args, i)?);
                    i += 2;
                }
                other => {
                    return Err(SyncError::Config(format!("Unknown argument: {}", other)));
                }
            }
        }

        // Env overrides (nice for scripts)
        if let Ok(cookie) = std::env::var("GROOVESYNC_COOKIE") {
            config.session_cookie = Some(cookie);
        }
        if let Some(secs) = std::env::var("GROOVESYNC_HOLD_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            config.long_poll_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = std::env::var("GROOVESYNC_RETRY_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            config.retry_delay = Duration::from_secs(secs);
        }

        if config.request_timeout <= config.long_poll_timeout {
            config.request_timeout = config.long_poll_timeout + Duration::from_secs(15);
        }

        Ok(config)
    }

    /// Values the initial page render would have embedded
    pub fn page_seed(&self) -> PageSeed {
        PageSeed {
            unread_snapshot: self.unread_snapshot,
            contacts: self.contacts.iter().map(|id| Contact::new(*id)).collect(),
            conversation: self.peer_id.map(|peer_id| ConversationSeed {
                peer_id,
                last_message_id: self.last_message_id,
            }),
        }
    }
}

fn parse_flag<T: std::str::FromStr>(args: &[String], i: usize) -> Result<T> {
    let flag = &args[i];
    let raw = args
        .get(i + 1)
        .ok_or_else(|| SyncError::Config(format!("{} requires a value", flag)))?;
    raw.parse::<T>()
        .map_err(|_| SyncError::Config(format!("{} must be a non-negative number", flag)))
}
