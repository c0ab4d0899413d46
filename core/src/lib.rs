/// GrooveSync - long-poll synchronization core for the record-collection client
///
/// Keeps chat threads, unread badges and notification counters live without a
/// persistent socket: two pausable long-poll loops, a contact list that follows
/// them, reaction widgets patched in place, and a page-visibility driver.

pub mod badge;
pub mod cli_app;
pub mod config;
pub mod contact_sync;
pub mod engine;
pub mod error;
pub mod poll;
pub mod reactions;
pub mod sync_types;
pub mod thread;
pub mod transport;
pub mod utils;
pub mod visibility;

pub use config::Config;
pub use engine::{PageSeed, SyncEngine};
pub use error::{Result, SyncError};
