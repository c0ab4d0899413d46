pub mod event_emitter;
pub mod time;
