/// Page lifecycle driver: pause on hide/unload, force a fresh poll on show
use crate::poll::chat::ChatSlot;
use crate::poll::LoopHandle;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSignal {
    Visible,
    Hidden,
    Unload,
}

#[derive(Clone)]
pub struct VisibilityController {
    notifications: LoopHandle,
    chat: ChatSlot,
}

impl VisibilityController {
    pub fn new(notifications: LoopHandle, chat: ChatSlot) -> Self {
        Self {
            notifications,
            chat,
        }
    }

    pub async fn handle(&self, signal: PageSignal) {
        debug!("Page signal: {:?}", signal);
        match signal {
            PageSignal::Hidden => {
                self.notifications.pause();
                self.chat.pause().await;
            }
            PageSignal::Visible => {
                self.notifications.resume();
                self.chat.resume().await;
            }
            PageSignal::Unload => {
                info!("Page unloading, pausing all loops");
                self.notifications.pause();
                self.chat.pause().await;
            }
        }
    }

    /// Apply signals until `Unload`; a closed channel counts as unload.
    pub async fn run(self, mut signals: mpsc::UnboundedReceiver<PageSignal>) {
        while let Some(signal) = signals.recv().await {
            self.handle(signal).await;
            if signal == PageSignal::Unload {
                return;
            }
        }
        self.handle(PageSignal::Unload).await;
    }
}
