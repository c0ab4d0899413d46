/// Reaction sync: asynchronous like/dislike submission patched into every widget occurrence
use crate::error::Result;
use crate::sync_types::{ReactionPayload, SyncEvent, UserReaction};
use crate::transport::SyncTransport;
use crate::utils::event_emitter::EventBus;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// What a reaction is attached to, e.g. `("record", "7")`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReactionTarget {
    pub kind: String,
    pub id: String,
}

impl ReactionTarget {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

/// One on-screen copy of a reaction widget
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionWidget {
    pub widget_id: String,
    pub likes_text: String,
    pub dislikes_text: String,
    pub like_active: bool,
    pub dislike_active: bool,
}

impl ReactionWidget {
    fn patch(&mut self, payload: &ReactionPayload) {
        self.likes_text = payload.likes.to_string();
        self.dislikes_text = payload.dislikes.to_string();
        self.like_active = payload.user_reaction == UserReaction::Like;
        self.dislike_active = payload.user_reaction == UserReaction::Dislike;
    }
}

/// Every registered widget, grouped by target
#[derive(Debug, Default)]
pub struct ReactionBoard {
    widgets: HashMap<ReactionTarget, Vec<ReactionWidget>>,
}

impl ReactionBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track another occurrence of `target`'s widget; re-registering is a no-op
    pub fn register(&mut self, target: ReactionTarget, widget_id: impl Into<String>) {
        let widget_id = widget_id.into();
        let widgets = self.widgets.entry(target).or_default();
        if !widgets.iter().any(|w| w.widget_id == widget_id) {
            widgets.push(ReactionWidget {
                widget_id,
                ..Default::default()
            });
        }
    }

    pub fn widgets(&self, target: &ReactionTarget) -> &[ReactionWidget] {
        self.widgets.get(target).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Patch every occurrence; returns how many were touched
    pub fn apply(&mut self, payload: &ReactionPayload) -> usize {
        let target = ReactionTarget::new(payload.target_type.clone(), payload.target_id.clone());
        match self.widgets.get_mut(&target) {
            Some(widgets) => {
                widgets.iter_mut().for_each(|w| w.patch(payload));
                widgets.len()
            }
            None => 0,
        }
    }
}

/// A form submit intercepted at the document level
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedForm {
    /// Stable identity of the form element, for the in-flight guard
    pub form_id: String,
    pub action: String,
    /// Carries the reaction marker
    pub is_reaction: bool,
    pub fields: Vec<(String, String)>,
}

/// Classic synchronous submission to perform when the async path fails
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackSubmission {
    pub method: &'static str,
    pub url: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Not a reaction form; default handling continues
    Ignored,
    /// The same form is already being submitted
    Duplicate,
    Applied { payload: ReactionPayload, widgets: usize },
    Fallback(FallbackSubmission),
}

/// Releases a form's in-flight flag when dropped
struct InFlightGuard {
    forms: Arc<Mutex<HashSet<String>>>,
    form_id: String,
}

impl InFlightGuard {
    fn acquire(forms: &Arc<Mutex<HashSet<String>>>, form_id: &str) -> Option<Self> {
        let mut set = forms.lock().unwrap_or_else(|e| e.into_inner());
        set.insert(form_id.to_string()).then(|| Self {
            forms: forms.clone(),
            form_id: form_id.to_string(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut set = self.forms.lock().unwrap_or_else(|e| e.into_inner());
        set.remove(&self.form_id);
    }
}

#[derive(Clone)]
pub struct ReactionSync {
    transport: Arc<dyn SyncTransport>,
    board: Arc<RwLock<ReactionBoard>>,
    in_flight: Arc<Mutex<HashSet<String>>>,
    events: EventBus,
}

impl ReactionSync {
    pub fn new(transport: Arc<dyn SyncTransport>, events: EventBus) -> Self {
        Self {
            transport,
            board: Arc::new(RwLock::new(ReactionBoard::new())),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            events,
        }
    }

    pub fn board(&self) -> Arc<RwLock<ReactionBoard>> {
        self.board.clone()
    }

    pub async fn register(&self, target: ReactionTarget, widget_id: impl Into<String>) {
        self.board.write().await.register(target, widget_id);
    }

    pub fn is_in_flight(&self, form_id: &str) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(form_id)
    }

    pub async fn handle_submit(&self, form: &SubmittedForm) -> SubmitOutcome {
        if !form.is_reaction {
            return SubmitOutcome::Ignored;
        }
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight, &form.form_id) else {
            debug!("Reaction form {} already in flight", form.form_id);
            return SubmitOutcome::Duplicate;
        };

        match self.transport.submit_reaction(&form.action, &form.fields).await {
            Ok(payload) => {
                let widgets = self.board.write().await.apply(&payload);
                debug!(
                    "Reaction on {} {} patched into {} widgets",
                    payload.target_type, payload.target_id, widgets
                );
                self.events.emit(SyncEvent::ReactionApplied {
                    target_type: payload.target_type.clone(),
                    target_id: payload.target_id.clone(),
                    widgets,
                });
                SubmitOutcome::Applied { payload, widgets }
            }
            Err(e) => {
                warn!("Reaction submit to {} failed, falling back: {}", form.action, e);
                SubmitOutcome::Fallback(self.fallback(form))
            }
        }
    }

    fn fallback(&self, form: &SubmittedForm) -> FallbackSubmission {
        let url = self
            .resolve(&form.action)
            .unwrap_or_else(|_| form.action.clone());
        FallbackSubmission {
            method: "POST",
            url,
            body: encode_form(&form.fields),
        }
    }

    fn resolve(&self, action: &str) -> Result<String> {
        self.transport.resolve_action(action)
    }
}

/// `application/x-www-form-urlencoded` body
pub fn encode_form(fields: &[(String, String)]) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}
