//! Volatile per-actor conversation state.

use std::collections::{BTreeMap, HashMap};

use roomie_types::ActorId;
use tokio::sync::{Mutex, RwLock};

use crate::dialog_machine::DialogState;
use crate::matching_engine::BrowseSession;

/// Named slot for a value collected mid-dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DraftField {
    Name,
    Age,
    Gender,
    Affiliation,
    Description,
    Reason,
    BroadcastText,
    BroadcastMedia,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub dialog: DialogState,
    pub fields: BTreeMap<DraftField, String>,
    pub browse: Option<BrowseSession>,
}

impl SessionState {
    pub fn in_dialog(dialog: DialogState) -> Self {
        Self {
            dialog,
            ..Self::default()
        }
    }

    pub fn browsing(browse: BrowseSession) -> Self {
        Self {
            dialog: DialogState::Browsing,
            fields: BTreeMap::new(),
            browse: Some(browse),
        }
    }

    pub fn field(&self, field: DraftField) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }

    pub fn is_idle(&self) -> bool {
        self.dialog == DialogState::Idle && self.fields.is_empty() && self.browse.is_none()
    }
}

/// Session registry keyed by actor. Sessions are created lazily and dropped when idle.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<ActorId, SessionState>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn load(&self, actor: ActorId) -> SessionState {
        self.sessions
            .lock()
            .await
            .get(&actor)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn save(&self, actor: ActorId, session: SessionState) {
        let mut sessions = self.sessions.lock().await;
        if session.is_idle() {
            sessions.remove(&actor);
        } else {
            sessions.insert(actor, session);
        }
    }

    pub async fn active_count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

/// Last public handle seen per actor. Survives session resets.
#[derive(Debug, Default)]
pub struct HandleBook {
    handles: RwLock<HashMap<ActorId, String>>,
}

impl HandleBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn remember(&self, actor: ActorId, handle: &str) {
        let handle = handle.trim().trim_start_matches('@');
        if handle.is_empty() {
            return;
        }
        let mut handles = self.handles.write().await;
        if handles.get(&actor).map(String::as_str) != Some(handle) {
            handles.insert(actor, handle.to_string());
        }
    }

    pub async fn lookup(&self, actor: ActorId) -> Option<String> {
        self.handles.read().await.get(&actor).cloned()
    }
}
