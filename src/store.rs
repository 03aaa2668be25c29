use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::{
    consts::{EVENT_CHANNEL_CAPACITY, TOAST_TEXT_MAX_CHARS},
    error::Result,
    model::{
        truncate_text, ConnectionStatus, Notification, StoreSnapshot, Toast, ToastKind, UiEvent,
    },
    transport::{NotificationApi, UnreadSnapshot},
};

/// Unread-notification aggregate for one authenticated session. Three input
/// channels mutate it: the initial fetch, stream pushes, and poll-triggered
/// reconciliation. These operations are the only mutation surface, so the
/// invariants hold at the boundary.
///
/// The state mutex is only ever held for synchronous sections, never across
/// an await. Pushes therefore apply immediately even while a reconcile fetch
/// is in flight; the reconcile response is a full-state replace and simply
/// wins when it lands, so a push that also appears in the response is not
/// double-counted.
pub struct NotificationStore {
    api: Arc<dyn NotificationApi>,
    state: Mutex<StoreState>,
    events: broadcast::Sender<UiEvent>,
}

struct StoreState {
    unread_list: Vec<Notification>,
    unread_count: u64,
    connection_status: ConnectionStatus,
    last_known_server_unread_count: u64,
    dropdown_open: bool,
}

impl StoreState {
    fn empty() -> Self {
        Self {
            unread_list: Vec::new(),
            unread_count: 0,
            connection_status: ConnectionStatus::Disconnected,
            last_known_server_unread_count: 0,
            dropdown_open: false,
        }
    }
}

impl NotificationStore {
    pub fn new(api: Arc<dyn NotificationApi>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            api,
            state: Mutex::new(StoreState::empty()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UiEvent> {
        self.events.subscribe()
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        let state = self.state();
        StoreSnapshot {
            unread_list: state.unread_list.clone(),
            unread_count: state.unread_count,
            connection_status: state.connection_status,
            last_known_server_unread_count: state.last_known_server_unread_count,
        }
    }

    pub fn unread_count(&self) -> u64 {
        self.state().unread_count
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.state().connection_status
    }

    /// Replaces the aggregate with the server's authoritative unread state.
    /// On failure the previous state is untouched; the error is logged and
    /// returned for callers that want to toast it, never thrown further.
    pub async fn initial_load(&self) -> Result<()> {
        match self.api.unread_snapshot().await {
            Ok(snapshot) => {
                self.apply_snapshot(snapshot);
                Ok(())
            }
            Err(error) => {
                warn!(%error, "unread fetch failed, keeping current state");
                Err(error)
            }
        }
    }

    /// Drift repair: same full-replace fetch as the initial load.
    pub async fn reconcile(&self) -> Result<()> {
        self.initial_load().await
    }

    /// Synchronous stream-push ingestion; never awaits. Redelivered ids are
    /// dropped, never duplicated.
    pub fn on_push(&self, notification: Notification) {
        if notification.is_read {
            debug!(id = %notification.id, "ignoring push for an already-read notification");
            return;
        }

        let toast_text;
        {
            let mut state = self.state();
            if state
                .unread_list
                .iter()
                .any(|entry| entry.id == notification.id)
            {
                debug!(id = %notification.id, "ignoring redelivered push");
                return;
            }
            state.unread_list.insert(0, notification.clone());
            state.unread_count += 1;
            toast_text = (!state.dropdown_open)
                .then(|| truncate_text(&notification.title, TOAST_TEXT_MAX_CHARS));
        }

        if let Some(text) = toast_text {
            self.toast(ToastKind::Info, text);
        }
        self.emit(UiEvent::Push(notification));
    }

    /// Server first, state second: the entry is removed only once the server
    /// confirms, so a rejected request never shows a false "read".
    pub async fn mark_as_read(&self, id: &str) -> Result<()> {
        if let Err(error) = self.api.mark_read(id).await {
            warn!(%error, id, "mark-read rejected");
            self.toast(
                ToastKind::Error,
                "Could not mark notification as read".to_string(),
            );
            return Err(error);
        }

        {
            let mut state = self.state();
            if let Some(pos) = state.unread_list.iter().position(|entry| entry.id == id) {
                state.unread_list.remove(pos);
                state.unread_count = state.unread_count.saturating_sub(1);
            }
        }
        self.emit(UiEvent::Updated);
        Ok(())
    }

    pub async fn mark_all_as_read(&self) -> Result<()> {
        if let Err(error) = self.api.mark_all_read().await {
            warn!(%error, "mark-all-read rejected");
            self.toast(
                ToastKind::Error,
                "Could not mark notifications as read".to_string(),
            );
            return Err(error);
        }

        {
            let mut state = self.state();
            state.unread_list.clear();
            state.unread_count = 0;
        }
        self.emit(UiEvent::Updated);
        Ok(())
    }

    /// Whether pushes toast (closed) or just update the badge (open).
    pub fn open_dropdown(&self) {
        self.state().dropdown_open = true;
    }

    pub fn close_dropdown(&self) {
        self.state().dropdown_open = false;
    }

    /// Back to the empty aggregate, for logout or token loss.
    pub fn reset(&self) {
        *self.state() = StoreState::empty();
        self.emit(UiEvent::Updated);
    }

    pub(crate) fn set_connection_status(&self, status: ConnectionStatus) {
        {
            let mut state = self.state();
            if state.connection_status == status {
                return;
            }
            state.connection_status = status;
        }
        self.emit(UiEvent::Connection(status));
    }

    pub(crate) fn record_server_count(&self, count: u64) {
        self.state().last_known_server_unread_count = count;
    }

    pub(crate) fn toast(&self, kind: ToastKind, text: String) {
        self.emit(UiEvent::Toast(Toast { kind, text }));
    }

    fn apply_snapshot(&self, snapshot: UnreadSnapshot) {
        let mut items = snapshot.items;
        items.retain(|entry| !entry.is_read);
        let mut seen = HashSet::new();
        items.retain(|entry| seen.insert(entry.id.clone()));
        let count = items.len() as u64;

        {
            let mut state = self.state();
            state.unread_list = items;
            state.unread_count = count;
            state.last_known_server_unread_count = snapshot.server_count;
        }
        self.emit(UiEvent::Updated);
    }

    fn emit(&self, event: UiEvent) {
        // No receivers is fine; the shell may not have subscribed yet.
        let _ = self.events.send(event);
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
