use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{NotifyError, Result};

/// Server-owned notification record. `id` is the identity across every
/// channel (initial fetch, push, reconciliation); nothing is keyed by
/// position. `is_read` only ever flips false to true.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Notification {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub link_url: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// REST responses arrive either wrapped in `{success, data}` or as the bare
/// payload, depending on backend version.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum Envelope<T> {
    Wrapped {
        #[serde(default = "envelope_success_default")]
        success: bool,
        data: T,
    },
    Bare(T),
}

fn envelope_success_default() -> bool {
    true
}

impl<T> Envelope<T> {
    pub(crate) fn into_data(self) -> Result<T> {
        match self {
            Envelope::Wrapped { success: false, .. } => Err(NotifyError::Transport(
                "server reported failure in response envelope".to_string(),
            )),
            Envelope::Wrapped { data, .. } => Ok(data),
            Envelope::Bare(data) => Ok(data),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct UnreadCountWire {
    pub(crate) count: u64,
}

/// Inbound socket frame. `type` values other than `notification` belong to
/// other features sharing the socket and are ignored here.
#[derive(Debug, Deserialize)]
pub(crate) struct StreamFrameWire {
    #[serde(rename = "type")]
    pub(crate) kind: String,
    pub(crate) payload: serde_json::Value,
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
}

/// Read view handed to the presentation shell.
#[derive(Debug, Serialize, Clone)]
pub struct StoreSnapshot {
    pub unread_list: Vec<Notification>,
    pub unread_count: u64,
    pub connection_status: ConnectionStatus,
    pub last_known_server_unread_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    Info,
    Error,
}

#[derive(Debug, Clone)]
pub struct Toast {
    pub kind: ToastKind,
    pub text: String,
}

/// Events for the presentation shell: re-render triggers and transient
/// toasts. Never carries an error object.
#[derive(Debug, Clone)]
pub enum UiEvent {
    /// A single notification arrived over the stream and was prepended.
    Push(Notification),
    /// The unread list changed by any other means; re-read the snapshot.
    Updated,
    Toast(Toast),
    Connection(ConnectionStatus),
}

pub(crate) fn truncate_text(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input.to_string();
    }

    let truncated: String = input.chars().take(max_chars).collect();
    format!("{truncated}...")
}
