//! Realtime notification client for the ServiceDesk admin console.
//!
//! Keeps the unread badge and dropdown consistent across three input
//! channels (the initial fetch, WebSocket push, and a visibility-aware
//! polling fallback) plus user mark-read actions, despite unreliable
//! connectivity. The presentation shell reads [`StoreSnapshot`]s,
//! subscribes to [`UiEvent`]s, and issues commands through
//! [`NotificationClient`].

mod client;
mod consts;
mod error;
mod model;
mod poller;
mod settings;
mod store;
mod stream;
mod transport;

pub use client::NotificationClient;
pub use error::{NotifyError, Result};
pub use model::{ConnectionStatus, Notification, StoreSnapshot, Toast, ToastKind, UiEvent};
pub use settings::ClientSettings;
pub use store::NotificationStore;
pub use transport::{NotificationApi, RestTransport, UnreadSnapshot};
