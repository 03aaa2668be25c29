use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::watch;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

use crate::{
    consts::{FRAME_LOG_MAX_CHARS, STREAM_CONNECT_TIMEOUT_SECS},
    error::{NotifyError, Result},
    model::{truncate_text, ConnectionStatus, Notification, StreamFrameWire},
    settings::{build_stream_ws_url, redact_ws_url, ClientSettings},
    store::NotificationStore,
};

/// Fixed-delay reconnect with a hard attempt cap. Once the cap is hit the
/// poller is the only source of truth until an explicit reconnect.
#[derive(Debug)]
pub(crate) struct ReconnectPolicy {
    delay: Duration,
    max_attempts: u32,
    consecutive_failures: u32,
}

impl ReconnectPolicy {
    pub(crate) fn new(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay,
            max_attempts,
            consecutive_failures: 0,
        }
    }

    pub(crate) fn connected(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Delay before the next attempt, or None once the cap is exhausted.
    pub(crate) fn next_delay(&mut self) -> Option<Duration> {
        self.consecutive_failures += 1;
        if self.consecutive_failures >= self.max_attempts {
            None
        } else {
            Some(self.delay)
        }
    }

    pub(crate) fn failures(&self) -> u32 {
        self.consecutive_failures
    }
}

/// Extracts a notification from a text frame. Frames for other features on
/// the shared socket and malformed frames are dropped here; a single bad
/// frame must never take down the connection or the store.
pub(crate) fn parse_stream_frame(text: &str) -> Option<Notification> {
    let frame = match serde_json::from_str::<StreamFrameWire>(text) {
        Ok(frame) => frame,
        Err(error) => {
            debug!(
                %error,
                payload = %truncate_text(text, FRAME_LOG_MAX_CHARS),
                "dropping malformed frame"
            );
            return None;
        }
    };

    if frame.kind != "notification" {
        debug!(kind = %frame.kind, "ignoring frame for another feature");
        return None;
    }

    match serde_json::from_value::<Notification>(frame.payload) {
        Ok(notification) => Some(notification),
        Err(error) => {
            debug!(%error, "dropping notification frame with bad payload");
            None
        }
    }
}

pub(crate) async fn run_stream_loop(
    store: Arc<NotificationStore>,
    settings: ClientSettings,
    mut stop_rx: watch::Receiver<bool>,
    current_epoch: Arc<AtomicU64>,
    task_epoch: u64,
) {
    let mut policy = ReconnectPolicy::new(
        settings.reconnect_delay,
        settings.max_reconnect_attempts,
    );
    debug!("stream task started");

    loop {
        if *stop_rx.borrow() {
            break;
        }

        store.set_connection_status(ConnectionStatus::Connecting);
        match stream_once(&store, &settings, &mut stop_rx, &mut policy).await {
            Ok(()) => break,
            Err(error) => {
                if *stop_rx.borrow() {
                    break;
                }

                warn!(%error, "stream session ended");
                match policy.next_delay() {
                    Some(delay) => {
                        store.set_connection_status(ConnectionStatus::Disconnected);
                        tokio::select! {
                            changed = stop_rx.changed() => {
                                if changed.is_err() || *stop_rx.borrow() {
                                    break;
                                }
                            }
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                    None => {
                        warn!(
                            attempts = policy.failures(),
                            "reconnect attempts exhausted; polling is now the only source of truth"
                        );
                        break;
                    }
                }
            }
        }
    }

    // Only the task for the current epoch reports Disconnected at exit; a
    // late-exiting old task must not clobber a fresh replacement's status.
    if current_epoch.load(Ordering::SeqCst) == task_epoch {
        store.set_connection_status(ConnectionStatus::Disconnected);
    }
    debug!("stream task finished");
}

async fn stream_once(
    store: &NotificationStore,
    settings: &ClientSettings,
    stop_rx: &mut watch::Receiver<bool>,
    policy: &mut ReconnectPolicy,
) -> Result<()> {
    let ws_url = build_stream_ws_url(&settings.base_url, &settings.token)?;
    debug!(url = %redact_ws_url(&ws_url), "connecting stream");

    let (mut ws_stream, _) = tokio::time::timeout(
        Duration::from_secs(STREAM_CONNECT_TIMEOUT_SECS),
        connect_async(ws_url.as_str()),
    )
    .await
    .map_err(|_| {
        NotifyError::Socket(format!(
            "connection timed out after {STREAM_CONNECT_TIMEOUT_SECS}s"
        ))
    })?
    .map_err(|error| NotifyError::Socket(format!("connection failed: {error}")))?;

    debug!("stream connected");
    policy.connected();
    store.set_connection_status(ConnectionStatus::Connected);

    loop {
        tokio::select! {
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    let _ = ws_stream.close(None).await;
                    return Ok(());
                }
            }
            incoming = ws_stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(notification) = parse_stream_frame(text.as_ref()) {
                            store.on_push(notification);
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        ws_stream.send(Message::Pong(payload)).await.map_err(|error| {
                            NotifyError::Socket(format!("failed to send pong: {error}"))
                        })?;
                    }
                    Some(Ok(Message::Close(_))) => {
                        return Err(NotifyError::Socket("stream closed by server".to_string()));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        return Err(NotifyError::Socket(format!("stream read error: {error}")));
                    }
                    None => {
                        return Err(NotifyError::Socket("stream ended unexpectedly".to_string()));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconnect_policy_stops_after_the_attempt_cap() {
        let mut policy = ReconnectPolicy::new(Duration::from_secs(3), 5);

        // Four retries are scheduled after the first four failures; the
        // fifth consecutive failure exhausts the cap.
        for _ in 0..4 {
            assert_eq!(policy.next_delay(), Some(Duration::from_secs(3)));
        }
        assert_eq!(policy.next_delay(), None);
        assert_eq!(policy.failures(), 5);
    }

    #[test]
    fn successful_open_resets_the_failure_streak() {
        let mut policy = ReconnectPolicy::new(Duration::from_secs(3), 5);
        for _ in 0..3 {
            policy.next_delay();
        }
        policy.connected();
        assert_eq!(policy.failures(), 0);
        assert_eq!(policy.next_delay(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn frame_parser_accepts_notification_frames() {
        let text = r#"{
            "type": "notification",
            "payload": {
                "id": "n-9",
                "title": "Ticket assigned",
                "message": "Ticket #42 is yours",
                "is_read": false,
                "created_at": "2024-06-01T10:00:00Z"
            }
        }"#;
        let parsed = parse_stream_frame(text).unwrap();
        assert_eq!(parsed.id, "n-9");
        assert_eq!(parsed.title, "Ticket assigned");
    }

    #[test]
    fn frame_parser_drops_garbage_without_panicking() {
        assert!(parse_stream_frame("not json at all").is_none());
        assert!(parse_stream_frame(r#"{"no_type": true}"#).is_none());
        assert!(parse_stream_frame(r#"{"type": "notification", "payload": 42}"#).is_none());
    }

    #[test]
    fn frame_parser_ignores_other_frame_types() {
        let text = r#"{"type": "ticket_updated", "payload": {"id": "t-1"}}"#;
        assert!(parse_stream_frame(text).is_none());
    }
}
