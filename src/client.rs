use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{broadcast, watch};
use tracing::warn;

use crate::{
    error::Result,
    model::{ConnectionStatus, StoreSnapshot, UiEvent},
    poller::run_poller,
    settings::ClientSettings,
    store::NotificationStore,
    stream::run_stream_loop,
    transport::{NotificationApi, RestTransport},
};

/// Session facade for the presentation shell: one instance per
/// authenticated session, started after login and torn down on logout.
/// Owns the store and the background tasks; all shell interaction goes
/// through snapshots, the event subscription, and the commands below.
pub struct NotificationClient {
    settings: ClientSettings,
    api: Arc<dyn NotificationApi>,
    store: Arc<NotificationStore>,
    runtime: Mutex<Runtime>,
    /// Bumped on every start. A stream task captures its epoch at spawn and
    /// only writes teardown status if it is still the current one.
    stream_epoch: Arc<AtomicU64>,
    visibility_tx: watch::Sender<bool>,
}

#[derive(Default)]
struct Runtime {
    stop_tx: Option<watch::Sender<bool>>,
}

impl NotificationClient {
    pub fn new(settings: ClientSettings) -> Result<Self> {
        let api: Arc<dyn NotificationApi> = Arc::new(RestTransport::new(&settings)?);
        Ok(Self::with_api(settings, api))
    }

    /// Seam for exercising the client against a scripted backend.
    pub fn with_api(settings: ClientSettings, api: Arc<dyn NotificationApi>) -> Self {
        let store = Arc::new(NotificationStore::new(api.clone()));
        let (visibility_tx, _) = watch::channel(true);
        Self {
            settings,
            api,
            store,
            runtime: Mutex::new(Runtime::default()),
            stream_epoch: Arc::new(AtomicU64::new(0)),
            visibility_tx,
        }
    }

    /// Initial fetch, then the stream loop and the poller. A second start
    /// while running is a no-op. Must be called on a tokio runtime.
    pub async fn start(&self) {
        let stop_rx = {
            let mut runtime = self.runtime();
            if runtime.stop_tx.is_some() {
                return;
            }
            let (tx, rx) = watch::channel(false);
            runtime.stop_tx = Some(tx);
            rx
        };
        let task_epoch = self.stream_epoch.fetch_add(1, Ordering::SeqCst) + 1;

        if let Err(error) = self.store.initial_load().await {
            // The poller self-corrects once the backend is reachable.
            warn!(%error, "initial notification load failed");
        }

        tokio::spawn(run_stream_loop(
            self.store.clone(),
            self.settings.clone(),
            stop_rx.clone(),
            self.stream_epoch.clone(),
            task_epoch,
        ));
        tokio::spawn(run_poller(
            self.api.clone(),
            self.store.clone(),
            self.settings.poll_interval,
            stop_rx,
            self.visibility_tx.subscribe(),
        ));
    }

    /// Stops the poller and closes the socket. Idempotent. In-flight
    /// fetches are left to resolve; their results are simply discarded.
    pub fn stop(&self) {
        let stopped = {
            let mut runtime = self.runtime();
            match runtime.stop_tx.take() {
                Some(stop_tx) => {
                    let _ = stop_tx.send(true);
                    true
                }
                None => false,
            }
        };
        if stopped {
            self.store
                .set_connection_status(ConnectionStatus::Disconnected);
        }
    }

    /// Unconditional teardown and redial, e.g. after a token refresh.
    pub async fn restart(&self) {
        self.stop();
        self.start().await;
    }

    /// Redials only when the stream is down (reconnect attempts exhausted);
    /// a healthy or still-retrying connection is left alone.
    pub async fn recover(&self) {
        let running = self.runtime().stop_tx.is_some();
        if !running {
            return;
        }
        if self.store.connection_status() != ConnectionStatus::Disconnected {
            return;
        }
        self.restart().await;
    }

    /// Logout or token loss: stop everything and drop the aggregate.
    pub fn reset(&self) {
        self.stop();
        self.store.reset();
    }

    /// Shell-reported tab visibility; a flip to visible triggers an
    /// immediate catch-up poll. send_replace keeps the value even when the
    /// poller is not running yet, so a later start sees the current state.
    pub fn set_visibility(&self, visible: bool) {
        self.visibility_tx.send_replace(visible);
    }

    pub async fn mark_as_read(&self, id: &str) -> Result<()> {
        self.store.mark_as_read(id).await
    }

    pub async fn mark_all_as_read(&self) -> Result<()> {
        self.store.mark_all_as_read().await
    }

    /// Manual refresh: the same full-replace fetch the poller triggers.
    pub async fn force_reconcile(&self) -> Result<()> {
        self.store.reconcile().await
    }

    pub fn open_dropdown(&self) {
        self.store.open_dropdown();
    }

    pub fn close_dropdown(&self) {
        self.store.close_dropdown();
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.store.snapshot()
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.store.connection_status()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UiEvent> {
        self.store.subscribe()
    }

    fn runtime(&self) -> MutexGuard<'_, Runtime> {
        self.runtime.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ClientSettings {
        ClientSettings::new("https://desk.example.com", "token").unwrap()
    }

    #[tokio::test]
    async fn stop_before_start_is_a_no_op() {
        let client = NotificationClient::new(settings()).unwrap();
        client.stop();
        client.stop();
        assert_eq!(
            client.connection_status(),
            ConnectionStatus::Disconnected
        );
    }

    #[tokio::test]
    async fn reset_clears_the_aggregate() {
        let client = NotificationClient::new(settings()).unwrap();
        client.open_dropdown();
        client.reset();
        let snapshot = client.snapshot();
        assert_eq!(snapshot.unread_count, 0);
        assert!(snapshot.unread_list.is_empty());
    }
}
