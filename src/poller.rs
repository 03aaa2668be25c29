use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::{model::ToastKind, store::NotificationStore, transport::NotificationApi};

/// The poller only ever reacts to the server count growing; a shrinking
/// count is always this client's own mark-read traffic landing server-side.
pub(crate) fn should_reconcile(server_count: u64, local_count: u64) -> bool {
    server_count > local_count
}

/// Correctness backstop for missed pushes: a cheap count check per interval,
/// a full reconcile only when the count has grown, and no work at all while
/// the tab is hidden.
pub(crate) async fn run_poller(
    api: Arc<dyn NotificationApi>,
    store: Arc<NotificationStore>,
    interval: Duration,
    mut stop_rx: watch::Receiver<bool>,
    mut visibility_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The initial load covers t0; the first real poll is one interval in.
    ticker.tick().await;

    let mut failure_toasted = false;
    let mut visibility_gone = false;
    debug!("poller armed");

    loop {
        tokio::select! {
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
            changed = visibility_rx.changed(), if !visibility_gone => {
                match changed {
                    // A tab back in the foreground catches up immediately
                    // instead of waiting out the interval.
                    Ok(()) if *visibility_rx.borrow() => {
                        poll_once(&api, &store, &visibility_rx, &mut failure_toasted).await;
                    }
                    Ok(()) => {}
                    Err(_) => visibility_gone = true,
                }
            }
            _ = ticker.tick() => {
                poll_once(&api, &store, &visibility_rx, &mut failure_toasted).await;
            }
        }
    }
    debug!("poller stopped");
}

async fn poll_once(
    api: &Arc<dyn NotificationApi>,
    store: &NotificationStore,
    visibility_rx: &watch::Receiver<bool>,
    failure_toasted: &mut bool,
) {
    if !*visibility_rx.borrow() {
        debug!("tab hidden, skipping poll");
        return;
    }

    let server_count = match api.authoritative_unread_count().await {
        Ok(count) => count,
        Err(error) => {
            // Background ticks fail silently.
            debug!(%error, "poll tick failed");
            return;
        }
    };

    let local_count = store.unread_count();
    if should_reconcile(server_count, local_count) {
        debug!(server_count, local_count, "drift detected, reconciling");
        match store.reconcile().await {
            Ok(()) => {
                *failure_toasted = false;
                store.toast(ToastKind::Info, "New notifications arrived".to_string());
            }
            Err(error) => {
                warn!(%error, "poll-triggered reconcile failed");
                if !*failure_toasted {
                    store.toast(
                        ToastKind::Error,
                        "Could not refresh notifications".to_string(),
                    );
                    *failure_toasted = true;
                }
            }
        }
    }
    store.record_server_count(server_count);
}
