//! End-to-end reconciliation flow against a scripted backend: initial load,
//! a live push, a mark-read round-trip, and drift repair after missed
//! pushes.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use servicedesk_notify::{
    NotificationApi, NotificationStore, Notification, NotifyError, Result, Toast, ToastKind,
    UiEvent,
};

fn notification(id: &str, minutes: i64) -> Notification {
    Notification {
        id: id.to_string(),
        title: format!("Ticket update {id}"),
        message: format!("Ticket {id} changed"),
        is_read: false,
        link_url: Some(format!("/tickets/{id}")),
        created_at: Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
            + ChronoDuration::minutes(minutes),
        metadata: serde_json::Value::Null,
    }
}

/// Server-side unread set the client reconciles against.
struct ScriptedBackend {
    unread: Mutex<Vec<Notification>>,
}

impl ScriptedBackend {
    fn new(unread: Vec<Notification>) -> Self {
        Self {
            unread: Mutex::new(unread),
        }
    }

    fn deliver(&self, notification: Notification) {
        self.unread.lock().unwrap().insert(0, notification);
    }
}

#[async_trait]
impl NotificationApi for ScriptedBackend {
    async fn list_notifications(&self) -> Result<Vec<Notification>> {
        self.list_unread().await
    }

    async fn list_unread(&self) -> Result<Vec<Notification>> {
        Ok(self.unread.lock().unwrap().clone())
    }

    async fn unread_count(&self) -> Result<u64> {
        Ok(self.unread.lock().unwrap().len() as u64)
    }

    async fn mark_read(&self, id: &str) -> Result<()> {
        let mut unread = self.unread.lock().unwrap();
        if !unread.iter().any(|entry| entry.id == id) {
            return Err(NotifyError::Transport("HTTP 404: unknown id".to_string()));
        }
        unread.retain(|entry| entry.id != id);
        Ok(())
    }

    async fn mark_all_read(&self) -> Result<()> {
        self.unread.lock().unwrap().clear();
        Ok(())
    }
}

#[tokio::test]
async fn badge_stays_consistent_across_push_mark_read_and_drift_repair() {
    let backend = Arc::new(ScriptedBackend::new(vec![
        notification("2", 10),
        notification("1", 0),
    ]));
    let store = NotificationStore::new(backend.clone());
    let mut events = store.subscribe();

    // Initial fetch: two unread.
    store.initial_load().await.unwrap();
    let snapshot = store.snapshot();
    assert_eq!(snapshot.unread_count, 2);
    assert_eq!(snapshot.unread_count, snapshot.unread_list.len() as u64);

    // A push arrives for id 3; the server created it at the same moment.
    backend.deliver(notification("3", 20));
    store.on_push(notification("3", 20));
    let snapshot = store.snapshot();
    assert_eq!(snapshot.unread_count, 3);
    assert_eq!(snapshot.unread_list[0].id, "3");

    // Dropdown is closed, so the push also toasted.
    let mut saw_push = false;
    let mut saw_toast = false;
    while let Ok(event) = events.try_recv() {
        match event {
            UiEvent::Push(pushed) => saw_push = pushed.id == "3",
            UiEvent::Toast(Toast {
                kind: ToastKind::Info,
                ..
            }) => saw_toast = true,
            _ => {}
        }
    }
    assert!(saw_push);
    assert!(saw_toast);

    // Mark id 2 read; the server confirms, then local state follows.
    store.mark_as_read("2").await.unwrap();
    let snapshot = store.snapshot();
    assert_eq!(snapshot.unread_count, 2);
    let ids: Vec<&str> = snapshot
        .unread_list
        .iter()
        .map(|entry| entry.id.as_str())
        .collect();
    assert_eq!(ids, vec!["3", "1"]);

    // Server and client agree; a poll at this point would see count 2 and
    // leave everything alone.
    assert_eq!(backend.unread_count().await.unwrap(), store.unread_count());

    // Two notifications arrive while the socket is down. The next poll sees
    // the count grow and repairs the drift with a wholesale replace.
    backend.deliver(notification("4", 30));
    backend.deliver(notification("5", 40));
    assert_eq!(backend.unread_count().await.unwrap(), 4);

    store.reconcile().await.unwrap();
    let snapshot = store.snapshot();
    assert_eq!(snapshot.unread_count, 4);
    assert_eq!(snapshot.unread_count, snapshot.unread_list.len() as u64);
    assert_eq!(snapshot.last_known_server_unread_count, 4);
    let mut ids: Vec<&str> = snapshot
        .unread_list
        .iter()
        .map(|entry| entry.id.as_str())
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["1", "3", "4", "5"]);
}

#[tokio::test]
async fn rejected_mark_read_is_not_applied_locally() {
    let backend = Arc::new(ScriptedBackend::new(vec![notification("1", 0)]));
    let store = NotificationStore::new(backend.clone());
    store.initial_load().await.unwrap();

    // The server has never heard of this id; the local list must not change.
    assert!(store.mark_as_read("ghost").await.is_err());
    let snapshot = store.snapshot();
    assert_eq!(snapshot.unread_count, 1);
    assert_eq!(snapshot.unread_list[0].id, "1");
}
