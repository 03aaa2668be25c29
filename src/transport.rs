use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::{
    consts::{ERROR_BODY_MAX_CHARS, REQUEST_TIMEOUT_SECS},
    error::{NotifyError, Result},
    model::{truncate_text, Envelope, Notification, UnreadCountWire},
    settings::ClientSettings,
};

/// Authoritative unread state as served by the backend, regardless of which
/// endpoint path produced it.
#[derive(Debug, Clone)]
pub struct UnreadSnapshot {
    pub items: Vec<Notification>,
    pub server_count: u64,
}

/// Backend surface consumed by the store and the poller. The provided
/// methods carry the capability fallback: older backends lack the dedicated
/// unread endpoints, so any failure there degrades to fetching the full
/// history and filtering client-side. Callers never observe which path
/// served the data.
#[async_trait]
pub trait NotificationApi: Send + Sync {
    async fn list_notifications(&self) -> Result<Vec<Notification>>;
    async fn list_unread(&self) -> Result<Vec<Notification>>;
    async fn unread_count(&self) -> Result<u64>;
    async fn mark_read(&self, id: &str) -> Result<()>;
    async fn mark_all_read(&self) -> Result<()>;

    async fn unread_snapshot(&self) -> Result<UnreadSnapshot> {
        let (unread, count) = tokio::join!(self.list_unread(), self.unread_count());
        match (unread, count) {
            (Ok(items), Ok(server_count)) => Ok(UnreadSnapshot {
                items,
                server_count,
            }),
            (Err(error), _) | (_, Err(error)) => {
                debug!(%error, "dedicated unread endpoints unavailable, using history");
                let history = self.list_notifications().await?;
                Ok(snapshot_from_history(history))
            }
        }
    }

    async fn authoritative_unread_count(&self) -> Result<u64> {
        match self.unread_count().await {
            Ok(count) => Ok(count),
            Err(error) => {
                debug!(%error, "count endpoint unavailable, using history");
                let history = self.list_notifications().await?;
                Ok(history.iter().filter(|n| !n.is_read).count() as u64)
            }
        }
    }
}

fn snapshot_from_history(history: Vec<Notification>) -> UnreadSnapshot {
    let mut items: Vec<Notification> = history.into_iter().filter(|n| !n.is_read).collect();
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    let server_count = items.len() as u64;
    UnreadSnapshot {
        items,
        server_count,
    }
}

/// Bearer-authenticated REST client against the service-desk backend.
pub struct RestTransport {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl RestTransport {
    pub fn new(settings: &ClientSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|error| {
                NotifyError::Transport(format!("failed to build HTTP client: {error}"))
            })?;

        Ok(Self {
            client,
            base_url: settings.base_url.clone(),
            token: settings.token.clone(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .client
            .get(format!("{}{path}", self.base_url))
            .bearer_auth(&self.token)
            .send()
            .await?;
        let response = check_status(response).await?;

        // Decode from text rather than straight json() so a shape mismatch
        // can be logged with the offending payload.
        let body = response.text().await.map_err(NotifyError::from)?;
        let envelope = serde_json::from_str::<Envelope<T>>(&body).map_err(|error| {
            warn!(
                %error,
                payload = %truncate_text(&body, ERROR_BODY_MAX_CHARS),
                "response shape mismatch"
            );
            NotifyError::Protocol(error.to_string())
        })?;
        envelope.into_data()
    }

    async fn post_ok(&self, path: &str) -> Result<()> {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .bearer_auth(&self.token)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unable to read response body>".to_string());
    Err(NotifyError::Transport(format!(
        "HTTP {status}: {}",
        truncate_text(&body, ERROR_BODY_MAX_CHARS)
    )))
}

#[async_trait]
impl NotificationApi for RestTransport {
    async fn list_notifications(&self) -> Result<Vec<Notification>> {
        self.get_json("/notifications").await
    }

    async fn list_unread(&self) -> Result<Vec<Notification>> {
        self.get_json("/notifications/unread").await
    }

    async fn unread_count(&self) -> Result<u64> {
        let wire: UnreadCountWire = self.get_json("/notifications/unread/count").await?;
        Ok(wire.count)
    }

    async fn mark_read(&self, id: &str) -> Result<()> {
        self.post_ok(&format!("/notifications/{id}/read")).await
    }

    async fn mark_all_read(&self) -> Result<()> {
        self.post_ok("/notifications/read-all").await
    }
}
