use std::time::Duration;

use crate::{
    consts::{MAX_RECONNECT_ATTEMPTS, POLL_INTERVAL_SECS, RECONNECT_DELAY_SECS},
    error::{NotifyError, Result},
};

/// Connection settings for one authenticated session. The token is whatever
/// bearer credential the surrounding application holds; it is never
/// persisted here.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub base_url: String,
    pub token: String,
    pub poll_interval: Duration,
    pub reconnect_delay: Duration,
    pub max_reconnect_attempts: u32,
}

impl ClientSettings {
    pub fn new(base_url: &str, token: &str) -> Result<Self> {
        let normalized = normalize_base_url(base_url)?;
        let token = token.trim();
        if token.is_empty() {
            return Err(NotifyError::Transport("token is required".to_string()));
        }

        Ok(Self {
            base_url: normalized,
            token: token.to_string(),
            poll_interval: Duration::from_secs(POLL_INTERVAL_SECS),
            reconnect_delay: Duration::from_secs(RECONNECT_DELAY_SECS),
            max_reconnect_attempts: MAX_RECONNECT_ATTEMPTS,
        })
    }
}

pub(crate) fn normalize_base_url(input: &str) -> Result<String> {
    let trimmed = input.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(NotifyError::Transport("server URL is required".to_string()));
    }

    let url = reqwest::Url::parse(trimmed)
        .map_err(|error| NotifyError::Transport(format!("invalid server URL: {error}")))?;

    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(NotifyError::Transport(
            "server URL must start with http:// or https://".to_string(),
        ));
    }

    Ok(trimmed.to_string())
}

/// Derives the stream URL from the REST base URL: scheme mirrors the base
/// (http becomes ws, https becomes wss), path gains `/ws`, and the bearer
/// token rides as a query parameter.
pub(crate) fn build_stream_ws_url(base_url: &str, token: &str) -> Result<String> {
    let mut ws_url = reqwest::Url::parse(base_url)
        .map_err(|error| NotifyError::Transport(format!("invalid server URL: {error}")))?;

    match ws_url.scheme() {
        "http" => {
            ws_url
                .set_scheme("ws")
                .map_err(|_| NotifyError::Transport("unable to derive ws scheme".to_string()))?;
        }
        "https" => {
            ws_url
                .set_scheme("wss")
                .map_err(|_| NotifyError::Transport("unable to derive wss scheme".to_string()))?;
        }
        _ => {
            return Err(NotifyError::Transport(
                "server URL must start with http:// or https://".to_string(),
            ))
        }
    }

    let mut path = ws_url.path().trim_end_matches('/').to_string();
    path.push_str("/ws");
    ws_url.set_path(&path);
    ws_url.query_pairs_mut().append_pair("token", token);
    Ok(ws_url.to_string())
}

pub(crate) fn redact_ws_url(url: &str) -> String {
    let mut parsed = match reqwest::Url::parse(url) {
        Ok(url) => url,
        Err(_) => return "<invalid-url>".to_string(),
    };
    if parsed.query().is_some() {
        parsed.set_query(Some("token=***"));
    }
    parsed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_trailing_slashes() {
        assert_eq!(
            normalize_base_url("https://desk.example.com/api/").unwrap(),
            "https://desk.example.com/api"
        );
    }

    #[test]
    fn normalize_rejects_non_http_schemes() {
        assert!(normalize_base_url("ftp://desk.example.com").is_err());
        assert!(normalize_base_url("").is_err());
        assert!(normalize_base_url("not a url").is_err());
    }

    #[test]
    fn stream_url_mirrors_page_scheme() {
        let plain = build_stream_ws_url("http://desk.example.com/api", "t0ken").unwrap();
        assert_eq!(plain, "ws://desk.example.com/api/ws?token=t0ken");

        let secure = build_stream_ws_url("https://desk.example.com", "t0ken").unwrap();
        assert_eq!(secure, "wss://desk.example.com/ws?token=t0ken");
    }

    #[test]
    fn redacted_url_hides_the_token() {
        let url = build_stream_ws_url("https://desk.example.com", "secret").unwrap();
        let redacted = redact_ws_url(&url);
        assert!(!redacted.contains("secret"));
        assert!(redacted.contains("token=***"));
    }

    #[test]
    fn settings_require_a_token() {
        assert!(ClientSettings::new("https://desk.example.com", "  ").is_err());
        let settings = ClientSettings::new("https://desk.example.com/", "abc").unwrap();
        assert_eq!(settings.base_url, "https://desk.example.com");
    }
}
