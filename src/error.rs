use thiserror::Error;

pub type Result<T> = std::result::Result<T, NotifyError>;

/// Everything here is recoverable: the worst observable symptom of total
/// failure is a stale badge, never a crash in the caller.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Network or HTTP failure. State is left unchanged by the operation
    /// that raised it.
    #[error("transport failure: {0}")]
    Transport(String),

    /// A response arrived but did not match the expected shape. Recovery is
    /// the same as for a transport failure.
    #[error("unexpected response shape: {0}")]
    Protocol(String),

    /// Stream dial failure, drop, or read error. Surfaces to the shell only
    /// as a connection-status change.
    #[error("stream failure: {0}")]
    Socket(String),
}

impl From<reqwest::Error> for NotifyError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            Self::Protocol(error.to_string())
        } else {
            Self::Transport(error.to_string())
        }
    }
}
