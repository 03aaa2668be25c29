pub(crate) const POLL_INTERVAL_SECS: u64 = 12;

pub(crate) const STREAM_CONNECT_TIMEOUT_SECS: u64 = 10;
pub(crate) const RECONNECT_DELAY_SECS: u64 = 3;
pub(crate) const MAX_RECONNECT_ATTEMPTS: u32 = 5;

pub(crate) const REQUEST_TIMEOUT_SECS: u64 = 15;

pub(crate) const TOAST_TEXT_MAX_CHARS: usize = 120;
pub(crate) const ERROR_BODY_MAX_CHARS: usize = 200;
pub(crate) const FRAME_LOG_MAX_CHARS: usize = 140;

pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 64;
