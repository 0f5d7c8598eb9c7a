//! Remote synchronization settings.

use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_RECONNECT_ATTEMPTS: u32 = 5;
const DEFAULT_RECONNECT_BACKOFF_MS: u64 = 200;

/// Tuning for a [`RemoteSync`](crate::RemoteSync) binding.
///
/// Every field has a default, so `{}` is a valid config document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncConfig {
    /// How long an outgoing patch request may stay unanswered before the
    /// binding reconciles.
    pub request_timeout_ms: u64,
    /// Coalescing window for local edits; `0` sends every change at once.
    pub outgoing_debounce_ms: u64,
    /// Consecutive failed connection attempts tolerated before giving up.
    pub max_reconnect_attempts: u32,
    /// Delay between connection attempts, multiplied by the attempt number.
    pub reconnect_backoff_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            outgoing_debounce_ms: 0,
            max_reconnect_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            reconnect_backoff_ms: DEFAULT_RECONNECT_BACKOFF_MS,
        }
    }
}

impl SyncConfig {
    /// Parse a JSON config document.
    pub fn from_json_str(raw: &str) -> SyncResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Load a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| SyncError::ConfigIo {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = duration_ms(timeout);
        self
    }

    #[must_use]
    pub fn with_outgoing_debounce(mut self, window: Duration) -> Self {
        self.outgoing_debounce_ms = duration_ms(window);
        self
    }

    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_reconnect_backoff(mut self, backoff: Duration) -> Self {
        self.reconnect_backoff_ms = duration_ms(backoff);
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn outgoing_debounce(&self) -> Duration {
        Duration::from_millis(self.outgoing_debounce_ms)
    }

    /// Backoff before reconnect attempt number `attempt` (1-based).
    pub fn reconnect_backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms.saturating_mul(u64::from(attempt)))
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_document_uses_defaults() {
        let config = SyncConfig::from_json_str("{}").unwrap();
        assert_eq!(config, SyncConfig::default());
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.outgoing_debounce(), Duration::ZERO);
    }

    #[test]
    fn camel_case_fields_override_defaults() {
        let config =
            SyncConfig::from_json_str(r#"{"requestTimeoutMs": 250, "maxReconnectAttempts": 1}"#)
                .unwrap();
        assert_eq!(config.request_timeout_ms, 250);
        assert_eq!(config.max_reconnect_attempts, 1);
        assert_eq!(config.reconnect_backoff_ms, DEFAULT_RECONNECT_BACKOFF_MS);
    }

    #[test]
    fn backoff_grows_linearly() {
        let config = SyncConfig::default().with_reconnect_backoff(Duration::from_millis(100));
        assert_eq!(config.reconnect_backoff(1), Duration::from_millis(100));
        assert_eq!(config.reconnect_backoff(3), Duration::from_millis(300));
    }

    #[test]
    fn from_file_reads_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"outgoingDebounceMs": 40}}"#).unwrap();

        let config = SyncConfig::from_file(file.path()).unwrap();
        assert_eq!(config.outgoing_debounce(), Duration::from_millis(40));
    }

    #[test]
    fn missing_file_is_config_io_error() {
        let err = SyncConfig::from_file("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, SyncError::ConfigIo { .. }));
    }

    #[test]
    fn malformed_json_is_parse_error() {
        let err = SyncConfig::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, SyncError::ConfigParse(_)));
    }
}
