//! Transport configuration types.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for request and response size limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum size of a single response head (status line plus headers) in bytes.
    /// `None` = transport default
    pub max_head_size: Option<usize>,

    /// Maximum number of response headers accepted.
    pub max_headers: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_head_size: Some(64 * 1024), // 64KB
            max_headers: 100,
        }
    }
}

/// Configuration for connection timeouts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Connection establishment timeout.
    pub connect: Duration,

    /// Time allowed between writing the request and receiving the response head.
    /// `None` = no timeout
    pub response_head: Option<Duration>,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(30),
            response_head: Some(Duration::from_secs(60)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_config_default() {
        let config = LimitsConfig::default();
        assert_eq!(config.max_head_size, Some(64 * 1024));
        assert_eq!(config.max_headers, 100);
    }

    #[test]
    fn test_timeout_config_default() {
        let config = TimeoutConfig::default();
        assert_eq!(config.connect, Duration::from_secs(30));
        assert_eq!(config.response_head, Some(Duration::from_secs(60)));
    }
}
