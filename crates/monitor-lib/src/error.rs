//! Error types for the monitoring engine

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors surfaced by the engine and its collaborators
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    #[error("probe timed out: {0}")]
    ProbeTimeout(String),

    #[error("DNS resolution failed: {0}")]
    DnsFailure(String),

    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    #[error("connection reset: {0}")]
    ConnectionReset(String),

    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("probe failed: {0}")]
    UnknownProbeError(String),

    #[error("notification failed: {0}")]
    NotifierFailure(String),

    #[error("status sink failed: {0}")]
    StatusSinkFailure(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No history data to export")]
    NoHistory,
}

impl EngineError {
    /// Map a raw probe failure message to its typed error
    pub fn from_probe_message(message: impl Into<String>) -> Self {
        let message = message.into();
        match ProbeErrorKind::classify(&message) {
            ProbeErrorKind::Timeout => EngineError::ProbeTimeout(message),
            ProbeErrorKind::Dns => EngineError::DnsFailure(message),
            ProbeErrorKind::Refused => EngineError::ConnectionRefused(message),
            ProbeErrorKind::Reset => EngineError::ConnectionReset(message),
            ProbeErrorKind::Network => EngineError::NetworkUnreachable(message),
            ProbeErrorKind::Unknown => EngineError::UnknownProbeError(message),
        }
    }
}

/// Category of a failed probe, derived from the executor's message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeErrorKind {
    Timeout,
    Dns,
    Refused,
    Reset,
    Network,
    Unknown,
}

impl ProbeErrorKind {
    /// Classify an error message by case-insensitive substring
    pub fn classify(message: &str) -> Self {
        let msg = message.to_lowercase();
        if msg.contains("timeout") || msg.contains("timed out") {
            ProbeErrorKind::Timeout
        } else if msg.contains("dns") || msg.contains("resolve") || msg.contains("getaddrinfo") {
            ProbeErrorKind::Dns
        } else if msg.contains("connection refused") || msg.contains("econnrefused") {
            ProbeErrorKind::Refused
        } else if msg.contains("connection reset") || msg.contains("econnreset") {
            ProbeErrorKind::Reset
        } else if msg.contains("network") || msg.contains("socket") || msg.contains("enetunreach")
        {
            ProbeErrorKind::Network
        } else {
            ProbeErrorKind::Unknown
        }
    }

    /// Human readable description
    pub fn user_message(&self) -> &'static str {
        match self {
            ProbeErrorKind::Timeout => "Connection timed out",
            ProbeErrorKind::Dns => "DNS lookup failed",
            ProbeErrorKind::Refused => "Connection refused",
            ProbeErrorKind::Reset => "Connection reset",
            ProbeErrorKind::Network => "Network error",
            ProbeErrorKind::Unknown => "Connection failed",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeErrorKind::Timeout => "timeout",
            ProbeErrorKind::Dns => "dns",
            ProbeErrorKind::Refused => "refused",
            ProbeErrorKind::Reset => "reset",
            ProbeErrorKind::Network => "network",
            ProbeErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ProbeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_messages() {
        assert_eq!(
            ProbeErrorKind::classify("Connection Timed Out after 5000ms"),
            ProbeErrorKind::Timeout
        );
        assert_eq!(
            ProbeErrorKind::classify("getaddrinfo ENOTFOUND example.invalid"),
            ProbeErrorKind::Dns
        );
        assert_eq!(
            ProbeErrorKind::classify("connect ECONNREFUSED 10.0.0.1:443"),
            ProbeErrorKind::Refused
        );
        assert_eq!(
            ProbeErrorKind::classify("read ECONNRESET"),
            ProbeErrorKind::Reset
        );
        assert_eq!(
            ProbeErrorKind::classify("connect ENETUNREACH"),
            ProbeErrorKind::Network
        );
        assert_eq!(ProbeErrorKind::classify("boom"), ProbeErrorKind::Unknown);
    }

    #[test]
    fn test_timeout_wins_over_network() {
        assert_eq!(
            ProbeErrorKind::classify("network timeout"),
            ProbeErrorKind::Timeout
        );
    }

    #[test]
    fn test_user_messages() {
        assert_eq!(ProbeErrorKind::Dns.user_message(), "DNS lookup failed");
        assert_eq!(ProbeErrorKind::Unknown.user_message(), "Connection failed");
    }

    #[test]
    fn test_from_probe_message() {
        assert!(matches!(
            EngineError::from_probe_message("connection refused"),
            EngineError::ConnectionRefused(_)
        ));
        assert!(matches!(
            EngineError::from_probe_message("weird"),
            EngineError::UnknownProbeError(_)
        ));
    }
}
