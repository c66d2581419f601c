//! Structured, user-facing description of a pipeline failure.
//!
//! Failures are classified into an [`ErrorKind`] from the raw technical
//! message. Each kind carries a fixed user message, a recoverable flag,
//! a severity, and default remediation suggestions. The technical message is
//! kept separately in [`ErrorInfo::technical_details`] and never shown in the
//! user message.
//!
//! `is_recoverable` and `severity` are advisory; nothing in the core retries.
//!
//! Keyword groups are checked most specific first: api key, quota, rate
//! limit, timeout, network, validation, anything else is a system error.
//! Quota is checked before rate limit so "quota exceeded" reads as
//! `quota_exceeded` rather than a rate limit, and timeout before network so
//! "connection timeout" reads as `timeout_error`. The older keyword handler
//! checked rate limit and network first.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// ErrorKind
// ---------------------------------------------------------------------------

/// Machine-readable failure classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    #[serde(rename = "api_key_error")]
    ApiKey,
    #[serde(rename = "rate_limit_error")]
    RateLimit,
    #[serde(rename = "network_error")]
    Network,
    #[serde(rename = "validation_error")]
    Validation,
    #[serde(rename = "system_error")]
    System,
    #[serde(rename = "quota_exceeded")]
    QuotaExceeded,
    #[serde(rename = "timeout_error")]
    Timeout,
}

const API_KEY_KEYWORDS: &[&str] = &[
    "api key",
    "authentication",
    "unauthorized",
    "invalid_api_key",
    "incorrect api key",
    "sk-proj",
    "openai",
];

const QUOTA_KEYWORDS: &[&str] = &[
    "quota exceeded",
    "billing",
    "usage limit",
    "insufficient credits",
];

const RATE_LIMIT_KEYWORDS: &[&str] = &[
    "rate limit",
    "too many requests",
    "quota",
    "limit exceeded",
    "requests per minute",
    "rpm",
    "tpm",
];

const TIMEOUT_KEYWORDS: &[&str] = &["timed out", "timeout", "deadline exceeded"];

const NETWORK_KEYWORDS: &[&str] = &[
    "network",
    "connection",
    "unreachable",
    "dns",
    "socket",
    "ssl",
    "certificate",
];

const VALIDATION_KEYWORDS: &[&str] = &[
    "validation",
    "invalid",
    "malformed",
    "bad request",
    "missing required",
    "parameter",
];

impl ErrorKind {
    /// Wire name, e.g. `"timeout_error"`.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::ApiKey => "api_key_error",
            ErrorKind::RateLimit => "rate_limit_error",
            ErrorKind::Network => "network_error",
            ErrorKind::Validation => "validation_error",
            ErrorKind::System => "system_error",
            ErrorKind::QuotaExceeded => "quota_exceeded",
            ErrorKind::Timeout => "timeout_error",
        }
    }

    /// Classify a raw technical message by keyword.
    ///
    /// Checks run from most to least specific; anything unmatched is a
    /// [`ErrorKind::System`] error.
    pub fn classify(technical_message: &str) -> Self {
        let msg = technical_message.to_lowercase();
        let has_any = |keywords: &[&str]| keywords.iter().any(|k| msg.contains(k));

        if has_any(API_KEY_KEYWORDS) {
            ErrorKind::ApiKey
        } else if has_any(QUOTA_KEYWORDS) {
            ErrorKind::QuotaExceeded
        } else if has_any(RATE_LIMIT_KEYWORDS) {
            ErrorKind::RateLimit
        } else if has_any(TIMEOUT_KEYWORDS) {
            ErrorKind::Timeout
        } else if has_any(NETWORK_KEYWORDS) {
            ErrorKind::Network
        } else if has_any(VALIDATION_KEYWORDS) {
            ErrorKind::Validation
        } else {
            ErrorKind::System
        }
    }

    pub fn user_message(self) -> &'static str {
        match self {
            ErrorKind::ApiKey => {
                "There's an issue with the API configuration. Please check your API key settings."
            }
            ErrorKind::RateLimit => "API rate limit reached. Please wait a moment and try again.",
            ErrorKind::Network => {
                "Network connection issue. Please check your internet connection and try again."
            }
            ErrorKind::Validation => {
                "Invalid input provided. Please check your request and try again."
            }
            ErrorKind::System => {
                "An unexpected system error occurred. Please try again in a moment."
            }
            ErrorKind::QuotaExceeded => {
                "API quota has been exceeded. Please check your account limits."
            }
            ErrorKind::Timeout => "The request took too long to complete. Please try again.",
        }
    }

    /// Whether retrying the same request may succeed.
    pub fn is_recoverable(self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimit | ErrorKind::Network | ErrorKind::Timeout | ErrorKind::System
        )
    }

    pub fn severity(self) -> Severity {
        match self {
            ErrorKind::ApiKey | ErrorKind::QuotaExceeded | ErrorKind::System => Severity::High,
            ErrorKind::RateLimit | ErrorKind::Network | ErrorKind::Timeout => Severity::Medium,
            ErrorKind::Validation => Severity::Low,
        }
    }

    pub fn default_suggestions(self) -> Vec<String> {
        let suggestions: &[&str] = match self {
            ErrorKind::ApiKey => &[
                "Check your OpenAI API key in the configuration",
                "Verify your API key is valid and active",
                "Ensure your API key has the correct permissions",
                "Contact support if the issue persists",
            ],
            ErrorKind::RateLimit => &[
                "Wait a few minutes and try again",
                "Consider upgrading your API plan for higher limits",
                "Try again during off-peak hours",
            ],
            ErrorKind::Network => &[
                "Check your internet connection",
                "Try again in a few moments",
                "Verify your firewall settings allow the connection",
            ],
            ErrorKind::Validation => &[
                "Check your blog topic is not empty",
                "Ensure your input doesn't contain invalid characters",
                "Try with a different topic or shorter text",
            ],
            ErrorKind::System => &[
                "Try again in a few moments",
                "Check system status",
                "Contact support if the issue persists",
            ],
            ErrorKind::QuotaExceeded => &[
                "Check your API usage limits",
                "Upgrade your API plan for higher quotas",
                "Wait until your quota resets",
            ],
            ErrorKind::Timeout => &[
                "Try again with a simpler topic",
                "Check your internet connection",
                "The system may be experiencing high load",
            ],
        };
        suggestions.iter().map(|s| s.to_string()).collect()
    }

    /// Default suggestions plus hints specific to the technical message.
    pub fn suggestions_for(self, technical_message: &str) -> Vec<String> {
        let msg = technical_message.to_lowercase();
        let mut suggestions = self.default_suggestions();

        match self {
            ErrorKind::ApiKey if msg.contains("openai") => suggestions.insert(
                0,
                "Visit https://platform.openai.com/account/api-keys to check your API key"
                    .to_string(),
            ),
            ErrorKind::RateLimit if msg.contains("requests per minute") => suggestions.insert(
                0,
                "You're making requests too quickly. Wait 60 seconds before retrying.".to_string(),
            ),
            ErrorKind::RateLimit if msg.contains("tokens per minute") => suggestions.insert(
                0,
                "Try using a shorter blog topic to reduce token usage.".to_string(),
            ),
            _ => {}
        }

        suggestions
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

// ---------------------------------------------------------------------------
// ErrorInfo
// ---------------------------------------------------------------------------

/// Fully populated failure description attached to a failed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub error_type: ErrorKind,
    pub user_message: String,
    pub technical_details: String,
    pub is_recoverable: bool,
    pub suggestions: Vec<String>,
    pub severity: Severity,
    pub timestamp: Timestamp,
}

impl ErrorInfo {
    /// Build the info for a known kind, with message-specific suggestions.
    pub fn new(kind: ErrorKind, technical_details: impl Into<String>) -> Self {
        let technical_details = technical_details.into();
        Self {
            error_type: kind,
            user_message: kind.user_message().to_string(),
            suggestions: kind.suggestions_for(&technical_details),
            is_recoverable: kind.is_recoverable(),
            severity: kind.severity(),
            technical_details,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Classify a raw technical message and build the info for it.
    pub fn from_technical(technical_details: impl Into<String>) -> Self {
        let technical_details = technical_details.into();
        let kind = ErrorKind::classify(&technical_details);
        Self::new(kind, technical_details)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
