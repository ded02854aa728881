//! Core error types for webstatus-core.
//!
//! Raised when a stored or caller-supplied string does not name a known
//! enumeration value.

use thiserror::Error;

/// Errors produced when parsing core enumerations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// The value is not one of `none`, `low`, `high`.
    #[error("unknown baseline status: '{0}'")]
    UnknownBaselineStatus(String),

    /// The value is not one of `supported`, `unsupported`.
    #[error("unknown support status: '{0}'")]
    UnknownSupportStatus(String),

    /// The value is not a known saved search role.
    #[error("unknown saved search role: '{0}'")]
    UnknownSavedSearchRole(String),

    /// The value is not a known saved search scope.
    #[error("unknown saved search scope: '{0}'")]
    UnknownSavedSearchScope(String),

    /// The value is not a known notification channel type.
    #[error("unknown notification channel type: '{0}'")]
    UnknownChannelType(String),

    /// The value is not a known Chromium histogram name.
    #[error("unknown histogram name: '{0}'")]
    UnknownHistogramName(String),
}
