//! Upstream failure classification.

use std::fmt::{Display, Formatter};

/// Adapter-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    /// Network failure, timeout, or non-2xx status.
    Unavailable,
    /// Upstream answered with an error status in an otherwise valid payload.
    Rejected,
    /// Payload could not be decoded.
    Malformed,
    /// Well-formed payload without the requested data.
    NotFound,
}

/// Structured upstream error used to decide between retry, failure entry, and fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
}

impl SourceError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Unavailable,
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Rejected,
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Malformed,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::NotFound,
            message: message.into(),
        }
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            SourceErrorKind::Unavailable => "source.unavailable",
            SourceErrorKind::Rejected => "source.rejected",
            SourceErrorKind::Malformed => "source.malformed",
            SourceErrorKind::NotFound => "source.not_found",
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for SourceError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_stable_code() {
        let error = SourceError::rejected("twse rtcode 5000");
        assert_eq!(error.to_string(), "twse rtcode 5000 (source.rejected)");
        assert_eq!(error.kind(), SourceErrorKind::Rejected);
    }
}
