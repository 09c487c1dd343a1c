// Error taxonomy shared by adapters, normalizer and card bindings
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum DashboardError {
    /// Store unreachable, file unreadable or unparseable, fetch timed out
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    /// Result shape does not match what the card expects
    #[error("source malformed: {0}")]
    SourceMalformed(String),

    /// Structurally invalid card, source or rule set; fatal at startup
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl DashboardError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::SourceUnavailable(message.into())
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::SourceMalformed(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Stable reason code surfaced on failed cards
    pub fn code(&self) -> &'static str {
        match self {
            Self::SourceUnavailable(_) => "SourceUnavailable",
            Self::SourceMalformed(_) => "SourceMalformed",
            Self::Configuration(_) => "ConfigurationError",
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            Self::SourceUnavailable(m) | Self::SourceMalformed(m) | Self::Configuration(m) => m,
        }
    }
}

pub type DashboardResult<T> = Result<T, DashboardError>;
