//! Resolution outcome types.
//!
//! Every dispatched candidate produces exactly one `ResolutionOutcome`. Lookup
//! failures are values here, never errors that end the run.

use std::fmt;
use std::time::Duration;

/// Result of resolving a single candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionOutcome {
    /// Resolver found an external identifier
    Matched(String),
    /// Resolver answered but nothing relevant matched
    NotFound,
    /// Lookup failed; counted and added to the miss list
    Error(ResolutionError),
}

impl ResolutionOutcome {
    pub fn is_match(&self) -> bool {
        matches!(self, ResolutionOutcome::Matched(_))
    }

    /// Returns the external identifier for a match
    pub fn matched_id(&self) -> Option<&str> {
        match self {
            ResolutionOutcome::Matched(id) => Some(id),
            _ => None,
        }
    }
}

/// Why a single lookup failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    /// Lookup exceeded its time allowance
    Timeout(Duration),
    /// Connection or protocol failure
    Transport(String),
    /// Service answered with a non-success status
    Http(u16),
    /// Service refused the request because of its rate limit
    Throttled { retry_after: Option<Duration> },
    /// Response body could not be understood
    Malformed(String),
    /// Resolver task panicked
    Panicked(String),
}

impl ResolutionError {
    /// Suggested wait before the next request, if the service asked for one
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ResolutionError::Throttled { retry_after } => *retry_after,
            _ => None,
        }
    }

    pub fn is_throttled(&self) -> bool {
        matches!(self, ResolutionError::Throttled { .. })
    }
}

impl fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionError::Timeout(after) => write!(f, "timed out after {}s", after.as_secs()),
            ResolutionError::Transport(msg) => write!(f, "transport error: {}", msg),
            ResolutionError::Http(status) => write!(f, "HTTP status {}", status),
            ResolutionError::Throttled { retry_after: Some(after) } => {
                write!(f, "rate limited, retry after {}s", after.as_secs())
            }
            ResolutionError::Throttled { retry_after: None } => write!(f, "rate limited"),
            ResolutionError::Malformed(msg) => write!(f, "malformed response: {}", msg),
            ResolutionError::Panicked(msg) => write!(f, "resolver panicked: {}", msg),
        }
    }
}

impl std::error::Error for ResolutionError {}
