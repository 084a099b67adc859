//! Wait errors

use std::time::Duration;
use thiserror::Error;

/// Errors that can end a wait call
///
/// Every call yields exactly one terminal result; nothing is retried here.
/// Retry policy belongs to the caller.
#[derive(Debug, Error)]
pub enum WaitError {
    /// The requested kind has no registered resource type, or discovery failed
    #[error("Cannot resolve {kind}: {reason}")]
    Resolution {
        /// group/version/kind that was requested
        kind: String,
        /// Why the lookup failed
        reason: String,
    },

    /// The deadline elapsed before the condition was met
    #[error("Timed out after {timeout:?} waiting for {resource}{}", last_event_suffix(.last_event))]
    Timeout {
        /// Plural resource name being watched, or the kind if resolution did not finish
        resource: String,
        /// Timeout the call was given
        timeout: Duration,
        /// Summary of the last event observed before the deadline, if any
        last_event: Option<String>,
    },

    /// The event source reported an error event or the feed ended
    #[error("Transport error: {0}")]
    Transport(String),

    /// Kubernetes API request failed
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// An object could not be mapped to the requested static type
    #[error("Decode error: {0}")]
    Decode(String),

    /// Local file I/O failed (kubeconfig cache)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn last_event_suffix(last_event: &Option<String>) -> String {
    match last_event {
        Some(event) => format!(" (last event: {event})"),
        None => String::new(),
    }
}

impl WaitError {
    /// True if the deadline elapsed; the caller may retry with a fresh call
    pub fn is_timeout(&self) -> bool {
        matches!(self, WaitError::Timeout { .. })
    }

    /// True if the kind could not be mapped to a resource type
    pub fn is_resolution(&self) -> bool {
        matches!(self, WaitError::Resolution { .. })
    }

    /// True for failures reported by the event source itself
    pub fn is_transport(&self) -> bool {
        matches!(self, WaitError::Transport(_) | WaitError::Kube(_))
    }
}
