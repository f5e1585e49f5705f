//! Adapter error type.
//!
//! Recoverable conditions (attach failures, unsupported precise memory,
//! "invalid wave id" on a wave that already went away) never reach this
//! type: they are logged and absorbed where they happen. What remains is
//! either a user-facing error that leaves all state intact, or a fatal
//! invariant violation that aborts the triggering command.

use crate::library::{BreakpointId, EventId, EventKind, RuntimeState, Status, Version};
use crate::signal::Signal;

/// Errors surfaced by the GPU target adapter.
#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    /// A library call failed with a status that should be impossible here.
    #[error("{call} failed ({status})")]
    Library { call: &'static str, status: Status },

    /// A wave cannot be resumed with this signal.
    #[error("Resuming with signal {0} is not supported by this agent.")]
    UnsupportedSignal(Signal),

    /// A breakpoint-resume event did not belong to the breakpoint just hit.
    #[error(
        "breakpoint resume event is not for this breakpoint. Expected {expected}, got {got}"
    )]
    BreakpointResumeMismatch {
        expected: BreakpointId,
        got: BreakpointId,
    },

    /// An event kind that is illegal in the context it was pulled in.
    #[error("unexpected {kind} event ({event}) {context}")]
    UnexpectedEvent {
        event: EventId,
        kind: EventKind,
        context: &'static str,
    },

    /// A runtime-state change from a state it cannot follow.
    #[error("invalid runtime state transition for pid {pid}: {from} -> {to}")]
    InvalidTransition {
        pid: i32,
        from: RuntimeState,
        to: RuntimeState,
    },

    /// Memory of a wave's address space could not be transferred.
    #[error("cannot access memory at address {address:#x} ({status})")]
    MemoryAccess { address: u64, status: Status },

    /// The loaded library is older than, or incompatible with, this adapter.
    #[error("library version mismatch, got {got}, need {need_major}.{need_minor}+")]
    VersionMismatch {
        got: Version,
        need_major: u32,
        need_minor: u32,
    },

    /// Any other broken internal invariant.
    #[error("internal invariant violated: {0}")]
    Invariant(String),

    /// A failure reported by the debugger core or the beneath-target.
    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}

impl TargetError {
    /// Shorthand for a failed library call.
    pub fn library(call: &'static str, status: Status) -> Self {
        Self::Library { call, status }
    }

    /// Whether this error is an invariant violation rather than a
    /// user-correctable condition.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::UnsupportedSignal(_) | Self::MemoryAccess { .. } | Self::Collaborator(_)
        )
    }
}

/// Result alias used throughout the adapter.
pub type Result<T, E = TargetError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn library_errors_name_call_and_status() {
        let err = TargetError::library("wave_stop", Status::Fatal);
        assert_eq!(err.to_string(), "wave_stop failed (AMD_DBGAPI_STATUS_FATAL)");
        assert!(err.is_fatal());
    }

    #[test]
    fn unsupported_signal_is_not_fatal() {
        let err = TargetError::UnsupportedSignal(Signal::Int);
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("SIGINT"));
    }

    #[test]
    fn mismatch_message_names_both_breakpoints() {
        let err = TargetError::BreakpointResumeMismatch {
            expected: BreakpointId(1),
            got: BreakpointId(2),
        };
        let msg = err.to_string();
        assert!(msg.contains("breakpoint_1"));
        assert!(msg.contains("breakpoint_2"));
        assert!(err.is_fatal());
    }
}
