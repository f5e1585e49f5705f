//! Vendor debug-library interface.
//!
//! This module defines the [`DebugLibrary`] trait the adapter drives, the
//! [`ClientCallbacks`] trait the library calls back into, and the value
//! types that cross that boundary ([`Status`], [`EventKind`],
//! [`StopReasons`], opaque handles, ...).
//!
//! # Architecture
//!
//! ```text
//! GpuTarget
//!     |
//!     v
//! DebugLibrary --process_attach(client, callbacks)--> ProcessId
//!     |                 |
//!     |                 +--> ClientCallbacks::insert_breakpoint(...)
//!     |
//!     |   next_pending_event(scope) --> (EventId, EventKind)
//!     |   event_*(event)            --> typed event info
//!     |   event_processed(event)
//!     |   wave_*(wave)              --> typed wave info / resume / stop
//!     |   report_breakpoint_hit(bp) --> BreakpointAction
//! ```
//!
//! Calls that may re-enter the client take the callbacks explicitly, so the
//! library never holds a reference into adapter state between calls.

pub mod status;
pub mod trait_def;
pub mod types;

pub use status::Status;
pub use trait_def::{ClientCallbacks, DebugLibrary, NotifierFd};
pub use types::{
    AddressSpace, AgentId, ArchitectureId, BreakpointAction, BreakpointId, ClientProcessId,
    DispatchId, EventId, EventKind, Exception, LogLevel, LogLevelParseError, MemoryPrecision,
    ProcessId, Progress, QueueId, RegisterId, RegisterProperties, ResumeMode, RuntimeState,
    StopReasons, Version, WaveId, WaveList, WaveState,
};
