use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::ptid::Pid;

// ---------------------------------------------------------------------------
// Opaque handles
// ---------------------------------------------------------------------------

macro_rules! handle_type {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "_{}"), self.0)
            }
        }
    };
}

handle_type!(
    /// A process the library is attached to.
    ProcessId,
    "process"
);
handle_type!(
    /// A hardware execution context ("wave").
    WaveId,
    "wave"
);
handle_type!(
    /// A queued library event.
    EventId,
    "event"
);
handle_type!(
    /// A breakpoint the library asked the client to insert.
    BreakpointId,
    "breakpoint"
);
handle_type!(
    /// A device agent.
    AgentId,
    "agent"
);
handle_type!(
    /// A hardware queue on an agent.
    QueueId,
    "queue"
);
handle_type!(
    /// A kernel dispatch on a queue.
    DispatchId,
    "dispatch"
);
handle_type!(
    /// A device instruction-set architecture.
    ArchitectureId,
    "architecture"
);
handle_type!(
    /// A register of a device architecture.
    RegisterId,
    "register"
);

/// The client-side identity of a process, handed to the library on attach
/// and passed back in every client callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientProcessId(pub Pid);

/// Library version triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Kind of an event pulled from the library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    WaveStop,
    WaveCommandTerminated,
    CodeObjectListUpdated,
    BreakpointResume,
    Runtime,
    QueueError,
    /// A kind this adapter does not know about.
    Unknown(u32),
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::WaveStop => "WAVE_STOP",
            Self::WaveCommandTerminated => "WAVE_COMMAND_TERMINATED",
            Self::CodeObjectListUpdated => "CODE_OBJECT_LIST_UPDATED",
            Self::BreakpointResume => "BREAKPOINT_RESUME",
            Self::Runtime => "RUNTIME",
            Self::QueueError => "QUEUE_ERROR",
            Self::Unknown(raw) => return write!(f, "UNKNOWN({raw})"),
        };
        f.write_str(s)
    }
}

/// State of the in-debuggee runtime, as reported by `Runtime` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeState {
    #[default]
    Unloaded,
    LoadedSuccess,
    LoadedErrorRestriction,
}

impl fmt::Display for RuntimeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unloaded => "unloaded",
            Self::LoadedSuccess => "loaded_success",
            Self::LoadedErrorRestriction => "loaded_error_restriction",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Waves
// ---------------------------------------------------------------------------

/// How a wave is resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResumeMode {
    #[default]
    Normal,
    SingleStep,
}

impl fmt::Display for ResumeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Normal => "normal",
            Self::SingleStep => "step",
        })
    }
}

/// Exception delivered to a wave when it is resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Exception {
    #[default]
    None,
    WaveAbort,
    WaveTrap,
    WaveMathError,
    WaveIllegalInstruction,
    WaveMemoryViolation,
    WaveApertureViolation,
}

/// Execution state of a wave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaveState {
    Run,
    SingleStep,
    Stop,
}

bitflags! {
    /// Why a wave stopped. Several bits may be set at once.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StopReasons: u32 {
        const BREAKPOINT = 1 << 0;
        const WATCHPOINT = 1 << 1;
        const SINGLE_STEP = 1 << 2;
        const FP_INPUT_DENORMAL = 1 << 3;
        const FP_DIVIDE_BY_0 = 1 << 4;
        const FP_OVERFLOW = 1 << 5;
        const FP_UNDERFLOW = 1 << 6;
        const FP_INEXACT = 1 << 7;
        const FP_INVALID_OPERATION = 1 << 8;
        const INT_DIVIDE_BY_0 = 1 << 9;
        const DEBUG_TRAP = 1 << 10;
        const ASSERT_TRAP = 1 << 11;
        const TRAP = 1 << 12;
        const MEMORY_VIOLATION = 1 << 13;
        const APERTURE_VIOLATION = 1 << 14;
        const ILLEGAL_INSTRUCTION = 1 << 15;
        const ECC_ERROR = 1 << 16;
        const FATAL_HALT = 1 << 17;
    }
}

impl StopReasons {
    /// Any floating-point or integer arithmetic exception.
    pub const ARITHMETIC: Self = Self::FP_INPUT_DENORMAL
        .union(Self::FP_DIVIDE_BY_0)
        .union(Self::FP_OVERFLOW)
        .union(Self::FP_UNDERFLOW)
        .union(Self::FP_INEXACT)
        .union(Self::FP_INVALID_OPERATION)
        .union(Self::INT_DIVIDE_BY_0);

    /// Any of the debug-trap style reasons reported as a trace trap.
    pub const TRACE: Self = Self::BREAKPOINT
        .union(Self::WATCHPOINT)
        .union(Self::SINGLE_STEP)
        .union(Self::DEBUG_TRAP)
        .union(Self::TRAP);
}

/// Result of a wave-list query.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WaveList {
    pub waves: Vec<WaveId>,
    /// Whether the list changed since the previous query.
    pub changed: bool,
}

// ---------------------------------------------------------------------------
// Process settings
// ---------------------------------------------------------------------------

/// Forward-progress requirement for a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Progress {
    Normal,
    NoForward,
}

/// Memory access reporting precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryPrecision {
    None,
    Precise,
}

/// What the client must do after reporting a breakpoint hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BreakpointAction {
    Resume,
    Halt,
}

/// Address space for memory transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressSpace {
    Global,
}

bitflags! {
    /// Per-register properties published by the library.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RegisterProperties: u32 {
        /// Some bits of the register ignore writes.
        const READONLY_BITS = 1 << 0;
        /// The value may change without being written (e.g. status flags).
        const VOLATILE = 1 << 1;
        /// Writing this register may change every volatile register.
        const INVALIDATE_VOLATILE = 1 << 2;
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Library log level, ordered from quietest to noisiest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Off,
    #[serde(rename = "error")]
    FatalError,
    #[default]
    Warning,
    Info,
    Trace,
    Verbose,
}

impl LogLevel {
    pub const ALL: [LogLevel; 6] = [
        Self::Off,
        Self::FatalError,
        Self::Warning,
        Self::Info,
        Self::Trace,
        Self::Verbose,
    ];
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Off => "off",
            Self::FatalError => "error",
            Self::Warning => "warning",
            Self::Info => "info",
            Self::Trace => "trace",
            Self::Verbose => "verbose",
        };
        f.write_str(s)
    }
}

impl FromStr for LogLevel {
    type Err = LogLevelParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(Self::Off),
            "error" => Ok(Self::FatalError),
            "warning" => Ok(Self::Warning),
            "info" => Ok(Self::Info),
            "trace" => Ok(Self::Trace),
            "verbose" => Ok(Self::Verbose),
            other => Err(LogLevelParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`LogLevel`] string.
#[derive(Debug, Clone)]
pub struct LogLevelParseError(pub String);

impl fmt::Display for LogLevelParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid log level: {:?} (expected off, error, warning, info, trace, or verbose)",
            self.0
        )
    }
}

impl std::error::Error for LogLevelParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_roundtrips_through_strings() {
        for level in LogLevel::ALL {
            assert_eq!(level.to_string().parse::<LogLevel>().unwrap(), level);
        }
    }

    #[test]
    fn log_level_rejects_unknown() {
        let err = "loud".parse::<LogLevel>().unwrap_err();
        assert!(err.to_string().contains("loud"));
    }

    #[test]
    fn log_levels_are_ordered_by_verbosity() {
        assert!(LogLevel::Off < LogLevel::FatalError);
        assert!(LogLevel::Warning < LogLevel::Trace);
        assert!(LogLevel::Trace < LogLevel::Verbose);
    }

    #[test]
    fn handles_display_with_prefix() {
        assert_eq!(WaveId(7).to_string(), "wave_7");
        assert_eq!(BreakpointId(3).to_string(), "breakpoint_3");
        assert_eq!(EventKind::BreakpointResume.to_string(), "BREAKPOINT_RESUME");
        assert_eq!(EventKind::Unknown(42).to_string(), "UNKNOWN(42)");
    }

    #[test]
    fn arithmetic_mask_covers_fp_and_int_bits() {
        assert!(StopReasons::ARITHMETIC.contains(StopReasons::INT_DIVIDE_BY_0));
        assert!(StopReasons::ARITHMETIC.contains(StopReasons::FP_INEXACT));
        assert!(!StopReasons::ARITHMETIC.intersects(StopReasons::TRACE));
    }
}
