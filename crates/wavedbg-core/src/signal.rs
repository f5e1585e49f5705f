//! Signals, wait statuses and the fixed signal/exception tables.
//!
//! Wave stops are reported to the core as ordinary signals. The mapping is
//! an ordered precedence over a non-exclusive bitmask: the first matching
//! row wins even when later bits are also set.

use std::fmt;
use std::str::FromStr;

use crate::library::{Exception, StopReasons};

/// A debugger-level signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    /// "Stopped, no signal."
    None,
    Trap,
    Segv,
    Bus,
    Ill,
    Fpe,
    Abrt,
    Int,
    Kill,
    /// Any other signal, by number.
    Other(i32),
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "0",
            Self::Trap => "SIGTRAP",
            Self::Segv => "SIGSEGV",
            Self::Bus => "SIGBUS",
            Self::Ill => "SIGILL",
            Self::Fpe => "SIGFPE",
            Self::Abrt => "SIGABRT",
            Self::Int => "SIGINT",
            Self::Kill => "SIGKILL",
            Self::Other(n) => return write!(f, "signal {n}"),
        };
        f.write_str(s)
    }
}

impl FromStr for Signal {
    type Err = SignalParseError;

    /// Accepts the names [`Signal`] displays as, with or without the `SIG`
    /// prefix, and `0` for no signal.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let name = upper.strip_prefix("SIG").unwrap_or(&upper);
        match name {
            "0" | "NONE" => Ok(Self::None),
            "TRAP" => Ok(Self::Trap),
            "SEGV" => Ok(Self::Segv),
            "BUS" => Ok(Self::Bus),
            "ILL" => Ok(Self::Ill),
            "FPE" => Ok(Self::Fpe),
            "ABRT" => Ok(Self::Abrt),
            "INT" => Ok(Self::Int),
            "KILL" => Ok(Self::Kill),
            _ => Err(SignalParseError(s.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`Signal`] name.
#[derive(Debug, Clone)]
pub struct SignalParseError(pub String);

impl fmt::Display for SignalParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid signal: {:?}", self.0)
    }
}

impl std::error::Error for SignalParseError {}

/// What `wait` reports for a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitStatus {
    Stopped(Signal),
    ThreadExited(i32),
    Exited(i32),
    Signalled(Signal),
    /// No resumed threads remain.
    NoResumed,
    /// Nothing to report now; keep waiting.
    Ignore,
}

impl WaitStatus {
    /// Whether the whole process is gone.
    pub fn is_process_exit(&self) -> bool {
        matches!(self, Self::Exited(_) | Self::Signalled(_))
    }
}

impl fmt::Display for WaitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped(sig) => write!(f, "stopped, signal = {sig}"),
            Self::ThreadExited(code) => write!(f, "thread exited, status = {code}"),
            Self::Exited(code) => write!(f, "exited, status = {code}"),
            Self::Signalled(sig) => write!(f, "signalled, signal = {sig}"),
            Self::NoResumed => f.write_str("no-resumed"),
            Self::Ignore => f.write_str("ignore"),
        }
    }
}

/// Map a wave's stop reasons to the signal reported to the core.
pub fn stop_reasons_to_signal(reasons: StopReasons) -> Signal {
    if reasons.contains(StopReasons::APERTURE_VIOLATION) {
        Signal::Bus
    } else if reasons.contains(StopReasons::MEMORY_VIOLATION) {
        Signal::Segv
    } else if reasons.contains(StopReasons::ILLEGAL_INSTRUCTION) {
        Signal::Ill
    } else if reasons.intersects(StopReasons::ARITHMETIC) {
        Signal::Fpe
    } else if reasons.intersects(StopReasons::TRACE) {
        Signal::Trap
    } else if reasons.contains(StopReasons::ASSERT_TRAP) {
        Signal::Abrt
    } else {
        Signal::None
    }
}

/// Map a resume signal to the exception delivered to the wave.
///
/// Returns `None` for signals a wave cannot be resumed with.
pub fn signal_to_exception(signal: Signal) -> Option<Exception> {
    match signal {
        Signal::Bus => Some(Exception::WaveApertureViolation),
        Signal::Segv => Some(Exception::WaveMemoryViolation),
        Signal::Ill => Some(Exception::WaveIllegalInstruction),
        Signal::Fpe => Some(Exception::WaveMathError),
        Signal::Abrt => Some(Exception::WaveAbort),
        Signal::Trap => Some(Exception::WaveTrap),
        Signal::None => Some(Exception::None),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_prefers_aperture_over_everything() {
        let reasons = StopReasons::APERTURE_VIOLATION
            | StopReasons::MEMORY_VIOLATION
            | StopReasons::BREAKPOINT;
        assert_eq!(stop_reasons_to_signal(reasons), Signal::Bus);
    }

    #[test]
    fn memory_violation_beats_illegal_instruction() {
        let reasons = StopReasons::MEMORY_VIOLATION | StopReasons::ILLEGAL_INSTRUCTION;
        assert_eq!(stop_reasons_to_signal(reasons), Signal::Segv);
        assert_eq!(
            stop_reasons_to_signal(StopReasons::ILLEGAL_INSTRUCTION),
            Signal::Ill
        );
    }

    #[test]
    fn arithmetic_bits_map_to_fpe_before_trace() {
        for bit in [
            StopReasons::FP_INPUT_DENORMAL,
            StopReasons::FP_DIVIDE_BY_0,
            StopReasons::FP_OVERFLOW,
            StopReasons::FP_UNDERFLOW,
            StopReasons::FP_INEXACT,
            StopReasons::FP_INVALID_OPERATION,
            StopReasons::INT_DIVIDE_BY_0,
        ] {
            assert_eq!(
                stop_reasons_to_signal(bit | StopReasons::SINGLE_STEP),
                Signal::Fpe
            );
        }
    }

    #[test]
    fn trace_bits_map_to_trap_before_assert() {
        for bit in [
            StopReasons::BREAKPOINT,
            StopReasons::WATCHPOINT,
            StopReasons::SINGLE_STEP,
            StopReasons::DEBUG_TRAP,
            StopReasons::TRAP,
        ] {
            assert_eq!(
                stop_reasons_to_signal(bit | StopReasons::ASSERT_TRAP),
                Signal::Trap
            );
        }
        assert_eq!(stop_reasons_to_signal(StopReasons::ASSERT_TRAP), Signal::Abrt);
    }

    #[test]
    fn unmapped_reasons_are_neutral() {
        assert_eq!(stop_reasons_to_signal(StopReasons::empty()), Signal::None);
        assert_eq!(stop_reasons_to_signal(StopReasons::ECC_ERROR), Signal::None);
    }

    #[test]
    fn every_supported_signal_maps_to_one_exception() {
        let table = [
            (Signal::Bus, Exception::WaveApertureViolation),
            (Signal::Segv, Exception::WaveMemoryViolation),
            (Signal::Ill, Exception::WaveIllegalInstruction),
            (Signal::Fpe, Exception::WaveMathError),
            (Signal::Abrt, Exception::WaveAbort),
            (Signal::Trap, Exception::WaveTrap),
            (Signal::None, Exception::None),
        ];
        for (signal, exception) in table {
            assert_eq!(signal_to_exception(signal), Some(exception));
        }
    }

    #[test]
    fn signal_names_parse_with_or_without_prefix() {
        assert_eq!("SIGTRAP".parse::<Signal>().unwrap(), Signal::Trap);
        assert_eq!("segv".parse::<Signal>().unwrap(), Signal::Segv);
        assert_eq!("0".parse::<Signal>().unwrap(), Signal::None);
        assert_eq!(Signal::Kill.to_string().parse::<Signal>().unwrap(), Signal::Kill);
        assert!("SIGWINCH".parse::<Signal>().is_err());
    }

    #[test]
    fn unsupported_signals_have_no_exception() {
        assert_eq!(signal_to_exception(Signal::Int), None);
        assert_eq!(signal_to_exception(Signal::Kill), None);
        assert_eq!(signal_to_exception(Signal::Other(10)), None);
    }
}
