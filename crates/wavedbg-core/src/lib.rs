//! GPU wave debugging target layer.
//!
//! `wavedbg-core` lets a native debugger control code running on a GPU by
//! bridging to a vendor debug library. Hardware execution contexts
//! ("waves") are exposed to the debugger core as pseudo-threads; stops,
//! single-steps and breakpoints on them behave like they do on ordinary
//! threads.
//!
//! The entry point is [`GpuTarget`]. It is built from three collaborators
//! behind traits: the vendor library ([`library::DebugLibrary`]), the
//! debugger core ([`host::DebuggerCore`]) and the OS process-control target
//! below it ([`host::BeneathTarget`]).

pub mod breakpoint;
pub mod config;
pub mod error;
pub mod host;
pub mod library;
pub mod ptid;
pub mod session;
pub mod signal;
pub mod target;
pub mod wave;

pub use config::AdapterConfig;
pub use error::{Result, TargetError};
pub use ptid::{Pid, Ptid};
pub use session::{PendingEvent, PreciseMemory, Session, SessionTable};
pub use signal::{Signal, WaitStatus};
pub use target::{GpuTarget, ThreadArchitecture};
pub use wave::{Wave, WaveCoordinates};
