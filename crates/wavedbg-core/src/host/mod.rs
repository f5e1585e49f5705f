//! Interfaces of the two collaborators that sit around the adapter.
//!
//! ```text
//!                debugger core (DebuggerCore)
//!      threads, regcache, breakpoints, event loop, target stack
//!                           ^
//!                           |  calls / notifications
//!                           v
//!                     GpuTarget (this crate)
//!                           |
//!          non-wave work    |    wave work
//!              v            |        v
//!   BeneathTarget (OS process control)   DebugLibrary (vendor API)
//! ```
//!
//! The core owns thread objects, register caches and breakpoint objects;
//! the adapter only asks it to create, flag or delete them. The
//! beneath-target handles every non-wave thread.

pub mod beneath;
pub mod debugger;

pub use beneath::{BeneathTarget, WaitOutcome};
pub use debugger::{AsyncEvent, CoreBreakpoint, DebuggerCore, RegisterDesc};
