//! The `DebuggerCore` trait: services consumed from the generic debugger.

use anyhow::Result;

use crate::library::{NotifierFd, RegisterId, RegisterProperties};
use crate::ptid::{Pid, Ptid};

/// A breakpoint object owned by the debugger core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CoreBreakpoint(pub u64);

/// An event-loop async event: a flag the core polls to re-invoke `wait`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AsyncEvent(pub u64);

/// Architecture description of one wave register.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterDesc {
    pub name: String,
    /// The library's id for this register.
    pub id: RegisterId,
    /// Size in bytes.
    pub size: usize,
    pub properties: RegisterProperties,
}

/// Generic debugger core as seen by the adapter.
///
/// All calls happen on the event-loop thread. None of them may call back
/// into the adapter.
pub trait DebuggerCore {
    // -- threads -----------------------------------------------------------

    /// Create a pseudo-thread without announcing it to the user.
    fn add_thread_silent(&mut self, ptid: Ptid);

    /// Delete a pseudo-thread without announcing it to the user.
    fn delete_thread_silent(&mut self, ptid: Ptid);

    fn set_running(&mut self, ptid: Ptid, running: bool);

    fn set_executing(&mut self, ptid: Ptid, executing: bool);

    /// The currently selected thread (or process filter when no thread is
    /// selected).
    fn selected_thread(&self) -> Ptid;

    // -- registers ---------------------------------------------------------

    fn read_pc(&mut self, ptid: Ptid) -> Result<u64>;

    fn write_pc(&mut self, ptid: Ptid, pc: u64) -> Result<()>;

    /// Bytes the PC has advanced past a software breakpoint instruction
    /// when the trap is reported.
    fn decr_pc_after_break(&self, ptid: Ptid) -> u64;

    /// Number of raw registers of `ptid`'s architecture.
    fn register_count(&self, ptid: Ptid) -> usize;

    fn register_desc(&self, ptid: Ptid, regno: usize) -> Option<RegisterDesc>;

    /// Store a freshly read register value in the register cache.
    fn supply_register(&mut self, ptid: Ptid, regno: usize, value: &[u8]);

    /// The register cache's current value of a register.
    fn collect_register(&self, ptid: Ptid, regno: usize) -> Vec<u8>;

    fn invalidate_register(&mut self, ptid: Ptid, regno: usize);

    // -- breakpoints -------------------------------------------------------

    /// Whether `address` lies in a loaded module of `pid`.
    fn resolve_code_address(&self, pid: Pid, address: u64) -> bool;

    /// Install a silent internal breakpoint that never stops the program.
    fn install_breakpoint(&mut self, pid: Pid, address: u64) -> Result<CoreBreakpoint>;

    fn delete_breakpoint(&mut self, breakpoint: CoreBreakpoint);

    /// Remove every inserted breakpoint location of `pid` from memory.
    fn remove_breakpoints_inf(&mut self, pid: Pid);

    /// Re-read the shared library list of `pid`.
    fn handle_solib_event(&mut self, pid: Pid) -> Result<()>;

    // -- target stack ------------------------------------------------------

    /// Route `pid`'s target calls through the adapter.
    fn push_target(&mut self, pid: Pid);

    /// Stop routing `pid`'s target calls through the adapter. No-op when
    /// not pushed.
    fn unpush_target(&mut self, pid: Pid);

    // -- event loop --------------------------------------------------------

    fn create_async_event(&mut self, name: &str) -> AsyncEvent;

    fn mark_async_event(&mut self, event: AsyncEvent);

    fn clear_async_event(&mut self, event: AsyncEvent);

    fn async_event_marked(&self, event: AsyncEvent) -> bool;

    fn delete_async_event(&mut self, event: AsyncEvent);

    /// Watch `fd` for readability and call the adapter's notifier handler
    /// for `pid` when it fires. Re-registering an fd replaces the handler.
    fn add_file_handler(&mut self, fd: NotifierFd, pid: Pid, name: &str);

    fn delete_file_handler(&mut self, fd: NotifierFd);
}

const _: () = {
    fn _assert_object_safe(_: &dyn DebuggerCore) {}
};
