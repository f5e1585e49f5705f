//! The `BeneathTarget` trait -- the OS process-control target below the
//! adapter.
//!
//! Every request for a non-wave thread is delegated here unchanged.

use anyhow::Result;

use crate::ptid::{Pid, Ptid};
use crate::signal::{Signal, WaitStatus};

/// Result of a `wait` call.
///
/// `ptid` is `None` when nothing was reported; `status` is then
/// [`WaitStatus::NoResumed`] or [`WaitStatus::Ignore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOutcome {
    pub ptid: Option<Ptid>,
    pub status: WaitStatus,
}

impl WaitOutcome {
    pub fn event(ptid: Ptid, status: WaitStatus) -> Self {
        Self {
            ptid: Some(ptid),
            status,
        }
    }

    pub fn nothing(status: WaitStatus) -> Self {
        Self { ptid: None, status }
    }

    pub fn is_event(&self) -> bool {
        self.ptid.is_some()
    }
}

/// The process-stratum target beneath the adapter.
pub trait BeneathTarget {
    fn wait(&mut self, scope: Ptid) -> Result<WaitOutcome>;

    fn resume(&mut self, scope: Ptid, step: bool, signal: Signal) -> Result<()>;

    fn stop(&mut self, scope: Ptid) -> Result<()>;

    fn commit_resumed(&mut self) -> Result<()>;

    fn update_thread_list(&mut self) -> Result<()>;

    fn has_pending_events(&self) -> bool;

    /// Whether this target can run in async mode at all.
    fn can_async(&self) -> bool;

    /// Whether async mode is currently enabled.
    fn is_async(&self) -> bool;

    fn set_async(&mut self, enable: bool);

    /// Whether thread creation/exit events should be reported.
    fn thread_events(&mut self, enable: bool);

    fn thread_alive(&self, ptid: Ptid) -> bool;

    fn thread_name(&self, ptid: Ptid) -> Option<String>;

    fn extra_thread_info(&self, ptid: Ptid) -> Option<String>;

    fn pid_to_str(&self, ptid: Ptid) -> String;

    /// Architecture name of a host thread.
    fn thread_architecture(&mut self, ptid: Ptid) -> Result<String>;

    /// Fetch one register, or all when `regno` is `None`.
    fn fetch_registers(&mut self, ptid: Ptid, regno: Option<usize>) -> Result<()>;

    fn store_registers(&mut self, ptid: Ptid, regno: Option<usize>) -> Result<()>;

    fn read_memory(&mut self, ptid: Ptid, address: u64, buf: &mut [u8]) -> Result<usize>;

    fn write_memory(&mut self, ptid: Ptid, address: u64, data: &[u8]) -> Result<usize>;

    fn stopped_by_sw_breakpoint(&self, ptid: Ptid) -> bool;

    fn stopped_by_hw_breakpoint(&self, ptid: Ptid) -> bool;

    fn stopped_by_watchpoint(&self, ptid: Ptid) -> bool;

    fn detach(&mut self, pid: Pid) -> Result<()>;

    fn mourn(&mut self, pid: Pid) -> Result<()>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn BeneathTarget) {}
};
