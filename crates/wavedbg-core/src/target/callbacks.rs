//! Client services handed to the library for re-entrant calls.
//!
//! A [`Callbacks`] value borrows exactly the adapter state the library may
//! touch while one of its calls is in progress: the session table (for the
//! breakpoint bridge) and the debugger core (to install and delete
//! breakpoints). The library itself is borrowed separately by the caller.

use tracing::{debug, error, trace, warn};

use crate::host::DebuggerCore;
use crate::library::{BreakpointId, ClientCallbacks, ClientProcessId, LogLevel, Status};
use crate::ptid::Pid;
use crate::session::SessionTable;

/// Tracing target for messages emitted by the library itself.
pub const LIBRARY_LOG_TARGET: &str = "wavedbg::lib";

pub(crate) struct Callbacks<'a> {
    pub(crate) sessions: &'a mut SessionTable,
    pub(crate) core: &'a mut dyn DebuggerCore,
}

impl ClientCallbacks for Callbacks<'_> {
    fn get_os_pid(&mut self, client: ClientProcessId) -> Result<Pid, Status> {
        match self.sessions.get(client.0) {
            Some(_) if client.0 != 0 => Ok(client.0),
            _ => Err(Status::ProcessExited),
        }
    }

    fn insert_breakpoint(
        &mut self,
        client: ClientProcessId,
        address: u64,
        breakpoint: BreakpointId,
    ) -> Result<(), Status> {
        let pid = client.0;
        let session = self
            .sessions
            .get_mut(pid)
            .ok_or(Status::InvalidArgument)?;
        if session.breakpoints.contains(breakpoint) {
            return Err(Status::InvalidBreakpointId);
        }

        if !self.core.resolve_code_address(pid, address) {
            debug!(pid, address = format_args!("{address:#x}"), "breakpoint address is not in a loaded module");
            return Err(Status::Error);
        }
        let installed = self.core.install_breakpoint(pid, address).map_err(|e| {
            debug!(pid, error = %e, "could not install breakpoint");
            Status::Error
        })?;

        session.breakpoints.insert(breakpoint, installed);
        debug!(pid, %breakpoint, address = format_args!("{address:#x}"), "inserted library breakpoint");
        Ok(())
    }

    fn remove_breakpoint(
        &mut self,
        client: ClientProcessId,
        breakpoint: BreakpointId,
    ) -> Result<(), Status> {
        let pid = client.0;
        let session = self
            .sessions
            .get_mut(pid)
            .ok_or(Status::InvalidArgument)?;
        let installed = session
            .breakpoints
            .remove(breakpoint)
            .ok_or(Status::InvalidBreakpointId)?;

        self.core.delete_breakpoint(installed);
        debug!(pid, %breakpoint, "removed library breakpoint");
        Ok(())
    }

    fn log_message(&mut self, level: LogLevel, message: &str) {
        forward_library_log(level, message);
    }
}

/// Re-emit a library log message as a tracing event.
pub(crate) fn forward_library_log(level: LogLevel, message: &str) {
    match level {
        LogLevel::Off => {}
        LogLevel::FatalError => error!(target: LIBRARY_LOG_TARGET, "{message}"),
        LogLevel::Warning => warn!(target: LIBRARY_LOG_TARGET, "{message}"),
        LogLevel::Info => debug!(target: LIBRARY_LOG_TARGET, "{message}"),
        LogLevel::Trace | LogLevel::Verbose => trace!(target: LIBRARY_LOG_TARGET, "{message}"),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use anyhow::{Result, bail};

    use super::*;
    use crate::host::{AsyncEvent, CoreBreakpoint, RegisterDesc};
    use crate::library::NotifierFd;
    use crate::ptid::Ptid;

    /// Just enough of a core to install and delete breakpoints.
    #[derive(Default)]
    struct BreakpointCore {
        code: Option<std::ops::Range<u64>>,
        installed: HashSet<u64>,
        next: u64,
    }

    impl DebuggerCore for BreakpointCore {
        fn add_thread_silent(&mut self, _ptid: Ptid) {}
        fn delete_thread_silent(&mut self, _ptid: Ptid) {}
        fn set_running(&mut self, _ptid: Ptid, _running: bool) {}
        fn set_executing(&mut self, _ptid: Ptid, _executing: bool) {}
        fn selected_thread(&self) -> Ptid {
            Ptid::ALL
        }
        fn read_pc(&mut self, _ptid: Ptid) -> Result<u64> {
            bail!("no registers")
        }
        fn write_pc(&mut self, _ptid: Ptid, _pc: u64) -> Result<()> {
            bail!("no registers")
        }
        fn decr_pc_after_break(&self, _ptid: Ptid) -> u64 {
            0
        }
        fn register_count(&self, _ptid: Ptid) -> usize {
            0
        }
        fn register_desc(&self, _ptid: Ptid, _regno: usize) -> Option<RegisterDesc> {
            None
        }
        fn supply_register(&mut self, _ptid: Ptid, _regno: usize, _value: &[u8]) {}
        fn collect_register(&self, _ptid: Ptid, _regno: usize) -> Vec<u8> {
            Vec::new()
        }
        fn invalidate_register(&mut self, _ptid: Ptid, _regno: usize) {}
        fn resolve_code_address(&self, _pid: Pid, address: u64) -> bool {
            self.code.as_ref().is_some_and(|range| range.contains(&address))
        }
        fn install_breakpoint(&mut self, _pid: Pid, _address: u64) -> Result<CoreBreakpoint> {
            self.next += 1;
            self.installed.insert(self.next);
            Ok(CoreBreakpoint(self.next))
        }
        fn delete_breakpoint(&mut self, breakpoint: CoreBreakpoint) {
            self.installed.remove(&breakpoint.0);
        }
        fn remove_breakpoints_inf(&mut self, _pid: Pid) {}
        fn handle_solib_event(&mut self, _pid: Pid) -> Result<()> {
            Ok(())
        }
        fn push_target(&mut self, _pid: Pid) {}
        fn unpush_target(&mut self, _pid: Pid) {}
        fn create_async_event(&mut self, _name: &str) -> AsyncEvent {
            AsyncEvent(0)
        }
        fn mark_async_event(&mut self, _event: AsyncEvent) {}
        fn clear_async_event(&mut self, _event: AsyncEvent) {}
        fn async_event_marked(&self, _event: AsyncEvent) -> bool {
            false
        }
        fn delete_async_event(&mut self, _event: AsyncEvent) {}
        fn add_file_handler(&mut self, _fd: NotifierFd, _pid: Pid, _name: &str) {}
        fn delete_file_handler(&mut self, _fd: NotifierFd) {}
    }

    const PID: Pid = 4242;

    fn setup() -> (SessionTable, BreakpointCore) {
        let mut sessions = SessionTable::new();
        sessions.get_or_insert(PID, false);
        let core = BreakpointCore {
            code: Some(0x1000..0x2000),
            ..BreakpointCore::default()
        };
        (sessions, core)
    }

    #[test]
    fn insert_then_remove_leaves_nothing_behind() {
        let (mut sessions, mut core) = setup();
        let mut callbacks = Callbacks {
            sessions: &mut sessions,
            core: &mut core,
        };
        let client = ClientProcessId(PID);

        callbacks
            .insert_breakpoint(client, 0x1800, BreakpointId(7))
            .unwrap();
        callbacks
            .remove_breakpoint(client, BreakpointId(7))
            .unwrap();

        assert!(sessions.get(PID).unwrap().breakpoints().is_empty());
        assert!(core.installed.is_empty());
    }

    #[test]
    fn duplicate_handle_is_rejected() {
        let (mut sessions, mut core) = setup();
        let mut callbacks = Callbacks {
            sessions: &mut sessions,
            core: &mut core,
        };
        let client = ClientProcessId(PID);

        callbacks
            .insert_breakpoint(client, 0x1800, BreakpointId(7))
            .unwrap();
        assert_eq!(
            callbacks.insert_breakpoint(client, 0x1900, BreakpointId(7)),
            Err(Status::InvalidBreakpointId)
        );
        assert_eq!(core.installed.len(), 1);
    }

    #[test]
    fn unresolvable_address_is_an_error() {
        let (mut sessions, mut core) = setup();
        let mut callbacks = Callbacks {
            sessions: &mut sessions,
            core: &mut core,
        };
        assert_eq!(
            callbacks.insert_breakpoint(ClientProcessId(PID), 0x9000, BreakpointId(1)),
            Err(Status::Error)
        );
        assert!(core.installed.is_empty());
    }

    #[test]
    fn unknown_handles_and_processes() {
        let (mut sessions, mut core) = setup();
        let mut callbacks = Callbacks {
            sessions: &mut sessions,
            core: &mut core,
        };
        assert_eq!(
            callbacks.remove_breakpoint(ClientProcessId(PID), BreakpointId(3)),
            Err(Status::InvalidBreakpointId)
        );
        assert_eq!(
            callbacks.insert_breakpoint(ClientProcessId(1), 0x1800, BreakpointId(3)),
            Err(Status::InvalidArgument)
        );
        assert_eq!(
            callbacks.get_os_pid(ClientProcessId(1)),
            Err(Status::ProcessExited)
        );
        assert_eq!(callbacks.get_os_pid(ClientProcessId(PID)), Ok(PID));
    }
}
