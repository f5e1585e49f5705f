//! Breakpoint hits on library-requested breakpoints.

use tracing::{debug, warn};

use crate::error::{Result, TargetError};
use crate::host::CoreBreakpoint;
use crate::library::{BreakpointAction, EventKind};
use crate::ptid::Ptid;

use super::GpuTarget;

impl GpuTarget {
    /// `thread` stopped at `breakpoint`, one of the breakpoints the library
    /// asked for. The stop is never shown to the user.
    ///
    /// When the library answers `Halt`, it has queued work that must run
    /// before the thread continues; the events up to the matching
    /// breakpoint-resume event are dispatched here.
    pub fn breakpoint_hit(&mut self, breakpoint: CoreBreakpoint, thread: Ptid) -> Result<()> {
        let pid = thread.pid();
        let session = self
            .sessions
            .get(pid)
            .ok_or_else(|| TargetError::Invariant(format!("breakpoint hit in unknown pid {pid}")))?;
        let handle = session.breakpoints.handle_for(breakpoint).ok_or_else(|| {
            TargetError::Invariant(format!(
                "no library breakpoint for core breakpoint {} in pid {pid}",
                breakpoint.0
            ))
        })?;
        let process = session.process();

        let (lib, mut callbacks) = self.split();
        let action = lib
            .report_breakpoint_hit(handle, thread, &mut callbacks)
            .map_err(|status| TargetError::library("report_breakpoint_hit", status))?;
        debug!(%thread, breakpoint = %handle, ?action, "reported breakpoint hit");

        if action == BreakpointAction::Resume {
            return Ok(());
        }

        let resume_event = self
            .drain(process, Some(EventKind::BreakpointResume))?
            .ok_or_else(|| {
                TargetError::Invariant(format!("no breakpoint resume event after halting at {handle}"))
            })?;

        let resumed = self
            .lib
            .event_breakpoint(resume_event)
            .map_err(|status| TargetError::library("event_breakpoint", status))?;
        // Hit/resume pairs of one process never interleave.
        if resumed != handle {
            return Err(TargetError::BreakpointResumeMismatch {
                expected: handle,
                got: resumed,
            });
        }

        if let Err(status) = self.lib.event_processed(resume_event) {
            warn!(event_id = %resume_event, %status, "failed to acknowledge breakpoint resume event");
        }
        Ok(())
    }
}
