//! Session lifecycle: library attach/detach, runtime-state transitions and
//! the process lifecycle observers that drive them.

use tracing::{debug, warn};

use crate::error::{Result, TargetError};
use crate::library::{ClientProcessId, RuntimeState, Status};
use crate::ptid::Pid;
use crate::session::{Attachment, RuntimeStateMachine};

use super::{GpuTarget, NOTIFIER_HANDLER_NAME};

impl GpuTarget {
    /// Attach the library to `pid`.
    ///
    /// Attach failures are never errors: they warn and leave the session
    /// detached. Errors are reserved for broken invariants after a
    /// successful attach.
    pub fn attach(&mut self, pid: Pid) -> Result<()> {
        debug!(pid, "attach start");

        if !self.beneath.can_async() {
            warn!(
                pid,
                "the GPU target requires the target beneath to be asynchronous, GPU debugging is disabled"
            );
            return Ok(());
        }

        let session = self.sessions.get_or_insert(pid, self.config.precise_memory);
        if session.vfork_child {
            debug!(pid, "vfork child, not attaching until it execs");
            return Ok(());
        }
        if let Some(attachment) = session.attachment {
            debug!(pid, process = %attachment.process, "already attached");
            return Ok(());
        }

        let (lib, mut callbacks) = self.split();
        let process = match lib.process_attach(ClientProcessId(pid), &mut callbacks) {
            Ok(process) => process,
            Err(Status::Restriction) => {
                warn!(pid, "unable to enable GPU debugging due to a restriction error");
                return Ok(());
            }
            Err(status) => {
                warn!(
                    pid,
                    %status,
                    "could not attach to process, GPU debugging will not be available"
                );
                return Ok(());
            }
        };

        let notifier = match self.lib.process_notifier(process) {
            Ok(fd) => fd,
            Err(status) => {
                let (lib, mut callbacks) = self.split();
                if let Err(detach_status) = lib.process_detach(process, &mut callbacks) {
                    debug!(pid, status = %detach_status, "rollback detach failed");
                }
                if let Some(session) = self.sessions.get_mut(pid) {
                    session.reset();
                }
                warn!(
                    pid,
                    %status,
                    "could not retrieve process notifier, GPU debugging will not be available"
                );
                return Ok(());
            }
        };

        if let Some(session) = self.sessions.get_mut(pid) {
            session.attachment = Some(Attachment { process, notifier });
        }
        debug!(pid, %process, notifier, "attached");

        self.apply_memory_precision(pid)?;

        // A runtime that is already loaded has its event buffered by now.
        self.handle_notifier(pid)?;

        self.core.add_file_handler(notifier, pid, NOTIFIER_HANDLER_NAME);
        debug!(pid, "attach end");
        Ok(())
    }

    /// Undo [`Self::attach`]. No-op when `pid` is not attached.
    pub fn detach_session(&mut self, pid: Pid) -> Result<()> {
        let Some(session) = self.sessions.get_mut(pid) else {
            return Ok(());
        };
        let Some(attachment) = session.attachment else {
            return Ok(());
        };
        debug!(pid, "detach start");

        session.runtime_state = RuntimeState::Unloaded;

        let (lib, mut callbacks) = self.split();
        if let Err(status) = lib.process_detach(attachment.process, &mut callbacks) {
            warn!(pid, %status, "could not detach from process");
        }

        self.core.delete_file_handler(attachment.notifier);
        self.core.unpush_target(pid);

        if let Some(session) = self.sessions.get_mut(pid) {
            for breakpoint in session.breakpoints.take_all() {
                self.core.delete_breakpoint(breakpoint);
            }
            session.reset();
        }
        debug!(pid, "detach end");

        self.maybe_reset_library()
    }

    /// Move `pid`'s runtime to `to`, publishing or un-publishing the
    /// adapter as needed.
    pub(crate) fn apply_runtime_state(&mut self, pid: Pid, to: RuntimeState) -> Result<()> {
        let session = self
            .sessions
            .get_mut(pid)
            .ok_or_else(|| TargetError::Invariant(format!("runtime event for unknown pid {pid}")))?;

        let from = session.runtime_state;
        if !RuntimeStateMachine::is_valid_transition(from, to) {
            return Err(TargetError::InvalidTransition { pid, from, to });
        }
        session.runtime_state = to;
        debug!(pid, %from, %to, "runtime state changed");

        match to {
            RuntimeState::LoadedSuccess => {
                session.published = true;
                self.core.push_target(pid);
                debug!(pid, "published GPU target");

                // Already async when the process was running; not when the
                // debugger attached to it.
                if self.beneath.is_async() {
                    self.set_async(true);
                }
            }
            RuntimeState::Unloaded => {
                if session.published {
                    session.published = false;
                    self.core.unpush_target(pid);
                    debug!(pid, "un-published GPU target");
                }
            }
            RuntimeState::LoadedErrorRestriction => {
                if !session.restriction_warned {
                    session.restriction_warned = true;
                    warn!(pid, "unable to enable GPU debugging due to a restriction error");
                }
            }
        }
        Ok(())
    }

    /// Detach the library from `pid`, then detach beneath.
    pub fn detach(&mut self, pid: Pid) -> Result<()> {
        // Waves resume once the library lets go; nothing may stay inserted.
        self.core.remove_breakpoints_inf(pid);
        self.detach_session(pid)?;
        self.beneath.detach(pid)?;
        Ok(())
    }

    pub fn mourn(&mut self, pid: Pid) -> Result<()> {
        self.detach_session(pid)?;
        self.beneath.mourn(pid)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Observers
    // -----------------------------------------------------------------------

    /// A new inferior process exists. Only processes controlled by the
    /// native beneath-target are handled.
    pub fn inferior_created(&mut self, pid: Pid, on_native_target: bool) -> Result<()> {
        if !on_native_target {
            debug!(pid, "not a native process, ignoring");
            return Ok(());
        }
        self.attach(pid)
    }

    /// `exec_pid` exec'd; `follow_pid` is the process that continues (the
    /// same pid unless the core follows into a new inferior).
    pub fn inferior_execd(&mut self, exec_pid: Pid, follow_pid: Pid) -> Result<()> {
        self.detach_session(exec_pid)?;

        let requested = self.precise_memory(exec_pid).requested;
        if let Some(session) = self.sessions.get_mut(exec_pid) {
            session.vfork_child = false;
        }
        let follow = self.sessions.get_or_insert(follow_pid, requested);
        follow.precise_memory.requested = requested;
        follow.vfork_child = false;

        self.attach(follow_pid)
    }

    /// `parent` forked `child`. A vfork child is not attached until it
    /// execs.
    pub fn inferior_forked(&mut self, parent: Pid, child: Pid, is_vfork: bool) -> Result<()> {
        let requested = self.precise_memory(parent).requested;
        let session = self.sessions.get_or_insert(child, requested);
        session.precise_memory.requested = requested;
        session.vfork_child = is_vfork;

        if is_vfork {
            debug!(parent, child, "vfork child, deferring attach");
            return Ok(());
        }
        self.attach(child)
    }

    /// `new` was cloned from `original` before it started running.
    pub fn inferior_cloned(&mut self, original: Pid, new: Pid) {
        let requested = self.precise_memory(original).requested;
        let session = self.sessions.get_or_insert(new, requested);
        debug_assert!(!session.is_attached(), "cloned inferior {new} is already attached");
        session.precise_memory.requested = requested;
    }

    /// `pid` exited. The session stays so a later inferior with the same
    /// pid keeps its precise memory request, but a vfork child that never
    /// exec'd is no longer one.
    pub fn inferior_exited(&mut self, pid: Pid) -> Result<()> {
        self.detach_session(pid)?;
        if let Some(session) = self.sessions.get_mut(pid) {
            session.vfork_child = false;
        }
        Ok(())
    }

    /// The core forgot the inferior behind `pid`; drop its session.
    pub fn inferior_removed(&mut self, pid: Pid) -> Result<()> {
        self.detach_session(pid)?;
        if self.sessions.remove(pid).is_some() {
            debug!(pid, "session removed");
        }
        Ok(())
    }

    /// The core is about to detach from `pid`. When the adapter is
    /// published, [`Self::detach`] does the work instead.
    pub fn inferior_pre_detach(&mut self, pid: Pid) -> Result<()> {
        let published = self.sessions.get(pid).is_some_and(|s| s.published);
        if published {
            return Ok(());
        }
        self.detach_session(pid)
    }
}
