//! Event drain, dispatch and `wait`.
//!
//! [`GpuTarget::drain`] is the only place library events are pulled and
//! routed, which is what keeps per-process event order intact: wave stops
//! land in their session's pending queue in the order the library produced
//! them, and `wait` hands them out front to back.

use tracing::{debug, warn};

use crate::error::{Result, TargetError};
use crate::host::WaitOutcome;
use crate::library::{EventId, EventKind, ProcessId, RuntimeState, Status, StopReasons};
use crate::ptid::{Pid, Ptid};
use crate::session::{PendingEvent, Session};
use crate::signal::{WaitStatus, stop_reasons_to_signal};

use super::GpuTarget;

impl GpuTarget {
    /// Pull and dispatch library events for `scope` (one process, or all
    /// when `None`) until none remain.
    ///
    /// An event whose kind equals `until` is returned undispatched and
    /// unacknowledged instead; `until` requires a process scope.
    pub(crate) fn drain(
        &mut self,
        scope: Option<ProcessId>,
        until: Option<EventKind>,
    ) -> Result<Option<EventId>> {
        if until.is_some() && scope.is_none() {
            return Err(TargetError::Invariant(
                "a targeted drain needs a process scope".to_string(),
            ));
        }

        loop {
            let (lib, mut callbacks) = self.split();
            let next = lib
                .next_pending_event(scope, &mut callbacks)
                .map_err(|status| TargetError::library("next_pending_event", status))?;
            let Some((event, kind)) = next else {
                return Ok(None);
            };
            debug!(event_id = %event, %kind, "pulled library event");

            if Some(kind) == until {
                return Ok(Some(event));
            }
            self.dispatch(event, kind)?;
        }
    }

    /// Route one event, then acknowledge it whatever the outcome.
    fn dispatch(&mut self, event: EventId, kind: EventKind) -> Result<()> {
        let result = self.route(event, kind);
        self.acknowledge(event);
        result
    }

    pub(crate) fn acknowledge(&mut self, event: EventId) {
        if let Err(status) = self.lib.event_processed(event) {
            warn!(event_id = %event, %status, "failed to acknowledge library event");
        }
    }

    fn route(&mut self, event: EventId, kind: EventKind) -> Result<()> {
        match kind {
            EventKind::WaveStop | EventKind::WaveCommandTerminated => {
                self.route_wave_event(event, kind)
            }
            EventKind::CodeObjectListUpdated => {
                let pid = self.event_pid(event)?;
                // Only ever generated while reporting a breakpoint hit of
                // the selected process.
                let selected = self.core.selected_thread().pid();
                if pid != selected {
                    return Err(TargetError::Invariant(format!(
                        "code object list update for pid {pid} while pid {selected} is selected"
                    )));
                }
                self.core.handle_solib_event(pid)?;
                Ok(())
            }
            EventKind::Runtime => {
                let pid = self.event_pid(event)?;
                let state = self
                    .lib
                    .event_runtime_state(event)
                    .map_err(|status| TargetError::library("event_runtime_state", status))?;
                self.apply_runtime_state(pid, state)
            }
            EventKind::BreakpointResume => Err(TargetError::UnexpectedEvent {
                event,
                kind,
                context: "outside of a breakpoint hit",
            }),
            EventKind::QueueError | EventKind::Unknown(_) => Err(TargetError::UnexpectedEvent {
                event,
                kind,
                context: "is not supported",
            }),
        }
    }

    /// The pid of the session an event belongs to, as the library reports
    /// it. The session must still be attached through that process handle.
    fn event_pid(&self, event: EventId) -> Result<Pid> {
        let process = self
            .lib
            .event_process(event)
            .map_err(|status| TargetError::library("event_process", status))?;
        let pid = self
            .lib
            .process_os_pid(process)
            .map_err(|status| TargetError::library("process_os_pid", status))?;
        match self.sessions.get(pid) {
            Some(session) if session.process() == Some(process) => Ok(pid),
            _ => Err(TargetError::Invariant(format!(
                "event {event} for {process} (pid {pid}) has no attached session"
            ))),
        }
    }

    fn route_wave_event(&mut self, event: EventId, kind: EventKind) -> Result<()> {
        let pid = self.event_pid(event)?;
        let wave = self
            .lib
            .event_wave(event)
            .map_err(|status| TargetError::library("event_wave", status))?;
        let ptid = Ptid::wave(pid, wave);

        let status = match self.lib.wave_stop_reasons(wave) {
            Err(Status::InvalidWaveId) if kind == EventKind::WaveCommandTerminated => {
                WaitStatus::ThreadExited(0)
            }
            Err(status) => return Err(TargetError::library("wave_stop_reasons", status)),
            Ok(reasons) => {
                let signal = stop_reasons_to_signal(reasons);
                let known = self
                    .sessions
                    .get(pid)
                    .is_some_and(|session| session.waves.contains(wave));
                if !known {
                    self.add_wave(pid, wave)?;
                }

                // Point the PC back at the breakpoint instruction.
                if reasons.contains(StopReasons::BREAKPOINT) {
                    let decrement = self.core.decr_pc_after_break(ptid);
                    if decrement != 0 {
                        let pc = self.core.read_pc(ptid)?;
                        self.core.write_pc(ptid, pc.wrapping_sub(decrement))?;
                    }
                }
                WaitStatus::Stopped(signal)
            }
        };

        debug!(%ptid, %status, "queued wave event");
        if let Some(session) = self.sessions.get_mut(pid) {
            session.enqueue(ptid, status);
        }
        Ok(())
    }

    /// Pop the oldest pending event within `scope`. With no process scope,
    /// the first session (in table order) holding one is used.
    fn consume_one(&mut self, scope: Ptid) -> Option<PendingEvent> {
        match scope.scope_pid() {
            None => self
                .sessions
                .iter_mut()
                .find(|session| !session.pending.is_empty())
                .and_then(|session| session.pending.pop_front()),
            Some(pid) => self
                .sessions
                .get_mut(pid)
                .and_then(|session| session.pending.pop_front()),
        }
    }

    /// Report the next stop or exit within `scope` (all processes or one).
    ///
    /// Host events from beneath take priority. Otherwise a buffered wave
    /// event is returned, draining the library if none is buffered yet.
    /// The async event is re-marked on the way out so the core calls again
    /// until nothing is left.
    pub fn wait(&mut self, scope: Ptid) -> Result<WaitOutcome> {
        debug!(%scope, "wait");

        let beneath = self.beneath.wait(scope)?;
        if let Some(ptid) = beneath.ptid {
            if beneath.status.is_process_exit() {
                if let Some(session) = self.sessions.get_mut(ptid.pid()) {
                    let dropped = session.pending.len();
                    session.pending.clear();
                    if dropped > 0 {
                        debug!(pid = ptid.pid(), dropped, "process exited, dropped pending wave events");
                    }
                }
            }
            return Ok(beneath);
        }

        if !matches!(beneath.status, WaitStatus::NoResumed | WaitStatus::Ignore) {
            return Err(TargetError::Invariant(format!(
                "beneath reported {} without a thread",
                beneath.status
            )));
        }

        if let Some(event) = self.async_event {
            self.core.clear_async_event(event);
        }

        let mut more_events = true;
        let result = self.wait_for_wave_event(scope, beneath.status, &mut more_events);
        if more_events {
            self.mark_async_event();
        }
        result
    }

    fn wait_for_wave_event(
        &mut self,
        scope: Ptid,
        beneath_status: WaitStatus,
        more_events: &mut bool,
    ) -> Result<WaitOutcome> {
        self.require_forward_progress(scope, false)?;

        if let Some(event) = self.consume_one(scope) {
            return Ok(WaitOutcome::event(event.ptid, event.status));
        }

        // Drain the selected process (everything when it is not attached)
        // so its events keep their order.
        let selected = self.core.selected_thread().pid();
        let process = self.sessions.get(selected).and_then(Session::process);
        self.drain(process, None)?;

        if let Some(event) = self.consume_one(scope) {
            return Ok(WaitOutcome::event(event.ptid, event.status));
        }

        // Another process may still have events; only a wait over all
        // processes can tell there are none left.
        if scope.is_all() {
            *more_events = false;
        }

        // Waves can appear at any time while a runtime is loaded, so
        // "nothing resumed" from beneath does not hold for them.
        let gpu_active = self
            .sessions
            .iter()
            .any(|s| s.published && s.runtime_state == RuntimeState::LoadedSuccess);
        let status = if beneath_status == WaitStatus::NoResumed && gpu_active {
            WaitStatus::Ignore
        } else {
            beneath_status
        };
        Ok(WaitOutcome::nothing(status))
    }

    /// Whether the core should call [`Self::wait`] again soon.
    pub fn has_pending_events(&self) -> bool {
        if let Some(event) = self.async_event {
            if self.core.async_event_marked(event) {
                return true;
            }
        }
        self.beneath.has_pending_events()
    }
}
