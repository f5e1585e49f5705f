//! Per-debuggee-process state and the runtime-state transition graph.
//!
//! A [`Session`] lives in the [`SessionTable`] for as long as the adapter
//! knows the process, across any number of attach/detach cycles. Everything
//! tied to one attach (library handle, notifier, waves, breakpoints, pending
//! events) is dropped by [`Session::reset`]; the user's precise-memory
//! request survives it.

use std::collections::VecDeque;

use crate::breakpoint::BreakpointBridge;
use crate::library::{NotifierFd, ProcessId, RuntimeState, WaveId};
use crate::ptid::{Pid, Ptid};
use crate::signal::WaitStatus;
use crate::wave::{Wave, WaveRegistry};

/// A library attachment. The process handle and its notifier exist
/// together or not at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attachment {
    pub process: ProcessId,
    pub notifier: NotifierFd,
}

/// Precise memory-violation reporting, as requested and as in effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PreciseMemory {
    pub requested: bool,
    pub enabled: bool,
}

/// A stop or exit buffered for delivery through `wait`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingEvent {
    pub ptid: Ptid,
    pub status: WaitStatus,
}

/// The runtime-state transition graph.
///
/// ```text
/// unloaded                 -> loaded_success
/// unloaded                 -> loaded_error_restriction
/// loaded_success           -> unloaded
/// loaded_error_restriction -> unloaded
/// ```
pub struct RuntimeStateMachine;

impl RuntimeStateMachine {
    pub fn is_valid_transition(from: RuntimeState, to: RuntimeState) -> bool {
        matches!(
            (from, to),
            (RuntimeState::Unloaded, RuntimeState::LoadedSuccess)
                | (RuntimeState::Unloaded, RuntimeState::LoadedErrorRestriction)
                | (RuntimeState::LoadedSuccess, RuntimeState::Unloaded)
                | (RuntimeState::LoadedErrorRestriction, RuntimeState::Unloaded)
        )
    }
}

/// Bookkeeping for one debuggee process.
#[derive(Debug, Clone)]
pub struct Session {
    pid: Pid,
    pub(crate) attachment: Option<Attachment>,
    pub(crate) runtime_state: RuntimeState,
    /// Mirror of the library's forward-progress setting for this process.
    pub(crate) forward_progress_required: bool,
    pub(crate) precise_memory: PreciseMemory,
    pub(crate) breakpoints: BreakpointBridge,
    pub(crate) waves: WaveRegistry,
    pub(crate) pending: VecDeque<PendingEvent>,
    /// Whether the adapter is pushed on this process's target stack.
    pub(crate) published: bool,
    pub(crate) restriction_warned: bool,
    /// Child of a vfork that has not exec'd yet.
    pub(crate) vfork_child: bool,
}

impl Session {
    pub fn new(pid: Pid, precise_memory_requested: bool) -> Self {
        Self {
            pid,
            attachment: None,
            runtime_state: RuntimeState::Unloaded,
            forward_progress_required: true,
            precise_memory: PreciseMemory {
                requested: precise_memory_requested,
                enabled: false,
            },
            breakpoints: BreakpointBridge::new(),
            waves: WaveRegistry::new(),
            pending: VecDeque::new(),
            published: false,
            restriction_warned: false,
            vfork_child: false,
        }
    }

    /// Drop everything tied to the current attach.
    pub(crate) fn reset(&mut self) {
        let requested = self.precise_memory.requested;
        let vfork_child = self.vfork_child;
        *self = Self::new(self.pid, requested);
        self.vfork_child = vfork_child;
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn attachment(&self) -> Option<Attachment> {
        self.attachment
    }

    pub fn process(&self) -> Option<ProcessId> {
        self.attachment.map(|a| a.process)
    }

    pub fn notifier(&self) -> Option<NotifierFd> {
        self.attachment.map(|a| a.notifier)
    }

    pub fn is_attached(&self) -> bool {
        self.attachment.is_some()
    }

    pub fn runtime_state(&self) -> RuntimeState {
        self.runtime_state
    }

    pub fn forward_progress_required(&self) -> bool {
        self.forward_progress_required
    }

    pub fn precise_memory(&self) -> PreciseMemory {
        self.precise_memory
    }

    pub fn is_published(&self) -> bool {
        self.published
    }

    pub fn is_vfork_child(&self) -> bool {
        self.vfork_child
    }

    pub fn wave(&self, id: WaveId) -> Option<&Wave> {
        self.waves.get(id)
    }

    pub fn waves(&self) -> &WaveRegistry {
        &self.waves
    }

    pub fn breakpoints(&self) -> &BreakpointBridge {
        &self.breakpoints
    }

    pub fn pending_events(&self) -> impl Iterator<Item = &PendingEvent> {
        self.pending.iter()
    }

    pub(crate) fn enqueue(&mut self, ptid: Ptid, status: WaitStatus) {
        self.pending.push_back(PendingEvent { ptid, status });
    }
}

/// All known sessions, in insertion order.
///
/// Lookups are linear; a debugger rarely holds more than a handful of
/// inferiors and table order is what `wait` over all processes walks.
#[derive(Debug, Clone, Default)]
pub struct SessionTable {
    sessions: Vec<Session>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, pid: Pid) -> Option<&Session> {
        self.sessions.iter().find(|s| s.pid == pid)
    }

    pub fn get_mut(&mut self, pid: Pid) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|s| s.pid == pid)
    }

    /// The session for `pid`, created with `precise_memory_requested` if
    /// it does not exist yet.
    pub fn get_or_insert(&mut self, pid: Pid, precise_memory_requested: bool) -> &mut Session {
        let index = match self.sessions.iter().position(|s| s.pid == pid) {
            Some(index) => index,
            None => {
                self.sessions
                    .push(Session::new(pid, precise_memory_requested));
                self.sessions.len() - 1
            }
        };
        &mut self.sessions[index]
    }

    /// Forget `pid`, returning its session.
    pub fn remove(&mut self, pid: Pid) -> Option<Session> {
        let index = self.sessions.iter().position(|s| s.pid == pid)?;
        Some(self.sessions.remove(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Session> {
        self.sessions.iter_mut()
    }

    /// Sessions whose pid falls within `scope`.
    pub fn matching_mut(&mut self, scope: Ptid) -> impl Iterator<Item = &mut Session> {
        self.sessions
            .iter_mut()
            .filter(move |s| scope.is_all() || scope.pid() == s.pid)
    }

    pub fn any_attached(&self) -> bool {
        self.sessions.iter().any(Session::is_attached)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
