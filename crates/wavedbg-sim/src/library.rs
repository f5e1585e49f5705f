//! In-memory vendor debug library.
//!
//! [`SimLibrary`] is handed to the adapter as a `Box<dyn DebugLibrary>`;
//! the paired [`SimLibraryHandle`] shares its state so a driver can script
//! waves and events and inspect what the adapter asked for afterwards.
//!
//! ```text
//! driver --SimLibraryHandle--+
//!                            |   Rc<RefCell<LibraryState>>
//! GpuTarget --SimLibrary-----+
//!                            |
//!                            '--> notifier pipe (one byte per queued event)
//! ```
//!
//! Every handle the library hands out (process, wave, event, breakpoint)
//! comes from one counter that restarts on `initialize`.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::rc::Rc;

use tracing::debug;

use wavedbg_core::library::{
    AddressSpace, AgentId, ArchitectureId, BreakpointAction, BreakpointId, ClientCallbacks,
    ClientProcessId, DebugLibrary, DispatchId, EventId, EventKind, Exception, LogLevel,
    MemoryPrecision, NotifierFd, ProcessId, Progress, QueueId, RegisterId, ResumeMode,
    RuntimeState, Status, StopReasons, Version, WaveId, WaveList, WaveState,
};
use wavedbg_core::{Pid, Ptid};

/// ELF machine number of the simulated GPU architecture.
pub const EM_AMDGPU: u32 = 224;

/// The single architecture every simulated wave runs.
pub const SIM_ARCHITECTURE: ArchitectureId = ArchitectureId(0x1000);

/// Version reported unless a driver overrides it.
pub const DEFAULT_VERSION: Version = Version {
    major: 0,
    minor: 76,
    patch: 0,
};

/// A library entry point the adapter called, recorded in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LibraryCall {
    Initialize,
    Finalize,
    SetLogLevel(LogLevel),
    Attach(Pid),
    Detach(ProcessId),
    SetProgress(ProcessId, Progress),
    SetMemoryPrecision(ProcessId, MemoryPrecision),
    WaveResume(WaveId, ResumeMode, Exception),
    WaveStop(WaveId),
    BreakpointHit(BreakpointId, Ptid),
    EventProcessed(EventId),
}

/// How attaching to a pid behaves.
#[derive(Debug, Clone, Default)]
struct AttachPlan {
    failure: Option<Status>,
    notifier_failure: Option<Status>,
    /// Runtime event buffered as soon as the attach succeeds.
    runtime_on_attach: Option<RuntimeState>,
    /// Addresses the library asks the client to break at during attach.
    breakpoints: Vec<u64>,
}

#[derive(Debug)]
struct SimProcess {
    pid: Pid,
    client: ClientProcessId,
    notifier: Option<Pipe>,
    progress: Progress,
    precision: MemoryPrecision,
    list_changed: bool,
}

#[derive(Debug, Clone)]
struct SimWave {
    process: ProcessId,
    state: WaveState,
    stop_reasons: StopReasons,
    /// A stop was requested and has not been reported yet.
    stop_requested: bool,
    agent: AgentId,
    queue: QueueId,
    dispatch: DispatchId,
    group: [u32; 3],
    index_in_group: u32,
    registers: HashMap<RegisterId, Vec<u8>>,
}

#[derive(Debug, Clone, Copy)]
struct SimEvent {
    id: EventId,
    process: ProcessId,
    kind: EventKind,
    wave: Option<WaveId>,
    breakpoint: Option<BreakpointId>,
    runtime: Option<RuntimeState>,
}

#[derive(Debug, Clone, Copy)]
struct SimBreakpoint {
    process: ProcessId,
    address: u64,
}

#[derive(Debug)]
struct LibraryState {
    version: Version,
    initialized: bool,
    init_count: u32,
    log_level: LogLevel,
    next_handle: u64,
    precision_supported: bool,
    hit_action: BreakpointAction,
    /// Breakpoint named by the next resume event instead of the one hit.
    resume_override: Option<BreakpointId>,
    /// Queue a code-object update ahead of every breakpoint resume event.
    code_objects_on_hit: bool,
    plans: HashMap<Pid, AttachPlan>,
    processes: BTreeMap<ProcessId, SimProcess>,
    waves: BTreeMap<WaveId, SimWave>,
    breakpoints: BTreeMap<BreakpointId, SimBreakpoint>,
    queued: VecDeque<SimEvent>,
    in_flight: HashMap<EventId, SimEvent>,
    log_messages: VecDeque<(LogLevel, String)>,
    memory: BTreeMap<u64, u8>,
    calls: Vec<LibraryCall>,
}

impl Default for LibraryState {
    fn default() -> Self {
        Self {
            version: DEFAULT_VERSION,
            initialized: false,
            init_count: 0,
            log_level: LogLevel::default(),
            next_handle: 1,
            precision_supported: true,
            hit_action: BreakpointAction::Resume,
            resume_override: None,
            code_objects_on_hit: false,
            plans: HashMap::new(),
            processes: BTreeMap::new(),
            waves: BTreeMap::new(),
            breakpoints: BTreeMap::new(),
            queued: VecDeque::new(),
            in_flight: HashMap::new(),
            log_messages: VecDeque::new(),
            memory: BTreeMap::new(),
            calls: Vec::new(),
        }
    }
}

impl LibraryState {
    fn next_handle(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn process_for_pid(&self, pid: Pid) -> Option<ProcessId> {
        self.processes
            .iter()
            .find(|(_, process)| process.pid == pid)
            .map(|(&id, _)| id)
    }

    fn queue(&mut self, process: ProcessId, kind: EventKind) -> EventId {
        let id = EventId(self.next_handle());
        self.queued.push_back(SimEvent {
            id,
            process,
            kind,
            wave: None,
            breakpoint: None,
            runtime: None,
        });
        if let Some(pipe) = self.processes.get(&process).and_then(|p| p.notifier.as_ref()) {
            pipe.signal();
        }
        debug!(event_id = %id, %kind, %process, "sim library queued event");
        id
    }

    fn queued_mut(&mut self, id: EventId) -> Option<&mut SimEvent> {
        self.queued.iter_mut().find(|event| event.id == id)
    }

    fn queue_wave_event(&mut self, wave: WaveId, kind: EventKind) -> Option<EventId> {
        let process = self.waves.get(&wave).map(|w| w.process)?;
        let id = self.queue(process, kind);
        if let Some(event) = self.queued_mut(id) {
            event.wave = Some(wave);
        }
        Some(id)
    }

    fn queue_runtime(&mut self, process: ProcessId, state: RuntimeState) -> EventId {
        let id = self.queue(process, EventKind::Runtime);
        if let Some(event) = self.queued_mut(id) {
            event.runtime = Some(state);
        }
        id
    }

    fn queue_breakpoint_resume(&mut self, process: ProcessId, breakpoint: BreakpointId) {
        let id = self.queue(process, EventKind::BreakpointResume);
        if let Some(event) = self.queued_mut(id) {
            event.breakpoint = Some(breakpoint);
        }
    }

    fn event(&self, id: EventId) -> Result<&SimEvent, Status> {
        self.in_flight.get(&id).ok_or(Status::InvalidEventId)
    }

    fn wave(&self, id: WaveId) -> Result<&SimWave, Status> {
        self.waves.get(&id).ok_or(Status::InvalidWaveId)
    }

    fn wave_mut(&mut self, id: WaveId) -> Result<&mut SimWave, Status> {
        self.waves.get_mut(&id).ok_or(Status::InvalidWaveId)
    }

    fn ensure_initialized(&self) -> Result<(), Status> {
        if self.initialized {
            Ok(())
        } else {
            Err(Status::NotInitialized)
        }
    }

    /// Drop a process and everything that belongs to it.
    fn forget_process(&mut self, process: ProcessId) {
        self.processes.remove(&process);
        self.waves.retain(|_, wave| wave.process != process);
        self.breakpoints.retain(|_, bp| bp.process != process);
        self.queued.retain(|event| event.process != process);
        self.in_flight.retain(|_, event| event.process != process);
    }
}

// ---------------------------------------------------------------------------
// SimLibrary
// ---------------------------------------------------------------------------

/// The simulated library, as owned by the adapter.
pub struct SimLibrary {
    state: Rc<RefCell<LibraryState>>,
}

impl SimLibrary {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(LibraryState::default())),
        }
    }

    /// A driver-side handle sharing this library's state.
    pub fn handle(&self) -> SimLibraryHandle {
        SimLibraryHandle {
            state: Rc::clone(&self.state),
        }
    }
}

impl Default for SimLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl DebugLibrary for SimLibrary {
    fn name(&self) -> &str {
        "wavedbg-sim"
    }

    fn version(&self) -> Version {
        self.state.borrow().version
    }

    fn initialize(&mut self) -> Result<(), Status> {
        let mut state = self.state.borrow_mut();
        state.calls.push(LibraryCall::Initialize);
        if state.initialized {
            return Err(Status::AlreadyInitialized);
        }
        state.initialized = true;
        state.init_count += 1;
        state.next_handle = 1;
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), Status> {
        let mut state = self.state.borrow_mut();
        state.calls.push(LibraryCall::Finalize);
        state.ensure_initialized()?;
        state.initialized = false;
        let processes: Vec<ProcessId> = state.processes.keys().copied().collect();
        for process in processes {
            state.forget_process(process);
        }
        Ok(())
    }

    fn set_log_level(&mut self, level: LogLevel) -> Result<(), Status> {
        let mut state = self.state.borrow_mut();
        state.calls.push(LibraryCall::SetLogLevel(level));
        state.log_level = level;
        Ok(())
    }

    fn process_attach(
        &mut self,
        client: ClientProcessId,
        callbacks: &mut dyn ClientCallbacks,
    ) -> Result<ProcessId, Status> {
        let mut state = self.state.borrow_mut();
        state.ensure_initialized()?;

        let pid = callbacks.get_os_pid(client)?;
        state.calls.push(LibraryCall::Attach(pid));
        if state.process_for_pid(pid).is_some() {
            return Err(Status::AlreadyAttached);
        }
        let plan = state.plans.get(&pid).cloned().unwrap_or_default();
        if let Some(status) = plan.failure {
            return Err(status);
        }

        let process = ProcessId(state.next_handle());
        let notifier = Pipe::new().map_err(|e| {
            debug!(pid, error = %e, "sim library could not create notifier pipe");
            Status::Error
        })?;
        state.processes.insert(
            process,
            SimProcess {
                pid,
                client,
                notifier: Some(notifier),
                progress: Progress::Normal,
                precision: MemoryPrecision::None,
                list_changed: false,
            },
        );

        let mut inserted = Vec::new();
        for address in plan.breakpoints {
            let breakpoint = BreakpointId(state.next_handle());
            if let Err(status) = callbacks.insert_breakpoint(client, address, breakpoint) {
                debug!(pid, %breakpoint, %status, "client refused breakpoint, failing attach");
                for breakpoint in inserted {
                    let _ = callbacks.remove_breakpoint(client, breakpoint);
                }
                state.forget_process(process);
                return Err(Status::ClientCallback);
            }
            state
                .breakpoints
                .insert(breakpoint, SimBreakpoint { process, address });
            inserted.push(breakpoint);
        }

        if let Some(runtime) = plan.runtime_on_attach {
            state.queue_runtime(process, runtime);
        }
        Ok(process)
    }

    fn process_detach(
        &mut self,
        process: ProcessId,
        callbacks: &mut dyn ClientCallbacks,
    ) -> Result<(), Status> {
        let mut state = self.state.borrow_mut();
        state.calls.push(LibraryCall::Detach(process));
        let client = state
            .processes
            .get(&process)
            .map(|p| p.client)
            .ok_or(Status::InvalidProcessId)?;

        let owned: Vec<BreakpointId> = state
            .breakpoints
            .iter()
            .filter(|(_, bp)| bp.process == process)
            .map(|(&id, _)| id)
            .collect();
        for breakpoint in owned {
            if let Err(status) = callbacks.remove_breakpoint(client, breakpoint) {
                debug!(%breakpoint, %status, "client could not remove breakpoint");
            }
        }
        state.forget_process(process);
        Ok(())
    }

    fn process_notifier(&self, process: ProcessId) -> Result<NotifierFd, Status> {
        let state = self.state.borrow();
        let sim = state.processes.get(&process).ok_or(Status::InvalidProcessId)?;
        if let Some(status) = state.plans.get(&sim.pid).and_then(|p| p.notifier_failure) {
            return Err(status);
        }
        sim.notifier
            .as_ref()
            .map(Pipe::read_fd)
            .ok_or(Status::Error)
    }

    fn process_os_pid(&self, process: ProcessId) -> Result<Pid, Status> {
        let state = self.state.borrow();
        state
            .processes
            .get(&process)
            .map(|p| p.pid)
            .ok_or(Status::InvalidProcessId)
    }

    fn process_set_progress(
        &mut self,
        process: ProcessId,
        progress: Progress,
    ) -> Result<(), Status> {
        let mut state = self.state.borrow_mut();
        state.calls.push(LibraryCall::SetProgress(process, progress));
        let sim = state
            .processes
            .get_mut(&process)
            .ok_or(Status::InvalidProcessId)?;
        sim.progress = progress;
        Ok(())
    }

    fn set_memory_precision(
        &mut self,
        process: ProcessId,
        precision: MemoryPrecision,
    ) -> Result<(), Status> {
        let mut state = self.state.borrow_mut();
        state
            .calls
            .push(LibraryCall::SetMemoryPrecision(process, precision));
        let supported = state.precision_supported;
        let sim = state
            .processes
            .get_mut(&process)
            .ok_or(Status::InvalidProcessId)?;
        if precision == MemoryPrecision::Precise && !supported {
            return Err(Status::NotSupported);
        }
        sim.precision = precision;
        Ok(())
    }

    fn wave_list(&mut self, process: ProcessId) -> Result<WaveList, Status> {
        let mut state = self.state.borrow_mut();
        let sim = state
            .processes
            .get_mut(&process)
            .ok_or(Status::InvalidProcessId)?;
        let changed = std::mem::take(&mut sim.list_changed);
        let waves = state
            .waves
            .iter()
            .filter(|(_, wave)| wave.process == process)
            .map(|(&id, _)| id)
            .collect();
        Ok(WaveList { waves, changed })
    }

    fn next_pending_event(
        &mut self,
        process: Option<ProcessId>,
        callbacks: &mut dyn ClientCallbacks,
    ) -> Result<Option<(EventId, EventKind)>, Status> {
        let mut state = self.state.borrow_mut();
        state.ensure_initialized()?;

        while let Some((level, message)) = state.log_messages.pop_front() {
            if level <= state.log_level {
                callbacks.log_message(level, &message);
            }
        }

        if let Some(process) = process {
            if !state.processes.contains_key(&process) {
                return Err(Status::InvalidProcessId);
            }
        }
        let position = state
            .queued
            .iter()
            .position(|event| process.is_none_or(|p| event.process == p));
        let Some(event) = position.and_then(|i| state.queued.remove(i)) else {
            return Ok(None);
        };
        state.in_flight.insert(event.id, event);
        Ok(Some((event.id, event.kind)))
    }

    fn event_process(&self, event: EventId) -> Result<ProcessId, Status> {
        self.state.borrow().event(event).map(|e| e.process)
    }

    fn event_wave(&self, event: EventId) -> Result<WaveId, Status> {
        self.state
            .borrow()
            .event(event)?
            .wave
            .ok_or(Status::InvalidArgument)
    }

    fn event_breakpoint(&self, event: EventId) -> Result<BreakpointId, Status> {
        self.state
            .borrow()
            .event(event)?
            .breakpoint
            .ok_or(Status::InvalidArgument)
    }

    fn event_runtime_state(&self, event: EventId) -> Result<RuntimeState, Status> {
        self.state
            .borrow()
            .event(event)?
            .runtime
            .ok_or(Status::InvalidArgument)
    }

    fn event_processed(&mut self, event: EventId) -> Result<(), Status> {
        let mut state = self.state.borrow_mut();
        state.calls.push(LibraryCall::EventProcessed(event));
        state
            .in_flight
            .remove(&event)
            .map(|_| ())
            .ok_or(Status::InvalidEventId)
    }

    fn wave_state(&self, wave: WaveId) -> Result<WaveState, Status> {
        self.state.borrow().wave(wave).map(|w| w.state)
    }

    fn wave_stop_reasons(&self, wave: WaveId) -> Result<StopReasons, Status> {
        self.state.borrow().wave(wave).map(|w| w.stop_reasons)
    }

    fn wave_agent(&self, wave: WaveId) -> Result<AgentId, Status> {
        self.state.borrow().wave(wave).map(|w| w.agent)
    }

    fn wave_queue(&self, wave: WaveId) -> Result<QueueId, Status> {
        self.state.borrow().wave(wave).map(|w| w.queue)
    }

    fn wave_dispatch(&self, wave: WaveId) -> Result<DispatchId, Status> {
        self.state.borrow().wave(wave).map(|w| w.dispatch)
    }

    fn wave_workgroup_coords(&self, wave: WaveId) -> Result<[u32; 3], Status> {
        self.state.borrow().wave(wave).map(|w| w.group)
    }

    fn wave_number_in_group(&self, wave: WaveId) -> Result<u32, Status> {
        self.state.borrow().wave(wave).map(|w| w.index_in_group)
    }

    fn wave_architecture(&self, wave: WaveId) -> Result<ArchitectureId, Status> {
        self.state.borrow().wave(wave).map(|_| SIM_ARCHITECTURE)
    }

    /// Resuming a running wave is accepted and leaves it running.
    fn wave_resume(
        &mut self,
        wave: WaveId,
        mode: ResumeMode,
        exception: Exception,
    ) -> Result<(), Status> {
        let mut state = self.state.borrow_mut();
        state
            .calls
            .push(LibraryCall::WaveResume(wave, mode, exception));
        let sim = state.wave_mut(wave)?;
        sim.state = match mode {
            ResumeMode::Normal => WaveState::Run,
            ResumeMode::SingleStep => WaveState::SingleStep,
        };
        sim.stop_reasons = StopReasons::empty();
        sim.stop_requested = false;
        Ok(())
    }

    /// The stop completes at once: the wave is stopped with no reason and
    /// a stop event is queued.
    fn wave_stop(&mut self, wave: WaveId) -> Result<(), Status> {
        let mut state = self.state.borrow_mut();
        state.calls.push(LibraryCall::WaveStop(wave));
        let sim = state.wave_mut(wave)?;
        if sim.state == WaveState::Stop {
            return Ok(());
        }
        sim.state = WaveState::Stop;
        sim.stop_reasons = StopReasons::empty();
        sim.stop_requested = true;
        state.queue_wave_event(wave, EventKind::WaveStop);
        Ok(())
    }

    fn architecture_elf_machine(&self, architecture: ArchitectureId) -> Result<u32, Status> {
        if architecture == SIM_ARCHITECTURE {
            Ok(EM_AMDGPU)
        } else {
            Err(Status::InvalidArgument)
        }
    }

    fn report_breakpoint_hit(
        &mut self,
        breakpoint: BreakpointId,
        thread: Ptid,
        _callbacks: &mut dyn ClientCallbacks,
    ) -> Result<BreakpointAction, Status> {
        let mut state = self.state.borrow_mut();
        state.calls.push(LibraryCall::BreakpointHit(breakpoint, thread));
        let process = state
            .breakpoints
            .get(&breakpoint)
            .map(|bp| bp.process)
            .ok_or(Status::InvalidBreakpointId)?;

        if state.hit_action == BreakpointAction::Halt {
            if state.code_objects_on_hit {
                state.queue(process, EventKind::CodeObjectListUpdated);
            }
            let resumed = state.resume_override.take().unwrap_or(breakpoint);
            state.queue_breakpoint_resume(process, resumed);
        }
        Ok(state.hit_action)
    }

    fn read_memory(
        &mut self,
        process: ProcessId,
        wave: WaveId,
        _lane: u32,
        _space: AddressSpace,
        address: u64,
        buf: &mut [u8],
    ) -> Result<usize, Status> {
        let state = self.state.borrow();
        if !state.processes.contains_key(&process) {
            return Err(Status::InvalidProcessId);
        }
        state.wave(wave)?;
        for (offset, byte) in buf.iter_mut().enumerate() {
            *byte = *state
                .memory
                .get(&(address + offset as u64))
                .ok_or(Status::MemoryAccess)?;
        }
        Ok(buf.len())
    }

    fn write_memory(
        &mut self,
        process: ProcessId,
        wave: WaveId,
        _lane: u32,
        _space: AddressSpace,
        address: u64,
        data: &[u8],
    ) -> Result<usize, Status> {
        let mut state = self.state.borrow_mut();
        if !state.processes.contains_key(&process) {
            return Err(Status::InvalidProcessId);
        }
        state.wave(wave)?;
        let mapped = (0..data.len() as u64).all(|i| state.memory.contains_key(&(address + i)));
        if !mapped {
            return Err(Status::MemoryAccess);
        }
        for (offset, &byte) in data.iter().enumerate() {
            state.memory.insert(address + offset as u64, byte);
        }
        Ok(data.len())
    }

    fn read_register(
        &mut self,
        wave: WaveId,
        register: RegisterId,
        offset: usize,
        buf: &mut [u8],
    ) -> Result<(), Status> {
        let state = self.state.borrow();
        let value = state
            .wave(wave)?
            .registers
            .get(&register)
            .ok_or(Status::RegisterNotAvailable)?;
        let end = offset + buf.len();
        let bytes = value.get(offset..end).ok_or(Status::InvalidArgument)?;
        buf.copy_from_slice(bytes);
        Ok(())
    }

    fn write_register(
        &mut self,
        wave: WaveId,
        register: RegisterId,
        offset: usize,
        data: &[u8],
    ) -> Result<(), Status> {
        let mut state = self.state.borrow_mut();
        let sim = state.wave_mut(wave)?;
        let value = sim.registers.entry(register).or_default();
        let end = offset + data.len();
        if value.len() < end {
            value.resize(end, 0);
        }
        value[offset..end].copy_from_slice(data);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SimLibraryHandle
// ---------------------------------------------------------------------------

/// Driver-side view of a [`SimLibrary`].
#[derive(Clone)]
pub struct SimLibraryHandle {
    state: Rc<RefCell<LibraryState>>,
}

impl SimLibraryHandle {
    // -- configuration -----------------------------------------------------

    pub fn set_version(&self, version: Version) {
        self.state.borrow_mut().version = version;
    }

    /// Make attaching to `pid` fail with `status`.
    pub fn fail_attach(&self, pid: Pid, status: Status) {
        self.state.borrow_mut().plans.entry(pid).or_default().failure = Some(status);
    }

    /// Make the notifier query for `pid`'s process fail with `status`.
    pub fn fail_notifier(&self, pid: Pid, status: Status) {
        self.state
            .borrow_mut()
            .plans
            .entry(pid)
            .or_default()
            .notifier_failure = Some(status);
    }

    /// Buffer a runtime event as soon as `pid` is attached, as when the
    /// runtime was loaded before the debugger arrived.
    pub fn runtime_on_attach(&self, pid: Pid, runtime: RuntimeState) {
        self.state
            .borrow_mut()
            .plans
            .entry(pid)
            .or_default()
            .runtime_on_attach = Some(runtime);
    }

    /// Ask the client to break at `address` while attaching to `pid`.
    pub fn request_breakpoint(&self, pid: Pid, address: u64) {
        self.state
            .borrow_mut()
            .plans
            .entry(pid)
            .or_default()
            .breakpoints
            .push(address);
    }

    pub fn set_precise_memory_supported(&self, supported: bool) {
        self.state.borrow_mut().precision_supported = supported;
    }

    /// What the library answers to breakpoint hits. `Halt` queues a
    /// breakpoint resume event for the breakpoint hit.
    pub fn set_breakpoint_action(&self, action: BreakpointAction) {
        self.state.borrow_mut().hit_action = action;
    }

    /// Name `breakpoint` in the next breakpoint resume event, whichever
    /// breakpoint was hit.
    pub fn misreport_next_resume(&self, breakpoint: BreakpointId) {
        self.state.borrow_mut().resume_override = Some(breakpoint);
    }

    pub fn set_code_objects_on_hit(&self, enabled: bool) {
        self.state.borrow_mut().code_objects_on_hit = enabled;
    }

    /// Have the library emit `message` at the next event poll.
    pub fn emit_log(&self, level: LogLevel, message: &str) {
        self.state
            .borrow_mut()
            .log_messages
            .push_back((level, message.to_owned()));
    }

    // -- scripting ---------------------------------------------------------

    /// Start a running wave in `pid`'s process. Returns `None` when the
    /// process is not attached.
    pub fn spawn_wave(&self, pid: Pid) -> Option<WaveId> {
        let mut state = self.state.borrow_mut();
        let process = state.process_for_pid(pid)?;
        let index = state.waves.values().filter(|w| w.process == process).count() as u32;
        let wave = WaveId(state.next_handle());
        state.waves.insert(
            wave,
            SimWave {
                process,
                state: WaveState::Run,
                stop_reasons: StopReasons::empty(),
                stop_requested: false,
                agent: AgentId(1),
                queue: QueueId(1),
                dispatch: DispatchId(1),
                group: [index / 4, 0, 0],
                index_in_group: index % 4,
                registers: HashMap::new(),
            },
        );
        if let Some(sim) = state.processes.get_mut(&process) {
            sim.list_changed = true;
        }
        Some(wave)
    }

    /// Stop `wave` for `reasons` and queue a stop event.
    pub fn stop_wave(&self, wave: WaveId, reasons: StopReasons) -> Option<EventId> {
        let mut state = self.state.borrow_mut();
        let sim = state.waves.get_mut(&wave)?;
        sim.state = WaveState::Stop;
        sim.stop_reasons = reasons;
        state.queue_wave_event(wave, EventKind::WaveStop)
    }

    /// Finish a single-step: the wave stops with the single-step reason.
    pub fn complete_step(&self, wave: WaveId) -> Option<EventId> {
        self.stop_wave(wave, StopReasons::SINGLE_STEP)
    }

    /// Terminate `wave`. A wave that was stepping or being stopped reports
    /// a command-terminated event; any other wave just disappears.
    pub fn terminate_wave(&self, wave: WaveId) -> Option<EventId> {
        let mut state = self.state.borrow_mut();
        let sim = state.waves.get(&wave)?.clone();
        let event = if sim.state == WaveState::SingleStep || sim.stop_requested {
            state.queue_wave_event(wave, EventKind::WaveCommandTerminated)
        } else {
            None
        };
        state.waves.remove(&wave);
        if let Some(process) = state.processes.get_mut(&sim.process) {
            process.list_changed = true;
        }
        event
    }

    /// Queue a runtime state change for `pid`.
    pub fn runtime_event(&self, pid: Pid, runtime: RuntimeState) -> Option<EventId> {
        let mut state = self.state.borrow_mut();
        let process = state.process_for_pid(pid)?;
        Some(state.queue_runtime(process, runtime))
    }

    /// Queue a bare event of `kind` for `pid`.
    pub fn raw_event(&self, pid: Pid, kind: EventKind) -> Option<EventId> {
        let mut state = self.state.borrow_mut();
        let process = state.process_for_pid(pid)?;
        Some(state.queue(process, kind))
    }

    pub fn set_register(&self, wave: WaveId, register: RegisterId, value: &[u8]) {
        if let Some(sim) = self.state.borrow_mut().waves.get_mut(&wave) {
            sim.registers.insert(register, value.to_vec());
        }
    }

    /// Map `data` into global memory at `address`.
    pub fn poke_memory(&self, address: u64, data: &[u8]) {
        let mut state = self.state.borrow_mut();
        for (offset, &byte) in data.iter().enumerate() {
            state.memory.insert(address + offset as u64, byte);
        }
    }

    // -- inspection --------------------------------------------------------

    pub fn process_of(&self, pid: Pid) -> Option<ProcessId> {
        self.state.borrow().process_for_pid(pid)
    }

    pub fn is_initialized(&self) -> bool {
        self.state.borrow().initialized
    }

    /// How many times the library has been initialized.
    pub fn init_count(&self) -> u32 {
        self.state.borrow().init_count
    }

    pub fn log_level(&self) -> LogLevel {
        self.state.borrow().log_level
    }

    pub fn progress(&self, pid: Pid) -> Option<Progress> {
        let state = self.state.borrow();
        let process = state.process_for_pid(pid)?;
        state.processes.get(&process).map(|p| p.progress)
    }

    pub fn memory_precision(&self, pid: Pid) -> Option<MemoryPrecision> {
        let state = self.state.borrow();
        let process = state.process_for_pid(pid)?;
        state.processes.get(&process).map(|p| p.precision)
    }

    pub fn wave_state(&self, wave: WaveId) -> Option<WaveState> {
        self.state.borrow().waves.get(&wave).map(|w| w.state)
    }

    pub fn register(&self, wave: WaveId, register: RegisterId) -> Option<Vec<u8>> {
        self.state
            .borrow()
            .waves
            .get(&wave)
            .and_then(|w| w.registers.get(&register).cloned())
    }

    pub fn peek_memory(&self, address: u64, len: usize) -> Option<Vec<u8>> {
        let state = self.state.borrow();
        (0..len as u64)
            .map(|i| state.memory.get(&(address + i)).copied())
            .collect()
    }

    /// Breakpoints the library currently holds for `pid`, by handle.
    pub fn breakpoints(&self, pid: Pid) -> Vec<(BreakpointId, u64)> {
        let state = self.state.borrow();
        let Some(process) = state.process_for_pid(pid) else {
            return Vec::new();
        };
        state
            .breakpoints
            .iter()
            .filter(|(_, bp)| bp.process == process)
            .map(|(&id, bp)| (id, bp.address))
            .collect()
    }

    /// Events queued and not yet pulled.
    pub fn queued_events(&self) -> usize {
        self.state.borrow().queued.len()
    }

    /// Events pulled and not yet acknowledged.
    pub fn unacknowledged_events(&self) -> usize {
        self.state.borrow().in_flight.len()
    }

    pub fn calls(&self) -> Vec<LibraryCall> {
        self.state.borrow().calls.clone()
    }

    /// Count recorded calls matching `pred`.
    pub fn count_calls(&self, pred: impl Fn(&LibraryCall) -> bool) -> usize {
        self.state.borrow().calls.iter().filter(|c| pred(c)).count()
    }

    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }
}

impl std::fmt::Debug for SimLibraryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("SimLibraryHandle")
            .field("initialized", &state.initialized)
            .field("processes", &state.processes.len())
            .field("waves", &state.waves.len())
            .field("queued", &state.queued.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Notifier pipe
// ---------------------------------------------------------------------------

/// A non-blocking pipe; the read end is the process notifier.
#[derive(Debug)]
struct Pipe {
    read: NotifierFd,
    write: NotifierFd,
}

impl Pipe {
    #[cfg(unix)]
    fn new() -> std::io::Result<Self> {
        let mut fds = [0; 2];
        // SAFETY: `fds` has room for the two descriptors.
        if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
            return Err(std::io::Error::last_os_error());
        }
        for fd in fds {
            // SAFETY: `fd` was just returned by pipe() and is owned here.
            unsafe {
                let flags = libc::fcntl(fd, libc::F_GETFL);
                libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
                libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC);
            }
        }
        Ok(Self {
            read: fds[0],
            write: fds[1],
        })
    }

    #[cfg(not(unix))]
    fn new() -> std::io::Result<Self> {
        Ok(Self { read: -1, write: -1 })
    }

    fn read_fd(&self) -> NotifierFd {
        self.read
    }

    /// Make the read end readable. A full pipe is already readable.
    #[cfg(unix)]
    fn signal(&self) {
        let byte = [1u8];
        // SAFETY: `byte` is valid for reads of one byte.
        unsafe {
            libc::write(self.write, byte.as_ptr().cast(), 1);
        }
    }

    #[cfg(not(unix))]
    fn signal(&self) {}
}

#[cfg(unix)]
impl Drop for Pipe {
    fn drop(&mut self) {
        // SAFETY: both descriptors are owned by this pipe.
        unsafe {
            libc::close(self.read);
            libc::close(self.write);
        }
    }
}
