//! In-memory debugger core.
//!
//! Records every thread, breakpoint, async event and file handler the
//! adapter creates so a driver can assert on them through
//! [`SimHostHandle`].

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Range;
use std::rc::Rc;

use anyhow::{Result, anyhow, bail};

use wavedbg_core::host::{AsyncEvent, CoreBreakpoint, DebuggerCore, RegisterDesc};
use wavedbg_core::library::{NotifierFd, RegisterId, RegisterProperties};
use wavedbg_core::{Pid, Ptid};

/// Flags the core keeps for a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ThreadFlags {
    pub running: bool,
    pub executing: bool,
}

/// Register numbers of [`default_registers`].
pub mod regnum {
    pub const PC: usize = 0;
    pub const EXEC: usize = 1;
    pub const VCC: usize = 2;
    pub const STATUS: usize = 3;
    pub const MODE: usize = 4;
}

/// A small wave register file: PC, EXEC, VCC (writes clobber volatile
/// registers), STATUS (volatile) and MODE (has read-only bits).
pub fn default_registers() -> Vec<RegisterDesc> {
    let reg = |name: &str, id: u64, size: usize, properties: RegisterProperties| RegisterDesc {
        name: name.to_owned(),
        id: RegisterId(id),
        size,
        properties,
    };
    vec![
        reg("pc", 0x10, 8, RegisterProperties::empty()),
        reg("exec", 0x11, 8, RegisterProperties::empty()),
        reg("vcc", 0x12, 8, RegisterProperties::INVALIDATE_VOLATILE),
        reg("status", 0x13, 4, RegisterProperties::VOLATILE),
        reg("mode", 0x14, 4, RegisterProperties::READONLY_BITS),
    ]
}

#[derive(Debug, Clone)]
struct NamedEvent {
    name: String,
    marked: bool,
}

#[derive(Debug)]
struct HostState {
    threads: BTreeMap<Ptid, ThreadFlags>,
    /// Every pseudo-thread ever created, in creation order.
    created: Vec<Ptid>,
    deleted: Vec<Ptid>,
    selected: Ptid,
    pcs: HashMap<Ptid, u64>,
    decr_pc_after_break: u64,
    registers: Vec<RegisterDesc>,
    regcache: HashMap<(Ptid, usize), Vec<u8>>,
    invalidated: Vec<(Ptid, usize)>,
    code_ranges: Vec<(Pid, Range<u64>)>,
    fail_install: bool,
    next_breakpoint: u64,
    breakpoints: BTreeMap<u64, (Pid, u64)>,
    removed_inferiors: Vec<Pid>,
    solib_events: Vec<Pid>,
    pushed: BTreeSet<Pid>,
    next_async_event: u64,
    async_events: BTreeMap<u64, NamedEvent>,
    file_handlers: BTreeMap<NotifierFd, (Pid, String)>,
}

impl Default for HostState {
    fn default() -> Self {
        Self {
            threads: BTreeMap::new(),
            created: Vec::new(),
            deleted: Vec::new(),
            selected: Ptid::ALL,
            pcs: HashMap::new(),
            decr_pc_after_break: 0,
            registers: default_registers(),
            regcache: HashMap::new(),
            invalidated: Vec::new(),
            code_ranges: Vec::new(),
            fail_install: false,
            next_breakpoint: 1,
            breakpoints: BTreeMap::new(),
            removed_inferiors: Vec::new(),
            solib_events: Vec::new(),
            pushed: BTreeSet::new(),
            next_async_event: 1,
            async_events: BTreeMap::new(),
            file_handlers: BTreeMap::new(),
        }
    }
}

/// The simulated debugger core, as owned by the adapter.
pub struct SimHost {
    state: Rc<RefCell<HostState>>,
}

impl SimHost {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(HostState::default())),
        }
    }

    pub fn handle(&self) -> SimHostHandle {
        SimHostHandle {
            state: Rc::clone(&self.state),
        }
    }
}

impl Default for SimHost {
    fn default() -> Self {
        Self::new()
    }
}

impl DebuggerCore for SimHost {
    fn add_thread_silent(&mut self, ptid: Ptid) {
        let mut state = self.state.borrow_mut();
        state.threads.insert(ptid, ThreadFlags::default());
        state.created.push(ptid);
    }

    fn delete_thread_silent(&mut self, ptid: Ptid) {
        let mut state = self.state.borrow_mut();
        if state.threads.remove(&ptid).is_some() {
            state.deleted.push(ptid);
        }
    }

    fn set_running(&mut self, ptid: Ptid, running: bool) {
        if let Some(flags) = self.state.borrow_mut().threads.get_mut(&ptid) {
            flags.running = running;
        }
    }

    fn set_executing(&mut self, ptid: Ptid, executing: bool) {
        if let Some(flags) = self.state.borrow_mut().threads.get_mut(&ptid) {
            flags.executing = executing;
        }
    }

    fn selected_thread(&self) -> Ptid {
        self.state.borrow().selected
    }

    fn read_pc(&mut self, ptid: Ptid) -> Result<u64> {
        self.state
            .borrow()
            .pcs
            .get(&ptid)
            .copied()
            .ok_or_else(|| anyhow!("no PC recorded for {ptid}"))
    }

    fn write_pc(&mut self, ptid: Ptid, pc: u64) -> Result<()> {
        self.state.borrow_mut().pcs.insert(ptid, pc);
        Ok(())
    }

    fn decr_pc_after_break(&self, _ptid: Ptid) -> u64 {
        self.state.borrow().decr_pc_after_break
    }

    fn register_count(&self, _ptid: Ptid) -> usize {
        self.state.borrow().registers.len()
    }

    fn register_desc(&self, _ptid: Ptid, regno: usize) -> Option<RegisterDesc> {
        self.state.borrow().registers.get(regno).cloned()
    }

    fn supply_register(&mut self, ptid: Ptid, regno: usize, value: &[u8]) {
        self.state
            .borrow_mut()
            .regcache
            .insert((ptid, regno), value.to_vec());
    }

    fn collect_register(&self, ptid: Ptid, regno: usize) -> Vec<u8> {
        let state = self.state.borrow();
        match state.regcache.get(&(ptid, regno)) {
            Some(value) => value.clone(),
            None => vec![0; state.registers.get(regno).map_or(0, |d| d.size)],
        }
    }

    fn invalidate_register(&mut self, ptid: Ptid, regno: usize) {
        let mut state = self.state.borrow_mut();
        state.regcache.remove(&(ptid, regno));
        state.invalidated.push((ptid, regno));
    }

    fn resolve_code_address(&self, pid: Pid, address: u64) -> bool {
        self.state
            .borrow()
            .code_ranges
            .iter()
            .any(|(owner, range)| *owner == pid && range.contains(&address))
    }

    fn install_breakpoint(&mut self, pid: Pid, address: u64) -> Result<CoreBreakpoint> {
        let mut state = self.state.borrow_mut();
        if state.fail_install {
            bail!("cannot insert breakpoint at {address:#x}");
        }
        let id = state.next_breakpoint;
        state.next_breakpoint += 1;
        state.breakpoints.insert(id, (pid, address));
        Ok(CoreBreakpoint(id))
    }

    fn delete_breakpoint(&mut self, breakpoint: CoreBreakpoint) {
        self.state.borrow_mut().breakpoints.remove(&breakpoint.0);
    }

    fn remove_breakpoints_inf(&mut self, pid: Pid) {
        self.state.borrow_mut().removed_inferiors.push(pid);
    }

    fn handle_solib_event(&mut self, pid: Pid) -> Result<()> {
        self.state.borrow_mut().solib_events.push(pid);
        Ok(())
    }

    fn push_target(&mut self, pid: Pid) {
        self.state.borrow_mut().pushed.insert(pid);
    }

    fn unpush_target(&mut self, pid: Pid) {
        self.state.borrow_mut().pushed.remove(&pid);
    }

    fn create_async_event(&mut self, name: &str) -> AsyncEvent {
        let mut state = self.state.borrow_mut();
        let id = state.next_async_event;
        state.next_async_event += 1;
        state.async_events.insert(
            id,
            NamedEvent {
                name: name.to_owned(),
                marked: false,
            },
        );
        AsyncEvent(id)
    }

    fn mark_async_event(&mut self, event: AsyncEvent) {
        if let Some(entry) = self.state.borrow_mut().async_events.get_mut(&event.0) {
            entry.marked = true;
        }
    }

    fn clear_async_event(&mut self, event: AsyncEvent) {
        if let Some(entry) = self.state.borrow_mut().async_events.get_mut(&event.0) {
            entry.marked = false;
        }
    }

    fn async_event_marked(&self, event: AsyncEvent) -> bool {
        self.state
            .borrow()
            .async_events
            .get(&event.0)
            .is_some_and(|entry| entry.marked)
    }

    fn delete_async_event(&mut self, event: AsyncEvent) {
        self.state.borrow_mut().async_events.remove(&event.0);
    }

    fn add_file_handler(&mut self, fd: NotifierFd, pid: Pid, name: &str) {
        self.state
            .borrow_mut()
            .file_handlers
            .insert(fd, (pid, name.to_owned()));
    }

    fn delete_file_handler(&mut self, fd: NotifierFd) {
        self.state.borrow_mut().file_handlers.remove(&fd);
    }
}

/// Driver-side view of a [`SimHost`].
#[derive(Clone)]
pub struct SimHostHandle {
    state: Rc<RefCell<HostState>>,
}

impl SimHostHandle {
    pub fn select(&self, ptid: Ptid) {
        self.state.borrow_mut().selected = ptid;
    }

    pub fn set_pc(&self, ptid: Ptid, pc: u64) {
        self.state.borrow_mut().pcs.insert(ptid, pc);
    }

    pub fn pc(&self, ptid: Ptid) -> Option<u64> {
        self.state.borrow().pcs.get(&ptid).copied()
    }

    pub fn set_decr_pc_after_break(&self, bytes: u64) {
        self.state.borrow_mut().decr_pc_after_break = bytes;
    }

    /// Make `range` resolvable as code of `pid`.
    pub fn add_code_range(&self, pid: Pid, range: Range<u64>) {
        self.state.borrow_mut().code_ranges.push((pid, range));
    }

    pub fn fail_breakpoint_install(&self, fail: bool) {
        self.state.borrow_mut().fail_install = fail;
    }

    pub fn set_cached_register(&self, ptid: Ptid, regno: usize, value: &[u8]) {
        self.state
            .borrow_mut()
            .regcache
            .insert((ptid, regno), value.to_vec());
    }

    pub fn cached_register(&self, ptid: Ptid, regno: usize) -> Option<Vec<u8>> {
        self.state.borrow().regcache.get(&(ptid, regno)).cloned()
    }

    /// Registers invalidated so far, in order.
    pub fn invalidated(&self) -> Vec<(Ptid, usize)> {
        self.state.borrow().invalidated.clone()
    }

    pub fn thread(&self, ptid: Ptid) -> Option<ThreadFlags> {
        self.state.borrow().threads.get(&ptid).copied()
    }

    pub fn threads(&self) -> Vec<Ptid> {
        self.state.borrow().threads.keys().copied().collect()
    }

    pub fn created(&self) -> Vec<Ptid> {
        self.state.borrow().created.clone()
    }

    pub fn deleted(&self) -> Vec<Ptid> {
        self.state.borrow().deleted.clone()
    }

    /// Installed breakpoints as `(core breakpoint, pid, address)`.
    pub fn breakpoints(&self) -> Vec<(CoreBreakpoint, Pid, u64)> {
        self.state
            .borrow()
            .breakpoints
            .iter()
            .map(|(&id, &(pid, address))| (CoreBreakpoint(id), pid, address))
            .collect()
    }

    pub fn removed_inferiors(&self) -> Vec<Pid> {
        self.state.borrow().removed_inferiors.clone()
    }

    pub fn solib_events(&self) -> Vec<Pid> {
        self.state.borrow().solib_events.clone()
    }

    pub fn is_pushed(&self, pid: Pid) -> bool {
        self.state.borrow().pushed.contains(&pid)
    }

    /// Async events by name with their marked flag.
    pub fn async_events(&self) -> Vec<(String, bool)> {
        self.state
            .borrow()
            .async_events
            .values()
            .map(|e| (e.name.clone(), e.marked))
            .collect()
    }

    pub fn async_event_marked(&self, name: &str) -> bool {
        self.state
            .borrow()
            .async_events
            .values()
            .any(|e| e.name == name && e.marked)
    }

    /// Registered file handlers as `(fd, pid)`.
    pub fn file_handlers(&self) -> Vec<(NotifierFd, Pid)> {
        self.state
            .borrow()
            .file_handlers
            .iter()
            .map(|(&fd, &(pid, _))| (fd, pid))
            .collect()
    }
}

impl std::fmt::Debug for SimHostHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("SimHostHandle")
            .field("selected", &state.selected)
            .field("threads", &state.threads.len())
            .field("breakpoints", &state.breakpoints.len())
            .finish()
    }
}
