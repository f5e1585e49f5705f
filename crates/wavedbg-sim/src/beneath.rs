//! In-memory beneath-target.
//!
//! `wait` hands out scripted outcomes in order and falls back to an idle
//! status once they run out. Everything else is recorded.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use anyhow::{Result, anyhow};

use wavedbg_core::host::{BeneathTarget, WaitOutcome};
use wavedbg_core::{Pid, Ptid, Signal, WaitStatus};

/// Architecture name reported for host threads.
pub const HOST_ARCHITECTURE: &str = "i386:x86-64";

/// A recorded `resume` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumeCall {
    pub scope: Ptid,
    pub step: bool,
    pub signal: Signal,
}

#[derive(Debug)]
struct BeneathState {
    outcomes: VecDeque<WaitOutcome>,
    idle: WaitStatus,
    can_async: bool,
    is_async: bool,
    thread_events: bool,
    threads: BTreeMap<Ptid, String>,
    memory: BTreeMap<u64, u8>,
    resumes: Vec<ResumeCall>,
    stops: Vec<Ptid>,
    commits: usize,
    thread_list_updates: usize,
    register_fetches: Vec<(Ptid, Option<usize>)>,
    register_stores: Vec<(Ptid, Option<usize>)>,
    sw_breakpoint_stops: Vec<Ptid>,
    detached: Vec<Pid>,
    mourned: Vec<Pid>,
}

impl Default for BeneathState {
    fn default() -> Self {
        Self {
            outcomes: VecDeque::new(),
            idle: WaitStatus::NoResumed,
            can_async: true,
            is_async: false,
            thread_events: false,
            threads: BTreeMap::new(),
            memory: BTreeMap::new(),
            resumes: Vec::new(),
            stops: Vec::new(),
            commits: 0,
            thread_list_updates: 0,
            register_fetches: Vec::new(),
            register_stores: Vec::new(),
            sw_breakpoint_stops: Vec::new(),
            detached: Vec::new(),
            mourned: Vec::new(),
        }
    }
}

/// The simulated beneath-target, as owned by the adapter.
pub struct SimBeneath {
    state: Rc<RefCell<BeneathState>>,
}

impl SimBeneath {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(BeneathState::default())),
        }
    }

    pub fn handle(&self) -> SimBeneathHandle {
        SimBeneathHandle {
            state: Rc::clone(&self.state),
        }
    }
}

impl Default for SimBeneath {
    fn default() -> Self {
        Self::new()
    }
}

impl BeneathTarget for SimBeneath {
    fn wait(&mut self, scope: Ptid) -> Result<WaitOutcome> {
        let mut state = self.state.borrow_mut();
        let idle = WaitOutcome::nothing(state.idle);
        let position = state
            .outcomes
            .iter()
            .position(|outcome| outcome.ptid.is_some_and(|ptid| ptid.matches(scope)));
        Ok(position
            .and_then(|i| state.outcomes.remove(i))
            .unwrap_or(idle))
    }

    fn resume(&mut self, scope: Ptid, step: bool, signal: Signal) -> Result<()> {
        self.state
            .borrow_mut()
            .resumes
            .push(ResumeCall { scope, step, signal });
        Ok(())
    }

    fn stop(&mut self, scope: Ptid) -> Result<()> {
        self.state.borrow_mut().stops.push(scope);
        Ok(())
    }

    fn commit_resumed(&mut self) -> Result<()> {
        self.state.borrow_mut().commits += 1;
        Ok(())
    }

    fn update_thread_list(&mut self) -> Result<()> {
        self.state.borrow_mut().thread_list_updates += 1;
        Ok(())
    }

    fn has_pending_events(&self) -> bool {
        !self.state.borrow().outcomes.is_empty()
    }

    fn can_async(&self) -> bool {
        self.state.borrow().can_async
    }

    fn is_async(&self) -> bool {
        self.state.borrow().is_async
    }

    fn set_async(&mut self, enable: bool) {
        self.state.borrow_mut().is_async = enable;
    }

    fn thread_events(&mut self, enable: bool) {
        self.state.borrow_mut().thread_events = enable;
    }

    fn thread_alive(&self, ptid: Ptid) -> bool {
        self.state.borrow().threads.contains_key(&ptid)
    }

    fn thread_name(&self, ptid: Ptid) -> Option<String> {
        self.state.borrow().threads.get(&ptid).cloned()
    }

    fn extra_thread_info(&self, ptid: Ptid) -> Option<String> {
        self.state
            .borrow()
            .threads
            .contains_key(&ptid)
            .then(|| "host".to_owned())
    }

    fn pid_to_str(&self, ptid: Ptid) -> String {
        if ptid.is_pid() {
            format!("process {}", ptid.pid())
        } else {
            format!("Thread {}.{}", ptid.pid(), ptid.lwp())
        }
    }

    fn thread_architecture(&mut self, _ptid: Ptid) -> Result<String> {
        Ok(HOST_ARCHITECTURE.to_owned())
    }

    fn fetch_registers(&mut self, ptid: Ptid, regno: Option<usize>) -> Result<()> {
        self.state.borrow_mut().register_fetches.push((ptid, regno));
        Ok(())
    }

    fn store_registers(&mut self, ptid: Ptid, regno: Option<usize>) -> Result<()> {
        self.state.borrow_mut().register_stores.push((ptid, regno));
        Ok(())
    }

    fn read_memory(&mut self, _ptid: Ptid, address: u64, buf: &mut [u8]) -> Result<usize> {
        let state = self.state.borrow();
        for (offset, byte) in buf.iter_mut().enumerate() {
            let at = address + offset as u64;
            *byte = *state
                .memory
                .get(&at)
                .ok_or_else(|| anyhow!("cannot access memory at {at:#x}"))?;
        }
        Ok(buf.len())
    }

    fn write_memory(&mut self, _ptid: Ptid, address: u64, data: &[u8]) -> Result<usize> {
        let mut state = self.state.borrow_mut();
        for (offset, &byte) in data.iter().enumerate() {
            state.memory.insert(address + offset as u64, byte);
        }
        Ok(data.len())
    }

    fn stopped_by_sw_breakpoint(&self, ptid: Ptid) -> bool {
        self.state.borrow().sw_breakpoint_stops.contains(&ptid)
    }

    fn stopped_by_hw_breakpoint(&self, _ptid: Ptid) -> bool {
        false
    }

    fn stopped_by_watchpoint(&self, _ptid: Ptid) -> bool {
        false
    }

    fn detach(&mut self, pid: Pid) -> Result<()> {
        self.state.borrow_mut().detached.push(pid);
        Ok(())
    }

    fn mourn(&mut self, pid: Pid) -> Result<()> {
        self.state.borrow_mut().mourned.push(pid);
        Ok(())
    }
}

/// Driver-side view of a [`SimBeneath`].
#[derive(Clone)]
pub struct SimBeneathHandle {
    state: Rc<RefCell<BeneathState>>,
}

impl SimBeneathHandle {
    /// Queue a host event for `wait` to report.
    pub fn push_event(&self, ptid: Ptid, status: WaitStatus) {
        self.state
            .borrow_mut()
            .outcomes
            .push_back(WaitOutcome::event(ptid, status));
    }

    /// What `wait` reports once scripted events run out.
    pub fn set_idle_status(&self, status: WaitStatus) {
        self.state.borrow_mut().idle = status;
    }

    pub fn set_can_async(&self, can_async: bool) {
        self.state.borrow_mut().can_async = can_async;
    }

    /// Set the async state directly, as when the core enabled it before
    /// the adapter was involved.
    pub fn set_is_async(&self, is_async: bool) {
        self.state.borrow_mut().is_async = is_async;
    }

    pub fn is_async(&self) -> bool {
        self.state.borrow().is_async
    }

    pub fn thread_events(&self) -> bool {
        self.state.borrow().thread_events
    }

    pub fn add_thread(&self, ptid: Ptid, name: &str) {
        self.state.borrow_mut().threads.insert(ptid, name.to_owned());
    }

    pub fn mark_sw_breakpoint_stop(&self, ptid: Ptid) {
        self.state.borrow_mut().sw_breakpoint_stops.push(ptid);
    }

    pub fn poke_memory(&self, address: u64, data: &[u8]) {
        let mut state = self.state.borrow_mut();
        for (offset, &byte) in data.iter().enumerate() {
            state.memory.insert(address + offset as u64, byte);
        }
    }

    pub fn resumes(&self) -> Vec<ResumeCall> {
        self.state.borrow().resumes.clone()
    }

    pub fn stops(&self) -> Vec<Ptid> {
        self.state.borrow().stops.clone()
    }

    pub fn commits(&self) -> usize {
        self.state.borrow().commits
    }

    pub fn thread_list_updates(&self) -> usize {
        self.state.borrow().thread_list_updates
    }

    pub fn register_fetches(&self) -> Vec<(Ptid, Option<usize>)> {
        self.state.borrow().register_fetches.clone()
    }

    pub fn register_stores(&self) -> Vec<(Ptid, Option<usize>)> {
        self.state.borrow().register_stores.clone()
    }

    pub fn detached(&self) -> Vec<Pid> {
        self.state.borrow().detached.clone()
    }

    pub fn mourned(&self) -> Vec<Pid> {
        self.state.borrow().mourned.clone()
    }
}

impl std::fmt::Debug for SimBeneathHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("SimBeneathHandle")
            .field("scripted", &state.outcomes.len())
            .field("is_async", &state.is_async)
            .finish()
    }
}
