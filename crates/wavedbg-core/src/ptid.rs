//! Thread identities as the debugger core sees them.
//!
//! A [`Ptid`] is a `(pid, lwp, tid)` triple. Waves are exposed as
//! pseudo-threads `(pid, 1, wave_handle)`; host threads use the layout of
//! the beneath-target. [`Ptid::ALL`] and [`Ptid::process`] are the scope
//! filters used by `wait`, `resume` and `stop`.

use std::fmt;

use crate::library::WaveId;

/// OS process id.
pub type Pid = i32;

/// The `lwp` value that marks a pseudo-thread as a wave.
const WAVE_LWP: i64 = 1;

/// A thread identity, or a filter over thread identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ptid {
    pid: Pid,
    lwp: i64,
    tid: u64,
}

impl Ptid {
    /// Matches every thread of every process.
    pub const ALL: Ptid = Ptid {
        pid: -1,
        lwp: 0,
        tid: 0,
    };

    pub const fn new(pid: Pid, lwp: i64, tid: u64) -> Self {
        Self { pid, lwp, tid }
    }

    /// Matches every thread of `pid`.
    pub const fn process(pid: Pid) -> Self {
        Self::new(pid, 0, 0)
    }

    /// The pseudo-thread for `wave` in process `pid`.
    pub const fn wave(pid: Pid, wave: WaveId) -> Self {
        Self::new(pid, WAVE_LWP, wave.0)
    }

    pub const fn pid(&self) -> Pid {
        self.pid
    }

    pub const fn lwp(&self) -> i64 {
        self.lwp
    }

    pub const fn tid(&self) -> u64 {
        self.tid
    }

    pub fn is_all(&self) -> bool {
        *self == Self::ALL
    }

    /// Whether this is a whole-process filter.
    pub fn is_pid(&self) -> bool {
        !self.is_all() && self.pid != 0 && self.lwp == 0 && self.tid == 0
    }

    /// Whether this identifies a wave pseudo-thread.
    pub fn is_wave(&self) -> bool {
        self.pid != 1 && self.lwp == WAVE_LWP
    }

    /// The wave handle of a wave pseudo-thread.
    pub fn wave_id(&self) -> WaveId {
        debug_assert!(self.is_wave(), "{self} is not a wave");
        WaveId(self.tid)
    }

    /// The process this identity or filter is restricted to, if any.
    pub fn scope_pid(&self) -> Option<Pid> {
        if self.is_all() { None } else { Some(self.pid) }
    }

    /// Whether this thread is selected by `filter`.
    pub fn matches(&self, filter: Ptid) -> bool {
        filter.is_all() || (filter.is_pid() && self.pid == filter.pid) || *self == filter
    }
}

impl fmt::Display for Ptid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_all() {
            f.write_str("all")
        } else if self.is_pid() {
            write!(f, "process {}", self.pid)
        } else {
            write!(f, "{}.{}.{}", self.pid, self.lwp, self.tid)
        }
    }
}
