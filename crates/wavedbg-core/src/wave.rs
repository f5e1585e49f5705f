//! Wave registry: per-wave cached coordinates and resume bookkeeping.
//!
//! A [`Wave`] is registered the first time the adapter sees it (in a stop
//! event or a thread-list refresh) and stays registered until its
//! termination has been processed. Coordinates are fetched once, best
//! effort, because they are still needed to name the wave after it exits.
//!
//! [`WaveRegistry::reconcile`] computes how a fresh wave list changes the
//! registry: waves that vanished are only dropped right away when no
//! termination event is guaranteed for them.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::library::{AgentId, DebugLibrary, DispatchId, QueueId, ResumeMode, WaveId};

/// Where a wave runs. Each field is `None` until successfully fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaveCoordinates {
    pub wave: WaveId,
    pub agent: Option<AgentId>,
    pub queue: Option<QueueId>,
    pub dispatch: Option<DispatchId>,
    pub workgroup: Option<[u32; 3]>,
    pub index_in_group: Option<u32>,
}

impl WaveCoordinates {
    /// Coordinates with every field unknown.
    pub fn unknown(wave: WaveId) -> Self {
        Self {
            wave,
            agent: None,
            queue: None,
            dispatch: None,
            workgroup: None,
            index_in_group: None,
        }
    }

    /// Query every coordinate from the library. Failed queries leave the
    /// field unknown.
    pub fn fetch(lib: &dyn DebugLibrary, wave: WaveId) -> Self {
        Self {
            wave,
            agent: lib.wave_agent(wave).ok(),
            queue: lib.wave_queue(wave).ok(),
            dispatch: lib.wave_dispatch(wave).ok(),
            workgroup: lib.wave_workgroup_coords(wave).ok(),
            index_in_group: lib.wave_number_in_group(wave).ok(),
        }
    }
}

impl fmt::Display for WaveCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AMDGPU Wave")?;
        match self.agent {
            Some(agent) => write!(f, " {}", agent.0)?,
            None => f.write_str(" ?")?,
        }
        match self.queue {
            Some(queue) => write!(f, ":{}", queue.0)?,
            None => f.write_str(":?")?,
        }
        match self.dispatch {
            Some(dispatch) => write!(f, ":{}", dispatch.0)?,
            None => f.write_str(":?")?,
        }
        write!(f, ":{}", self.wave.0)?;
        match self.workgroup {
            Some([x, y, z]) => write!(f, " ({x},{y},{z})")?,
            None => f.write_str(" (?,?,?)")?,
        }
        match self.index_in_group {
            Some(index) => write!(f, "/{index}"),
            None => f.write_str("/?"),
        }
    }
}

/// A known wave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wave {
    coords: WaveCoordinates,
    /// The mode passed to the last resume of this wave. A wave that
    /// terminates while single-stepping always reports a
    /// command-terminated event.
    pub last_resume_mode: ResumeMode,
    /// Set between a successful stop request and observing its
    /// completion. A wave that terminates while being stopped also
    /// reports a command-terminated event.
    pub stopping: bool,
}

impl Wave {
    pub fn new(coords: WaveCoordinates) -> Self {
        Self {
            coords,
            last_resume_mode: ResumeMode::Normal,
            stopping: false,
        }
    }

    pub fn id(&self) -> WaveId {
        self.coords.wave
    }

    pub fn coords(&self) -> &WaveCoordinates {
        &self.coords
    }

    /// Whether a termination event is guaranteed for this wave, meaning it
    /// must stay registered until that event is processed.
    pub fn awaits_termination_event(&self) -> bool {
        self.last_resume_mode == ResumeMode::SingleStep || self.stopping
    }
}

/// How a fresh wave list differs from the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Listed waves the registry does not know yet.
    pub added: Vec<WaveId>,
    /// Known waves that vanished and can be removed now.
    pub removed: Vec<WaveId>,
    /// Known waves that vanished but must wait for their termination event.
    pub retained: Vec<WaveId>,
}

impl Reconciliation {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.retained.is_empty()
    }
}

/// The waves of one session, keyed by library handle.
#[derive(Debug, Clone, Default)]
pub struct WaveRegistry {
    waves: HashMap<WaveId, Wave>,
}

impl WaveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a wave. Returns `false` (and keeps the existing entry) if
    /// the handle is already registered.
    pub fn insert(&mut self, wave: Wave) -> bool {
        match self.waves.entry(wave.id()) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(wave);
                true
            }
        }
    }

    pub fn get(&self, id: WaveId) -> Option<&Wave> {
        self.waves.get(&id)
    }

    pub fn get_mut(&mut self, id: WaveId) -> Option<&mut Wave> {
        self.waves.get_mut(&id)
    }

    pub fn remove(&mut self, id: WaveId) -> Option<Wave> {
        self.waves.remove(&id)
    }

    pub fn contains(&self, id: WaveId) -> bool {
        self.waves.contains_key(&id)
    }

    /// Registered handles in ascending order.
    pub fn ids(&self) -> Vec<WaveId> {
        let mut ids: Vec<WaveId> = self.waves.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn iter(&self) -> impl Iterator<Item = &Wave> {
        self.waves.values()
    }

    pub fn len(&self) -> usize {
        self.waves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waves.is_empty()
    }

    /// Diff the registry against `current`, the library's full wave list.
    pub fn reconcile(&self, current: &[WaveId]) -> Reconciliation {
        let listed: HashSet<WaveId> = current.iter().copied().collect();
        let mut result = Reconciliation::default();

        for id in self.ids() {
            if listed.contains(&id) {
                continue;
            }
            let wave = &self.waves[&id];
            if wave.awaits_termination_event() {
                result.retained.push(id);
            } else {
                result.removed.push(id);
            }
        }

        let mut seen = HashSet::new();
        for &id in current {
            if !self.contains(id) && seen.insert(id) {
                result.added.push(id);
            }
        }

        result
    }
}
