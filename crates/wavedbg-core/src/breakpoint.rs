//! Breakpoint bridge map: library breakpoint handles to core breakpoints.
//!
//! Entries are created when the library asks for a breakpoint, destroyed
//! when it asks for removal, and dropped en masse on detach. The core
//! breakpoints are referenced, not owned: deleting them is the caller's job.
//!
//! The map is touched from callbacks re-entered inside library calls, so it
//! only supports keyed insert, erase and lookup. The reverse index lets a
//! hit be resolved to its handle without walking the map.

use std::collections::HashMap;

use crate::host::CoreBreakpoint;
use crate::library::BreakpointId;

#[derive(Debug, Clone, Default)]
pub struct BreakpointBridge {
    by_handle: HashMap<BreakpointId, CoreBreakpoint>,
    by_core: HashMap<CoreBreakpoint, BreakpointId>,
}

impl BreakpointBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, handle: BreakpointId) -> bool {
        self.by_handle.contains_key(&handle)
    }

    /// Record a mapping. Returns `false` without changing anything if
    /// `handle` is already mapped.
    pub fn insert(&mut self, handle: BreakpointId, breakpoint: CoreBreakpoint) -> bool {
        if self.contains(handle) {
            return false;
        }
        self.by_handle.insert(handle, breakpoint);
        self.by_core.insert(breakpoint, handle);
        true
    }

    /// Erase a mapping, returning the core breakpoint it referenced.
    pub fn remove(&mut self, handle: BreakpointId) -> Option<CoreBreakpoint> {
        let breakpoint = self.by_handle.remove(&handle)?;
        self.by_core.remove(&breakpoint);
        Some(breakpoint)
    }

    pub fn core_breakpoint(&self, handle: BreakpointId) -> Option<CoreBreakpoint> {
        self.by_handle.get(&handle).copied()
    }

    /// The library handle behind a core breakpoint.
    pub fn handle_for(&self, breakpoint: CoreBreakpoint) -> Option<BreakpointId> {
        self.by_core.get(&breakpoint).copied()
    }

    /// Empty the map, returning every core breakpoint it referenced.
    pub fn take_all(&mut self) -> Vec<CoreBreakpoint> {
        self.by_core.clear();
        self.by_handle.drain().map(|(_, bp)| bp).collect()
    }

    pub fn len(&self) -> usize {
        self.by_handle.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_handle.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_remove_leaves_map_empty() {
        let mut bridge = BreakpointBridge::new();
        assert!(bridge.insert(BreakpointId(1), CoreBreakpoint(10)));
        assert_eq!(bridge.handle_for(CoreBreakpoint(10)), Some(BreakpointId(1)));

        assert_eq!(bridge.remove(BreakpointId(1)), Some(CoreBreakpoint(10)));
        assert!(bridge.is_empty());
        assert_eq!(bridge.handle_for(CoreBreakpoint(10)), None);
    }

    #[test]
    fn duplicate_handle_is_rejected() {
        let mut bridge = BreakpointBridge::new();
        assert!(bridge.insert(BreakpointId(1), CoreBreakpoint(10)));
        assert!(!bridge.insert(BreakpointId(1), CoreBreakpoint(11)));
        assert_eq!(bridge.core_breakpoint(BreakpointId(1)), Some(CoreBreakpoint(10)));
        assert_eq!(bridge.handle_for(CoreBreakpoint(11)), None);
        assert_eq!(bridge.len(), 1);
    }

    #[test]
    fn removing_unknown_handle_is_none() {
        let mut bridge = BreakpointBridge::new();
        assert_eq!(bridge.remove(BreakpointId(3)), None);
    }

    #[test]
    fn take_all_empties_both_directions() {
        let mut bridge = BreakpointBridge::new();
        bridge.insert(BreakpointId(1), CoreBreakpoint(10));
        bridge.insert(BreakpointId(2), CoreBreakpoint(20));

        let mut taken = bridge.take_all();
        taken.sort_by_key(|bp| bp.0);
        assert_eq!(taken, vec![CoreBreakpoint(10), CoreBreakpoint(20)]);
        assert!(bridge.is_empty());
        assert_eq!(bridge.handle_for(CoreBreakpoint(20)), None);
    }
}
