//! Wave pseudo-threads: creation, deletion, thread-list refresh and the
//! per-thread queries the core makes.

use tracing::debug;

use crate::error::{Result, TargetError};
use crate::library::{ProcessId, WaveId};
use crate::ptid::{Pid, Ptid};
use crate::wave::{Wave, WaveCoordinates};

use super::GpuTarget;

/// Architecture of a thread as reported by [`GpuTarget::thread_architecture`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadArchitecture {
    /// A host thread, named by the beneath-target.
    Host(String),
    /// A wave, identified by the ELF machine number of its ISA.
    Gpu { elf_machine: u32 },
}

impl GpuTarget {
    /// Register `wave` of `pid` and create its pseudo-thread.
    pub(crate) fn add_wave(&mut self, pid: Pid, wave: WaveId) -> Result<()> {
        let coords = WaveCoordinates::fetch(self.lib.as_ref(), wave);
        let session = self
            .sessions
            .get_mut(pid)
            .ok_or_else(|| TargetError::Invariant(format!("new wave for unknown pid {pid}")))?;
        if !session.waves.insert(Wave::new(coords)) {
            return Err(TargetError::Invariant(format!("{wave} already registered")));
        }

        // Created silently: there may be thousands of them.
        let ptid = Ptid::wave(pid, wave);
        self.core.add_thread_silent(ptid);
        self.core.set_running(ptid, true);
        self.core.set_executing(ptid, true);
        debug!(pid, %wave, "new wave");
        Ok(())
    }

    /// Delete a wave's pseudo-thread and forget the wave.
    pub(crate) fn delete_wave(&mut self, ptid: Ptid) {
        self.core.delete_thread_silent(ptid);
        if let Some(session) = self.sessions.get_mut(ptid.pid()) {
            session.waves.remove(ptid.wave_id());
        }
    }

    /// The core deleted a pseudo-thread; drop the wave it stood for.
    pub fn thread_deleted(&mut self, ptid: Ptid) {
        if !ptid.is_wave() {
            return;
        }
        if let Some(session) = self.sessions.get_mut(ptid.pid()) {
            if session.waves.remove(ptid.wave_id()).is_some() {
                debug!(%ptid, "wave deleted");
            }
        }
    }

    /// Reconcile every attached session's waves with the library, then let
    /// beneath refresh its own threads.
    pub fn update_thread_list(&mut self) -> Result<()> {
        let attached: Vec<(Pid, ProcessId)> = self
            .sessions
            .iter()
            .filter_map(|session| session.process().map(|process| (session.pid(), process)))
            .collect();

        for (pid, process) in attached {
            self.refresh_session(pid, process)?;
        }

        self.beneath.update_thread_list()?;
        Ok(())
    }

    fn refresh_session(&mut self, pid: Pid, process: ProcessId) -> Result<()> {
        let list = self
            .lib
            .wave_list(process)
            .map_err(|status| TargetError::library("wave_list", status))?;
        if !list.changed {
            return Ok(());
        }

        let Some(session) = self.sessions.get(pid) else {
            return Ok(());
        };
        let diff = session.waves.reconcile(&list.waves);

        // Stepping or stopping waves always report command-terminated.
        for &id in &diff.retained {
            if let Some(wave) = session.waves.get(id) {
                debug!(
                    pid,
                    wave = %id,
                    last_resume_mode = %wave.last_resume_mode,
                    stopping = wave.stopping,
                    "wave disappeared, keeping it"
                );
            }
        }
        for id in diff.removed {
            debug!(pid, wave = %id, "wave disappeared, deleting it");
            self.delete_wave(Ptid::wave(pid, id));
        }
        for id in diff.added {
            self.add_wave(pid, id)?;
        }
        Ok(())
    }

    pub fn thread_alive(&self, ptid: Ptid) -> bool {
        if !ptid.is_wave() {
            return self.beneath.thread_alive(ptid);
        }
        self.lib.wave_state(ptid.wave_id()).is_ok()
    }

    pub fn thread_name(&self, ptid: Ptid) -> Option<String> {
        if !ptid.is_wave() {
            return self.beneath.thread_name(ptid);
        }
        None
    }

    pub fn extra_thread_info(&self, ptid: Ptid) -> Option<String> {
        if !ptid.is_wave() {
            return self.beneath.extra_thread_info(ptid);
        }
        None
    }

    /// Describe a thread. An unregistered wave prints with every
    /// coordinate unknown.
    pub fn pid_to_str(&self, ptid: Ptid) -> String {
        if !ptid.is_wave() {
            return self.beneath.pid_to_str(ptid);
        }
        let id = ptid.wave_id();
        match self.sessions.get(ptid.pid()).and_then(|s| s.wave(id)) {
            Some(wave) => wave.coords().to_string(),
            None => WaveCoordinates::unknown(id).to_string(),
        }
    }

    pub fn thread_architecture(&mut self, ptid: Ptid) -> Result<ThreadArchitecture> {
        if !ptid.is_wave() {
            return Ok(ThreadArchitecture::Host(
                self.beneath.thread_architecture(ptid)?,
            ));
        }

        if let Some((tid, elf_machine)) = self.cached_architecture {
            if tid == ptid.tid() {
                return Ok(ThreadArchitecture::Gpu { elf_machine });
            }
        }

        let wave = ptid.wave_id();
        let architecture = self
            .lib
            .wave_architecture(wave)
            .map_err(|status| TargetError::library("wave_architecture", status))?;
        let elf_machine = self
            .lib
            .architecture_elf_machine(architecture)
            .map_err(|status| TargetError::library("architecture_elf_machine", status))?;

        self.cached_architecture = Some((ptid.tid(), elf_machine));
        Ok(ThreadArchitecture::Gpu { elf_machine })
    }
}
