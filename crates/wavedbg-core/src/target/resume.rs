//! Resume/stop coordination and the forward-progress toggle.
//!
//! Forward progress is suspended whenever the core starts working with a
//! subset of waves (`resume`, `stop`, `wait`) and restored by
//! `commit_resumed`. The session caches the last value sent so repeated
//! requests cost one library call; only the value in effect at commit time
//! matters.

use tracing::debug;

use crate::error::{Result, TargetError};
use crate::library::{Exception, Progress, ResumeMode, Status, WaveState};
use crate::ptid::Ptid;
use crate::signal::{Signal, WaitStatus, signal_to_exception};
use crate::wave::Wave;

use super::GpuTarget;

impl GpuTarget {
    /// Set the forward-progress requirement of every attached session in
    /// `scope`, skipping sessions already in that state.
    pub(crate) fn require_forward_progress(&mut self, scope: Ptid, require: bool) -> Result<()> {
        let Self { lib, sessions, .. } = self;
        for session in sessions.matching_mut(scope) {
            let Some(process) = session.process() else {
                continue;
            };
            if session.forward_progress_required == require {
                continue;
            }

            let progress = if require {
                Progress::Normal
            } else {
                Progress::NoForward
            };
            lib.process_set_progress(process, progress)
                .map_err(|status| TargetError::library("process_set_progress", status))?;
            session.forward_progress_required = require;
            debug!(pid = session.pid(), require, "forward progress changed");

            if !scope.is_all() {
                break;
            }
        }
        Ok(())
    }

    /// Resume the threads in `scope`.
    ///
    /// Only the selected thread steps or receives `signal`; every other
    /// wave resumes normally. Signals a wave cannot take are rejected before
    /// anything is resumed.
    pub fn resume(&mut self, scope: Ptid, step: bool, signal: Signal) -> Result<()> {
        debug!(%scope, step, %signal, "resume");

        let selected = self.core.selected_thread();
        let exception = if selected.is_wave() {
            signal_to_exception(signal).ok_or(TargetError::UnsupportedSignal(signal))?
        } else {
            Exception::None
        };

        if !selected.is_wave() || scope != selected {
            self.beneath.resume(scope, step, signal)?;
            if scope == selected {
                return Ok(());
            }
        }

        self.require_forward_progress(scope, false)?;

        let Self { lib, sessions, .. } = self;
        for session in sessions.matching_mut(scope) {
            let pid = session.pid();
            for id in session.waves.ids() {
                let ptid = Ptid::wave(pid, id);
                if !ptid.matches(scope) {
                    continue;
                }
                let Some(wave) = session.waves.get_mut(id) else {
                    continue;
                };

                let (mode, wave_exception) = if ptid == selected {
                    let mode = if step {
                        ResumeMode::SingleStep
                    } else {
                        ResumeMode::Normal
                    };
                    (mode, exception)
                } else {
                    (ResumeMode::Normal, Exception::None)
                };
                wave.last_resume_mode = mode;

                match lib.wave_resume(id, mode, wave_exception) {
                    // A wave that is gone counts as resumed; the process
                    // may have exited.
                    Ok(()) | Err(Status::InvalidWaveId) => {}
                    Err(status) => return Err(TargetError::library("wave_resume", status)),
                }
                wave.stopping = false;
            }
        }
        Ok(())
    }

    pub fn commit_resumed(&mut self) -> Result<()> {
        debug!("commit resumed");
        self.beneath.commit_resumed()?;
        self.require_forward_progress(Ptid::ALL, true)
    }

    /// Request a stop of the threads in `scope`.
    pub fn stop(&mut self, scope: Ptid) -> Result<()> {
        debug!(%scope, "stop");

        let many = scope.is_all() || scope.is_pid();
        if !scope.is_wave() || many {
            self.beneath.stop(scope)?;
            if !many {
                return Ok(());
            }
        }

        self.require_forward_progress(scope, false)?;

        if !many {
            return self.stop_wave(scope);
        }

        // Collected up front: stopping a wave may delete it.
        let targets: Vec<Ptid> = self
            .sessions
            .iter()
            .flat_map(|session| {
                let pid = session.pid();
                session
                    .waves
                    .ids()
                    .into_iter()
                    .map(move |id| Ptid::wave(pid, id))
            })
            .filter(|ptid| ptid.matches(scope))
            .collect();

        for ptid in targets {
            self.stop_wave(ptid)?;
        }
        Ok(())
    }

    fn stop_wave(&mut self, ptid: Ptid) -> Result<()> {
        let id = ptid.wave_id();

        match self.lib.wave_state(id) {
            Ok(WaveState::Stop) => return Ok(()),
            Ok(_) => match self.lib.wave_stop(id) {
                Ok(()) => {
                    self.wave_mut(ptid)?.stopping = true;
                    return Ok(());
                }
                Err(Status::InvalidWaveId) => {}
                Err(status) => return Err(TargetError::library("wave_stop", status)),
            },
            Err(Status::InvalidWaveId) => {}
            Err(status) => return Err(TargetError::library("wave_state", status)),
        }

        // The wave terminated since the last thread-list refresh.
        let report = self.report_thread_events;
        let wave = self.wave_mut(ptid)?;
        wave.stopping = true;
        let mode = wave.last_resume_mode;
        debug!(
            wave = %id,
            last_resume_mode = %mode,
            report_thread_events = report,
            "wave gone while stopping"
        );

        // A stepping wave always reports command-terminated; wait for it.
        if mode == ResumeMode::SingleStep {
            return Ok(());
        }

        if report {
            if let Some(session) = self.sessions.get_mut(ptid.pid()) {
                session.enqueue(ptid, WaitStatus::ThreadExited(0));
            }
            self.mark_async_event();
        }
        self.delete_wave(ptid);
        Ok(())
    }

    fn wave_mut(&mut self, ptid: Ptid) -> Result<&mut Wave> {
        self.sessions
            .get_mut(ptid.pid())
            .and_then(|session| session.waves.get_mut(ptid.wave_id()))
            .ok_or_else(|| TargetError::Invariant(format!("no wave registered for {ptid}")))
    }
}
