//! The GPU target adapter, the object the debugger core calls.
//!
//! [`GpuTarget`] sits between the debugger core and the beneath-target.
//! Requests for host threads are delegated beneath unchanged; requests
//! for wave pseudo-threads are translated into vendor library calls.
//!
//! # Architecture
//!
//! ```text
//! DebuggerCore
//!     |  wait / resume / stop / commit_resumed / update_thread_list
//!     |  registers / memory / breakpoint_hit / handle_notifier
//!     v
//! GpuTarget
//!     |-- SessionTable ----- Session (per pid)
//!     |                        |-- WaveRegistry
//!     |                        |-- BreakpointBridge
//!     |                        '-- pending events (FIFO)
//!     |
//!     |-- DebugLibrary  <-- Callbacks { sessions, core } (re-entrant)
//!     '-- BeneathTarget (host threads)
//! ```
//!
//! The implementation is split by concern: session lifecycle (`attach`),
//! event drain and `wait` (`events`), resume/stop and forward progress
//! (`resume`), wave pseudo-threads (`threads`), the notifier and async
//! event (`notify`), breakpoint hits (`breakpoints`) and register/memory
//! access (`regs`).

mod attach;
mod breakpoints;
mod callbacks;
mod events;
mod notify;
mod regs;
mod resume;
mod threads;

pub use callbacks::LIBRARY_LOG_TARGET;
pub use threads::ThreadArchitecture;

use tracing::{debug, info, warn};

use crate::config::AdapterConfig;
use crate::error::{Result, TargetError};
use crate::host::{AsyncEvent, BeneathTarget, DebuggerCore};
use crate::library::{DebugLibrary, LogLevel, MemoryPrecision, Status, Version};
use crate::ptid::Pid;
use crate::session::{PreciseMemory, Session, SessionTable};
use crate::signal::Signal;

use callbacks::Callbacks;

/// Library major version this adapter is built against.
pub const SUPPORTED_VERSION_MAJOR: u32 = 0;

/// Oldest library minor version this adapter works with.
pub const SUPPORTED_VERSION_MINOR: u32 = 76;

/// Name of the shared async event registered with the event loop.
pub const ASYNC_EVENT_NAME: &str = "amd-dbgapi";

/// Name used when registering session notifiers with the event loop.
const NOTIFIER_HANDLER_NAME: &str = "amd-dbgapi notifier";

/// Check that `version` is compatible with this adapter.
pub fn check_library_version(version: Version) -> Result<()> {
    if version.major != SUPPORTED_VERSION_MAJOR || version.minor < SUPPORTED_VERSION_MINOR {
        return Err(TargetError::VersionMismatch {
            got: version,
            need_major: SUPPORTED_VERSION_MAJOR,
            need_minor: SUPPORTED_VERSION_MINOR,
        });
    }
    Ok(())
}

/// The GPU target adapter.
pub struct GpuTarget {
    lib: Box<dyn DebugLibrary>,
    core: Box<dyn DebuggerCore>,
    beneath: Box<dyn BeneathTarget>,
    sessions: SessionTable,
    config: AdapterConfig,
    async_event: Option<AsyncEvent>,
    report_thread_events: bool,
    /// Wave tid and ELF machine of the last architecture lookup. Cleared
    /// when the library resets, since wave handles are then reissued.
    cached_architecture: Option<(u64, u32)>,
}

impl GpuTarget {
    /// Check the library version, initialize the library and apply the
    /// configured log level.
    pub fn new(
        mut lib: Box<dyn DebugLibrary>,
        core: Box<dyn DebuggerCore>,
        beneath: Box<dyn BeneathTarget>,
        config: AdapterConfig,
    ) -> Result<Self> {
        let version = lib.version();
        check_library_version(version)?;

        lib.initialize()
            .map_err(|status| TargetError::library("initialize", status))?;
        if let Err(status) = lib.set_log_level(config.library_log_level) {
            warn!(%status, level = %config.library_log_level, "could not set library log level");
        }
        info!(library = lib.name(), %version, "debug library initialized");

        Ok(Self {
            lib,
            core,
            beneath,
            sessions: SessionTable::new(),
            config,
            async_event: None,
            report_thread_events: false,
            cached_architecture: None,
        })
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    pub fn session(&self, pid: Pid) -> Option<&Session> {
        self.sessions.get(pid)
    }

    pub fn library(&self) -> &dyn DebugLibrary {
        self.lib.as_ref()
    }

    /// The shared async event, present while async mode is enabled.
    pub fn async_event(&self) -> Option<AsyncEvent> {
        self.async_event
    }

    pub fn is_async_enabled(&self) -> bool {
        self.async_event.is_some()
    }

    pub fn reports_thread_events(&self) -> bool {
        self.report_thread_events
    }

    /// Borrow the library together with the callbacks it may re-enter.
    fn split(&mut self) -> (&mut dyn DebugLibrary, Callbacks<'_>) {
        (
            self.lib.as_mut(),
            Callbacks {
                sessions: &mut self.sessions,
                core: self.core.as_mut(),
            },
        )
    }

    fn mark_async_event(&mut self) {
        if let Some(event) = self.async_event {
            self.core.mark_async_event(event);
        }
    }

    // -----------------------------------------------------------------------
    // Library singleton
    // -----------------------------------------------------------------------

    /// Finalize and re-initialize the library once no session is attached,
    /// so handle numbering starts over.
    fn maybe_reset_library(&mut self) -> Result<()> {
        if !self.config.reset_library_on_last_detach || self.sessions.any_attached() {
            return Ok(());
        }

        debug!("no session attached, resetting debug library");
        self.cached_architecture = None;
        self.lib
            .finalize()
            .map_err(|status| TargetError::library("finalize", status))?;
        self.lib
            .initialize()
            .map_err(|status| TargetError::library("initialize", status))?;
        if let Err(status) = self.lib.set_log_level(self.config.library_log_level) {
            warn!(%status, "could not restore library log level");
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Settings
    // -----------------------------------------------------------------------

    pub fn library_log_level(&self) -> LogLevel {
        self.config.library_log_level
    }

    pub fn set_library_log_level(&mut self, level: LogLevel) -> Result<()> {
        self.config.library_log_level = level;
        self.lib
            .set_log_level(level)
            .map_err(|status| TargetError::library("set_log_level", status))
    }

    /// Precise memory reporting for `pid`; unknown processes report the
    /// configured default.
    pub fn precise_memory(&self, pid: Pid) -> PreciseMemory {
        self.sessions
            .get(pid)
            .map(Session::precise_memory)
            .unwrap_or(PreciseMemory {
                requested: self.config.precise_memory,
                enabled: false,
            })
    }

    /// Record the precise memory request for `pid` and apply it right away
    /// when attached.
    pub fn set_precise_memory(&mut self, pid: Pid, requested: bool) -> Result<()> {
        let session = self.sessions.get_or_insert(pid, self.config.precise_memory);
        session.precise_memory.requested = requested;
        if session.is_attached() {
            self.apply_memory_precision(pid)?;
        }
        Ok(())
    }

    /// Push the session's requested memory precision to the library.
    fn apply_memory_precision(&mut self, pid: Pid) -> Result<()> {
        let Self { lib, sessions, .. } = self;
        let Some(session) = sessions.get_mut(pid) else {
            return Ok(());
        };
        let Some(process) = session.process() else {
            return Ok(());
        };

        let requested = session.precise_memory.requested;
        let precision = if requested {
            MemoryPrecision::Precise
        } else {
            MemoryPrecision::None
        };
        match lib.set_memory_precision(process, precision) {
            Ok(()) => {
                session.precise_memory.enabled = requested;
                Ok(())
            }
            Err(Status::NotSupported) => {
                warn!(pid, "AMDGPU precise memory access reporting could not be enabled");
                Ok(())
            }
            Err(status) => Err(TargetError::library("set_memory_precision", status)),
        }
    }

    /// Called when the core reports a signal for the selected thread.
    ///
    /// Returns `true` (after warning) when a memory-violation signal was
    /// reported for a wave while precise memory reporting is off, meaning
    /// the reported location may be inaccurate.
    pub fn signal_received(&self, signal: Signal) -> bool {
        let selected = self.core.selected_thread();
        let Some(session) = self.sessions.get(selected.pid()) else {
            return false;
        };
        if !session.is_attached() || !selected.is_wave() {
            return false;
        }
        if !matches!(signal, Signal::Segv | Signal::Bus) {
            return false;
        }
        if session.precise_memory.enabled {
            return false;
        }
        warn!(
            pid = selected.pid(),
            "precise memory violation signal reporting is not enabled, reported location may not be accurate"
        );
        true
    }

    /// Release the shared async event, if any.
    pub fn close(&mut self) {
        if let Some(event) = self.async_event.take() {
            self.core.delete_async_event(event);
        }
    }
}

impl std::fmt::Debug for GpuTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuTarget")
            .field("library", &self.lib.name())
            .field("sessions", &self.sessions.len())
            .field("async_event", &self.async_event)
            .field("report_thread_events", &self.report_thread_events)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(major: u32, minor: u32) -> Version {
        Version {
            major,
            minor,
            patch: 0,
        }
    }

    #[test]
    fn accepts_supported_and_newer_minor() {
        check_library_version(version(SUPPORTED_VERSION_MAJOR, SUPPORTED_VERSION_MINOR)).unwrap();
        check_library_version(version(SUPPORTED_VERSION_MAJOR, SUPPORTED_VERSION_MINOR + 4))
            .unwrap();
    }

    #[test]
    fn rejects_older_minor() {
        let err = check_library_version(version(SUPPORTED_VERSION_MAJOR, SUPPORTED_VERSION_MINOR - 1))
            .unwrap_err();
        assert!(matches!(err, TargetError::VersionMismatch { .. }));
        assert!(err.to_string().contains("need 0.76+"));
    }

    #[test]
    fn rejects_other_major() {
        assert!(check_library_version(version(SUPPORTED_VERSION_MAJOR + 1, 0)).is_err());
    }
}
