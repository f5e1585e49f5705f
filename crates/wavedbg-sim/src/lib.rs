//! Simulated collaborators for driving a [`GpuTarget`] without a GPU.
//!
//! The three fakes implement the adapter's trait seams entirely in memory:
//!
//! - [`SimLibrary`]: the vendor debug library (processes, waves, events,
//!   breakpoints, registers, memory), with a real pipe as each process
//!   notifier.
//! - [`SimHost`]: the debugger core (threads, register cache, breakpoints,
//!   async events, file handlers, target stack).
//! - [`SimBeneath`]: the process-control target below the adapter.
//!
//! Each fake hands out a cloneable handle sharing its state, so a driver can
//! keep scripting and inspecting after the fake itself has been moved into
//! the adapter. [`SimRig`] wires all of it together.

pub mod beneath;
pub mod host;
pub mod library;

pub use beneath::{ResumeCall, SimBeneath, SimBeneathHandle};
pub use host::{SimHost, SimHostHandle, ThreadFlags};
pub use library::{LibraryCall, SimLibrary, SimLibraryHandle};

use wavedbg_core::library::NotifierFd;
use wavedbg_core::{AdapterConfig, GpuTarget, Pid};

/// An adapter wired to the three simulators, plus their handles.
#[derive(Debug)]
pub struct SimRig {
    pub target: GpuTarget,
    pub lib: SimLibraryHandle,
    pub host: SimHostHandle,
    pub beneath: SimBeneathHandle,
}

impl SimRig {
    /// Build a rig from fresh simulators.
    pub fn new(config: AdapterConfig) -> wavedbg_core::Result<Self> {
        Self::from_parts(SimLibrary::new(), SimHost::new(), SimBeneath::new(), config)
    }

    /// Build a rig from simulators a driver has already configured.
    pub fn from_parts(
        lib: SimLibrary,
        host: SimHost,
        beneath: SimBeneath,
        config: AdapterConfig,
    ) -> wavedbg_core::Result<Self> {
        let handles = (lib.handle(), host.handle(), beneath.handle());
        let target = GpuTarget::new(Box::new(lib), Box::new(host), Box::new(beneath), config)?;
        Ok(Self {
            target,
            lib: handles.0,
            host: handles.1,
            beneath: handles.2,
        })
    }

    /// One event-loop iteration: run the notifier handler of every
    /// registered notifier that is readable. Returns how many ran.
    pub fn pump_notifiers(&mut self) -> wavedbg_core::Result<usize> {
        let ready: Vec<Pid> = self
            .host
            .file_handlers()
            .into_iter()
            .filter(|&(fd, _)| is_readable(fd))
            .map(|(_, pid)| pid)
            .collect();
        for &pid in &ready {
            self.target.handle_notifier(pid)?;
        }
        Ok(ready.len())
    }
}

/// Whether `fd` has data to read right now.
#[cfg(unix)]
pub fn is_readable(fd: NotifierFd) -> bool {
    let mut pollfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    // SAFETY: `pollfd` is a valid array of one entry; timeout 0 never blocks.
    let ret = unsafe { libc::poll(&mut pollfd, 1, 0) };
    ret > 0 && pollfd.revents & libc::POLLIN != 0
}

#[cfg(not(unix))]
pub fn is_readable(_fd: NotifierFd) -> bool {
    false
}
