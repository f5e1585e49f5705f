//! The `DebugLibrary` trait: the adapter's view of the vendor debug API.
//!
//! A production build wraps the vendor's shared library behind this trait;
//! tests and the CLI's replay command use the in-memory simulator from the
//! `wavedbg-sim` crate. Both traits are object-safe so they can be stored
//! and passed as `dyn` objects.

use crate::ptid::{Pid, Ptid};

use super::status::Status;
use super::types::{
    AddressSpace, AgentId, ArchitectureId, BreakpointAction, BreakpointId, ClientProcessId,
    DispatchId, EventId, EventKind, Exception, LogLevel, MemoryPrecision, ProcessId, Progress,
    QueueId, RegisterId, ResumeMode, RuntimeState, StopReasons, Version, WaveId, WaveList,
    WaveState,
};

/// File descriptor the library signals when a process has pending events.
pub type NotifierFd = i32;

/// Services the client provides to the library.
///
/// The library invokes these synchronously from inside the calls that take
/// a `callbacks` argument (attach, detach, event polling, breakpoint-hit
/// reporting). Implementations must not call back into the library.
pub trait ClientCallbacks {
    /// Return the OS process id behind `client`.
    ///
    /// Fails with [`Status::ProcessExited`] once the process is gone.
    fn get_os_pid(&mut self, client: ClientProcessId) -> Result<Pid, Status>;

    /// Insert a breakpoint at `address` and remember it as `breakpoint`.
    fn insert_breakpoint(
        &mut self,
        client: ClientProcessId,
        address: u64,
        breakpoint: BreakpointId,
    ) -> Result<(), Status>;

    /// Remove a breakpoint previously inserted via [`Self::insert_breakpoint`].
    fn remove_breakpoint(
        &mut self,
        client: ClientProcessId,
        breakpoint: BreakpointId,
    ) -> Result<(), Status>;

    /// Receive a log message emitted by the library.
    fn log_message(&mut self, level: LogLevel, message: &str);
}

/// The vendor debug API.
///
/// Calls are synchronous and never block. Methods mirror the library's
/// entry points one to one; info queries are split into typed accessors.
pub trait DebugLibrary {
    /// Human-readable name of the implementation (e.g. "amd-dbgapi").
    fn name(&self) -> &str;

    /// Version of the loaded library.
    fn version(&self) -> Version;

    fn initialize(&mut self) -> Result<(), Status>;

    fn finalize(&mut self) -> Result<(), Status>;

    fn set_log_level(&mut self, level: LogLevel) -> Result<(), Status>;

    // -- processes ---------------------------------------------------------

    /// Attach to the process behind `client`.
    ///
    /// The library may ask the client to insert breakpoints before this
    /// returns.
    fn process_attach(
        &mut self,
        client: ClientProcessId,
        callbacks: &mut dyn ClientCallbacks,
    ) -> Result<ProcessId, Status>;

    /// Detach from `process`, removing any breakpoints it inserted.
    fn process_detach(
        &mut self,
        process: ProcessId,
        callbacks: &mut dyn ClientCallbacks,
    ) -> Result<(), Status>;

    /// The notifier descriptor for `process`.
    fn process_notifier(&self, process: ProcessId) -> Result<NotifierFd, Status>;

    /// The OS process id of `process`.
    fn process_os_pid(&self, process: ProcessId) -> Result<Pid, Status>;

    fn process_set_progress(&mut self, process: ProcessId, progress: Progress)
    -> Result<(), Status>;

    fn set_memory_precision(
        &mut self,
        process: ProcessId,
        precision: MemoryPrecision,
    ) -> Result<(), Status>;

    /// The current set of waves of `process`.
    fn wave_list(&mut self, process: ProcessId) -> Result<WaveList, Status>;

    // -- events ------------------------------------------------------------

    /// Pull the next pending event for `process`, or for any process when
    /// `process` is `None`. Returns `Ok(None)` when no event is pending.
    fn next_pending_event(
        &mut self,
        process: Option<ProcessId>,
        callbacks: &mut dyn ClientCallbacks,
    ) -> Result<Option<(EventId, EventKind)>, Status>;

    fn event_process(&self, event: EventId) -> Result<ProcessId, Status>;

    fn event_wave(&self, event: EventId) -> Result<WaveId, Status>;

    fn event_breakpoint(&self, event: EventId) -> Result<BreakpointId, Status>;

    fn event_runtime_state(&self, event: EventId) -> Result<RuntimeState, Status>;

    /// Acknowledge that `event` has been handled.
    fn event_processed(&mut self, event: EventId) -> Result<(), Status>;

    // -- waves -------------------------------------------------------------

    fn wave_state(&self, wave: WaveId) -> Result<WaveState, Status>;

    fn wave_stop_reasons(&self, wave: WaveId) -> Result<StopReasons, Status>;

    fn wave_agent(&self, wave: WaveId) -> Result<AgentId, Status>;

    fn wave_queue(&self, wave: WaveId) -> Result<QueueId, Status>;

    fn wave_dispatch(&self, wave: WaveId) -> Result<DispatchId, Status>;

    fn wave_workgroup_coords(&self, wave: WaveId) -> Result<[u32; 3], Status>;

    fn wave_number_in_group(&self, wave: WaveId) -> Result<u32, Status>;

    fn wave_architecture(&self, wave: WaveId) -> Result<ArchitectureId, Status>;

    fn wave_resume(
        &mut self,
        wave: WaveId,
        mode: ResumeMode,
        exception: Exception,
    ) -> Result<(), Status>;

    fn wave_stop(&mut self, wave: WaveId) -> Result<(), Status>;

    fn architecture_elf_machine(&self, architecture: ArchitectureId) -> Result<u32, Status>;

    // -- breakpoints -------------------------------------------------------

    /// Tell the library that `thread` hit `breakpoint`.
    fn report_breakpoint_hit(
        &mut self,
        breakpoint: BreakpointId,
        thread: Ptid,
        callbacks: &mut dyn ClientCallbacks,
    ) -> Result<BreakpointAction, Status>;

    // -- memory and registers ---------------------------------------------

    /// Read memory into `buf`; returns the number of bytes read.
    fn read_memory(
        &mut self,
        process: ProcessId,
        wave: WaveId,
        lane: u32,
        space: AddressSpace,
        address: u64,
        buf: &mut [u8],
    ) -> Result<usize, Status>;

    /// Write `data` to memory; returns the number of bytes written.
    fn write_memory(
        &mut self,
        process: ProcessId,
        wave: WaveId,
        lane: u32,
        space: AddressSpace,
        address: u64,
        data: &[u8],
    ) -> Result<usize, Status>;

    fn read_register(
        &mut self,
        wave: WaveId,
        register: RegisterId,
        offset: usize,
        buf: &mut [u8],
    ) -> Result<(), Status>;

    fn write_register(
        &mut self,
        wave: WaveId,
        register: RegisterId,
        offset: usize,
        data: &[u8],
    ) -> Result<(), Status>;
}

// Compile-time assertion: both traits must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn DebugLibrary, _: &dyn ClientCallbacks) {}
};

#[cfg(test)]
mod tests {
    use super::*;

    /// Records what the library asked for, used to prove the callback
    /// trait can be driven through `dyn`.
    #[derive(Default)]
    struct RecordingCallbacks {
        inserted: Vec<(u64, BreakpointId)>,
        messages: Vec<(LogLevel, String)>,
    }

    impl ClientCallbacks for RecordingCallbacks {
        fn get_os_pid(&mut self, client: ClientProcessId) -> Result<Pid, Status> {
            if client.0 == 0 {
                return Err(Status::ProcessExited);
            }
            Ok(client.0)
        }

        fn insert_breakpoint(
            &mut self,
            _client: ClientProcessId,
            address: u64,
            breakpoint: BreakpointId,
        ) -> Result<(), Status> {
            self.inserted.push((address, breakpoint));
            Ok(())
        }

        fn remove_breakpoint(
            &mut self,
            _client: ClientProcessId,
            breakpoint: BreakpointId,
        ) -> Result<(), Status> {
            let before = self.inserted.len();
            self.inserted.retain(|(_, id)| *id != breakpoint);
            if self.inserted.len() == before {
                return Err(Status::InvalidBreakpointId);
            }
            Ok(())
        }

        fn log_message(&mut self, level: LogLevel, message: &str) {
            self.messages.push((level, message.to_string()));
        }
    }

    #[test]
    fn callbacks_are_usable_as_trait_objects() {
        let mut recording = RecordingCallbacks::default();
        let callbacks: &mut dyn ClientCallbacks = &mut recording;

        assert_eq!(callbacks.get_os_pid(ClientProcessId(42)), Ok(42));
        assert_eq!(
            callbacks.get_os_pid(ClientProcessId(0)),
            Err(Status::ProcessExited)
        );

        callbacks
            .insert_breakpoint(ClientProcessId(42), 0x1000, BreakpointId(1))
            .unwrap();
        callbacks.log_message(LogLevel::Info, "hello");
        assert_eq!(
            callbacks.remove_breakpoint(ClientProcessId(42), BreakpointId(2)),
            Err(Status::InvalidBreakpointId)
        );
        callbacks
            .remove_breakpoint(ClientProcessId(42), BreakpointId(1))
            .unwrap();

        assert!(recording.inserted.is_empty());
        assert_eq!(recording.messages.len(), 1);
    }
}
