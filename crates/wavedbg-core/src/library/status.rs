//! Library status codes.
//!
//! Every fallible library call returns `Result<T, Status>`; success is
//! `Ok`. The adapter decides per call site which codes are expected (and
//! absorbed) and which are invariant violations.

/// Error status returned by the vendor debug library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum Status {
    #[error("AMD_DBGAPI_STATUS_ERROR")]
    Error,

    #[error("AMD_DBGAPI_STATUS_FATAL")]
    Fatal,

    #[error("AMD_DBGAPI_STATUS_ERROR_NOT_SUPPORTED")]
    NotSupported,

    #[error("AMD_DBGAPI_STATUS_ERROR_INVALID_ARGUMENT")]
    InvalidArgument,

    #[error("AMD_DBGAPI_STATUS_ERROR_NOT_INITIALIZED")]
    NotInitialized,

    #[error("AMD_DBGAPI_STATUS_ERROR_ALREADY_INITIALIZED")]
    AlreadyInitialized,

    #[error("AMD_DBGAPI_STATUS_ERROR_ALREADY_ATTACHED")]
    AlreadyAttached,

    #[error("AMD_DBGAPI_STATUS_ERROR_INVALID_PROCESS_ID")]
    InvalidProcessId,

    #[error("AMD_DBGAPI_STATUS_ERROR_INVALID_WAVE_ID")]
    InvalidWaveId,

    #[error("AMD_DBGAPI_STATUS_ERROR_INVALID_EVENT_ID")]
    InvalidEventId,

    #[error("AMD_DBGAPI_STATUS_ERROR_INVALID_BREAKPOINT_ID")]
    InvalidBreakpointId,

    #[error("AMD_DBGAPI_STATUS_ERROR_PROCESS_EXITED")]
    ProcessExited,

    #[error("AMD_DBGAPI_STATUS_ERROR_RESTRICTION")]
    Restriction,

    #[error("AMD_DBGAPI_STATUS_ERROR_REGISTER_NOT_AVAILABLE")]
    RegisterNotAvailable,

    #[error("AMD_DBGAPI_STATUS_ERROR_WAVE_NOT_STOPPED")]
    WaveNotStopped,

    #[error("AMD_DBGAPI_STATUS_ERROR_MEMORY_ACCESS")]
    MemoryAccess,

    #[error("AMD_DBGAPI_STATUS_ERROR_CLIENT_CALLBACK")]
    ClientCallback,
}
