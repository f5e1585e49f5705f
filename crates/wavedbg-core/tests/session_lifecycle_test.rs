//! Session lifecycle against the simulator: attach/detach, runtime
//! publishing, precise memory, process observers and the library reset.

use wavedbg_core::library::{
    EventKind, LogLevel, MemoryPrecision, RuntimeState, Status, Version,
};
use wavedbg_core::target::ASYNC_EVENT_NAME;
use wavedbg_core::{AdapterConfig, PreciseMemory, Ptid, Signal, TargetError};
use wavedbg_sim::{LibraryCall, SimBeneath, SimHost, SimLibrary, SimRig};

const PID: i32 = 100;

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

fn rig() -> SimRig {
    SimRig::new(AdapterConfig::default()).expect("rig should build")
}

/// A rig whose runtime is already loaded when the adapter attaches to
/// `PID`, with the beneath-target in async mode or not.
fn loaded_rig(beneath_async: bool) -> SimRig {
    let lib = SimLibrary::new();
    lib.handle().runtime_on_attach(PID, RuntimeState::LoadedSuccess);
    let beneath = SimBeneath::new();
    beneath.handle().set_is_async(beneath_async);
    SimRig::from_parts(lib, SimHost::new(), beneath, AdapterConfig::default())
        .expect("rig should build")
}

fn attach_calls(rig: &SimRig) -> usize {
    rig.lib
        .count_calls(|call| matches!(call, LibraryCall::Attach(_)))
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

#[test]
fn construction_initializes_and_applies_log_level() {
    let config = AdapterConfig {
        library_log_level: LogLevel::Trace,
        ..AdapterConfig::default()
    };
    let rig = SimRig::new(config).unwrap();

    assert!(rig.lib.is_initialized());
    assert_eq!(rig.lib.log_level(), LogLevel::Trace);
    assert_eq!(rig.target.library_log_level(), LogLevel::Trace);
}

#[test]
fn old_library_is_rejected() {
    let lib = SimLibrary::new();
    lib.handle().set_version(Version {
        major: 0,
        minor: 75,
        patch: 9,
    });
    let err = SimRig::from_parts(lib, SimHost::new(), SimBeneath::new(), AdapterConfig::default())
        .unwrap_err();
    assert!(matches!(err, TargetError::VersionMismatch { .. }));
}

// ---------------------------------------------------------------------------
// Attach
// ---------------------------------------------------------------------------

#[test]
fn attach_registers_notifier_without_publishing() {
    let mut rig = rig();
    rig.target.attach(PID).unwrap();

    let session = rig.target.session(PID).unwrap();
    assert!(session.is_attached());
    assert_eq!(session.process(), rig.lib.process_of(PID));
    assert!(!session.is_published());
    assert_eq!(session.runtime_state(), RuntimeState::Unloaded);

    let notifier = session.notifier().unwrap();
    assert_eq!(rig.host.file_handlers(), vec![(notifier, PID)]);
    assert!(!rig.host.is_pushed(PID));
}

#[test]
fn attach_twice_attaches_once() {
    let mut rig = rig();
    rig.target.attach(PID).unwrap();
    rig.target.attach(PID).unwrap();
    assert_eq!(attach_calls(&rig), 1);
}

#[test]
fn buffered_runtime_load_publishes_and_enables_async() {
    let mut rig = loaded_rig(true);
    rig.target.attach(PID).unwrap();

    let session = rig.target.session(PID).unwrap();
    assert!(session.is_published());
    assert_eq!(session.runtime_state(), RuntimeState::LoadedSuccess);
    assert!(rig.host.is_pushed(PID));

    // Nobody called set_async; the adapter did it itself.
    assert!(rig.target.is_async_enabled());
    assert!(rig.host.async_event_marked(ASYNC_EVENT_NAME));
    assert_eq!(rig.lib.unacknowledged_events(), 0);
}

#[test]
fn buffered_runtime_load_waits_for_async_when_beneath_is_sync() {
    let mut rig = loaded_rig(false);
    rig.target.attach(PID).unwrap();

    assert!(rig.target.session(PID).unwrap().is_published());
    assert!(!rig.target.is_async_enabled());

    rig.target.set_async(true);
    assert!(rig.beneath.is_async());
    assert!(rig.host.async_event_marked(ASYNC_EVENT_NAME));

    // Idempotent.
    rig.target.set_async(true);
    assert_eq!(rig.host.async_events().len(), 1);

    rig.target.set_async(false);
    assert!(rig.host.async_events().is_empty());
    assert!(rig.host.file_handlers().is_empty());
}

#[test]
fn restriction_on_attach_leaves_session_detached() {
    let mut rig = rig();
    rig.lib.fail_attach(PID, Status::Restriction);

    rig.target.attach(PID).unwrap();
    assert!(!rig.target.session(PID).unwrap().is_attached());
    assert!(rig.host.file_handlers().is_empty());
}

#[test]
fn other_attach_failure_is_not_an_error() {
    let mut rig = rig();
    rig.lib.fail_attach(PID, Status::Error);

    rig.target.attach(PID).unwrap();
    assert!(!rig.target.session(PID).unwrap().is_attached());
}

#[test]
fn notifier_failure_rolls_back_the_attach() {
    let mut rig = rig();
    rig.lib.fail_notifier(PID, Status::Error);

    rig.target.attach(PID).unwrap();

    let session = rig.target.session(PID).unwrap();
    assert!(!session.is_attached());
    assert_eq!(session.notifier(), None);
    assert_eq!(rig.lib.process_of(PID), None);
    assert_eq!(
        rig.lib
            .count_calls(|call| matches!(call, LibraryCall::Detach(_))),
        1
    );
}

#[test]
fn attach_needs_an_async_capable_beneath() {
    let mut rig = rig();
    rig.beneath.set_can_async(false);

    rig.target.attach(PID).unwrap();
    assert_eq!(attach_calls(&rig), 0);
}

#[test]
fn restricted_runtime_is_not_published() {
    let lib = SimLibrary::new();
    lib.handle()
        .runtime_on_attach(PID, RuntimeState::LoadedErrorRestriction);
    let mut rig =
        SimRig::from_parts(lib, SimHost::new(), SimBeneath::new(), AdapterConfig::default())
            .unwrap();

    rig.target.attach(PID).unwrap();

    let session = rig.target.session(PID).unwrap();
    assert_eq!(session.runtime_state(), RuntimeState::LoadedErrorRestriction);
    assert!(!session.is_published());
    assert!(!rig.host.is_pushed(PID));
}

#[test]
fn event_other_than_runtime_before_publishing_is_fatal() {
    let mut rig = rig();
    rig.target.attach(PID).unwrap();
    rig.lib
        .raw_event(PID, EventKind::QueueError)
        .unwrap();

    let err = rig.target.handle_notifier(PID).unwrap_err();
    assert!(matches!(err, TargetError::UnexpectedEvent { .. }));
    assert!(err.is_fatal());
    // Acknowledged all the same.
    assert_eq!(rig.lib.unacknowledged_events(), 0);
}

#[test]
fn runtime_unload_unpublishes() {
    let mut rig = loaded_rig(true);
    rig.host.select(Ptid::process(PID));
    rig.target.attach(PID).unwrap();

    rig.lib.runtime_event(PID, RuntimeState::Unloaded).unwrap();
    assert_eq!(rig.pump_notifiers().unwrap(), 1);
    rig.target.wait(Ptid::ALL).unwrap();

    let session = rig.target.session(PID).unwrap();
    assert_eq!(session.runtime_state(), RuntimeState::Unloaded);
    assert!(!session.is_published());
    assert!(!rig.host.is_pushed(PID));
}

#[test]
fn illegal_runtime_transition_is_fatal() {
    let mut rig = loaded_rig(true);
    rig.host.select(Ptid::process(PID));
    rig.target.attach(PID).unwrap();

    rig.lib
        .runtime_event(PID, RuntimeState::LoadedErrorRestriction)
        .unwrap();
    let err = rig.target.wait(Ptid::ALL).unwrap_err();
    assert!(matches!(
        err,
        TargetError::InvalidTransition {
            from: RuntimeState::LoadedSuccess,
            to: RuntimeState::LoadedErrorRestriction,
            ..
        }
    ));
}

// ---------------------------------------------------------------------------
// Detach
// ---------------------------------------------------------------------------

#[test]
fn detach_undoes_attach_and_resets_the_library() {
    let mut rig = loaded_rig(true);
    rig.target.attach(PID).unwrap();

    rig.target.detach(PID).unwrap();

    let session = rig.target.session(PID).unwrap();
    assert!(!session.is_attached());
    assert!(!session.is_published());
    assert_eq!(session.runtime_state(), RuntimeState::Unloaded);
    assert!(!rig.host.is_pushed(PID));
    assert!(rig.host.file_handlers().is_empty());
    assert_eq!(rig.host.removed_inferiors(), vec![PID]);
    assert_eq!(rig.beneath.detached(), vec![PID]);

    assert_eq!(rig.lib.init_count(), 2);
    // The log level survives the reset.
    assert_eq!(
        rig.lib
            .count_calls(|call| matches!(call, LibraryCall::SetLogLevel(LogLevel::Warning))),
        2
    );
}

#[test]
fn library_reset_can_be_disabled() {
    let config = AdapterConfig {
        reset_library_on_last_detach: false,
        ..AdapterConfig::default()
    };
    let mut rig = SimRig::new(config).unwrap();
    rig.target.attach(PID).unwrap();
    rig.target.detach_session(PID).unwrap();
    assert_eq!(rig.lib.init_count(), 1);
}

#[test]
fn library_is_not_reset_while_another_session_is_attached() {
    let mut rig = rig();
    rig.target.attach(PID).unwrap();
    rig.target.attach(PID + 1).unwrap();

    rig.target.detach_session(PID).unwrap();
    assert_eq!(rig.lib.init_count(), 1);
    assert!(rig.target.session(PID + 1).unwrap().is_attached());

    rig.target.detach_session(PID + 1).unwrap();
    assert_eq!(rig.lib.init_count(), 2);
}

#[test]
fn detach_of_unattached_session_is_a_no_op() {
    let mut rig = rig();
    rig.target.detach_session(PID).unwrap();
    assert!(rig.lib.calls().iter().all(|call| !matches!(call, LibraryCall::Detach(_))));
}

#[test]
fn mourn_detaches_and_mourns_beneath() {
    let mut rig = rig();
    rig.target.attach(PID).unwrap();
    rig.target.mourn(PID).unwrap();
    assert!(!rig.target.session(PID).unwrap().is_attached());
    assert_eq!(rig.beneath.mourned(), vec![PID]);
}

// ---------------------------------------------------------------------------
// Precise memory
// ---------------------------------------------------------------------------

#[test]
fn configured_precise_memory_is_applied_on_attach() {
    let config = AdapterConfig {
        precise_memory: true,
        ..AdapterConfig::default()
    };
    let mut rig = SimRig::new(config).unwrap();
    rig.target.attach(PID).unwrap();

    assert_eq!(
        rig.target.precise_memory(PID),
        PreciseMemory {
            requested: true,
            enabled: true
        }
    );
    assert_eq!(rig.lib.memory_precision(PID), Some(MemoryPrecision::Precise));
}

#[test]
fn unsupported_precise_memory_only_warns() {
    let mut rig = rig();
    rig.lib.set_precise_memory_supported(false);
    rig.target.attach(PID).unwrap();

    rig.target.set_precise_memory(PID, true).unwrap();
    assert_eq!(
        rig.target.precise_memory(PID),
        PreciseMemory {
            requested: true,
            enabled: false
        }
    );
}

#[test]
fn precise_memory_request_survives_detach() {
    let mut rig = rig();
    rig.target.set_precise_memory(PID, true).unwrap();
    // Not attached yet: only recorded.
    assert_eq!(rig.lib.memory_precision(PID), None);

    rig.target.attach(PID).unwrap();
    assert!(rig.target.precise_memory(PID).enabled);

    rig.target.detach_session(PID).unwrap();
    assert_eq!(
        rig.target.precise_memory(PID),
        PreciseMemory {
            requested: true,
            enabled: false
        }
    );
}

#[test]
fn memory_violation_advisory_needs_an_imprecise_wave() {
    let mut rig = loaded_rig(true);
    rig.target.attach(PID).unwrap();
    let wave = rig.lib.spawn_wave(PID).unwrap();
    rig.target.update_thread_list().unwrap();
    rig.host.select(Ptid::wave(PID, wave));

    assert!(rig.target.signal_received(Signal::Segv));
    assert!(rig.target.signal_received(Signal::Bus));
    assert!(!rig.target.signal_received(Signal::Trap));

    rig.target.set_precise_memory(PID, true).unwrap();
    assert!(!rig.target.signal_received(Signal::Segv));

    rig.host.select(Ptid::new(PID, PID as i64, 0));
    rig.target.set_precise_memory(PID, false).unwrap();
    assert!(!rig.target.signal_received(Signal::Segv));
}

// ---------------------------------------------------------------------------
// Observers
// ---------------------------------------------------------------------------

#[test]
fn created_attaches_only_native_processes() {
    let mut rig = rig();
    rig.target.inferior_created(PID, false).unwrap();
    assert!(rig.target.session(PID).is_none());

    rig.target.inferior_created(PID, true).unwrap();
    assert!(rig.target.session(PID).unwrap().is_attached());
}

#[test]
fn vfork_child_attaches_after_exec() {
    let child = PID + 1;
    let mut rig = rig();
    rig.target.attach(PID).unwrap();
    rig.target.set_precise_memory(PID, true).unwrap();

    rig.target.inferior_forked(PID, child, true).unwrap();
    let session = rig.target.session(child).unwrap();
    assert!(session.is_vfork_child());
    assert!(!session.is_attached());
    assert!(session.precise_memory().requested);

    // Attach is a no-op until the child execs.
    rig.target.attach(child).unwrap();
    assert!(!rig.target.session(child).unwrap().is_attached());

    rig.target.inferior_execd(child, child).unwrap();
    let session = rig.target.session(child).unwrap();
    assert!(!session.is_vfork_child());
    assert!(session.is_attached());
    assert!(session.precise_memory().enabled);
}

#[test]
fn fork_child_attaches_immediately() {
    let child = PID + 1;
    let mut rig = rig();
    rig.target.attach(PID).unwrap();
    rig.target.inferior_forked(PID, child, false).unwrap();
    assert!(rig.target.session(child).unwrap().is_attached());
}

#[test]
fn exec_reattaches_the_new_image() {
    let mut rig = rig();
    rig.target.attach(PID).unwrap();

    rig.target.inferior_execd(PID, PID).unwrap();

    assert!(rig.target.session(PID).unwrap().is_attached());
    assert_eq!(attach_calls(&rig), 2);
    assert_eq!(
        rig.lib
            .count_calls(|call| matches!(call, LibraryCall::Detach(_))),
        1
    );
}

#[test]
fn clone_copies_precise_memory_request() {
    let clone = PID + 2;
    let mut rig = rig();
    rig.target.set_precise_memory(PID, true).unwrap();

    rig.target.inferior_cloned(PID, clone);
    let session = rig.target.session(clone).unwrap();
    assert!(session.precise_memory().requested);
    assert!(!session.is_attached());
}

#[test]
fn exit_detaches() {
    let mut rig = rig();
    rig.target.attach(PID).unwrap();
    rig.target.inferior_exited(PID).unwrap();
    assert!(!rig.target.session(PID).unwrap().is_attached());
}

#[test]
fn vfork_child_that_exits_without_exec_frees_its_pid() {
    let child = PID + 1;
    let mut rig = rig();
    rig.target.attach(PID).unwrap();
    rig.target.inferior_forked(PID, child, true).unwrap();

    rig.target.inferior_exited(child).unwrap();
    assert!(!rig.target.session(child).unwrap().is_vfork_child());

    // The OS hands the pid to a new inferior.
    rig.target.inferior_created(child, true).unwrap();
    assert!(rig.target.session(child).unwrap().is_attached());
}

#[test]
fn removed_inferior_drops_its_session() {
    let child = PID + 1;
    let mut rig = rig();
    rig.target.attach(PID).unwrap();
    rig.target.inferior_forked(PID, child, false).unwrap();
    assert_eq!(rig.target.sessions().len(), 2);

    rig.target.inferior_removed(child).unwrap();
    assert!(rig.target.session(child).is_none());
    assert_eq!(rig.target.sessions().len(), 1);
    assert_eq!(
        rig.lib
            .count_calls(|call| matches!(call, LibraryCall::Detach(_))),
        1
    );

    // Unknown pids are ignored.
    rig.target.inferior_removed(child).unwrap();
}

#[test]
fn pre_detach_leaves_published_sessions_to_detach() {
    let mut rig = loaded_rig(true);
    rig.target.attach(PID).unwrap();
    rig.target.inferior_pre_detach(PID).unwrap();
    assert!(rig.target.session(PID).unwrap().is_attached());

    let other = PID + 1;
    rig.target.attach(other).unwrap();
    rig.target.inferior_pre_detach(other).unwrap();
    assert!(!rig.target.session(other).unwrap().is_attached());
}

#[test]
fn close_releases_the_async_event() {
    let mut rig = loaded_rig(true);
    rig.target.attach(PID).unwrap();
    assert_eq!(rig.host.async_events().len(), 1);

    rig.target.close();
    assert!(rig.host.async_events().is_empty());
    assert!(rig.target.async_event().is_none());
}
