//! Register and memory access on wave threads, and delegation for host
//! threads.

use wavedbg_core::library::{RegisterId, RuntimeState, Status, WaveId};
use wavedbg_core::{AdapterConfig, Ptid, TargetError};
use wavedbg_sim::host::regnum;
use wavedbg_sim::{SimBeneath, SimHost, SimLibrary, SimRig};

const PID: i32 = 100;
const PC: RegisterId = RegisterId(0x10);
const VCC: RegisterId = RegisterId(0x12);
const MODE: RegisterId = RegisterId(0x14);

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

fn rig_with_wave() -> (SimRig, WaveId, Ptid) {
    let lib = SimLibrary::new();
    lib.handle().runtime_on_attach(PID, RuntimeState::LoadedSuccess);
    let beneath = SimBeneath::new();
    beneath.handle().set_is_async(true);
    let mut rig = SimRig::from_parts(lib, SimHost::new(), beneath, AdapterConfig::default())
        .expect("rig should build");
    rig.target.attach(PID).expect("attach should succeed");
    let wave = rig.lib.spawn_wave(PID).expect("process is attached");
    rig.target.update_thread_list().expect("refresh should succeed");
    (rig, wave, Ptid::wave(PID, wave))
}

fn host_thread() -> Ptid {
    Ptid::new(PID, PID as i64, 0)
}

// ---------------------------------------------------------------------------
// Registers
// ---------------------------------------------------------------------------

#[test]
fn fetch_supplies_available_registers() {
    let (mut rig, wave, ptid) = rig_with_wave();
    rig.lib.set_register(wave, PC, &0x4000u64.to_le_bytes());

    rig.target.fetch_registers(ptid, None).unwrap();

    assert_eq!(
        rig.host.cached_register(ptid, regnum::PC),
        Some(0x4000u64.to_le_bytes().to_vec())
    );
    // Not provided by the wave: left unavailable, no error.
    assert_eq!(rig.host.cached_register(ptid, regnum::EXEC), None);
}

#[test]
fn fetch_of_one_register_touches_only_that_register() {
    let (mut rig, wave, ptid) = rig_with_wave();
    rig.lib.set_register(wave, PC, &[1; 8]);
    rig.lib.set_register(wave, VCC, &[2; 8]);

    rig.target.fetch_registers(ptid, Some(regnum::VCC)).unwrap();

    assert_eq!(rig.host.cached_register(ptid, regnum::VCC), Some(vec![2; 8]));
    assert_eq!(rig.host.cached_register(ptid, regnum::PC), None);
}

#[test]
fn store_writes_through_to_the_wave() {
    let (mut rig, wave, ptid) = rig_with_wave();
    rig.host
        .set_cached_register(ptid, regnum::PC, &0x2000u64.to_le_bytes());

    rig.target.store_registers(ptid, Some(regnum::PC)).unwrap();

    assert_eq!(
        rig.lib.register(wave, PC),
        Some(0x2000u64.to_le_bytes().to_vec())
    );
    assert!(rig.host.invalidated().is_empty());
}

#[test]
fn storing_vcc_invalidates_volatile_registers() {
    let (mut rig, wave, ptid) = rig_with_wave();
    rig.host.set_cached_register(ptid, regnum::VCC, &[0xff; 8]);
    rig.host.set_cached_register(ptid, regnum::STATUS, &[0; 4]);

    rig.target.store_registers(ptid, Some(regnum::VCC)).unwrap();

    assert_eq!(rig.host.invalidated(), vec![(ptid, regnum::STATUS)]);
    assert_eq!(rig.host.cached_register(ptid, regnum::STATUS), None);
    assert_eq!(rig.lib.register(wave, VCC), Some(vec![0xff; 8]));
}

#[test]
fn storing_a_register_with_read_only_bits_invalidates_it() {
    let (mut rig, wave, ptid) = rig_with_wave();
    rig.host.set_cached_register(ptid, regnum::MODE, &[7, 0, 0, 0]);

    rig.target.store_registers(ptid, Some(regnum::MODE)).unwrap();

    assert_eq!(rig.host.invalidated(), vec![(ptid, regnum::MODE)]);
    // The value collected before invalidation still reached the wave.
    assert_eq!(rig.lib.register(wave, MODE), Some(vec![7, 0, 0, 0]));
}

#[test]
fn register_access_on_host_threads_is_delegated() {
    let (mut rig, _, _) = rig_with_wave();

    rig.target.fetch_registers(host_thread(), None).unwrap();
    rig.target.store_registers(host_thread(), Some(3)).unwrap();

    assert_eq!(rig.beneath.register_fetches(), vec![(host_thread(), None)]);
    assert_eq!(rig.beneath.register_stores(), vec![(host_thread(), Some(3))]);
}

// ---------------------------------------------------------------------------
// Memory
// ---------------------------------------------------------------------------

#[test]
fn wave_memory_goes_through_the_library() {
    let (mut rig, _, ptid) = rig_with_wave();
    rig.lib.poke_memory(0x9000, &[1, 2, 3, 4]);

    let mut buf = [0u8; 4];
    assert_eq!(rig.target.read_memory(ptid, 0x9000, &mut buf).unwrap(), 4);
    assert_eq!(buf, [1, 2, 3, 4]);

    assert_eq!(rig.target.write_memory(ptid, 0x9001, &[9, 9]).unwrap(), 2);
    assert_eq!(rig.lib.peek_memory(0x9000, 4), Some(vec![1, 9, 9, 4]));
}

#[test]
fn unmapped_wave_memory_is_a_recoverable_error() {
    let (mut rig, _, ptid) = rig_with_wave();

    let mut buf = [0u8; 8];
    let err = rig.target.read_memory(ptid, 0xdead, &mut buf).unwrap_err();

    assert!(matches!(
        err,
        TargetError::MemoryAccess {
            address: 0xdead,
            status: Status::MemoryAccess
        }
    ));
    assert!(!err.is_fatal());
}

#[test]
fn wave_memory_of_a_detached_process_is_refused() {
    let (mut rig, _, ptid) = rig_with_wave();
    rig.target.detach(PID).unwrap();

    let err = rig.target.write_memory(ptid, 0x9000, &[0]).unwrap_err();
    assert!(matches!(
        err,
        TargetError::MemoryAccess {
            status: Status::InvalidProcessId,
            ..
        }
    ));
}

#[test]
fn host_memory_goes_beneath() {
    let (mut rig, _, _) = rig_with_wave();
    rig.beneath.poke_memory(0x1000, &[0xaa, 0xbb]);

    let mut buf = [0u8; 2];
    rig.target.read_memory(host_thread(), 0x1000, &mut buf).unwrap();
    assert_eq!(buf, [0xaa, 0xbb]);

    let mut unmapped = [0u8; 1];
    let err = rig
        .target
        .read_memory(host_thread(), 0x5000, &mut unmapped)
        .unwrap_err();
    assert!(matches!(err, TargetError::Collaborator(_)));
}
