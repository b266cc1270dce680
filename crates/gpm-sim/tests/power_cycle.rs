//! ---
//! gpm_section: "11-simulation-test-harness"
//! gpm_subsection: "tests"
//! gpm_type: "source"
//! gpm_scope: "test"
//! gpm_description: "Power-cycle scenarios against the simulated platform."
//! gpm_version: "v0.0.0-prealpha"
//! gpm_owner: "tbd"
//! ---
use gpm_common::{AppConfig, FaultPoint};
use gpm_core::{GpuProperty, Handle, PmAction, PmProperties, RmError, SlotKind};
use gpm_sim::{SimEvent, SimulatedPlatform, SIM_ENGINE};

const SEEDED: &str = r#"
[registry]
max_clients = 2

[[scenario.objects]]
kind = "root"
index = 0
client = 0xc1
parent = 0xc1
object = 0xc1
class = 0x41

[[scenario.objects]]
kind = "device"
index = 0
client = 0xc1
parent = 0xc1
object = 0xd0
class = 0x80

[[scenario.objects]]
kind = "subdevice"
index = 0
client = 0xc1
parent = 0xd0
object = 0x50
class = 0x2080

[[scenario.objects]]
kind = "root"
index = 1
client = 0xc2
parent = 0xc2
object = 0xc2
class = 0x41

[[scenario.objects]]
kind = "display_software"
client = 0xc1
parent = 0xd0
object = 0xd5
class = 0x74
params = "0102"
"#;

fn seeded_platform() -> SimulatedPlatform {
    let config: AppConfig = SEEDED.parse().expect("sample config parses");
    SimulatedPlatform::from_config(config).expect("platform builds")
}

#[test]
fn standby_then_resume_replays_every_valid_slot_in_order() {
    let platform = seeded_platform();
    platform.journal().clear();

    let reports = platform.run(&[PmAction::Standby, PmAction::Resume]);
    assert!(reports.iter().all(|report| report.is_ok()));
    assert_eq!(
        platform.journal().allocations(),
        vec![0xc1, 0xd0, 0x50, 0xc2, 0xd5]
    );
    assert_eq!(platform.registry().valid_count(), 5);
    assert_eq!(
        platform.gpu().properties().pm_snapshot(),
        PmProperties::default()
    );
    assert!(platform.firmware().session_loaded());
    assert_eq!(platform.firmware().live_objects().len(), 5);
    assert!(!platform.locks_held());
}

#[test]
fn standby_unloads_engines_in_reverse_and_keeps_slots() {
    let platform = seeded_platform();
    platform.journal().clear();

    let report = platform.transition(PmAction::Standby);
    assert!(report.is_ok());
    let events = platform.journal().events();
    assert_eq!(
        events,
        vec![
            SimEvent::Flush { queue: "gpu0".into(), ok: true },
            SimEvent::LockAcquired { lock: "api".into() },
            SimEvent::LockAcquired { lock: "gpu0.device".into() },
            SimEvent::EngineUnload {
                engine: SIM_ENGINE.into(),
                flags: "PRESERVING | PM_TRANSITION".into(),
            },
            SimEvent::SessionInit { load: false, ok: true },
            SimEvent::TransportDeinit,
            SimEvent::LockReleased { lock: "gpu0.device".into() },
            SimEvent::LockReleased { lock: "api".into() },
            SimEvent::Flush { queue: "gpu0".into(), ok: true },
        ]
    );
    assert_eq!(platform.registry().valid_count(), 5);
    assert!(platform.gpu().property(GpuProperty::InStandby));
}

#[test]
fn hibernate_marker_is_cleared_so_resume_replays() {
    let platform = seeded_platform();
    let report = platform.transition(PmAction::Hibernate);
    assert!(report.is_ok());
    assert!(!report.pm_state.in_hibernate);

    platform.journal().clear();
    assert!(platform.transition(PmAction::Resume).is_ok());
    assert_eq!(platform.journal().allocations().len(), 5);
}

#[test]
fn replay_stops_at_first_failed_allocation() {
    let platform = seeded_platform();
    platform.transition(PmAction::Standby);
    platform
        .faults()
        .inject_alloc(Handle(0xd0), Some(RmError::Rpc("no memory".into())));
    platform.journal().clear();

    let report = platform.transition(PmAction::Resume);
    assert_eq!(report.result(), Err(RmError::Generic));
    assert!(report.recovery.is_none());
    assert_eq!(platform.journal().allocations(), vec![0xc1, 0xd0]);
    // The engine after the registry never loads.
    assert_eq!(
        platform
            .journal()
            .count(|event| matches!(event, SimEvent::EngineLoad { .. })),
        0
    );
    assert_eq!(platform.registry().valid_count(), 5);
}

#[test]
fn session_load_failure_is_generic_and_skips_replay() {
    let platform = seeded_platform();
    platform.transition(PmAction::Standby);
    platform
        .faults()
        .inject(FaultPoint::SessionLoad, Some(RmError::Timeout));
    platform.journal().clear();

    let report = platform.transition(PmAction::Resume);
    assert_eq!(report.result(), Err(RmError::Generic));
    assert!(platform.journal().allocations().is_empty());
}

#[test]
fn transport_failure_on_resume_propagates_unchanged() {
    let platform = seeded_platform();
    platform.transition(PmAction::Standby);
    platform
        .faults()
        .inject(FaultPoint::TransportInit, Some(RmError::InsufficientResources));

    let report = platform.transition(PmAction::Resume);
    assert_eq!(report.result(), Err(RmError::InsufficientResources));
}

#[test]
fn failed_standby_triggers_one_recovery_resume() {
    let platform = seeded_platform();
    platform
        .faults()
        .inject(FaultPoint::EngineUnload, Some(RmError::Busy));
    platform.journal().clear();

    let report = platform.transition(PmAction::Standby);
    assert_eq!(report.result(), Err(RmError::Busy));
    let recovery = report.recovery.expect("recovery resume ran");
    assert_eq!(recovery.error, None);

    // Unload still reached the registry after the stand-in engine failed.
    let events = platform.journal().events();
    assert!(events.contains(&SimEvent::SessionInit { load: false, ok: true }));
    // Recovery resume re-created the firmware objects.
    assert_eq!(platform.journal().allocations().len(), 5);
    assert_eq!(
        report.properties,
        Some(PmProperties::default())
    );
    assert!(!platform.locks_held());
}

#[test]
fn session_unload_failure_is_reported_after_transport_teardown() {
    let platform = seeded_platform();
    platform
        .faults()
        .inject(FaultPoint::SessionUnload, Some(RmError::Rpc("hung".into())));
    platform.journal().clear();

    let report = platform.transition(PmAction::Standby);
    assert_eq!(report.result(), Err(RmError::Rpc("hung".into())));
    let events = platform.journal().events();
    let unload = events
        .iter()
        .position(|e| matches!(e, SimEvent::SessionInit { load: false, .. }))
        .expect("session unload attempted");
    assert_eq!(events[unload + 1], SimEvent::TransportDeinit);
}

#[test]
fn refused_device_lock_releases_api_lock_and_skips_engines() {
    let platform = seeded_platform();
    platform
        .faults()
        .inject(FaultPoint::DeviceLock, Some(RmError::Timeout));
    platform.journal().clear();

    let report = platform.transition(PmAction::Standby);
    assert_eq!(report.result(), Err(RmError::Timeout));
    assert!(report.recovery.is_none());
    let events = platform.journal().events();
    assert!(events.contains(&SimEvent::LockReleased { lock: "api".into() }));
    assert!(!events
        .iter()
        .any(|e| matches!(e, SimEvent::EngineUnload { .. } | SimEvent::SessionInit { .. })));
    assert!(!platform.locks_held());
}

#[test]
fn unbound_gpu_makes_transitions_noops() {
    let mut config: AppConfig = SEEDED.parse().unwrap();
    config.power.bind_gpu = false;
    let platform = SimulatedPlatform::from_config(config).unwrap();
    platform.journal().clear();

    let report = platform.transition(PmAction::Standby);
    assert!(report.is_ok());
    assert!(!report.gpu_bound);
    assert_eq!(platform.journal().count(SimEvent::is_lock_event), 0);
}

#[test]
fn flush_failure_does_not_change_the_result() {
    let platform = seeded_platform();
    platform
        .faults()
        .inject(FaultPoint::Flush, Some(RmError::InvalidState));
    let report = platform.transition(PmAction::Standby);
    assert!(report.is_ok());
    assert_eq!(
        platform
            .journal()
            .count(|e| matches!(e, SimEvent::Flush { ok: false, .. })),
        2
    );
}

#[test]
fn gc6_entry_is_forwarded_to_engines() {
    let mut config: AppConfig = SEEDED.parse().unwrap();
    config.power.gc6_entering = true;
    let platform = SimulatedPlatform::from_config(config).unwrap();
    platform.transition(PmAction::Standby);
    assert!(platform.journal().events().contains(&SimEvent::EngineUnload {
        engine: SIM_ENGINE.into(),
        flags: "PRESERVING | PM_TRANSITION | GC6_TRANSITION".into(),
    }));
}

#[test]
fn shutdown_invalidates_every_slot() {
    let platform = seeded_platform();
    platform.shutdown();
    assert_eq!(platform.registry().valid_count(), 0);
    assert!(platform.registry().slot(SlotKind::Root, 0).is_some_and(|s| !s.is_valid()));
    assert!(platform.device().gpu().is_none());
}

#[test]
fn closed_device_queue_only_fails_the_flushes() {
    let platform = seeded_platform();
    platform.queue().close();
    platform.journal().clear();

    let report = platform.transition(PmAction::Standby);
    assert!(report.is_ok());
    assert_eq!(
        platform
            .journal()
            .count(|e| matches!(e, SimEvent::Flush { ok: false, .. })),
        2
    );
    assert!(!platform.locks_held());
}

#[test]
fn clearing_faults_lets_the_next_cycle_replay() {
    let platform = seeded_platform();
    platform
        .faults()
        .inject(FaultPoint::SessionLoad, Some(RmError::Timeout));
    let reports = platform.run(&[PmAction::Standby, PmAction::Resume]);
    assert_eq!(reports[1].result(), Err(RmError::Generic));

    platform.faults().clear();
    assert!(platform.faults().check(FaultPoint::SessionLoad).is_ok());
    platform.journal().clear();

    let reports = platform.run(&[PmAction::Standby, PmAction::Resume]);
    assert!(reports.iter().all(|report| report.is_ok()));
    assert_eq!(platform.journal().count(SimEvent::is_alloc), 5);
}
