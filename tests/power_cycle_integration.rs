//! ---
//! gpm_section: "15-testing-qa-runbook"
//! gpm_subsection: "integration-tests"
//! gpm_type: "source"
//! gpm_scope: "code"
//! gpm_description: "Integration and validation tests for the GPM stack."
//! gpm_version: "v0.0.0-prealpha"
//! gpm_owner: "tbd"
//! ---
use std::fs;
use std::thread;

use gpm_common::AppConfig;
use gpm_core::{PmAction, RmError, SlotKind};
use gpm_metrics::{encode_text, new_registry};
use gpm_sim::{SimEvent, SimulatedPlatform};
use tempfile::tempdir;

const CONFIG: &str = r#"
[registry]
max_clients = 3

[power]
device = "gpu7"
gpu_instance = 7

[scenario]
actions = ["hibernate", "resume", "standby", "2"]

[[scenario.objects]]
kind = "root"
index = 2
client = 0xc3
parent = 0xc3
object = 0xc3
class = 0x41

[[scenario.objects]]
kind = "device"
index = 2
client = 0xc3
parent = 0xc3
object = 0xd3
class = 0x80

[[scenario.objects]]
kind = "display"
client = 0xc3
parent = 0xd3
object = 0xd4
class = 0x73
"#;

#[test]
fn config_file_drives_a_full_scenario_with_metrics() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("gpm.toml");
    fs::write(&path, CONFIG).unwrap();

    let loaded = AppConfig::load_with_source(&[path.clone()]).unwrap();
    assert_eq!(loaded.source, path);

    let metrics = new_registry();
    let platform = SimulatedPlatform::builder()
        .config(loaded.config)
        .metrics(metrics.clone())
        .build()
        .unwrap();
    let reports = platform.run_scenario().unwrap();
    assert_eq!(reports.len(), 4);
    assert!(reports.iter().all(|report| report.is_ok()));
    assert_eq!(reports[3].action, PmAction::Resume);

    // Two resumes, three objects each.
    assert_eq!(
        platform.journal().allocations(),
        vec![0xc3, 0xd3, 0xd4, 0xc3, 0xd3, 0xd4]
    );

    let exposition = encode_text(&metrics).unwrap();
    assert!(exposition.contains(r#"gpm_power_transitions_total{action="resume",outcome="ok"} 2"#));
    assert!(exposition.contains(r#"gpm_registry_replayed_objects_total{kind="display"} 2"#));

    let json = serde_json::to_value(&reports).unwrap();
    assert_eq!(json[0]["device"], "gpu7");
    assert_eq!(json[0]["pm_state"]["in_hibernate"], false);
}

#[test]
fn concurrent_requests_never_nest_the_api_lock() {
    let config: AppConfig = CONFIG.parse().unwrap();
    let platform = SimulatedPlatform::from_config(config).unwrap();
    platform.journal().clear();

    thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..10 {
                    platform.transition(PmAction::Standby);
                    platform.transition(PmAction::Resume);
                }
            });
        }
    });

    let mut api_depth = 0i32;
    let mut device_depth = 0i32;
    for event in platform.journal().events() {
        match event {
            SimEvent::LockAcquired { lock } if lock == "api" => {
                api_depth += 1;
                assert_eq!(api_depth, 1, "api lock acquired twice");
            }
            SimEvent::LockReleased { lock } if lock == "api" => api_depth -= 1,
            SimEvent::LockAcquired { .. } => {
                assert_eq!(api_depth, 1, "device lock taken without api lock");
                device_depth += 1;
            }
            SimEvent::LockReleased { .. } => {
                assert_eq!(api_depth, 1, "api lock released before device lock");
                device_depth -= 1;
            }
            SimEvent::EngineUnload { .. } | SimEvent::EngineLoad { .. } | SimEvent::Alloc { .. } => {
                assert_eq!((api_depth, device_depth), (1, 1));
            }
            _ => {}
        }
    }
    assert_eq!((api_depth, device_depth), (0, 0));
    assert!(!platform.locks_held());
    assert_eq!(platform.registry().valid_count(), 3);
}

#[test]
fn unsupported_action_code_is_rejected_and_recovered() {
    let config: AppConfig = CONFIG.parse().unwrap();
    let platform = SimulatedPlatform::from_config(config).unwrap();
    platform.journal().clear();

    let report = platform.transition("42".parse().unwrap());
    assert_eq!(report.action, PmAction::Unsupported(42));
    assert_eq!(report.result(), Err(RmError::InvalidArgument));
    assert_eq!(report.recovery.as_ref().and_then(|r| r.error.clone()), None);
    // Recovery resume ran against a device that never suspended.
    assert_eq!(platform.journal().allocations().len(), 3);
}

#[test]
fn destroy_after_cycles_clears_registry() {
    let config: AppConfig = CONFIG.parse().unwrap();
    let platform = SimulatedPlatform::from_config(config).unwrap();
    platform.run(&[PmAction::Standby, PmAction::Resume]);
    assert!(platform.registry().is_valid(SlotKind::Device, 2));

    platform.shutdown();
    assert_eq!(platform.registry().valid_count(), 0);
    assert!(platform.registry().snapshot().is_empty());
    assert!(platform
        .journal()
        .events()
        .ends_with(&[SimEvent::TransportDeinit]));
}
