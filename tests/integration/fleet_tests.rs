//! Fleet fan-out tests: per-device isolation, selection, retries and the
//! convenience operations built on `for_each_device`.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use badgehub::protocol::{BadgeAssignment, encode_frame};
use badgehub::protocol::messages::tag;
use badgehub::{
    Anomaly, DeviceRegistryEntry, Error, Fleet, FleetSummary, HubConfig, Selection, Sensor,
};
use tempfile::tempdir;

use crate::sim_badge::{BadgeState, SimBadge};

type Badges = BTreeMap<u16, Rc<RefCell<BadgeState>>>;

fn badges(ids: &[u16]) -> Badges {
    ids.iter()
        .map(|&id| (id, Rc::new(RefCell::new(BadgeState::default()))))
        .collect()
}

fn registry(ids: &[u16]) -> Vec<DeviceRegistryEntry> {
    ids.iter()
        .map(|&id| DeviceRegistryEntry::new(id, format!("AA:BB:CC:DD:EE:{id:02X}")))
        .collect()
}

fn make_fleet(
    entries: Vec<DeviceRegistryEntry>,
    badges: &Badges,
    config: HubConfig,
) -> Fleet<impl Fn(&DeviceRegistryEntry) -> SimBadge + '_> {
    Fleet::new(
        entries,
        move |entry: &DeviceRegistryEntry| SimBadge::attach(badges[&entry.participant_id].clone()),
        config,
    )
}

#[test]
fn one_unreachable_badge_does_not_affect_others() {
    let ids = [1, 2, 3, 4, 5];
    let sims = badges(&ids);
    sims[&3].borrow_mut().fail_connects = u32::MAX;
    let fleet = make_fleet(registry(&ids), &sims, HubConfig::default());

    let report = fleet.start_all(&[Sensor::Microphone, Sensor::Scan], Selection::All);

    assert_eq!(
        report.summary(),
        FleetSummary {
            success: 4,
            failed: 1,
            total: 5
        }
    );
    let failed = report.device(3).unwrap();
    let err = failed.outcome.as_ref().unwrap_err();
    assert!(matches!(err, Error::Device { participant_id: 3, .. }));
    assert!(matches!(err.root(), Error::ConnectFailed { attempts: 15, .. }));

    for id in [1, 2, 4, 5] {
        let s = sims[&id].borrow();
        assert_eq!(s.assignment, Some(BadgeAssignment { id, group: 1 }));
        assert!(s.status.microphone && s.status.scan && !s.status.imu);
        assert_eq!(s.disconnect_calls, 1);
    }
    assert_eq!(
        report.devices.iter().map(|d| d.participant_id).collect::<Vec<_>>(),
        ids
    );
}

#[test]
fn failed_assignment_still_starts_sensors() {
    let ids = [1, 2];
    let sims = badges(&ids);
    // An unknown-tag frame ahead of the status reply fails the assignment.
    sims[&2].borrow_mut().raw_before_reply = vec![encode_frame(&[99]).unwrap()];
    let fleet = make_fleet(registry(&ids), &sims, HubConfig::default());

    let report = fleet.start_all(&[Sensor::Scan, Sensor::Imu], Selection::All);

    assert_eq!(report.summary().failed, 0);
    let row = report.device(2).unwrap();
    assert_eq!(row.attempts, 1);
    let s = sims[&2].borrow();
    assert!(s.status.scan && s.status.imu);
}

#[test]
fn rows_follow_registry_order_across_batches() {
    let ids = [10, 11, 12, 13, 14, 15, 16];
    let sims = badges(&ids);
    let config = HubConfig {
        max_parallel_devices: 3,
        ..HubConfig::default()
    };
    let fleet = make_fleet(registry(&ids), &sims, config);

    let report = fleet.for_each_device(Selection::All, async |entry, session| {
        let status = session.get_status().await?;
        Ok((entry.participant_id, status.battery))
    });

    let rows: Vec<(u16, u8)> = report.successes().map(|(_, r)| *r).collect();
    assert_eq!(rows, ids.iter().map(|&id| (id, 90)).collect::<Vec<_>>());
}

#[test]
fn in_use_selection_skips_unused_badges() {
    let ids = [1, 2, 3];
    let sims = badges(&ids);
    let mut entries = registry(&ids);
    entries[1].use_flag = false;
    let fleet = make_fleet(entries, &sims, HubConfig::default());

    let report = fleet.stop_all(&Sensor::ALL, Selection::InUse);

    assert_eq!(report.summary().total, 2);
    assert_eq!(sims[&2].borrow().connect_calls, 0);
    assert_eq!(sims[&1].borrow().requests.len(), 3);
}

#[test]
fn synchronize_reports_anomalies_and_skips_held_badge() {
    let ids = [1, 2, 3];
    let sims = badges(&ids);
    sims[&1].borrow_mut().status.microphone = true;
    {
        let mut s = sims[&3].borrow_mut();
        s.status.clock = false;
        s.status.battery = 5;
    }
    let fleet = make_fleet(registry(&ids), &sims, HubConfig::default());

    let report = fleet.synchronize_all(Some(2), &[Sensor::Microphone]);

    assert_eq!(report.summary().total, 2);
    assert_eq!(sims[&2].borrow().connect_calls, 0);

    let healthy = report.device(1).unwrap().outcome.as_ref().unwrap();
    assert!(healthy.is_healthy());

    let sick = report.device(3).unwrap().outcome.as_ref().unwrap();
    assert_eq!(
        sick.anomalies,
        vec![
            Anomaly::SensorDisabled(Sensor::Microphone),
            Anomaly::ClockNotSynced,
            Anomaly::LowBattery(5),
        ]
    );
}

#[test]
fn transient_failure_is_retried_with_fresh_session() {
    let ids = [1, 2];
    let sims = badges(&ids);
    sims[&2].borrow_mut().drop_link_once_on = Some(tag::request::STATUS);
    let config = HubConfig {
        max_retries_per_device: 1,
        ..HubConfig::default()
    };
    let fleet = make_fleet(registry(&ids), &sims, config);

    let report = fleet.start_all(&[Sensor::Imu], Selection::All);

    assert_eq!(report.summary().failed, 0);
    assert_eq!(report.device(1).unwrap().attempts, 1);
    assert_eq!(report.device(2).unwrap().attempts, 2);
    assert_eq!(sims[&2].borrow().connect_calls, 2);
    assert!(sims[&2].borrow().status.imu);
}

#[test]
fn connect_failure_is_not_retried() {
    let ids = [1];
    let sims = badges(&ids);
    sims[&1].borrow_mut().fail_connects = u32::MAX;
    let config = HubConfig {
        connect_attempts: 2,
        max_retries_per_device: 3,
        ..HubConfig::default()
    };
    let fleet = make_fleet(registry(&ids), &sims, config);

    let report = fleet.erase_all(Selection::All);

    assert_eq!(report.device(1).unwrap().attempts, 1);
    assert_eq!(sims[&1].borrow().connect_calls, 2);
}

#[test]
fn retries_are_bounded() {
    let ids = [1];
    let sims = badges(&ids);
    sims[&1].borrow_mut().drop_link_on = Some(tag::request::ERASE_ALL);
    let config = HubConfig {
        max_retries_per_device: 2,
        ..HubConfig::default()
    };
    let fleet = make_fleet(registry(&ids), &sims, config);

    let report = fleet.erase_all(Selection::All);

    let row = report.device(1).unwrap();
    assert_eq!(row.attempts, 3);
    assert_eq!(row.outcome.as_ref().unwrap_err().root(), &Error::Disconnected);
}

#[test]
fn erase_all_reaches_every_badge() {
    let ids = [1, 2];
    let sims = badges(&ids);
    for sim in sims.values() {
        sim.borrow_mut().files.push(("a.bin".into(), vec![1, 2, 3]));
    }
    let fleet = make_fleet(registry(&ids), &sims, HubConfig::default());

    let report = fleet.erase_all(Selection::All);

    assert!(report.successes().all(|(_, r)| r.done));
    assert!(sims.values().all(|s| s.borrow().files.is_empty()));
}

#[test]
fn download_all_writes_one_directory_per_participant() {
    let ids = [7, 8];
    let sims = badges(&ids);
    sims[&7].borrow_mut().files = vec![("a.bin".into(), vec![7; 100])];
    sims[&8].borrow_mut().files = vec![
        ("a.bin".into(), vec![8; 10]),
        ("b.bin".into(), vec![9; 300]),
    ];
    let fleet = make_fleet(registry(&ids), &sims, HubConfig::default());
    let root = tempdir().unwrap();

    let report = fleet.download_all(root.path(), Selection::All);

    assert_eq!(report.summary().success, 2);
    let totals: Vec<usize> = report.successes().map(|(_, s)| s.success).collect();
    assert_eq!(totals, vec![1, 2]);
    assert_eq!(
        std::fs::read(root.path().join("7").join("a.bin")).unwrap(),
        vec![7; 100]
    );
    assert_eq!(
        std::fs::read(root.path().join("8").join("b.bin")).unwrap(),
        vec![9; 300]
    );
}
