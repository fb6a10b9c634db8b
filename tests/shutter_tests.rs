use obsbus::asyncop::{HardwareOp, OpError, POLL_DONE, POLL_FAILED};
use obsbus::device::{Device, DeviceError, ShutterDevice};
use obsbus::state::*;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct DriveLog {
    started: AtomicU32,
    finished: AtomicU32,
}

impl DriveLog {
    fn started(&self) -> u32 {
        self.started.load(Ordering::SeqCst)
    }
    fn finished(&self) -> u32 {
        self.finished.load(Ordering::SeqCst)
    }
}

/// Scripted shutter drive: plays back a fixed check() sequence and counts
/// start/finish calls through a shared log.
struct ScriptedDrive {
    script: Vec<i64>,
    index: usize,
    log: Arc<DriveLog>,
}

impl ScriptedDrive {
    fn boxed(script: Vec<i64>, log: Arc<DriveLog>) -> Box<dyn HardwareOp + Send> {
        Box::new(Self { script, index: 0, log })
    }

    fn instant() -> Box<dyn HardwareOp + Send> {
        Self::boxed(vec![POLL_DONE], Arc::new(DriveLog::default()))
    }
}

impl HardwareOp for ScriptedDrive {
    fn start(&mut self) -> Result<(), OpError> {
        self.log.started.fetch_add(1, Ordering::SeqCst);
        self.index = 0;
        Ok(())
    }

    fn check(&mut self) -> i64 {
        let value = self.script[self.index.min(self.script.len() - 1)];
        self.index += 1;
        value
    }

    fn finish(&mut self) -> Result<bool, OpError> {
        self.log.finished.fetch_add(1, Ordering::SeqCst);
        Ok(false)
    }
}

#[test]
fn test_night_broadcast_opens_shutter_through_polling() {
    // Closed shutter, night arrives: one start, two reschedules, then the
    // opened sub-state, with no hardware error anywhere
    let log = Arc::new(DriveLog::default());
    let mut dome = ShutterDevice::new(
        "DOME",
        ScriptedDrive::boxed(vec![5, 5, POLL_DONE], log.clone()),
        ScriptedDrive::instant(),
    );
    assert_eq!(dome.shutter(), SHUTTER_CLOSED);

    dome.on_master_state(MasterState::new(Phase::Night)).unwrap();
    assert_eq!(dome.shutter(), SHUTTER_OPENING);

    // Two polls report time remaining and keep the device in OPENING
    assert_eq!(dome.idle().unwrap(), Some(5));
    assert_eq!(dome.idle().unwrap(), Some(5));
    assert_eq!(dome.shutter(), SHUTTER_OPENING);

    // Third poll completes
    assert_eq!(dome.idle().unwrap(), None);
    assert_eq!(dome.shutter(), SHUTTER_OPENED);
    assert_eq!(log.started(), 1);
    assert_eq!(log.finished(), 1);
}

#[test]
fn test_repeated_broadcast_issues_no_second_start() {
    let log = Arc::new(DriveLog::default());
    let mut dome = ShutterDevice::new(
        "DOME",
        ScriptedDrive::boxed(vec![POLL_DONE], log.clone()),
        ScriptedDrive::instant(),
    );

    dome.on_master_state(MasterState::new(Phase::Night)).unwrap();
    dome.idle().unwrap();
    assert_eq!(dome.shutter(), SHUTTER_OPENED);

    // The same macro-state again must not touch the hardware a second time
    dome.on_master_state(MasterState::new(Phase::Night)).unwrap();
    dome.on_master_state(MasterState::new(Phase::Night)).unwrap();
    assert_eq!(log.started(), 1);
}

#[test]
fn test_failed_open_reports_hardware_error_once() {
    let log = Arc::new(DriveLog::default());
    let mut dome = ShutterDevice::new(
        "DOME",
        ScriptedDrive::boxed(vec![5, POLL_FAILED], log.clone()),
        ScriptedDrive::instant(),
    );

    dome.on_master_state(MasterState::new(Phase::Night)).unwrap();
    assert_eq!(dome.idle().unwrap(), Some(5));
    match dome.idle() {
        Err(DeviceError::Hardware(_)) => {}
        other => panic!("unexpected idle result {other:?}"),
    }
    // The failure settles the shutter back to closed; the completion hook
    // ran exactly once
    assert_eq!(dome.shutter(), SHUTTER_CLOSED);
    assert_eq!(log.finished(), 1);
    assert_eq!(dome.idle().unwrap(), None);
}

#[test]
fn test_dusk_to_night_to_morning_drives_full_round() {
    let mut dome =
        ShutterDevice::new("DOME", ScriptedDrive::instant(), ScriptedDrive::instant());

    // Dusk: standby target, shutter stays closed
    dome.on_master_state(MasterState::new(Phase::Dusk)).unwrap();
    assert_eq!(dome.shutter(), SHUTTER_CLOSED);

    // Night: open
    dome.on_master_state(MasterState::new(Phase::Night)).unwrap();
    dome.idle().unwrap();
    assert_eq!(dome.shutter(), SHUTTER_OPENED);

    // Morning: close
    dome.on_master_state(MasterState::new(Phase::Morning)).unwrap();
    dome.idle().unwrap();
    assert_eq!(dome.shutter(), SHUTTER_CLOSED);
}
