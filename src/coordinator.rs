//! Master coordinator: the single source of macro-state truth.
//!
//! On every wake the coordinator re-derives the current phase from the
//! solar geometry, applies the standby/off switches, and pushes the encoded
//! word to every attached device, but only when the word actually changed.
//! The returned wake time is the computed next transition, so the idle loop
//! sleeps exactly until the sky requires attention again.

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::astro::{next_event, AstroError, Margins, Observer};
use crate::device::{Device, DeviceError};
use crate::state::{MasterState, Phase};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordError {
    #[error(transparent)]
    Astro(#[from] AstroError),
}

/// Outcome of one coordinator wake.
#[derive(Debug)]
pub struct CoordTick {
    pub state: MasterState,
    /// True when the encoded word differs from the last broadcast one.
    pub changed: bool,
    /// Absolute Unix time of the next phase transition.
    pub next_wake_unix: i64,
    /// Devices whose transition entry point failed this tick. Failures are
    /// per-device; they never abort the broadcast to the rest.
    pub device_errors: Vec<(String, DeviceError)>,
}

/// Point-in-time snapshot of the whole fleet, for status queries.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub state_word: u32,
    pub phase: Phase,
    pub standby: bool,
    pub off: bool,
    pub devices: Vec<DeviceStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceStatus {
    pub name: String,
    pub state_word: u32,
}

pub struct MasterCoordinator {
    observer: Observer,
    night_horizon: f64,
    day_horizon: f64,
    margins: Margins,
    standby: bool,
    off: bool,
    devices: Vec<Box<dyn Device + Send>>,
    last_broadcast: Option<u32>,
    current: Option<MasterState>,
}

impl MasterCoordinator {
    pub fn new(
        observer: Observer,
        night_horizon: f64,
        day_horizon: f64,
        margins: Margins,
    ) -> Self {
        Self {
            observer,
            night_horizon,
            day_horizon,
            margins,
            standby: false,
            off: false,
            devices: Vec::new(),
            last_broadcast: None,
            current: None,
        }
    }

    pub fn attach(&mut self, device: Box<dyn Device + Send>) {
        self.devices.push(device);
    }

    pub fn state(&self) -> Option<MasterState> {
        self.current
    }

    /// Flip the standby switch. Takes effect on the next [`evaluate`];
    /// the switch itself never recomputes the sky.
    ///
    /// [`evaluate`]: MasterCoordinator::evaluate
    pub fn set_standby(&mut self, on: bool) {
        if self.standby != on {
            info!("standby switch {}", if on { "on" } else { "off" });
        }
        self.standby = on;
    }

    pub fn set_off(&mut self, on: bool) {
        if self.off != on {
            info!("off switch {}", if on { "on" } else { "off" });
        }
        self.off = on;
    }

    pub fn standby(&self) -> bool {
        self.standby
    }

    /// Re-derive the macro-state for `now_unix`, broadcast it if it
    /// changed, and report when to wake next.
    pub fn evaluate(&mut self, now_unix: f64) -> Result<CoordTick, CoordError> {
        let ev = next_event(
            &self.observer,
            now_unix,
            self.night_horizon,
            self.day_horizon,
            self.margins,
        )?;

        let state = MasterState {
            phase: ev.current,
            standby: self.standby,
            off: self.off,
        };
        let word = state.encode();
        let changed = self.last_broadcast != Some(word);
        let mut device_errors = Vec::new();

        if changed {
            info!(
                "master state {:?} -> {:?} at {} (word {:#04x})",
                self.current.map(|s| s.phase),
                state.phase,
                ev.event_time,
                word
            );
            for device in &mut self.devices {
                if let Err(err) = device.on_master_state(state) {
                    warn!("{}: state transition failed: {}", device.name(), err);
                    device_errors.push((device.name().to_string(), err));
                }
            }
            self.last_broadcast = Some(word);
        }
        self.current = Some(state);

        Ok(CoordTick {
            state,
            changed,
            next_wake_unix: ev.event_time,
            device_errors,
        })
    }

    /// Forward a command line to a named device; `None` if no such device
    /// is attached.
    pub fn device_command(
        &mut self,
        name: &str,
        line: &crate::protocol::CommandLine,
    ) -> Option<crate::protocol::Reply> {
        self.devices
            .iter_mut()
            .find(|d| d.name() == name)
            .map(|d| d.handle_command(line))
    }

    /// Run one idle pass over all devices, returning the soonest requested
    /// wake delay in seconds, if any operation is still in progress.
    pub fn idle_devices(&mut self) -> Option<u64> {
        let mut soonest: Option<u64> = None;
        for device in &mut self.devices {
            match device.idle() {
                Ok(Some(delay)) => {
                    soonest = Some(soonest.map_or(delay, |s| s.min(delay)));
                }
                Ok(None) => {}
                Err(err) => warn!("{}: idle poll failed: {}", device.name(), err),
            }
        }
        soonest
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let state = self.current.unwrap_or_else(|| MasterState::new(Phase::Day));
        StatusSnapshot {
            state_word: state.encode(),
            phase: state.phase,
            standby: state.standby,
            off: state.off,
            devices: self
                .devices
                .iter()
                .map(|d| DeviceStatus {
                    name: d.name().to_string(),
                    state_word: d.state_word(),
                })
                .collect(),
        }
    }
}
