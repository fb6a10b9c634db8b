//! Shower-detection fan-in.
//!
//! External detectors report transient showers (date, RA, Dec, target id).
//! Reports arrive redundantly from several feeds, so a shower already seen
//! within the duplicate window is dropped. A fresh shower updates the
//! published values and posts an immediate-observation command to the
//! executor connection; a missing executor is a fatal, logged error for
//! that shower, never a silent drop.

use heapless::Vec as BoundedVec;
use thiserror::Error;
use tracing::{error, info};

use crate::command::{Command, ConnId};
use crate::device::DeviceRegistry;
use crate::protocol::format_value_line;

/// Name under which the executor registers.
pub const EXECUTOR_NAME: &str = "EXEC";

/// Two reports closer than this in time, with identical coordinates, are
/// the same shower.
pub const DUPLICATE_WINDOW_S: f64 = 5.0;

const HISTORY_CAP: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shower {
    /// Detection time, Unix seconds.
    pub date: f64,
    pub ra: f64,
    pub dec: f64,
    pub target_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShooterError {
    #[error("no executor running to post shower")]
    NoExecutor,
}

#[derive(Debug, PartialEq)]
pub enum ShowerOutcome {
    /// Already seen; nothing published, nothing posted.
    Duplicate,
    /// Posted to the executor; these value lines go to all peers.
    Posted { value_lines: Vec<String> },
}

/// Fan-in point for shower reports, keeping a short recent history for
/// duplicate suppression.
#[derive(Default)]
pub struct Shooter {
    history: BoundedVec<Shower, HISTORY_CAP>,
}

impl Shooter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Duplicate test: within the window and coordinate-identical. The
    /// coordinate match is exact; redundant feeds relay the same numbers.
    pub fn was_seen(&self, date: f64, ra: f64, dec: f64) -> bool {
        self.history.iter().any(|s| {
            (date - s.date).abs() < DUPLICATE_WINDOW_S
                && s.ra.to_bits() == ra.to_bits()
                && s.dec.to_bits() == dec.to_bits()
        })
    }

    /// Accept one report: suppress duplicates, otherwise publish and post
    /// the immediate-observation command to the executor.
    pub fn new_shower(
        &mut self,
        shower: Shower,
        registry: &mut DeviceRegistry,
        origin: ConnId,
    ) -> Result<ShowerOutcome, ShooterError> {
        if self.was_seen(shower.date, shower.ra, shower.dec) {
            return Ok(ShowerOutcome::Duplicate);
        }

        if self.history.is_full() {
            self.history.remove(0);
        }
        // Space was just ensured
        let _ = self.history.push(shower);

        registry
            .enqueue_to(
                EXECUTOR_NAME,
                Command::new("now", vec![shower.target_id.to_string()], origin),
            )
            .map_err(|_| {
                error!("FATAL! No executor running to post shower!");
                ShooterError::NoExecutor
            })?;

        info!(
            "shower {} at ra {} dec {} posted to executor",
            shower.target_id, shower.ra, shower.dec
        );
        Ok(ShowerOutcome::Posted {
            value_lines: vec![
                format_value_line("shower_date", &shower.date.to_string()),
                format_value_line("shower_ra", &shower.ra.to_string()),
                format_value_line("shower_dec", &shower.dec.to_string()),
            ],
        })
    }
}
