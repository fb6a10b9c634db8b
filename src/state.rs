//! Macro-state encoding, per-device target modes and masked state groups.
//!
//! The coordinator broadcasts one integer: the current phase of the
//! day/night cycle in the low nibble plus an orthogonal standby/off flag.
//! Devices keep their own state in a [`StateMask`], an integer carved into
//! independently-addressable bit groups.

use serde::{Deserialize, Serialize};
use static_assertions::const_assert_eq;

/// Phase bits of the broadcast state word.
pub const STATUS_MASK: u32 = 0x0f;
/// Standby/off bits of the broadcast state word.
pub const STANDBY_MASK: u32 = 0x30;
pub const STANDBY: u32 = 0x10;
pub const OFF: u32 = 0x20;

const_assert_eq!(STATUS_MASK & STANDBY_MASK, 0);

/// Shutter sub-state group of a dome-like device.
pub const SHUTTER_MASK: u32 = 0x03;
pub const SHUTTER_CLOSED: u32 = 0x00;
pub const SHUTTER_OPENING: u32 = 0x01;
pub const SHUTTER_OPENED: u32 = 0x02;
pub const SHUTTER_CLOSING: u32 = 0x03;

/// Cooling sub-state group (camera-like devices), independent of the
/// shutter group.
pub const COOLING_MASK: u32 = 0x0c;
pub const COOLING_OFF: u32 = 0x00;
pub const COOLING_RAMPING: u32 = 0x04;
pub const COOLING_STABLE: u32 = 0x08;

const_assert_eq!(SHUTTER_MASK & COOLING_MASK, 0);

/// One phase of the astronomical day/night cycle.
///
/// The cycle is total and cyclic: every phase has exactly one successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Day,
    Evening,
    Dusk,
    Night,
    Dawn,
    Morning,
}

impl Phase {
    pub fn as_u32(self) -> u32 {
        match self {
            Phase::Day => 0,
            Phase::Evening => 1,
            Phase::Dusk => 2,
            Phase::Night => 3,
            Phase::Dawn => 4,
            Phase::Morning => 5,
        }
    }

    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Phase::Day),
            1 => Some(Phase::Evening),
            2 => Some(Phase::Dusk),
            3 => Some(Phase::Night),
            4 => Some(Phase::Dawn),
            5 => Some(Phase::Morning),
            _ => None,
        }
    }

    /// The unique successor in the day/night cycle.
    pub fn successor(self) -> Self {
        match self {
            Phase::Day => Phase::Evening,
            Phase::Evening => Phase::Dusk,
            Phase::Dusk => Phase::Night,
            Phase::Night => Phase::Dawn,
            Phase::Dawn => Phase::Morning,
            Phase::Morning => Phase::Day,
        }
    }
}

/// The full broadcast macro-state: phase plus standby/off override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterState {
    pub phase: Phase,
    pub standby: bool,
    pub off: bool,
}

impl MasterState {
    pub fn new(phase: Phase) -> Self {
        Self { phase, standby: false, off: false }
    }

    /// Wire encoding: phase in the low nibble, standby/off flags above it.
    pub fn encode(self) -> u32 {
        let mut word = self.phase.as_u32();
        if self.standby {
            word |= STANDBY;
        }
        if self.off {
            word |= OFF;
        }
        word
    }

    pub fn decode(word: u32) -> Option<Self> {
        let phase = Phase::from_u32(word & STATUS_MASK)?;
        Some(Self {
            phase,
            standby: word & STANDBY_MASK == STANDBY,
            off: word & STANDBY_MASK == OFF,
        })
    }

    /// Per-device interpretation of the macro-state.
    ///
    /// Standby forces a reduced mode regardless of phase: during the dark
    /// phases the device holds at standby (ready to resume), otherwise it
    /// powers down. Without the override only full night maps to observing;
    /// the twilight phases hold at standby.
    pub fn target_mode(self) -> TargetMode {
        if self.standby || self.off {
            return match self.phase {
                Phase::Dusk | Phase::Night | Phase::Dawn => TargetMode::Standby,
                _ => TargetMode::Off,
            };
        }
        match self.phase {
            Phase::Night => TargetMode::Observing,
            Phase::Dusk | Phase::Dawn => TargetMode::Standby,
            _ => TargetMode::Off,
        }
    }
}

/// What a device should be doing under the current macro-state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetMode {
    Observing,
    Standby,
    Off,
}

/// Integer device state carved into independently-masked bit groups.
///
/// A group's bits are mutually exclusive: setting a group clears the whole
/// group mask before OR-ing in the new value, leaving other groups
/// untouched. Confined to the owning device's control thread, so no
/// locking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateMask {
    value: u32,
}

impl StateMask {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the bits of one group, leaving all others unchanged.
    pub fn set(&mut self, group_mask: u32, value: u32) {
        self.value = (self.value & !group_mask) | (value & group_mask);
    }

    /// Current bits of one group.
    pub fn get(&self, group_mask: u32) -> u32 {
        self.value & group_mask
    }

    pub fn raw(&self) -> u32 {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_cycle_is_total() {
        let mut phase = Phase::Day;
        for _ in 0..6 {
            phase = phase.successor();
        }
        assert_eq!(phase, Phase::Day);
    }

    #[test]
    fn test_master_state_round_trip() {
        for word in 0..6 {
            let state = MasterState::decode(word).unwrap();
            assert_eq!(state.encode(), word);
            let standby = MasterState::decode(word | STANDBY).unwrap();
            assert!(standby.standby);
            assert_eq!(standby.encode(), word | STANDBY);
        }
        assert!(MasterState::decode(0x0f).is_none());
    }

    #[test]
    fn test_target_mode_table() {
        assert_eq!(MasterState::new(Phase::Night).target_mode(), TargetMode::Observing);
        assert_eq!(MasterState::new(Phase::Dusk).target_mode(), TargetMode::Standby);
        assert_eq!(MasterState::new(Phase::Dawn).target_mode(), TargetMode::Standby);
        assert_eq!(MasterState::new(Phase::Day).target_mode(), TargetMode::Off);
        assert_eq!(MasterState::new(Phase::Evening).target_mode(), TargetMode::Off);
        assert_eq!(MasterState::new(Phase::Morning).target_mode(), TargetMode::Off);

        // Standby forces the reduced mode even at night
        let mut night = MasterState::new(Phase::Night);
        night.standby = true;
        assert_eq!(night.target_mode(), TargetMode::Standby);

        let mut day = MasterState::new(Phase::Day);
        day.standby = true;
        assert_eq!(day.target_mode(), TargetMode::Off);
    }

    #[test]
    fn test_state_mask_round_trip() {
        let mut mask = StateMask::new();
        mask.set(SHUTTER_MASK, SHUTTER_OPENING);
        mask.set(COOLING_MASK, COOLING_STABLE);
        assert_eq!(mask.get(SHUTTER_MASK), SHUTTER_OPENING);
        assert_eq!(mask.get(COOLING_MASK), COOLING_STABLE);

        // Updating one group leaves the other untouched
        mask.set(SHUTTER_MASK, SHUTTER_OPENED);
        assert_eq!(mask.get(SHUTTER_MASK), SHUTTER_OPENED);
        assert_eq!(mask.get(COOLING_MASK), COOLING_STABLE);
    }

    #[test]
    fn test_state_mask_ignores_out_of_group_bits() {
        let mut mask = StateMask::new();
        mask.set(SHUTTER_MASK, 0xff);
        assert_eq!(mask.raw(), SHUTTER_MASK);
    }
}
