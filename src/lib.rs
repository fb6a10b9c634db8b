//! # Observatory Device Bus
//!
//! A coordination library for heterogeneous observatory hardware (domes,
//! cameras, environmental sensors, script generators) providing a shared
//! astronomically-derived macro-state, non-blocking device operations and a
//! uniform command/event protocol over TCP.
//!
//! ## Features
//!
//! - **Macro-state engine**: predicts the next day/evening/dusk/night/dawn/
//!   morning transition and its absolute time from observer location and two
//!   solar elevation thresholds
//! - **Device state machines**: bit-masked sub-state groups driven by polled
//!   asynchronous hardware operations
//! - **Command protocol**: per-connection FIFO queues with completion
//!   reporting and a stable numeric error taxonomy
//! - **Event dispatch**: synchronous, typed, local and peer-directed
//! - **Master coordinator**: broadcasts macro-state changes to every
//!   connected device and maps them to per-device target modes
//!
//! ## Quick Start
//!
//! ```rust
//! use obsbus::astro::{self, Observer};
//!
//! let observer = Observer { latitude_deg: 37.1, longitude_deg: -2.5 };
//! let ev = astro::next_event(&observer, 1_700_000_000.0, -10.0, 0.0, Default::default());
//! if let Ok(ev) = ev {
//!     println!("{:?} until {:?} at {}", ev.current, ev.next, ev.event_time);
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`astro`] - Solar ephemeris and macro-state transition search
//! - [`state`] - Macro-state encoding, target modes and state masks
//! - [`asyncop`] - Non-blocking hardware operation machinery
//! - [`command`] - Per-connection command queues
//! - [`event`] - Synchronous event dispatch
//! - [`protocol`] - Text line protocol and error taxonomy
//! - [`device`] - Device trait, registry and the shutter reference device
//! - [`coordinator`] - Master coordinator state machine
//! - [`scriptor`] - External script-generator collaborator
//! - [`shooter`] - Shower-detection fan-in with duplicate suppression
//! - [`readout`] - Off-loop worker for long hardware reads

#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

pub mod astro;
pub mod asyncop;
pub mod command;
pub mod config;
pub mod coordinator;
pub mod device;
pub mod event;
pub mod protocol;
pub mod readout;
pub mod scriptor;
pub mod shooter;
pub mod state;

// Re-export main public types for convenience
pub use command::{Command, CommandQueue};
pub use coordinator::MasterCoordinator;
pub use device::{DeviceRegistry, ShutterDevice};
pub use state::{MasterState, Phase, StateMask, TargetMode};
