//! Device trait, identity registry and the shutter reference device.
//!
//! Devices are owned by their control loop and referred to everywhere else
//! only by stable identity through the registry; nothing holds an owning
//! pointer back to a parent. The shutter device is the dome-like template:
//! it derives its hardware posture from the broadcast macro-state through
//! the target-mode table, driving non-blocking open/close operations.

use std::collections::HashMap;

use thiserror::Error;
use tracing::{info, warn};

use crate::asyncop::{AsyncOperation, HardwareOp, OpError, OpProgress};
use crate::command::{Command, CommandQueue, ConnId};
use crate::protocol::{CommandLine, ErrorKind, Reply, WireError};
use crate::state::{
    MasterState, StateMask, TargetMode, SHUTTER_CLOSED, SHUTTER_CLOSING, SHUTTER_MASK,
    SHUTTER_OPENED, SHUTTER_OPENING,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("device busy: {0}")]
    Busy(String),
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("operation error: {0}")]
    Op(#[from] OpError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("unknown device {0}")]
    UnknownDevice(String),
    #[error("device name {0} already registered")]
    DuplicateName(String),
}

/// One networked device as the coordination core sees it.
///
/// `on_master_state` must be idempotent: receiving the macro-state the
/// device is already aligned with issues no hardware command.
pub trait Device {
    fn name(&self) -> &str;

    /// Encoded device state word (masked sub-groups).
    fn state_word(&self) -> u32;

    /// React to a (possibly unchanged) broadcast macro-state.
    fn on_master_state(&mut self, state: MasterState) -> Result<(), DeviceError>;

    /// One idle-loop pass: poll running operations. Returns the wake delay
    /// in seconds if anything is still in progress.
    fn idle(&mut self) -> Result<Option<u64>, DeviceError>;

    /// Handle one parsed command line, producing the terminal reply.
    fn handle_command(&mut self, line: &CommandLine) -> Reply;
}

/// Name-to-identity map plus the per-connection outbound queues.
///
/// The single authority on who exists; lookups resolve names to identities
/// at use time, so a device vanishing between ticks surfaces as an error,
/// never a dangling reference.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    next_id: ConnId,
    names: HashMap<String, ConnId>,
    queues: HashMap<ConnId, CommandQueue>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str) -> Result<ConnId, RegistryError> {
        if self.names.contains_key(name) {
            return Err(RegistryError::DuplicateName(name.to_string()));
        }
        let id = self.next_id;
        self.next_id += 1;
        self.names.insert(name.to_string(), id);
        self.queues.insert(id, CommandQueue::new());
        info!("registered {} as connection {}", name, id);
        Ok(id)
    }

    pub fn unregister(&mut self, name: &str) {
        if let Some(id) = self.names.remove(name) {
            self.queues.remove(&id);
            info!("unregistered {} (connection {})", name, id);
        }
    }

    pub fn lookup(&self, name: &str) -> Option<ConnId> {
        self.names.get(name).copied()
    }

    pub fn queue_mut(&mut self, id: ConnId) -> Option<&mut CommandQueue> {
        self.queues.get_mut(&id)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.keys().map(String::as_str)
    }

    /// Enqueue a command for a named peer, resolving the name now.
    pub fn enqueue_to(&mut self, name: &str, command: Command) -> Result<(), RegistryError> {
        let id = self
            .lookup(name)
            .ok_or_else(|| RegistryError::UnknownDevice(name.to_string()))?;
        if let Some(queue) = self.queues.get_mut(&id) {
            queue.enqueue(command);
        }
        Ok(())
    }
}

/// Dome-like device: one shutter driven by open/close hardware operations.
pub struct ShutterDevice {
    name: String,
    state: StateMask,
    open_op: AsyncOperation,
    close_op: AsyncOperation,
}

impl ShutterDevice {
    pub fn new(
        name: impl Into<String>,
        open_op: Box<dyn HardwareOp + Send>,
        close_op: Box<dyn HardwareOp + Send>,
    ) -> Self {
        Self {
            name: name.into(),
            state: StateMask::new(),
            open_op: AsyncOperation::new(open_op),
            close_op: AsyncOperation::new(close_op),
        }
    }

    pub fn shutter(&self) -> u32 {
        self.state.get(SHUTTER_MASK)
    }

    /// Start opening. Idempotent for OPENED/OPENING; rejected mid-close.
    pub fn start_open(&mut self) -> Result<(), DeviceError> {
        match self.shutter() {
            SHUTTER_OPENED | SHUTTER_OPENING => Ok(()),
            SHUTTER_CLOSING => Err(DeviceError::Busy("shutter is closing".to_string())),
            _ => {
                self.open_op.begin()?;
                self.state.set(SHUTTER_MASK, SHUTTER_OPENING);
                info!("{}: opening shutter", self.name);
                Ok(())
            }
        }
    }

    /// Start closing. Idempotent for CLOSED/CLOSING; rejected mid-open.
    pub fn start_close(&mut self) -> Result<(), DeviceError> {
        match self.shutter() {
            SHUTTER_CLOSED | SHUTTER_CLOSING => Ok(()),
            SHUTTER_OPENING => Err(DeviceError::Busy("shutter is opening".to_string())),
            _ => {
                self.close_op.begin()?;
                self.state.set(SHUTTER_MASK, SHUTTER_CLOSING);
                info!("{}: closing shutter", self.name);
                Ok(())
            }
        }
    }
}

impl Device for ShutterDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn state_word(&self) -> u32 {
        self.state.raw()
    }

    fn on_master_state(&mut self, state: MasterState) -> Result<(), DeviceError> {
        match state.target_mode() {
            TargetMode::Observing => self.start_open(),
            TargetMode::Standby | TargetMode::Off => self.start_close(),
        }
    }

    fn idle(&mut self) -> Result<Option<u64>, DeviceError> {
        match self.shutter() {
            SHUTTER_OPENING => match self.open_op.poll()? {
                OpProgress::Again(remaining) => Ok(Some(remaining)),
                OpProgress::Done { warned } => {
                    self.state.set(SHUTTER_MASK, SHUTTER_OPENED);
                    if warned {
                        warn!("{}: shutter opened with warning", self.name);
                    } else {
                        info!("{}: shutter opened", self.name);
                    }
                    Ok(None)
                }
                OpProgress::Failed => {
                    // The shutter did not move; report the failure from the
                    // settled closed state.
                    self.state.set(SHUTTER_MASK, SHUTTER_CLOSED);
                    Err(DeviceError::Hardware("shutter open failed".to_string()))
                }
            },
            SHUTTER_CLOSING => match self.close_op.poll()? {
                OpProgress::Again(remaining) => Ok(Some(remaining)),
                OpProgress::Done { warned } => {
                    self.state.set(SHUTTER_MASK, SHUTTER_CLOSED);
                    if warned {
                        warn!("{}: shutter closed with warning", self.name);
                    } else {
                        info!("{}: shutter closed", self.name);
                    }
                    Ok(None)
                }
                OpProgress::Failed => {
                    self.state.set(SHUTTER_MASK, SHUTTER_OPENED);
                    Err(DeviceError::Hardware("shutter close failed".to_string()))
                }
            },
            _ => Ok(None),
        }
    }

    fn handle_command(&mut self, line: &CommandLine) -> Reply {
        let result = match line.verb.as_str() {
            "open" => line.require_args(0).and_then(|()| {
                self.start_open().map(|()| None).map_err(WireError::from)
            }),
            "close" => line.require_args(0).and_then(|()| {
                self.start_close().map(|()| None).map_err(WireError::from)
            }),
            "info" => Ok(Some(format!("{} {}", self.name, self.state.raw()))),
            verb => Err(WireError::new(
                ErrorKind::Command,
                format!("unknown command {verb}"),
            )),
        };
        match result {
            Ok(value) => Reply::Ok(value),
            Err(err) => Reply::Err(err),
        }
    }
}

impl From<DeviceError> for WireError {
    fn from(err: DeviceError) -> Self {
        match err {
            DeviceError::Busy(msg) => WireError::new(ErrorKind::Hw, msg),
            DeviceError::Hardware(msg) => WireError::new(ErrorKind::Hw, msg),
            DeviceError::Op(op) => WireError::new(ErrorKind::Hw, op.to_string()),
        }
    }
}
