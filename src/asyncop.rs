//! Non-blocking multi-step hardware operation machinery.
//!
//! A device never blocks on hardware: it starts an operation, then lets the
//! idle loop poll it. The hardware side is a small capability trait,
//! implemented per hardware family; the coordination core only ever sees
//! the trait.
//!
//! `check()` follows the classic poll convention: a non-negative value is
//! the estimated seconds remaining (the caller reschedules a wake), `-1` is
//! terminal failure, `-2` is terminal success. `finish()` runs the
//! family's completion hook and reports whether a warning occurred.

use thiserror::Error;

pub const POLL_FAILED: i64 = -1;
pub const POLL_DONE: i64 = -2;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OpError {
    #[error("operation already running")]
    AlreadyRunning,
    #[error("operation is not running")]
    NotRunning,
    #[error("hardware error: {0}")]
    Hardware(String),
}

/// Capability interface of one hardware action family (open a shutter,
/// expose a chip, ramp a cooler). Implemented independently per family;
/// the coordination core depends only on this trait.
pub trait HardwareOp {
    /// Kick the hardware off. Must not block.
    fn start(&mut self) -> Result<(), OpError>;

    /// Progress check: seconds remaining, [`POLL_FAILED`] or [`POLL_DONE`].
    fn check(&mut self) -> i64;

    /// Completion hook, run exactly once after a terminal `check()`.
    /// `Ok(true)` means the action completed with a warning.
    fn finish(&mut self) -> Result<bool, OpError>;
}

/// Lifecycle phase of an [`AsyncOperation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpPhase {
    Idle,
    Running,
    Success,
    Error,
}

/// Outcome of one poll from the idle loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpProgress {
    /// Still running; wake again after this many seconds.
    Again(u64),
    /// Terminal failure; the completion hook has run.
    Failed,
    /// Terminal success. `warned` is the completion hook's warning flag.
    Done { warned: bool },
}

/// State machine wrapper enforcing the begin/poll contract around a
/// [`HardwareOp`].
///
/// Only idle-loop polling moves the operation out of `Running`; after a
/// terminal poll result, further polls are rejected until `begin()` is
/// called again.
pub struct AsyncOperation {
    op: Box<dyn HardwareOp + Send>,
    phase: OpPhase,
}

impl AsyncOperation {
    pub fn new(op: Box<dyn HardwareOp + Send>) -> Self {
        Self { op, phase: OpPhase::Idle }
    }

    pub fn phase(&self) -> OpPhase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        self.phase == OpPhase::Running
    }

    /// Transition idle (or a terminal phase) into running.
    pub fn begin(&mut self) -> Result<(), OpError> {
        if self.phase == OpPhase::Running {
            return Err(OpError::AlreadyRunning);
        }
        self.op.start()?;
        self.phase = OpPhase::Running;
        Ok(())
    }

    /// Poll from the idle loop. Invalid unless the operation is running.
    pub fn poll(&mut self) -> Result<OpProgress, OpError> {
        if self.phase != OpPhase::Running {
            return Err(OpError::NotRunning);
        }
        match self.op.check() {
            remaining if remaining >= 0 => Ok(OpProgress::Again(remaining as u64)),
            POLL_DONE => {
                // finish() failing downgrades success to a warning, the way
                // an end-of-open hook failure still leaves the shutter open
                let warned = self.op.finish().unwrap_or(true);
                self.phase = OpPhase::Success;
                Ok(OpProgress::Done { warned })
            }
            _ => {
                let _ = self.op.finish();
                self.phase = OpPhase::Error;
                Ok(OpProgress::Failed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scripted hardware: plays back a fixed check() sequence.
    pub(crate) struct ScriptedOp {
        pub script: Vec<i64>,
        pub index: usize,
        pub started: u32,
        pub finished: u32,
        pub warn_on_finish: bool,
    }

    impl ScriptedOp {
        pub fn new(script: Vec<i64>) -> Self {
            Self { script, index: 0, started: 0, finished: 0, warn_on_finish: false }
        }
    }

    impl HardwareOp for ScriptedOp {
        fn start(&mut self) -> Result<(), OpError> {
            self.started += 1;
            self.index = 0;
            Ok(())
        }

        fn check(&mut self) -> i64 {
            let value = self.script[self.index.min(self.script.len() - 1)];
            self.index += 1;
            value
        }

        fn finish(&mut self) -> Result<bool, OpError> {
            self.finished += 1;
            Ok(self.warn_on_finish)
        }
    }

    #[test]
    fn test_begin_poll_success_sequence() {
        let mut op = AsyncOperation::new(Box::new(ScriptedOp::new(vec![5, 5, POLL_DONE])));
        op.begin().unwrap();
        assert_eq!(op.poll().unwrap(), OpProgress::Again(5));
        assert_eq!(op.poll().unwrap(), OpProgress::Again(5));
        assert_eq!(op.poll().unwrap(), OpProgress::Done { warned: false });
        assert_eq!(op.phase(), OpPhase::Success);
    }

    #[test]
    fn test_poll_invalid_after_terminal() {
        let mut op = AsyncOperation::new(Box::new(ScriptedOp::new(vec![POLL_DONE])));
        op.begin().unwrap();
        assert_eq!(op.poll().unwrap(), OpProgress::Done { warned: false });
        assert_eq!(op.poll().unwrap_err(), OpError::NotRunning);
        // begin() re-arms
        op.begin().unwrap();
        assert!(op.is_running());
    }

    #[test]
    fn test_begin_while_running_rejected() {
        let mut op = AsyncOperation::new(Box::new(ScriptedOp::new(vec![10])));
        op.begin().unwrap();
        assert_eq!(op.begin().unwrap_err(), OpError::AlreadyRunning);
    }

    #[test]
    fn test_failure_runs_finish_once() {
        let mut op = AsyncOperation::new(Box::new(ScriptedOp::new(vec![3, POLL_FAILED])));
        op.begin().unwrap();
        assert_eq!(op.poll().unwrap(), OpProgress::Again(3));
        assert_eq!(op.poll().unwrap(), OpProgress::Failed);
        assert_eq!(op.phase(), OpPhase::Error);
        assert_eq!(op.poll().unwrap_err(), OpError::NotRunning);
    }
}
