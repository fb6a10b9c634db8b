//! Per-connection outbound command queues.
//!
//! Each connection owns one FIFO of commands waiting to go out plus a
//! single in-flight slot for the command awaiting its terminal reply.
//! Enqueueing never blocks and never fails; the queue is drained each tick
//! as the connection becomes writable, so backpressure lives at the
//! connection, not here. A stalled connection stalls only its own queue.

use std::collections::VecDeque;

use thiserror::Error;

use crate::protocol::{format_command, ErrorKind, LineBuffer, Reply, WireError};

/// Stable identity of a peer connection. Connections refer to devices (and
/// each other) only through identities resolved via the registry; nobody
/// holds an owning pointer back to its parent.
pub type ConnId = u32;

/// Completion disposition of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Queued, not yet on the wire. Can still be cancelled outright.
    Pending,
    /// On the wire, awaiting the terminal reply.
    Sent,
    /// Terminal reply received (or the command failed locally).
    Completed(Result<Option<String>, WireError>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub verb: String,
    pub args: Vec<String>,
    pub origin: ConnId,
    disposition: Disposition,
    cancel_requested: bool,
}

impl Command {
    pub fn new(verb: impl Into<String>, args: Vec<String>, origin: ConnId) -> Self {
        Self {
            verb: verb.into(),
            args,
            origin,
            disposition: Disposition::Pending,
            cancel_requested: false,
        }
    }

    pub fn disposition(&self) -> &Disposition {
        &self.disposition
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel_requested
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Matching pending commands were removed before dispatch.
    Removed(usize),
    /// The command is already on the wire; hardware cancellation was
    /// requested, but the queue still waits for a terminal reply.
    Requested,
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("reply received with no command in flight")]
    UnexpectedReply,
}

/// Outbound FIFO for one connection.
#[derive(Debug, Default)]
pub struct CommandQueue {
    pending: VecDeque<Command>,
    in_flight: Option<Command>,
    completed: Vec<Command>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-blocking, always succeeds.
    pub fn enqueue(&mut self, command: Command) {
        self.pending.push_back(command);
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn in_flight(&self) -> Option<&Command> {
        self.in_flight.as_ref()
    }

    /// Move the head of the queue onto the wire, returning the serialized
    /// line. Call when the connection is writable; returns `None` while a
    /// command is in flight or the queue is empty.
    ///
    /// A command too large for the line buffer can never be sent; it is
    /// completed locally with a SYSTEM error and the next command is tried.
    pub fn dispatch_next(&mut self) -> Option<LineBuffer> {
        if self.in_flight.is_some() {
            return None;
        }
        while let Some(mut command) = self.pending.pop_front() {
            let rendered = format_command(&command.verb, &command.args);
            let mut line = LineBuffer::new();
            if line.try_push_str(&rendered).is_ok() {
                command.disposition = Disposition::Sent;
                self.in_flight = Some(command);
                return Some(line);
            }
            command.disposition = Disposition::Completed(Err(WireError::new(
                ErrorKind::System,
                "command line exceeds buffer",
            )));
            self.completed.push(command);
        }
        None
    }

    /// Complete the in-flight command with its terminal reply.
    pub fn complete(&mut self, reply: Reply) -> Result<(), QueueError> {
        let mut command = self.in_flight.take().ok_or(QueueError::UnexpectedReply)?;
        command.disposition = Disposition::Completed(match reply {
            Reply::Ok(value) => Ok(value),
            Reply::Err(err) => Err(err),
        });
        self.completed.push(command);
        Ok(())
    }

    /// Drain commands that reached a terminal disposition this tick.
    pub fn take_completed(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.completed)
    }

    /// Cancel commands by verb. Pending commands are removed outright; an
    /// in-flight command only gets a best-effort cancellation mark (the
    /// hardware may ignore it) and the queue keeps waiting for its reply.
    pub fn cancel(&mut self, verb: &str) -> CancelOutcome {
        let before = self.pending.len();
        self.pending.retain(|c| c.verb != verb);
        let removed = before - self.pending.len();
        if removed > 0 {
            return CancelOutcome::Removed(removed);
        }
        if let Some(in_flight) = &mut self.in_flight {
            if in_flight.verb == verb {
                in_flight.cancel_requested = true;
                return CancelOutcome::Requested;
            }
        }
        CancelOutcome::NotFound
    }
}
