//! Off-loop frame readout.
//!
//! Reading a full frame off hardware takes too long for the cooperative
//! idle loop, so it is the one job allowed onto a dedicated worker thread.
//! The worker reads in bounded chunks and checks a shared cancellation
//! token between chunks; the finished buffer moves back over a bounded
//! ownership-transferring channel, polled with `try_recv` from the idle
//! loop. There is no shared result buffer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;

use thiserror::Error;
use tracing::{debug, info};

/// Chunk-granular access to one frame of hardware data.
pub trait ChunkReader: Send + 'static {
    /// The next chunk, or `Ok(None)` at end of frame.
    fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, String>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadoutError {
    #[error("readout already in progress")]
    Busy,
    /// Worker spawn failure; surfaces as the SYSTEM wire error.
    #[error("cannot spawn readout worker: {0}")]
    Spawn(String),
}

/// Result of one idle-loop poll.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadoutProgress {
    Running,
    /// The worker exited without producing a frame (cancelled).
    Cancelled,
    Complete(Vec<u8>),
    Failed(String),
}

/// One readout slot: at most one worker at a time.
#[derive(Default)]
pub struct Readout {
    cancel: Option<Arc<AtomicBool>>,
    rx: Option<Receiver<Result<Vec<u8>, String>>>,
    running: bool,
}

impl Readout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Kick off a readout. Rejected while one is running; after a cancel,
    /// restarting replaces the old channel, so a stale frame from a worker
    /// that finished anyway is dropped rather than served.
    pub fn start(&mut self, mut reader: impl ChunkReader) -> Result<(), ReadoutError> {
        if self.running {
            return Err(ReadoutError::Busy);
        }

        let cancel = Arc::new(AtomicBool::new(false));
        let (tx, rx) = sync_channel(1);
        let token = cancel.clone();

        thread::Builder::new()
            .name("readout".to_string())
            .spawn(move || {
                let mut frame = Vec::new();
                loop {
                    if token.load(Ordering::SeqCst) {
                        debug!("readout cancelled after {} bytes", frame.len());
                        return;
                    }
                    match reader.next_chunk() {
                        Ok(Some(chunk)) => frame.extend_from_slice(&chunk),
                        Ok(None) => {
                            debug!("readout complete, {} bytes", frame.len());
                            let _ = tx.send(Ok(frame));
                            return;
                        }
                        Err(err) => {
                            let _ = tx.send(Err(err));
                            return;
                        }
                    }
                }
            })
            .map_err(|err| ReadoutError::Spawn(err.to_string()))?;

        self.cancel = Some(cancel);
        self.rx = Some(rx);
        self.running = true;
        Ok(())
    }

    /// Request cancellation. The worker notices at the next chunk boundary;
    /// the slot is immediately reusable.
    pub fn cancel(&mut self) {
        if let Some(token) = &self.cancel {
            token.store(true, Ordering::SeqCst);
            info!("readout cancellation requested");
        }
        self.running = false;
    }

    /// Non-blocking progress check from the idle loop.
    pub fn poll(&mut self) -> ReadoutProgress {
        let Some(rx) = &self.rx else {
            return ReadoutProgress::Cancelled;
        };
        match rx.try_recv() {
            Ok(Ok(frame)) => {
                self.running = false;
                self.rx = None;
                ReadoutProgress::Complete(frame)
            }
            Ok(Err(err)) => {
                self.running = false;
                self.rx = None;
                ReadoutProgress::Failed(err)
            }
            Err(TryRecvError::Empty) => ReadoutProgress::Running,
            Err(TryRecvError::Disconnected) => {
                self.running = false;
                self.rx = None;
                ReadoutProgress::Cancelled
            }
        }
    }
}
