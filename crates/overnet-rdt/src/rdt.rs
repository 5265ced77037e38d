//! The transport event loop and its application surface.
//!
//! Per-iteration priorities: deliver buffered in-order payloads first,
//! then inbound substrate packets, then the retransmit timer, then
//! admission of fresh payloads (gated on window room and substrate
//! readiness). On shutdown the loop keeps running until the send
//! window has drained.

use tokio::sync::{mpsc, watch};
use tokio::time::{Duration, Instant};

use crate::error::RdtError;
use crate::state::GoBackN;
use crate::substrate::Substrate;

/// Capacity of the application-facing queues.
pub const QUEUE_CAPACITY: usize = 1000;

/// Application surface of the transport, callable from any task.
pub struct RdtHandle {
    to_rdt: mpsc::Sender<String>,
    from_rdt: tokio::sync::Mutex<mpsc::Receiver<String>>,
}

impl RdtHandle {
    /// Queue a message for reliable delivery to the peer. Blocks while
    /// the outgoing queue is full.
    pub async fn send(&self, message: impl Into<String>) -> Result<(), RdtError> {
        self.to_rdt
            .send(message.into())
            .await
            .map_err(|_| RdtError::Closed)
    }

    /// True iff the outgoing queue has room.
    #[must_use]
    pub fn ready(&self) -> bool {
        self.to_rdt.capacity() > 0
    }

    /// Receive the next delivered message; blocks while none is
    /// available.
    pub async fn receive(&self) -> Result<String, RdtError> {
        self.from_rdt
            .lock()
            .await
            .recv()
            .await
            .ok_or(RdtError::Closed)
    }

    /// True iff a delivered message is waiting.
    pub async fn incoming(&self) -> bool {
        !self.from_rdt.lock().await.is_empty()
    }
}

/// The transport event loop.
#[must_use]
pub struct Rdt<S> {
    state: GoBackN,
    substrate: S,
    from_src: mpsc::Receiver<String>,
    to_snk: mpsc::Sender<String>,
    shutdown: watch::Receiver<bool>,
}

impl<S: Substrate> Rdt<S> {
    /// Build a transport loop and its handle.
    ///
    /// `w_size` is the window size (sequence space is twice that) and
    /// `timeout` the retransmission timeout.
    pub fn new(
        w_size: u16,
        timeout: Duration,
        substrate: S,
        shutdown: watch::Receiver<bool>,
    ) -> (Self, RdtHandle) {
        let (src_tx, from_src) = mpsc::channel(QUEUE_CAPACITY);
        let (to_snk, snk_rx) = mpsc::channel(QUEUE_CAPACITY);
        let rdt = Self {
            state: GoBackN::new(w_size, timeout.as_nanos() as u64),
            substrate,
            from_src,
            to_snk,
            shutdown,
        };
        let handle = RdtHandle {
            to_rdt: src_tx,
            from_rdt: tokio::sync::Mutex::new(snk_rx),
        };
        (rdt, handle)
    }

    /// Run until shutdown is signalled and the send window has drained.
    pub async fn run(mut self) {
        let t0 = Instant::now();
        let mut quit = false;
        let mut src_closed = false;
        let mut shutdown_closed = false;

        loop {
            // Deliver everything in order before touching the wire.
            while let Some(payload) = self.state.deliverable() {
                if self.to_snk.send(payload).await.is_err() {
                    // Sink is gone; further deliveries have nowhere to go.
                    break;
                }
            }
            if quit && self.state.drained() {
                break;
            }

            let deadline = self.state.deadline();
            // Admission continues after a quit request; only the exit
            // check above waits for the window to drain.
            let can_admit = !src_closed && !self.state.window_full() && self.substrate.ready();

            tokio::select! {
                biased;
                changed = self.shutdown.changed(), if !shutdown_closed => {
                    if changed.is_err() {
                        shutdown_closed = true;
                        quit = true;
                    } else if *self.shutdown.borrow() {
                        quit = true;
                    }
                }
                inbound = self.substrate.recv() => {
                    let Some(pkt) = inbound else { break };
                    let now = t0.elapsed().as_nanos() as u64;
                    for out in self.state.on_packet(pkt, now) {
                        self.substrate.send(out);
                    }
                }
                _ = tokio::time::sleep_until(t0 + Duration::from_nanos(deadline)), if deadline != 0 => {
                    let now = t0.elapsed().as_nanos() as u64;
                    for out in self.state.on_timer(now) {
                        self.substrate.send(out);
                    }
                }
                payload = self.from_src.recv(), if can_admit => {
                    match payload {
                        Some(payload) => {
                            if let Some(pkt) = self.state.admit(payload) {
                                self.substrate.send(pkt);
                            }
                        }
                        None => {
                            src_closed = true;
                            quit = true;
                        }
                    }
                }
            }
        }
        tracing::debug!("transport stopped");
    }
}
