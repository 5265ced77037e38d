//! In-memory substrates for exercising the transport loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::substrate::Substrate;
use crate::wire::RdtPacket;

/// One end of an in-memory packet pipe between two transport loops.
///
/// Sent packets land in the peer's inbound queue unless the drop
/// predicate claims them. The pipe never corrupts and, by default,
/// never drops.
pub struct PipeEnd {
    to_peer: mpsc::Sender<RdtPacket>,
    inbound: tokio::sync::Mutex<mpsc::Receiver<RdtPacket>>,
    drop_fn: Mutex<Box<dyn FnMut(&RdtPacket) -> bool + Send>>,
    ready: AtomicBool,
}

impl PipeEnd {
    /// Replace the drop predicate for packets sent from this end.
    pub fn set_drop_fn(&self, f: impl FnMut(&RdtPacket) -> bool + Send + 'static) {
        *self.drop_fn.lock().unwrap() = Box::new(f);
    }

    /// Toggle admission readiness of this end.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }
}

/// A lossless bidirectional pipe.
pub fn pipe() -> (Arc<PipeEnd>, Arc<PipeEnd>) {
    let (a_tx, a_rx) = mpsc::channel(1024);
    let (b_tx, b_rx) = mpsc::channel(1024);
    let a = Arc::new(PipeEnd {
        to_peer: b_tx,
        inbound: tokio::sync::Mutex::new(a_rx),
        drop_fn: Mutex::new(Box::new(|_| false)),
        ready: AtomicBool::new(true),
    });
    let b = Arc::new(PipeEnd {
        to_peer: a_tx,
        inbound: tokio::sync::Mutex::new(b_rx),
        drop_fn: Mutex::new(Box::new(|_| false)),
        ready: AtomicBool::new(true),
    });
    (a, b)
}

impl Substrate for Arc<PipeEnd> {
    fn ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst) && self.to_peer.capacity() > 0
    }

    fn send(&self, pkt: RdtPacket) {
        let dropped = {
            let mut f = self.drop_fn.lock().unwrap();
            (**f)(&pkt)
        };
        if dropped {
            return;
        }
        // Best effort: shed under pressure like a real link would.
        let _ = self.to_peer.try_send(pkt);
    }

    async fn recv(&self) -> Option<RdtPacket> {
        self.inbound.lock().await.recv().await
    }
}
