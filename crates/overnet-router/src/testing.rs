//! In-memory substrate for exercising the forwarder and router loops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use overnet_core::Packet;

use crate::substrate::LinkSubstrate;

/// An in-memory [`LinkSubstrate`]: injected packets appear as inbound
/// traffic, sends are recorded for inspection, and per-link readiness
/// can be toggled to simulate a busy link.
pub struct TestSubstrate {
    inbound_tx: mpsc::Sender<(Packet, usize)>,
    inbound_rx: tokio::sync::Mutex<mpsc::Receiver<(Packet, usize)>>,
    sent: Mutex<Vec<(Packet, usize)>>,
    ready: Vec<AtomicBool>,
}

impl TestSubstrate {
    pub fn new(links: usize) -> Arc<Self> {
        let (inbound_tx, inbound_rx) = mpsc::channel(64);
        Arc::new(Self {
            inbound_tx,
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
            sent: Mutex::new(Vec::new()),
            ready: (0..links).map(|_| AtomicBool::new(true)).collect(),
        })
    }

    /// Inject an inbound packet as if it arrived on `link`.
    pub async fn inject(&self, pkt: Packet, link: usize) {
        self.inbound_tx
            .send((pkt, link))
            .await
            .expect("test substrate receiver dropped");
    }

    /// Snapshot of everything sent so far.
    pub fn sent(&self) -> Vec<(Packet, usize)> {
        self.sent.lock().unwrap().clone()
    }

    /// Toggle readiness of one link.
    pub fn set_ready(&self, link: usize, ready: bool) {
        self.ready[link].store(ready, Ordering::SeqCst);
    }
}

impl LinkSubstrate for Arc<TestSubstrate> {
    fn links(&self) -> usize {
        self.ready.len()
    }

    fn try_send(&self, pkt: Packet, link: usize) -> bool {
        if !self.ready[link].load(Ordering::SeqCst) {
            return false;
        }
        self.sent.lock().unwrap().push((pkt, link));
        true
    }

    async fn recv(&self) -> Option<(Packet, usize)> {
        self.inbound_rx.lock().await.recv().await
    }
}
