//! The routing daemon driver.
//!
//! Wraps [`RouterState`] in a timer-and-channel event loop: hellos every
//! second, advertisements every ten, inbound control packets from the
//! forwarder in between. Timer deadlines take priority over inbound
//! processing, and forwarding-table updates land before the packets
//! they correspond to are dispatched.

use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};

use crate::forwarder::RouterLink;
use crate::state::{Actions, RouterState};
use crate::table::SharedTable;

/// Interval between hello rounds.
pub const HELLO_INTERVAL: Duration = Duration::from_secs(1);

/// Interval between originated advertisements.
pub const ADVERT_INTERVAL: Duration = Duration::from_secs(10);

/// The routing daemon.
#[must_use]
pub struct Router {
    state: RouterState,
    link: RouterLink,
    table: SharedTable,
    shutdown: watch::Receiver<bool>,
}

impl Router {
    pub fn new(
        state: RouterState,
        link: RouterLink,
        table: SharedTable,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            state,
            link,
            table,
            shutdown,
        }
    }

    /// Run until shutdown is signalled; logs link statistics on exit.
    pub async fn run(mut self) {
        let t0 = Instant::now();
        let mut hello = time::interval(HELLO_INTERVAL);
        hello.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first advert goes out a full interval after startup.
        let mut advert = time::interval_at(
            time::Instant::now() + ADVERT_INTERVAL,
            ADVERT_INTERVAL,
        );
        advert.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.changed() => break,
                _ = hello.tick() => {
                    let actions = self.state.send_hellos(t0.elapsed().as_secs_f64());
                    if self.dispatch(actions).await.is_err() { break; }
                }
                _ = advert.tick() => {
                    let actions = self.state.send_adverts(t0.elapsed().as_secs_f64());
                    if self.dispatch(actions).await.is_err() { break; }
                }
                inbound = self.link.receive_pkt() => {
                    let Some((pkt, lnk)) = inbound else { break };
                    let actions = self.state.handle_incoming(&pkt, lnk, t0.elapsed().as_secs_f64());
                    if self.dispatch(actions).await.is_err() { break; }
                }
            }
        }
        tracing::info!("{}", self.state.stats_string());
    }

    /// Apply forwarding-table updates, then hand packets to the
    /// forwarder. The ordering keeps the data plane in step with the
    /// control plane before the next dispatch cycle.
    async fn dispatch(&mut self, actions: Actions) -> Result<(), ()> {
        for (prefix, link) in actions.fib_updates {
            self.table.add_route(prefix, link);
            tracing::debug!(%prefix, link, table = %self.table.table_string(),
                "forwarding table updated");
        }
        for out in actions.outbound {
            if self.link.send_pkt(out.packet, out.link).await.is_err() {
                return Err(());
            }
        }
        Ok(())
    }
}
