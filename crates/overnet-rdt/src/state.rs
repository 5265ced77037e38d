//! Go-back-N protocol state.
//!
//! [`GoBackN`] is deliberately decoupled from I/O: callers feed it
//! inbound packets, timer checks, and fresh payloads, and it returns
//! the packets to transmit. Time is a monotonic nanosecond count
//! supplied by the caller; the retransmit deadline is absolute, with 0
//! meaning disarmed.

use crate::wire::{PacketType, RdtPacket, SEQ_MAX};

/// Largest permitted window size; the sequence space is twice this.
pub const MAX_WINDOW: u16 = (SEQ_MAX + 1) / 2 - 1; // 2^14 - 1

/// Duplicate-ACK count that triggers a fast retransmit.
const DUP_ACK_THRESHOLD: u16 = 3;

/// Sliding-window sender/receiver state.
#[must_use]
pub struct GoBackN {
    /// Window size `W`; at most `W` packets are unacknowledged.
    w: u16,
    /// Retransmission timeout in nanoseconds.
    timeout: u64,

    // ---- Sender ----
    /// Unacknowledged packets, indexed by sequence number.
    send_buf: Vec<Option<RdtPacket>>,
    /// Oldest unacknowledged sequence number.
    send_base: u16,
    /// Next free sequence number.
    send_seq: u16,
    /// Consecutive duplicate ACKs of `send_base - 1`.
    dup_acks: u16,
    /// Set after a fast retransmit until the base advances.
    retrans_flag: bool,
    /// Absolute retransmit deadline in ns; 0 means disarmed.
    send_again: u64,

    // ---- Receiver ----
    /// In-order packets not yet delivered to the application.
    recv_buf: Vec<Option<RdtPacket>>,
    /// Next sequence to deliver.
    recv_base: u16,
    /// Next sequence expected from the substrate.
    exp_seq: u16,
    /// Most recently observed sequence number.
    last_rcvd: Option<u16>,
}

impl GoBackN {
    /// Create protocol state for window size `w` (clamped to
    /// [`MAX_WINDOW`]) and the given retransmission timeout.
    pub fn new(w: u16, timeout_ns: u64) -> Self {
        let w = w.clamp(1, MAX_WINDOW);
        let space = 2 * w as usize;
        Self {
            w,
            timeout: timeout_ns,
            send_buf: vec![None; space],
            send_base: 0,
            send_seq: 0,
            dup_acks: 0,
            retrans_flag: false,
            send_again: 0,
            recv_buf: vec![None; space],
            recv_base: 0,
            exp_seq: 0,
            last_rcvd: None,
        }
    }

    /// Sequence space size `S = 2W`.
    #[must_use]
    pub fn seq_space(&self) -> u16 {
        2 * self.w
    }

    /// Next sequence number after `x`, wrapping at `S`.
    #[must_use]
    pub fn incr(&self, x: u16) -> u16 {
        let x = x + 1;
        if x < self.seq_space() { x } else { 0 }
    }

    /// Clockwise distance from `y` to `x` in the sequence space.
    #[must_use]
    pub fn diff(&self, x: u16, y: u16) -> u16 {
        if x >= y {
            x - y
        } else {
            x + self.seq_space() - y
        }
    }

    // ------------------------------------------------------------------ //
    // Sender
    // ------------------------------------------------------------------ //

    /// True iff the send window has no room for another packet.
    #[must_use]
    pub fn window_full(&self) -> bool {
        self.diff(self.send_seq, self.send_base) >= self.w
    }

    /// True iff every sent packet has been acknowledged.
    #[must_use]
    pub fn drained(&self) -> bool {
        self.send_seq == self.send_base
    }

    /// Current retransmit deadline (0 = disarmed).
    #[must_use]
    pub fn deadline(&self) -> u64 {
        self.send_again
    }

    /// Most recently observed sequence number, if any.
    #[must_use]
    pub fn last_rcvd(&self) -> Option<u16> {
        self.last_rcvd
    }

    /// Admit a fresh payload into the window, returning the DATA packet
    /// to transmit, or `None` when the window is full.
    ///
    /// Admission does not arm the retransmit timer; only inbound
    /// traffic and timer expiry do.
    pub fn admit(&mut self, payload: String) -> Option<RdtPacket> {
        if self.window_full() {
            return None;
        }
        let pkt = RdtPacket::data(self.send_seq, payload);
        self.send_buf[self.send_seq as usize] = Some(pkt.clone());
        self.send_seq = self.incr(self.send_seq);
        Some(pkt)
    }

    /// Every packet currently in the send window, oldest first.
    #[must_use]
    pub fn window_packets(&self) -> Vec<RdtPacket> {
        let mut out = Vec::new();
        let mut s = self.send_base;
        while self.diff(s, self.send_base) < self.diff(self.send_seq, self.send_base) {
            if let Some(pkt) = &self.send_buf[s as usize] {
                out.push(pkt.clone());
            }
            s = self.incr(s);
        }
        out
    }

    /// Check the retransmit timer; on expiry, return the window to
    /// retransmit and re-arm.
    pub fn on_timer(&mut self, now: u64) -> Vec<RdtPacket> {
        if self.send_again == 0 || now < self.send_again {
            return Vec::new();
        }
        tracing::debug!(base = self.send_base, next = self.send_seq, "retransmit timer fired");
        let out = self.window_packets();
        self.send_again = now + self.timeout;
        out
    }

    // ------------------------------------------------------------------ //
    // Inbound
    // ------------------------------------------------------------------ //

    /// Process an inbound packet, returning the packets to transmit
    /// (an ACK for DATA, possibly a fast retransmit burst for an ACK).
    /// Any inbound packet re-arms the retransmit timer.
    pub fn on_packet(&mut self, pkt: RdtPacket, now: u64) -> Vec<RdtPacket> {
        self.last_rcvd = Some(pkt.seq);
        let out = match pkt.ty {
            PacketType::Data => vec![self.on_data(pkt)],
            PacketType::Ack => self.on_ack(pkt.seq),
        };
        self.send_again = now + self.timeout;
        out
    }

    /// A DATA packet: buffer it if it is the expected one, and
    /// acknowledge cumulatively either way.
    fn on_data(&mut self, pkt: RdtPacket) -> RdtPacket {
        if pkt.seq == self.exp_seq {
            let ack = RdtPacket::ack(self.exp_seq);
            self.recv_buf[self.exp_seq as usize] = Some(pkt);
            self.exp_seq = self.incr(self.exp_seq);
            ack
        } else {
            // Duplicate or out of order: re-acknowledge the last
            // in-order sequence. Before anything has arrived this wraps
            // to S-1, which the sender counts as a duplicate ACK.
            let last_in_order = if self.exp_seq == 0 {
                self.seq_space() - 1
            } else {
                self.exp_seq - 1
            };
            RdtPacket::ack(last_in_order)
        }
    }

    /// An ACK: advance the base if it acknowledges anything in flight,
    /// otherwise count duplicates toward a fast retransmit.
    fn on_ack(&mut self, seq: u16) -> Vec<RdtPacket> {
        if self.diff(seq, self.send_base) < self.diff(self.send_seq, self.send_base) {
            self.send_base = self.incr(seq);
            self.dup_acks = 0;
            self.retrans_flag = false;
        } else if self.incr(seq) == self.send_base {
            self.dup_acks += 1;
        }
        if self.dup_acks == DUP_ACK_THRESHOLD && !self.retrans_flag {
            self.retrans_flag = true;
            tracing::debug!(base = self.send_base, "fast retransmit");
            return self.window_packets();
        }
        Vec::new()
    }

    // ------------------------------------------------------------------ //
    // Receiver delivery
    // ------------------------------------------------------------------ //

    /// Take the next in-order payload for the application, if any.
    pub fn deliverable(&mut self) -> Option<String> {
        if self.recv_base == self.exp_seq {
            return None;
        }
        let pkt = self.recv_buf[self.recv_base as usize]
            .take()
            .expect("receive buffer slot empty inside delivery range");
        self.recv_base = self.incr(self.recv_base);
        Some(pkt.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: u64 = 1_000_000;

    fn gbn(w: u16) -> GoBackN {
        GoBackN::new(w, 1000 * MS)
    }

    #[test]
    fn incr_and_diff_wrap_at_sequence_space() {
        let g = gbn(4); // S = 8
        assert_eq!(g.incr(6), 7);
        assert_eq!(g.incr(7), 0);
        assert_eq!(g.diff(2, 6), 4);
        assert_eq!(g.diff(6, 2), 4);
        assert_eq!(g.diff(5, 5), 0);
    }

    #[test]
    fn window_is_clamped_to_protocol_maximum() {
        let g = GoBackN::new(u16::MAX, MS);
        assert_eq!(g.seq_space(), 2 * MAX_WINDOW);
    }

    #[test]
    fn admit_fills_window_then_refuses() {
        let mut g = gbn(4);
        for i in 0..4 {
            let pkt = g.admit(format!("p{i}")).expect("window has room");
            assert_eq!(pkt.seq, i);
            assert_eq!(pkt.ty, PacketType::Data);
        }
        assert!(g.window_full());
        assert!(g.admit("overflow".to_string()).is_none());
        // Window bound: never more than W outstanding.
        assert!(g.diff(g.send_seq, g.send_base) <= 4);
    }

    #[test]
    fn admit_does_not_arm_the_timer() {
        let mut g = gbn(4);
        g.admit("p".to_string()).unwrap();
        assert_eq!(g.deadline(), 0);
        assert!(g.on_timer(10_000 * MS).is_empty());
    }

    #[test]
    fn in_order_data_is_acked_and_delivered() {
        let mut g = gbn(4);
        let acks = g.on_packet(RdtPacket::data(0, "a"), MS);
        assert_eq!(acks, vec![RdtPacket::ack(0)]);
        let acks = g.on_packet(RdtPacket::data(1, "b"), 2 * MS);
        assert_eq!(acks, vec![RdtPacket::ack(1)]);

        assert_eq!(g.deliverable().as_deref(), Some("a"));
        assert_eq!(g.deliverable().as_deref(), Some("b"));
        assert_eq!(g.deliverable(), None);
    }

    #[test]
    fn out_of_order_data_gets_duplicate_ack_and_is_not_buffered() {
        let mut g = gbn(4);
        g.on_packet(RdtPacket::data(0, "a"), MS);
        // Sequence 2 arrives while 1 is expected.
        let acks = g.on_packet(RdtPacket::data(2, "c"), 2 * MS);
        assert_eq!(acks, vec![RdtPacket::ack(0)]);
        assert_eq!(g.deliverable().as_deref(), Some("a"));
        assert_eq!(g.deliverable(), None);
    }

    #[test]
    fn first_packet_miss_acks_top_of_sequence_space() {
        let mut g = gbn(4); // S = 8
        assert_eq!(g.last_rcvd(), None);
        // Nothing received yet; an out-of-order arrival is acked with
        // the wrap of expSeqNum - 1.
        let acks = g.on_packet(RdtPacket::data(1, "b"), MS);
        assert_eq!(acks, vec![RdtPacket::ack(7)]);
        assert_eq!(g.last_rcvd(), Some(1));
    }

    #[test]
    fn cumulative_ack_advances_base_past_skipped_acks() {
        let mut g = gbn(4);
        for i in 0..4 {
            g.admit(format!("p{i}")).unwrap();
        }
        // ACK 2 covers 0, 1, and 2 at once.
        let out = g.on_packet(RdtPacket::ack(2), MS);
        assert!(out.is_empty());
        assert_eq!(g.send_base, 3);
        assert!(!g.window_full());
    }

    #[test]
    fn triple_duplicate_ack_triggers_one_fast_retransmit() {
        let mut g = gbn(4); // S = 8
        for i in 0..4 {
            g.admit(format!("p{i}")).unwrap();
        }
        // Receiver never saw seq 0: duplicate ACKs of base-1 = 7.
        assert!(g.on_packet(RdtPacket::ack(7), MS).is_empty());
        assert!(g.on_packet(RdtPacket::ack(7), 2 * MS).is_empty());
        let burst = g.on_packet(RdtPacket::ack(7), 3 * MS);
        assert_eq!(burst.len(), 4);
        assert_eq!(
            burst.iter().map(|p| p.seq).collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );
        // A fourth duplicate does not retransmit again.
        assert!(g.on_packet(RdtPacket::ack(7), 4 * MS).is_empty());
    }

    #[test]
    fn base_advance_resets_duplicate_tracking() {
        let mut g = gbn(4);
        for i in 0..4 {
            g.admit(format!("p{i}")).unwrap();
        }
        g.on_packet(RdtPacket::ack(7), MS);
        g.on_packet(RdtPacket::ack(7), 2 * MS);
        g.on_packet(RdtPacket::ack(7), 3 * MS); // fast retransmit
        // The retransmitted window gets through; base advances.
        g.on_packet(RdtPacket::ack(3), 4 * MS);
        assert!(g.drained());

        // A fresh loss episode can fast-retransmit again.
        for i in 0..3 {
            g.admit(format!("q{i}")).unwrap();
        }
        g.on_packet(RdtPacket::ack(3), 5 * MS);
        g.on_packet(RdtPacket::ack(3), 6 * MS);
        let burst = g.on_packet(RdtPacket::ack(3), 7 * MS);
        assert_eq!(burst.len(), 3);
        assert_eq!(
            burst.iter().map(|p| p.seq).collect::<Vec<_>>(),
            vec![4, 5, 6]
        );
    }

    #[test]
    fn timer_retransmits_whole_window_and_rearms() {
        let mut g = gbn(4);
        for i in 0..3 {
            g.admit(format!("p{i}")).unwrap();
        }
        // Arm the timer via an inbound duplicate ACK.
        g.on_packet(RdtPacket::ack(7), 10 * MS);
        assert_eq!(g.deadline(), 1010 * MS);

        assert!(g.on_timer(500 * MS).is_empty(), "deadline not reached");
        let burst = g.on_timer(1010 * MS);
        assert_eq!(burst.len(), 3);
        assert_eq!(g.deadline(), 2010 * MS);
    }

    #[test]
    fn timer_is_idempotent_when_window_is_empty() {
        let mut g = gbn(4);
        // Arm via inbound, but nothing is outstanding.
        g.on_packet(RdtPacket::ack(7), MS);
        let burst = g.on_timer(5000 * MS);
        assert!(burst.is_empty());
    }

    #[test]
    fn sequence_numbers_wrap_through_the_space() {
        let mut g = gbn(2); // S = 4
        for round in 0..6 {
            let pkt = g.admit(format!("r{round}")).unwrap();
            assert_eq!(pkt.seq, (round % 4) as u16);
            let acks = g.on_packet(RdtPacket::data(pkt.seq, format!("r{round}")), MS);
            assert_eq!(acks, vec![RdtPacket::ack(pkt.seq)]);
            g.on_packet(RdtPacket::ack(pkt.seq), MS);
            assert_eq!(g.deliverable().as_deref(), Some(format!("r{round}").as_str()));
        }
        assert!(g.drained());
    }
}
