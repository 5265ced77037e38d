//! Reliable data transport: a go-back-N sliding-window protocol on top
//! of an unreliable packet substrate.
//!
//! Sequence numbers are 15 bits and wrap modulo twice the window size.
//! The receiver delivers strictly in order and acknowledges
//! cumulatively; the sender retransmits its whole window on a timer or
//! on the third duplicate acknowledgment.
//!
//! [`GoBackN`] holds the pure protocol state; the [`Rdt`] driver runs
//! it over bounded channels and the [`Substrate`] seam.

pub mod error;
pub mod rdt;
pub mod state;
pub mod substrate;
pub mod testing;
pub mod wire;

pub use error::RdtError;
pub use rdt::{Rdt, RdtHandle};
pub use state::GoBackN;
pub use substrate::Substrate;
pub use wire::{PacketType, RdtPacket};
