//! # XVC over FTDI MPSSE
//!
//! Translates XVC shift requests into batched MPSSE commands and decodes the
//! read-back into TDO vectors.
//!
//! ## Overview
//!
//! - [`ShiftEncoder`] splits a shift into chunks and turns each chunk into
//!   [`Operation`]s plus the command bytes for the adapter
//! - [`decode`](decode::decode) reconstructs the TDO bits from the bytes the adapter returns
//! - [`MpsseBackend`] ties both to a [`Transport`] and implements
//!   [`xvc_server::XvcServer`]
//! - [`SimulatedChain`] is a [`Transport`] that models the adapter in software
//!
//! Runs of bits with TMS low are clocked as whole bytes wherever possible. Bits with
//! TMS high are clocked one at a time, since they move the TAP state machine.
//!
//! ```ignore
//! use xvc_mpsse::{MpsseBackend, ShiftEncoder, SimulatedChain};
//! use xvc_server::server::{Config, Server};
//!
//! let backend = MpsseBackend::new(SimulatedChain::new(8), ShiftEncoder::default());
//! let server = Server::new(backend, Config::default());
//! ```

mod bits;
pub mod backend;
pub mod decode;
pub mod encode;
pub mod operation;
pub mod settings;
pub mod sim;
pub mod transport;

pub use backend::MpsseBackend;
pub use decode::DecodeError;
pub use encode::{DEFAULT_CHUNK_BITS, EncodedChunk, ShiftEncoder};
pub use operation::Operation;
pub use settings::{JtagPins, MpsseSettings};
pub use sim::SimulatedChain;
pub use transport::Transport;
