//! # XVC Server Library
//!
//! This crate provides a foundation for implementing Xilinx Virtual Cable (XVC) servers
//! that handle JTAG communication with FPGA devices over network connections.
//!
//! ## Architecture
//!
//! - **[`XvcServer`] Trait**: the interface a backend implements to perform the actual
//!   JTAG operations (TCK configuration and vector shifting)
//! - **[`server::Server`]**: accepts TCP connections and runs one session per client
//! - **Sessions**: decode XVC frames, dispatch them to the backend and write the replies
//!
//! ## How It Works
//!
//! 1. A backend (e.g. an FTDI MPSSE adapter) implements the [`XvcServer`] trait
//! 2. The backend is wrapped in a [`server::Server`] instance
//! 3. The server listens for TCP connections; every connection gets its own task
//! 4. Each message is dispatched to the backend on tokio's blocking thread pool
//! 5. Results are serialized and sent back to the client
//!
//! Any number of clients may be connected at once. The backend receives `&self` and is
//! responsible for serializing access to its device.
//!
//! ## Basic Usage
//!
//! ```ignore
//! use xvc_server::{XvcServer, error::ShiftError, server::{Server, Config}};
//! use tokio_util::sync::CancellationToken;
//!
//! struct MyDriver;
//!
//! impl XvcServer for MyDriver {
//!     fn set_tck(&self, period_ns: u32) -> u32 {
//!         period_ns
//!     }
//!
//!     fn shift(
//!         &self,
//!         _num_bits: u32,
//!         _tms: Box<[u8]>,
//!         tdi: Box<[u8]>,
//!     ) -> Result<Box<[u8]>, ShiftError> {
//!         Ok(tdi)
//!     }
//! }
//!
//! let server = Server::new(MyDriver, Config::default());
//! server.listen("127.0.0.1:2542", CancellationToken::new()).await?;
//! ```
//!
//! ## Error Handling
//!
//! XVC 1.0 has no way to report errors to a client. A failed shift therefore closes
//! the connection that issued it. Errors that leave the device in an unknown state
//! ([`error::ShiftError::is_fatal`]) additionally stop the whole server.
//!
//! ## Logging
//!
//! This crate uses the `log` crate for diagnostics: connections at info level,
//! processed messages at debug level and vector contents at trace level.

pub mod error;
pub mod server;
mod session;

use error::ShiftError;

/// Trait that backend drivers must implement to provide JTAG functionality.
pub trait XvcServer {
    /// Set the TCK (Test Clock) period.
    ///
    /// Returns the period in nanoseconds that is actually in effect. Backends with a
    /// fixed clock may return the requested value unchanged.
    fn set_tck(&self, period_ns: u32) -> u32;

    /// Shift JTAG TMS and TDI vectors into the device and return the captured TDO.
    ///
    /// `tms` and `tdi` hold ⌈num_bits / 8⌉ bytes each, packed LSB-first.
    /// The returned vector has the same length; bits past `num_bits` are zero.
    ///
    /// The shift must be atomic with respect to other callers: no other shift may
    /// touch the device between the first and the last clock of this one.
    fn shift(&self, num_bits: u32, tms: Box<[u8]>, tdi: Box<[u8]>)
    -> Result<Box<[u8]>, ShiftError>;
}
