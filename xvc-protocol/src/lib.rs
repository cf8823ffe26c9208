//! # XVC Protocol Library
//!
//! Message layer of the [Xilinx Virtual Cable (XVC)](https://github.com/Xilinx/XilinxVirtualCable)
//! protocol, version 1.0.
//!
//! ## Overview
//!
//! - [`Message`]: the three commands a client sends (`getinfo`, `settck`, `shift`)
//! - [`Response`]: the answer the server writes for each of them
//! - [`codec`]: blocking `Read`/`Write` encoding of both
//! - `framing` (feature `tokio`): an incremental decoder for use with
//!   `tokio_util::codec::Framed`, which never waits on a partial frame
//!
//! ## Wire Format
//!
//! | Command | Client sends | Server answers |
//! |---|---|---|
//! | GetInfo | `getinfo:` | `xvcServer_v1.0:<max vector bytes>\n` |
//! | SetTck | `settck:<period ns: u32>` | `<period ns: u32>` |
//! | Shift | `shift:<num_bits: u32><TMS vector><TDI vector>` | `<TDO vector>` |
//!
//! Servers only look at the first two bytes of each keyword (`ge`, `se`, `sh`) and skip
//! the rest of it without checking. All integers are little endian. Vectors are
//! `ceil(num_bits / 8)` bytes, packed LSB-first.
//!
//! ## Decoding a Client Frame
//!
//! ```
//! use xvc_protocol::Message;
//! use std::io::Cursor;
//!
//! let frame = b"shift:\x10\x00\x00\x00\xAA\xAA\x55\x55";
//! let message = Message::from_reader(&mut Cursor::new(frame), 1024).expect("frame is valid");
//! assert_eq!(
//!     message,
//!     Message::Shift {
//!         num_bits: 16,
//!         tms: vec![0xAA; 2].into_boxed_slice(),
//!         tdi: vec![0x55; 2].into_boxed_slice(),
//!     }
//! );
//! ```
//!
//! ## Answering
//!
//! ```
//! use xvc_protocol::{Response, Version, XvcInfo};
//!
//! let mut output = Vec::new();
//! Response::Info(XvcInfo::new(Version::V1_0, 32))
//!     .write_to(&mut output)
//!     .expect("Writing to vector shouldn't fail");
//! assert_eq!(output, b"xvcServer_v1.0:32\n");
//! ```
//!
//! ## Error Handling
//!
//! Decoding fails with [`error::ReadError`]. A server cannot report errors to the
//! client, so any of them ends the connection.

pub mod protocol;
pub use protocol::*;
pub mod codec;
pub mod error;
#[cfg(feature = "tokio")]
pub mod framing;
