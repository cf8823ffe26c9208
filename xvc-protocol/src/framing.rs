//! Incremental frame decoding for use with [`tokio_util::codec::Framed`].
//!
//! The server side decodes [`Message`]s and encodes [`Response`]s. Frames may arrive
//! split across any number of reads; the decoder keeps track of how far it got.
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::{
    codec::{Command, PREFIX_LEN, check_vector_len, le_u32},
    error::ReadError,
    protocol::{Message, Response},
};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum DecodeState {
    AwaitCommand,
    AwaitTail(Command),
    AwaitShiftPayload { num_bits: u32, num_bytes: usize },
}

/// Server side codec for XVC connections.
#[derive(Debug)]
pub struct XvcServerCodec {
    max_shift_bytes: usize,
    state: DecodeState,
}

impl XvcServerCodec {
    pub fn new(max_shift_bytes: usize) -> XvcServerCodec {
        XvcServerCodec {
            max_shift_bytes,
            state: DecodeState::AwaitCommand,
        }
    }

    /// Whether a frame has been started but not yet completed.
    pub fn is_mid_frame(&self) -> bool {
        self.state != DecodeState::AwaitCommand
    }
}

impl Decoder for XvcServerCodec {
    type Item = Message;
    type Error = ReadError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, ReadError> {
        loop {
            match self.state {
                DecodeState::AwaitCommand => {
                    if src.len() < PREFIX_LEN {
                        return Ok(None);
                    }
                    let command = Command::from_prefix(&src[..PREFIX_LEN])?;
                    src.advance(PREFIX_LEN);
                    self.state = DecodeState::AwaitTail(command);
                }
                DecodeState::AwaitTail(command) => {
                    let tail_len = command.tail_len();
                    if src.len() < tail_len {
                        src.reserve(tail_len - src.len());
                        return Ok(None);
                    }
                    let tail = src.split_to(tail_len);
                    match command {
                        Command::GetInfo => {
                            self.state = DecodeState::AwaitCommand;
                            return Ok(Some(Message::GetInfo));
                        }
                        Command::SetTck => {
                            self.state = DecodeState::AwaitCommand;
                            return Ok(Some(Message::SetTck {
                                period_ns: le_u32(&tail),
                            }));
                        }
                        Command::Shift => {
                            let num_bits = le_u32(&tail);
                            let num_bytes = check_vector_len(num_bits, self.max_shift_bytes)?;
                            self.state = DecodeState::AwaitShiftPayload {
                                num_bits,
                                num_bytes,
                            };
                        }
                    }
                }
                DecodeState::AwaitShiftPayload {
                    num_bits,
                    num_bytes,
                } => {
                    let payload_len = 2 * num_bytes;
                    if src.len() < payload_len {
                        src.reserve(payload_len - src.len());
                        return Ok(None);
                    }
                    let payload = src.split_to(payload_len);
                    let (tms, tdi) = payload.split_at(num_bytes);
                    self.state = DecodeState::AwaitCommand;
                    return Ok(Some(Message::Shift {
                        num_bits,
                        tms: tms.into(),
                        tdi: tdi.into(),
                    }));
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Message>, ReadError> {
        match self.decode(src)? {
            Some(message) => Ok(Some(message)),
            None if src.is_empty() && !self.is_mid_frame() => Ok(None),
            None => Err(ReadError::IoError(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed in the middle of a frame",
            ))),
        }
    }
}

impl Encoder<Response> for XvcServerCodec {
    type Error = ReadError;

    fn encode(&mut self, item: Response, dst: &mut BytesMut) -> Result<(), ReadError> {
        match item {
            Response::Tdo(tdo) => dst.extend_from_slice(&tdo),
            other => other.write_to(&mut dst.writer())?,
        }
        Ok(())
    }
}
