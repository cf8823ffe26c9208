/// Blocking read and write implementations for the protocol messages
use std::io::{self, BufRead, BufReader, Read, Write};

use crate::{
    error::ReadError,
    protocol::{Message, Response, Version, XvcInfo},
};

const XVC_INFO_PREFIX: &[u8] = b"xvcServer_v";

pub(crate) const PREFIX_LEN: usize = 2;
pub(crate) const PREFIX_GET_INFO: &[u8; 2] = b"ge";
pub(crate) const PREFIX_SET_TCK: &[u8; 2] = b"se";
pub(crate) const PREFIX_SHIFT: &[u8; 2] = b"sh";

// Bytes following the two byte prefix up to and including the ':' delimiter.
// The server skips these without looking at them.
pub(crate) const GET_INFO_TAIL: usize = b"tinfo:".len();
pub(crate) const SET_TCK_TAIL: usize = b"ttck:".len();
pub(crate) const SHIFT_TAIL: usize = b"ift:".len();

/// The command announced by the first two bytes of a frame.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum Command {
    GetInfo,
    SetTck,
    Shift,
}

impl Command {
    pub(crate) fn from_prefix(prefix: &[u8]) -> Result<Command, ReadError> {
        match prefix {
            p if p == PREFIX_GET_INFO => Ok(Command::GetInfo),
            p if p == PREFIX_SET_TCK => Ok(Command::SetTck),
            p if p == PREFIX_SHIFT => Ok(Command::Shift),
            _ => Err(ReadError::InvalidCommandPrefix(
                String::from_utf8_lossy(prefix).to_string(),
            )),
        }
    }

    /// Fixed number of bytes that follow the prefix, including the 4 byte argument if present.
    pub(crate) fn tail_len(self) -> usize {
        match self {
            Command::GetInfo => GET_INFO_TAIL,
            Command::SetTck => SET_TCK_TAIL + 4,
            Command::Shift => SHIFT_TAIL + 4,
        }
    }
}

pub(crate) fn le_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[bytes.len() - 4..]);
    u32::from_le_bytes(buf)
}

pub(crate) fn check_vector_len(num_bits: u32, max_shift_bytes: usize) -> Result<usize, ReadError> {
    let num_bytes = Message::vector_len(num_bits);
    if num_bytes > max_shift_bytes {
        return Err(ReadError::TooManyBytes {
            max: max_shift_bytes,
            got: num_bytes,
        });
    }
    Ok(num_bytes)
}

impl XvcInfo {
    pub fn write_to(&self, writer: &mut impl Write) -> io::Result<()> {
        writeln!(
            writer,
            "xvcServer_v{}:{}",
            self.version(),
            self.max_vector_len()
        )
    }

    pub fn from_reader(reader: &mut impl Read) -> Result<XvcInfo, ReadError> {
        let mut buf_reader = BufReader::with_capacity(32, reader);
        let mut line = Vec::with_capacity(32);
        let _ = buf_reader.read_until(b'\n', &mut line)?;
        Self::parse(line.trim_ascii_end())
    }

    /// Parses `xvcServer_v{version}:{max_vector_len}` without the trailing newline.
    pub fn parse(line: &[u8]) -> Result<XvcInfo, ReadError> {
        let rest = line.strip_prefix(XVC_INFO_PREFIX).ok_or_else(|| {
            ReadError::InvalidFormat("Invalid prefix in info message".to_string())
        })?;

        let colon_index = rest.iter().position(|b| *b == b':').ok_or_else(|| {
            ReadError::InvalidFormat("Missing ':' separator in info message".to_string())
        })?;
        let (version_part, max_len_part) = rest.split_at(colon_index);

        let version = match version_part {
            b"1.0" => Version::V1_0,
            _ => {
                return Err(ReadError::UnsupportedVersion(
                    String::from_utf8_lossy(version_part).to_string(),
                ));
            }
        };

        let max_vector_len = str::from_utf8(&max_len_part[1..])?.parse::<u32>()?;
        Ok(XvcInfo::new(version, max_vector_len))
    }
}

impl Message {
    const CMD_NAME_GET_INFO: &[u8; 7] = b"getinfo";
    const CMD_NAME_SET_TCK: &[u8; 6] = b"settck";
    const CMD_NAME_SHIFT: &[u8; 5] = b"shift";
    const CMD_DELIMITER: u8 = b':';

    /// Reads one complete message.
    ///
    /// Only the two byte prefix selects the command. The remainder of the keyword is
    /// consumed but not compared, which matches what deployed XVC servers accept.
    pub fn from_reader(
        reader: &mut impl Read,
        max_shift_bytes: usize,
    ) -> Result<Message, ReadError> {
        let mut prefix = [0u8; PREFIX_LEN];
        reader.read_exact(&mut prefix)?;
        let command = Command::from_prefix(&prefix)?;

        let mut buf = [0u8; 16];
        let tail = &mut buf[..command.tail_len()];
        reader.read_exact(tail)?;

        match command {
            Command::GetInfo => Ok(Message::GetInfo),
            Command::SetTck => Ok(Message::SetTck {
                period_ns: le_u32(tail),
            }),
            Command::Shift => {
                let num_bits = le_u32(tail);
                let num_bytes = check_vector_len(num_bits, max_shift_bytes)?;
                let mut tms = vec![0_u8; num_bytes].into_boxed_slice();
                reader.read_exact(&mut tms)?;
                let mut tdi = vec![0_u8; num_bytes].into_boxed_slice();
                reader.read_exact(&mut tdi)?;
                Ok(Message::Shift { num_bits, tms, tdi })
            }
        }
    }

    pub fn write_to(&self, writer: &mut impl Write) -> io::Result<()> {
        match self {
            Message::GetInfo => {
                writer.write_all(Self::CMD_NAME_GET_INFO)?;
                writer.write_all(&[Self::CMD_DELIMITER])
            }
            Message::SetTck { period_ns } => {
                writer.write_all(Self::CMD_NAME_SET_TCK)?;
                writer.write_all(&[Self::CMD_DELIMITER])?;
                writer.write_all(&period_ns.to_le_bytes())
            }
            Message::Shift { num_bits, tms, tdi } => {
                writer.write_all(Self::CMD_NAME_SHIFT)?;
                writer.write_all(&[Self::CMD_DELIMITER])?;
                writer.write_all(&num_bits.to_le_bytes())?;
                writer.write_all(tms)?;
                writer.write_all(tdi)
            }
        }
    }
}

impl Response {
    pub fn write_to(&self, writer: &mut impl Write) -> io::Result<()> {
        match self {
            Response::Info(info) => info.write_to(writer),
            Response::TckPeriod(period_ns) => writer.write_all(&period_ns.to_le_bytes()),
            Response::Tdo(tdo) => writer.write_all(tdo),
        }
    }
}
