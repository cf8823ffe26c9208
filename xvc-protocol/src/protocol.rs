use std::fmt::Display;

/// The version of the protocol.
/// A version always consists of a major and a minor part.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct Version {
    major: usize,
    minor: usize,
}

impl Version {
    /// Version 1.0 of the protocol
    pub const V1_0: Version = Version { major: 1, minor: 0 };

    /// Returns the latest supported version
    pub fn latest() -> Version {
        Version::V1_0
    }

    /// The major part of the version
    pub fn major(&self) -> usize {
        self.major
    }

    /// The minor part of the version
    pub fn minor(&self) -> usize {
        self.minor
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::V1_0
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Maximum vector size in bytes that a server advertises unless configured otherwise.
pub const DEFAULT_MAX_VECTOR_SIZE: u32 = 32 * 1024;

/// A command sent from the client to the server.
///
/// Every message is answered by exactly one [`Response`] before the next message is read,
/// so a connection never has more than one command in flight.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Message {
    /// Asks the server for its protocol version and the largest vector it accepts.
    GetInfo,
    /// Requests a TCK period. The server answers with the period it actually uses.
    SetTck { period_ns: u32 },
    /// Clocks `num_bits` cycles through the JTAG port.
    Shift {
        /// Number of TCK cycles.
        num_bits: u32,
        /// TMS level for every cycle, LSB-first, `ceil(num_bits / 8)` bytes.
        tms: Box<[u8]>,
        /// TDI level for every cycle, LSB-first, `ceil(num_bits / 8)` bytes.
        tdi: Box<[u8]>,
    },
}

impl Message {
    /// Number of bytes each vector of a shift with `num_bits` cycles occupies.
    pub fn vector_len(num_bits: u32) -> usize {
        num_bits.div_ceil(8) as usize
    }
}

/// The answer to a [`Message`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Response {
    /// Answer to [`Message::GetInfo`]
    Info(XvcInfo),
    /// Answer to [`Message::SetTck`], the period in effect
    TckPeriod(u32),
    /// Answer to [`Message::Shift`], the captured TDO vector
    Tdo(Box<[u8]>),
}

/// Static information about the server capabilities, exchanged once at the
/// start of a session.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct XvcInfo {
    version: Version,
    max_vector_len: u32,
}

impl XvcInfo {
    pub fn new(version: Version, max_vector_len: u32) -> XvcInfo {
        XvcInfo {
            version,
            max_vector_len,
        }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// The largest vector, in bytes, that the server accepts in a single shift
    pub fn max_vector_len(&self) -> u32 {
        self.max_vector_len
    }
}

impl Default for XvcInfo {
    fn default() -> XvcInfo {
        XvcInfo {
            version: Version::default(),
            max_vector_len: DEFAULT_MAX_VECTOR_SIZE,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn version_ordering() {
        assert!(Version { major: 1, minor: 0 } < Version { major: 1, minor: 1 });
        assert!(Version { major: 2, minor: 0 } > Version { major: 1, minor: 0 });
        assert_eq!(Version::latest().to_string(), "1.0");
        assert_eq!((Version::V1_0.major(), Version::V1_0.minor()), (1, 0));
    }

    #[test]
    fn vector_len_rounds_up() {
        assert_eq!(Message::vector_len(0), 0);
        assert_eq!(Message::vector_len(1), 1);
        assert_eq!(Message::vector_len(8), 1);
        assert_eq!(Message::vector_len(9), 2);
        assert_eq!(Message::vector_len(20000), 2500);
    }
}
