/// Largest number of bytes a single clock-data command can carry.
pub const MAX_BYTE_RUN: usize = 1 << 16;

/// One MPSSE clocking command, as far as decoding its read-back is concerned.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Operation {
    /// `bytes` whole bytes clocked with TMS low. Reads back one byte per byte clocked.
    ByteRun { bytes: usize },
    /// 1 to 7 trailing bits clocked with TMS low. Reads back one byte with TDO in its
    /// top `bits` bits.
    BitRun { bits: u8 },
    /// A single bit clocked with TMS high. Reads back one byte with TDO in bit 7.
    TmsBit,
}

impl Operation {
    /// Number of TCK cycles the operation clocks.
    pub fn bit_count(&self) -> usize {
        match self {
            Operation::ByteRun { bytes } => 8 * bytes,
            Operation::BitRun { bits } => usize::from(*bits),
            Operation::TmsBit => 1,
        }
    }

    /// Number of bytes the adapter returns for the operation.
    pub fn response_len(&self) -> usize {
        match self {
            Operation::ByteRun { bytes } => *bytes,
            Operation::BitRun { .. } | Operation::TmsBit => 1,
        }
    }
}
