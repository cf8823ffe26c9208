use thiserror::Error;
use xvc_server::error::ShiftError;

use crate::{bits, operation::Operation};

/// The adapter returned a different number of bytes than the commands call for.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Expected {expected} read-back bytes, got {received}")]
pub struct DecodeError {
    pub expected: usize,
    pub received: usize,
}

impl From<DecodeError> for ShiftError {
    fn from(err: DecodeError) -> Self {
        ShiftError::DecodeMismatch {
            expected: err.expected,
            received: err.received,
        }
    }
}

/// Extracts TDO bits from the read-back of `ops` into a new LSB-first vector.
pub fn decode(ops: &[Operation], returned: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let num_bits: usize = ops.iter().map(Operation::bit_count).sum();
    let mut tdo = vec![0u8; num_bits.div_ceil(8)];
    decode_into(ops, returned, &mut tdo, 0)?;
    Ok(tdo)
}

/// Extracts TDO bits from the read-back of `ops` and ORs them into `response`
/// starting at bit `first_bit`. Returns the number of bits written.
///
/// `response` must be zeroed in the written range and large enough to hold it.
pub fn decode_into(
    ops: &[Operation],
    returned: &[u8],
    response: &mut [u8],
    first_bit: usize,
) -> Result<usize, DecodeError> {
    let expected: usize = ops.iter().map(Operation::response_len).sum();
    if expected != returned.len() {
        return Err(DecodeError {
            expected,
            received: returned.len(),
        });
    }

    let mut read = 0;
    let mut bit = first_bit;
    for op in ops {
        match *op {
            Operation::ByteRun { bytes } => {
                for &byte in &returned[read..read + bytes] {
                    bits::put(response, bit, byte, 8);
                    bit += 8;
                }
            }
            Operation::BitRun { bits: count } => {
                // Bits are shifted in from the top of the byte.
                let value = returned[read] >> (8 - count);
                bits::put(response, bit, value, usize::from(count));
                bit += usize::from(count);
            }
            Operation::TmsBit => {
                bits::put(response, bit, returned[read] >> 7, 1);
                bit += 1;
            }
        }
        read += op.response_len();
    }
    Ok(bit - first_bit)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decodes_each_operation_kind() {
        let ops = [
            Operation::ByteRun { bytes: 2 },
            Operation::BitRun { bits: 3 },
            Operation::TmsBit,
        ];
        // 0xA0 carries 0b101 in its top three bits.
        let returned = [0x34, 0x12, 0xA0, 0x80];
        assert_eq!(decode(&ops, &returned).unwrap(), vec![0x34, 0x12, 0b1101]);
    }

    #[test]
    fn decodes_at_an_offset() {
        let ops = [Operation::TmsBit, Operation::ByteRun { bytes: 1 }];
        let mut response = [0u8; 3];
        let written = decode_into(&ops, &[0x80, 0xFF], &mut response, 5).unwrap();
        assert_eq!(written, 9);
        assert_eq!(response, [0b1110_0000, 0b0011_1111, 0x00]);
    }

    #[test]
    fn length_mismatch() {
        let ops = [Operation::ByteRun { bytes: 4 }, Operation::TmsBit];
        assert_eq!(
            decode(&ops, &[0; 4]),
            Err(DecodeError {
                expected: 5,
                received: 4
            })
        );
        let err: ShiftError = decode(&ops, &[0; 6]).unwrap_err().into();
        assert!(matches!(
            err,
            ShiftError::DecodeMismatch {
                expected: 5,
                received: 6
            }
        ));
        assert!(!err.is_fatal());
    }
}
