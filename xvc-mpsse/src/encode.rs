use std::ops::Range;

use ftdi_mpsse::{ClockBits, ClockData, ClockTMS, MpsseCmdBuilder};

use crate::{
    bits,
    operation::{MAX_BYTE_RUN, Operation},
    settings::JtagPins,
};

/// Bits processed per USB transaction unless configured otherwise.
pub const DEFAULT_CHUNK_BITS: usize = 2048;

/// Turns TMS/TDI vectors into MPSSE commands.
///
/// A shift is split into chunks of at most `chunk_bits` clocks. Each chunk is written
/// and read back as one transaction, which bounds both the command and the read-back
/// buffer no matter how long the requested shift is. A chunk never reads back more than
/// `chunk_bits` bytes and never writes more than `5 * chunk_bits + 4` bytes.
#[derive(Clone, Debug)]
pub struct ShiftEncoder {
    chunk_bits: usize,
    pins: JtagPins,
}

/// Commands for a contiguous range of clocks of a shift.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EncodedChunk {
    /// Clocks of the whole shift covered by this chunk.
    pub bits: Range<usize>,
    /// Bytes to write to the adapter.
    pub wire: Vec<u8>,
    /// Clocking commands in `wire`, in order.
    pub ops: Vec<Operation>,
}

impl EncodedChunk {
    /// Number of bytes the adapter returns after executing `wire`.
    pub fn response_len(&self) -> usize {
        self.ops.iter().map(Operation::response_len).sum()
    }
}

impl Default for ShiftEncoder {
    fn default() -> Self {
        ShiftEncoder::new(DEFAULT_CHUNK_BITS, JtagPins::default())
    }
}

impl ShiftEncoder {
    /// `chunk_bits` is raised to 1 if zero.
    pub fn new(chunk_bits: usize, pins: JtagPins) -> ShiftEncoder {
        ShiftEncoder {
            chunk_bits: chunk_bits.max(1),
            pins,
        }
    }

    pub fn chunk_bits(&self) -> usize {
        self.chunk_bits
    }

    pub fn pins(&self) -> JtagPins {
        self.pins
    }

    /// Encodes a shift of `num_bits` clocks.
    ///
    /// `tms` and `tdi` must hold at least ⌈num_bits / 8⌉ bytes. Bits past `num_bits`
    /// are ignored.
    ///
    /// # Panics
    ///
    /// Iterating panics if either vector is shorter than that.
    pub fn encode<'a>(&'a self, num_bits: usize, tms: &'a [u8], tdi: &'a [u8]) -> Chunks<'a> {
        Chunks {
            encoder: self,
            tms,
            tdi,
            num_bits,
            pos: 0,
            // The pin level is unknown when a shift starts.
            tms_high: true,
        }
    }
}

/// Iterator over the chunks of one shift, see [`ShiftEncoder::encode`].
#[derive(Debug)]
pub struct Chunks<'a> {
    encoder: &'a ShiftEncoder,
    tms: &'a [u8],
    tdi: &'a [u8],
    num_bits: usize,
    pos: usize,
    tms_high: bool,
}

impl Iterator for Chunks<'_> {
    type Item = EncodedChunk;

    fn next(&mut self) -> Option<EncodedChunk> {
        if self.pos >= self.num_bits {
            return None;
        }
        let start = self.pos;
        let end = self.num_bits.min(start + self.encoder.chunk_bits);
        self.pos = end;
        Some(self.encode_chunk(start, end))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self
            .num_bits
            .saturating_sub(self.pos)
            .div_ceil(self.encoder.chunk_bits);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Chunks<'_> {}

impl Chunks<'_> {
    fn encode_chunk(&mut self, start: usize, end: usize) -> EncodedChunk {
        let mut builder = MpsseCmdBuilder::with_vec(Vec::with_capacity(end - start + 16));
        let mut ops = Vec::new();
        let mut pos = start;

        while pos < end {
            if bits::get(self.tms, pos) {
                // TMS changes the TAP state, so these bits go out one clock at a time.
                let tdi = bits::get(self.tdi, pos);
                builder = builder.clock_tms(ClockTMS::NegTMSPosTDO, 0x01, tdi, 1);
                ops.push(Operation::TmsBit);
                self.tms_high = true;
                pos += 1;
                continue;
            }

            let stretch_end = bits::next_set(self.tms, pos, end).unwrap_or(end);
            if self.tms_high {
                // A TMS command leaves the pin at its last level. Data commands do not touch it.
                let pins = self.encoder.pins;
                builder = builder.set_gpio_lower(pins.tms_low(), pins.direction);
                self.tms_high = false;
            }
            builder = self.encode_stretch(pos, stretch_end, builder, &mut ops);
            pos = stretch_end;
        }

        EncodedChunk {
            bits: start..end,
            wire: builder.send_immediate().0,
            ops,
        }
    }

    /// Appends commands for clocks `start..end`, all of which have TMS low.
    fn encode_stretch(
        &self,
        start: usize,
        end: usize,
        mut builder: MpsseCmdBuilder,
        ops: &mut Vec<Operation>,
    ) -> MpsseCmdBuilder {
        let mut pos = start;
        let mut whole_bytes = (end - start) / 8;
        let mut data = Vec::with_capacity(whole_bytes.min(MAX_BYTE_RUN));
        while whole_bytes > 0 {
            let run = whole_bytes.min(MAX_BYTE_RUN);
            data.clear();
            bits::extend_bytes(&mut data, self.tdi, pos, run);
            builder = builder.clock_data(ClockData::LsbPosIn, &data);
            ops.push(Operation::ByteRun { bytes: run });
            pos += 8 * run;
            whole_bytes -= run;
        }

        let tail = end - pos;
        if tail > 0 {
            let data = bits::gather(self.tdi, pos, tail);
            builder = builder.clock_bits(ClockBits::LsbPosIn, data, tail as u8);
            ops.push(Operation::BitRun { bits: tail as u8 });
        }
        builder
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sim::opcode;

    fn encode_single(num_bits: usize, tms: &[u8], tdi: &[u8]) -> EncodedChunk {
        let encoder = ShiftEncoder::default();
        let mut chunks = encoder.encode(num_bits, tms, tdi);
        let chunk = chunks.next().expect("one chunk");
        assert!(chunks.next().is_none());
        chunk
    }

    #[test]
    fn empty_shift_has_no_chunks() {
        let encoder = ShiftEncoder::default();
        assert_eq!(encoder.encode(0, &[], &[]).count(), 0);
    }

    #[test]
    fn tms_low_bytes_form_one_run() {
        let tdi = [0x12, 0x34, 0x56, 0x78];
        let chunk = encode_single(32, &[0; 4], &tdi);
        assert_eq!(chunk.ops, vec![Operation::ByteRun { bytes: 4 }]);
        assert_eq!(
            chunk.wire,
            vec![0x80, 0x00, 0x0B, 0x39, 0x03, 0x00, 0x12, 0x34, 0x56, 0x78, 0x87]
        );
        assert_eq!(chunk.response_len(), 4);
    }

    #[test]
    fn tms_high_bits_are_singletons() {
        let chunk = encode_single(10, &[0xFF, 0x03], &[0x01, 0x02]);
        assert_eq!(chunk.ops, vec![Operation::TmsBit; 10]);
        assert_eq!(&chunk.wire[..6], &[0x6B, 0x00, 0x81, 0x6B, 0x00, 0x01]);
        assert_eq!(&chunk.wire[27..30], &[0x6B, 0x00, 0x81]);
        assert_eq!(chunk.wire.len(), 31);
    }

    #[test]
    fn exit_bit_after_data() {
        // Typical shift-DR: 11 data bits, the last one leaves the shift state.
        let tms = [0x00, 0b0000_0100];
        let tdi = [0xA5, 0b0000_0110];
        let chunk = encode_single(11, &tms, &tdi);
        assert_eq!(
            chunk.ops,
            vec![
                Operation::ByteRun { bytes: 1 },
                Operation::BitRun { bits: 2 },
                Operation::TmsBit
            ]
        );
        assert_eq!(
            chunk.wire,
            vec![
                0x80, 0x00, 0x0B, // TMS low
                0x39, 0x00, 0x00, 0xA5, // 8 bits
                0x3B, 0x01, 0b10, // 2 bits
                0x6B, 0x00, 0x81, // last bit with TMS high, TDI high
                0x87,
            ]
        );
    }

    #[test]
    fn tms_is_dropped_again_after_tms_bit() {
        let chunk = encode_single(3, &[0b010], &[0b101]);
        assert_eq!(
            chunk.ops,
            vec![
                Operation::BitRun { bits: 1 },
                Operation::TmsBit,
                Operation::BitRun { bits: 1 }
            ]
        );
        assert_eq!(
            chunk.wire,
            vec![
                0x80, 0x00, 0x0B, 0x3B, 0x00, 0x01, 0x6B, 0x00, 0x01, 0x80, 0x00, 0x0B, 0x3B, 0x00,
                0x01, 0x87,
            ]
        );
    }

    #[test]
    fn unaligned_byte_runs() {
        // One TMS bit first shifts every following byte run by one bit.
        let tms = [0x01, 0x00, 0x00];
        let tdi = [0b0000_0010, 0xFF, 0x00];
        let chunk = encode_single(17, &tms, &tdi);
        assert_eq!(
            chunk.ops,
            vec![Operation::TmsBit, Operation::ByteRun { bytes: 2 }]
        );
        assert_eq!(&chunk.wire[6..11], &[0x39, 0x01, 0x00, 0x81, 0x7F]);
    }

    #[test]
    fn long_requests_are_chunked() {
        let encoder = ShiftEncoder::new(64, JtagPins::default());
        let tms = vec![0u8; 25];
        let tdi = vec![0xC3u8; 25];
        let chunks: Vec<_> = encoder.encode(197, &tms, &tdi).collect();
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].bits, 0..64);
        assert_eq!(chunks[3].bits, 192..197);
        assert_eq!(chunks[0].ops, vec![Operation::ByteRun { bytes: 8 }]);
        assert_eq!(chunks[3].ops, vec![Operation::BitRun { bits: 5 }]);
        // Every chunk establishes the TMS level on its own only when needed.
        assert_eq!(chunks[0].wire[0], opcode::SET_BITS_LOW);
        assert_eq!(chunks[1].wire[0], opcode::CLOCK_BYTES);
        for chunk in &chunks {
            assert!(chunk.response_len() <= encoder.chunk_bits());
        }
    }

    #[test]
    fn operation_bits_cover_the_chunk() {
        let tms = [0b1001_0110, 0b0000_0001, 0x00, 0x80];
        let tdi = [0x5A; 4];
        let encoder = ShiftEncoder::new(13, JtagPins::default());
        let chunks: Vec<_> = encoder.encode(32, &tms, &tdi).collect();
        let mut next = 0;
        for chunk in &chunks {
            assert_eq!(chunk.bits.start, next);
            let bits: usize = chunk.ops.iter().map(Operation::bit_count).sum();
            assert_eq!(bits, chunk.bits.len());
            next = chunk.bits.end;
        }
        assert_eq!(next, 32);
    }

    #[test]
    fn worst_case_wire_size() {
        // Alternating TMS forces a pin reset, a one bit run and a TMS bit for every two clocks.
        let chunk_bits = 64;
        let encoder = ShiftEncoder::new(chunk_bits, JtagPins::default());
        let tms = [0xAA; 8];
        let tdi = [0xFF; 8];
        let chunk = encoder.encode(64, &tms, &tdi).next().unwrap();
        assert_eq!(chunk.wire.len(), 9 * chunk_bits / 2 + 1);
        assert!(chunk.wire.len() <= 5 * chunk_bits + 4);
    }
}
