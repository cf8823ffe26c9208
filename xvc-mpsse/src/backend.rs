use std::{
    io,
    sync::{Mutex, PoisonError},
};

use xvc_server::{XvcServer, error::ShiftError};

use crate::{decode::decode_into, encode::ShiftEncoder, transport::Transport};

/// [`XvcServer`] backend that runs shifts on an MPSSE engine.
///
/// The transport sits behind a mutex that is held for the whole shift, so shifts from
/// different connections never interleave on the device.
#[derive(Debug)]
pub struct MpsseBackend<T> {
    transport: Mutex<T>,
    encoder: ShiftEncoder,
}

impl<T: Transport> MpsseBackend<T> {
    /// `transport` must already be in MPSSE mode with the pins configured.
    pub fn new(transport: T, encoder: ShiftEncoder) -> MpsseBackend<T> {
        MpsseBackend {
            transport: Mutex::new(transport),
            encoder,
        }
    }

    pub fn encoder(&self) -> &ShiftEncoder {
        &self.encoder
    }

    /// Runs `f` with exclusive access to the transport.
    pub fn with_transport<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut transport = self.transport.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut transport)
    }

    pub fn into_transport(self) -> T {
        self.transport
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn shift_data(
        &self,
        num_bits: u32,
        tms: &[u8],
        tdi: &[u8],
    ) -> Result<Box<[u8]>, ShiftError> {
        let num_bytes = num_bits.div_ceil(8) as usize;
        for (vector, data) in [("TMS", tms), ("TDI", tdi)] {
            if data.len() != num_bytes {
                return Err(ShiftError::VectorLength {
                    vector,
                    expected: num_bytes,
                    got: data.len(),
                });
            }
        }

        let mut transport = self
            .transport
            .lock()
            .map_err(|_| ShiftError::Transport(io::Error::other("a previous shift panicked")))?;

        let chunks = self.encoder.encode(num_bits as usize, tms, tdi);
        log::debug!(
            "MPSSE shift: num_bits={}, chunks={}",
            num_bits,
            chunks.len()
        );

        let mut response = vec![0u8; num_bytes];
        let mut returned = Vec::new();
        for chunk in chunks {
            log::trace!(
                "Chunk {:?}: {} operations, {} command bytes",
                chunk.bits,
                chunk.ops.len(),
                chunk.wire.len()
            );
            let written = transport
                .write(&chunk.wire)
                .map_err(ShiftError::Transport)?;
            if written != chunk.wire.len() {
                return Err(ShiftError::Transport(io::Error::new(
                    io::ErrorKind::WriteZero,
                    format!(
                        "device accepted {} of {} command bytes",
                        written,
                        chunk.wire.len()
                    ),
                )));
            }

            let expected = chunk.response_len();
            returned.clear();
            returned.resize(expected, 0);
            transport
                .read_exact(&mut returned)
                .map_err(ShiftError::Transport)?;

            // Anything left over would be taken as TDO by the next shift.
            let surplus = transport.queued().map_err(ShiftError::Transport)?;
            if surplus > 0 {
                returned.resize(expected + surplus, 0);
                transport
                    .read_exact(&mut returned[expected..])
                    .map_err(ShiftError::Transport)?;
                log::debug!("Discarded read-back: {:02x?}", &returned[expected..]);
            }

            decode_into(&chunk.ops, &returned, &mut response, chunk.bits.start).inspect_err(
                |err| log::error!("Could not decode read-back of bits {:?}: {}", chunk.bits, err),
            )?;
        }
        Ok(response.into_boxed_slice())
    }
}

impl<T: Transport + Send> XvcServer for MpsseBackend<T> {
    fn set_tck(&self, period_ns: u32) -> u32 {
        // The divisor is fixed at start-up.
        log::debug!("MPSSE set_tck: period_ns={}", period_ns);
        period_ns
    }

    fn shift(
        &self,
        num_bits: u32,
        tms: Box<[u8]>,
        tdi: Box<[u8]>,
    ) -> Result<Box<[u8]>, ShiftError> {
        self.shift_data(num_bits, &tms, &tdi)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        operation::Operation,
        settings::JtagPins,
        sim::{SimulatedChain, opcode},
    };

    /// Deterministic pseudo-random bytes.
    fn lcg_bytes(seed: u32, len: usize) -> Vec<u8> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (state >> 24) as u8
            })
            .collect()
    }

    /// TDO of a fresh chain with `delay` flip-flops between TDI and TDO.
    fn delayed(tdi: &[u8], num_bits: usize, delay: usize) -> Vec<u8> {
        let mut tdo = vec![0u8; num_bits.div_ceil(8)];
        for bit in delay..num_bits {
            let src = bit - delay;
            if (tdi[src / 8] >> (src % 8)) & 1 != 0 {
                tdo[bit / 8] |= 1 << (bit % 8);
            }
        }
        tdo
    }

    fn backend(delay: usize, chunk_bits: usize) -> MpsseBackend<SimulatedChain> {
        MpsseBackend::new(
            SimulatedChain::new(delay),
            ShiftEncoder::new(chunk_bits, JtagPins::default()),
        )
    }

    #[test]
    fn round_trip_against_reference() {
        for num_bits in [0usize, 1, 7, 8, 9, 63, 64, 65, 2048, 20000] {
            let num_bytes = num_bits.div_ceil(8);
            let tms = lcg_bytes(num_bits as u32, num_bytes);
            let tdi = lcg_bytes(!(num_bits as u32), num_bytes);
            let backend = backend(3, 2048);
            let tdo = backend.shift_data(num_bits as u32, &tms, &tdi).unwrap();

            let expected = delayed(&tdi, num_bits, 3);
            assert_eq!(&tdo[..], &expected[..], "num_bits = {}", num_bits);
            assert_eq!(backend.into_transport().clocks(), num_bits as u64);
        }
    }

    #[test]
    fn chunking_is_transparent() {
        let num_bits = 5000;
        let tms = lcg_bytes(7, 625);
        let tdi = lcg_bytes(11, 625);
        let whole = backend(5, 8192).shift_data(num_bits, &tms, &tdi).unwrap();
        for chunk_bits in [1, 7, 64, 100, 2048] {
            let split = backend(5, chunk_bits)
                .shift_data(num_bits, &tms, &tdi)
                .unwrap();
            assert_eq!(split, whole, "chunk_bits = {}", chunk_bits);
        }
    }

    #[test]
    fn chain_state_persists_across_shifts() {
        let backend = backend(4, 2048);
        let first = backend.shift_data(8, &[0x00], &[0xF0]).unwrap();
        assert_eq!(&first[..], &[0x00]);
        let second = backend.shift_data(8, &[0x00], &[0x00]).unwrap();
        assert_eq!(&second[..], &[0x0F]);
    }

    #[test]
    fn device_sees_requested_tms() {
        let num_bits = 300;
        let tms = lcg_bytes(3, 38);
        let tdi = lcg_bytes(4, 38);
        let backend = MpsseBackend::new(
            SimulatedChain::new(0).record_tms(),
            ShiftEncoder::new(50, JtagPins::default()),
        );
        backend.shift_data(num_bits, &tms, &tdi).unwrap();
        let trace = backend.with_transport(|chain| chain.tms_trace().to_vec());
        let expected: Vec<bool> = (0..num_bits as usize)
            .map(|bit| (tms[bit / 8] >> (bit % 8)) & 1 != 0)
            .collect();
        assert_eq!(trace, expected);
    }

    #[test]
    fn operation_counts() {
        let encoder = ShiftEncoder::default();
        let ops: Vec<Operation> = encoder
            .encode(77, &[0xFF; 10], &[0x00; 10])
            .flat_map(|chunk| chunk.ops)
            .collect();
        assert_eq!(ops, vec![Operation::TmsBit; 77]);

        let chunks: Vec<_> = encoder.encode(2048, &[0x00; 256], &[0x5A; 256]).collect();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].ops, vec![Operation::ByteRun { bytes: 256 }]);
    }

    #[test]
    fn wrong_vector_length() {
        let backend = backend(0, 2048);
        let err = backend.shift_data(9, &[0x00], &[0x00, 0x00]).unwrap_err();
        assert!(matches!(
            err,
            ShiftError::VectorLength {
                vector: "TMS",
                expected: 2,
                got: 1
            }
        ));
        assert!(!err.is_fatal());
        assert_eq!(backend.into_transport().writes(), 0);
    }

    /// Accepts every write but never answers.
    struct Mute;

    impl Transport for Mute {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            Ok(data.len())
        }

        fn read_exact(&mut self, _buf: &mut [u8]) -> io::Result<()> {
            Err(io::ErrorKind::TimedOut.into())
        }

        fn queued(&mut self) -> io::Result<usize> {
            Ok(0)
        }
    }

    /// Accepts only part of every write.
    struct Short;

    impl Transport for Short {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            Ok(data.len() / 2)
        }

        fn read_exact(&mut self, _buf: &mut [u8]) -> io::Result<()> {
            Ok(())
        }

        fn queued(&mut self) -> io::Result<usize> {
            Ok(0)
        }
    }

    #[test]
    fn transport_failures_are_fatal() {
        let mute = MpsseBackend::new(Mute, ShiftEncoder::default());
        let err = mute.shift(8, Box::new([0x00]), Box::new([0x00])).unwrap_err();
        assert!(err.is_fatal());

        let short = MpsseBackend::new(Short, ShiftEncoder::default());
        let err = short.shift_data(8, &[0x00], &[0x00]).unwrap_err();
        assert!(
            matches!(&err, ShiftError::Transport(e) if e.kind() == io::ErrorKind::WriteZero)
        );
    }

    /// Adds one stray byte to the read-back of the first write.
    struct StrayByte {
        chain: SimulatedChain,
        stray: Option<u8>,
        armed: bool,
    }

    impl Transport for StrayByte {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            let written = self.chain.write(data)?;
            if self.armed {
                self.stray = Some(0xFA);
                self.armed = false;
            }
            Ok(written)
        }

        fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
            let from_chain = self.chain.queued()?.min(buf.len());
            self.chain.read_exact(&mut buf[..from_chain])?;
            for byte in &mut buf[from_chain..] {
                *byte = self.stray.take().ok_or(io::ErrorKind::UnexpectedEof)?;
            }
            Ok(())
        }

        fn queued(&mut self) -> io::Result<usize> {
            Ok(self.chain.queued()? + usize::from(self.stray.is_some()))
        }
    }

    #[test]
    fn surplus_read_back_is_a_decode_mismatch() {
        let backend = MpsseBackend::new(
            StrayByte {
                chain: SimulatedChain::new(0),
                stray: None,
                armed: true,
            },
            ShiftEncoder::default(),
        );
        let err = backend.shift_data(8, &[0x00], &[0x11]).unwrap_err();
        assert!(matches!(
            err,
            ShiftError::DecodeMismatch {
                expected: 1,
                received: 2
            }
        ));
        assert!(!err.is_fatal());

        // The stray byte is gone and does not leak into the next shift.
        let tdo = backend.shift_data(8, &[0x00], &[0x22]).unwrap();
        assert_eq!(&tdo[..], &[0x22]);
        assert_eq!(backend.with_transport(|t| t.queued().unwrap()), 0);
    }

    #[test]
    fn set_tck_is_echoed() {
        let backend = backend(0, 2048);
        assert_eq!(backend.set_tck(10), 10);
        assert_eq!(backend.set_tck(u32::MAX), u32::MAX);
        // Nothing reaches the device.
        assert_eq!(backend.into_transport().writes(), 0);
    }

    #[test]
    fn every_chunk_is_flushed() {
        let encoder = ShiftEncoder::new(16, JtagPins::default());
        for chunk in encoder.encode(40, &[0x0F; 5], &[0xFF; 5]) {
            assert_eq!(chunk.wire.last(), Some(&opcode::SEND_IMMEDIATE));
        }
    }
}
