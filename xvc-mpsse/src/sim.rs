//! Software model of an MPSSE engine wired to a JTAG chain.
//!
//! The chain is a plain shift register of `delay` flip-flops between TDI and TDO,
//! which is what a chain of devices in BYPASS looks like from the outside. TMS is
//! tracked so that tests can check which levels the device actually saw.
use std::{collections::VecDeque, io};

use crate::{settings::PIN_TMS, transport::Transport};

/// MPSSE opcodes the simulated engine understands.
///
/// Clocking commands shift LSB first, drive TDI/TMS on the falling edge and
/// sample TDO on the rising edge of TCK.
pub mod opcode {
    /// Followed by a 16-bit little endian `length - 1` and the data bytes.
    pub const CLOCK_BYTES: u8 = 0x39;
    /// Followed by `length - 1` and one data byte.
    pub const CLOCK_BITS: u8 = 0x3B;
    /// Clock 1 to 7 bits out on TMS. Bit 7 of the data byte is held on TDI.
    pub const CLOCK_TMS: u8 = 0x6B;
    /// Drive the low GPIO byte (value, direction) without clocking.
    pub const SET_BITS_LOW: u8 = 0x80;
    pub const SET_BITS_HIGH: u8 = 0x82;
    pub const LOOPBACK_START: u8 = 0x84;
    pub const LOOPBACK_END: u8 = 0x85;
    pub const SET_CLOCK_DIVISOR: u8 = 0x86;
    pub const SEND_IMMEDIATE: u8 = 0x87;
    pub const DISABLE_CLOCK_DIVIDE: u8 = 0x8A;
    pub const ENABLE_CLOCK_DIVIDE: u8 = 0x8B;
    pub const ENABLE_3_PHASE: u8 = 0x8C;
    pub const DISABLE_3_PHASE: u8 = 0x8D;
    pub const ENABLE_ADAPTIVE: u8 = 0x96;
    pub const DISABLE_ADAPTIVE: u8 = 0x97;
}

#[derive(Debug, Clone)]
pub struct SimulatedChain {
    register: VecDeque<bool>,
    input: Vec<u8>,
    output: VecDeque<u8>,
    tms: bool,
    loopback: bool,
    clock_divisor: u16,
    clocks: u64,
    writes: usize,
    tms_trace: Option<Vec<bool>>,
}

impl SimulatedChain {
    /// A chain whose TDO lags TDI by `delay` clocks. Starts out filled with zeros.
    pub fn new(delay: usize) -> SimulatedChain {
        SimulatedChain {
            register: std::iter::repeat_n(false, delay).collect(),
            input: Vec::new(),
            output: VecDeque::new(),
            tms: true,
            loopback: false,
            clock_divisor: 0,
            clocks: 0,
            writes: 0,
            tms_trace: None,
        }
    }

    /// Remember the TMS level of every clock.
    pub fn record_tms(mut self) -> SimulatedChain {
        self.tms_trace = Some(Vec::new());
        self
    }

    pub fn delay(&self) -> usize {
        self.register.len()
    }

    /// TMS level of every clock since recording was enabled.
    pub fn tms_trace(&self) -> &[bool] {
        self.tms_trace.as_deref().unwrap_or_default()
    }

    /// TCK cycles clocked so far.
    pub fn clocks(&self) -> u64 {
        self.clocks
    }

    /// Number of `write` calls so far.
    pub fn writes(&self) -> usize {
        self.writes
    }

    pub fn clock_divisor(&self) -> u16 {
        self.clock_divisor
    }

    fn clock(&mut self, tdi: bool) -> bool {
        self.clocks += 1;
        if let Some(trace) = &mut self.tms_trace {
            trace.push(self.tms);
        }
        if self.loopback {
            return tdi;
        }
        match self.register.pop_front() {
            Some(tdo) => {
                self.register.push_back(tdi);
                tdo
            }
            None => tdi,
        }
    }

    /// Clocks `count` bits of `data` LSB first. TDO enters the result from the top.
    fn clock_bits(&mut self, data: u8, count: usize) -> u8 {
        let mut tdo = 0u8;
        for k in 0..count {
            let bit = self.clock((data >> k) & 1 != 0);
            tdo = (tdo >> 1) | (u8::from(bit) << 7);
        }
        tdo
    }

    /// Executes the command at the start of `commands`.
    ///
    /// Returns the number of bytes consumed, or `None` if the command is incomplete.
    fn execute(&mut self, commands: &[u8]) -> io::Result<Option<usize>> {
        let arg = |n: usize| commands.get(n).copied();
        let consumed = match commands[0] {
            opcode::CLOCK_BYTES => {
                let (Some(lo), Some(hi)) = (arg(1), arg(2)) else {
                    return Ok(None);
                };
                let len = usize::from(u16::from_le_bytes([lo, hi])) + 1;
                let Some(data) = commands.get(3..3 + len) else {
                    return Ok(None);
                };
                for &byte in data {
                    let tdo = self.clock_bits(byte, 8);
                    self.output.push_back(tdo);
                }
                3 + len
            }
            opcode::CLOCK_BITS => {
                let (Some(len), Some(data)) = (arg(1), arg(2)) else {
                    return Ok(None);
                };
                let count = usize::from(len & 0x07) + 1;
                let tdo = self.clock_bits(data, count);
                self.output.push_back(tdo);
                3
            }
            opcode::CLOCK_TMS => {
                let (Some(len), Some(data)) = (arg(1), arg(2)) else {
                    return Ok(None);
                };
                let count = usize::from(len & 0x07).min(6) + 1;
                let tdi = data & 0x80 != 0;
                let mut tdo = 0u8;
                for k in 0..count {
                    self.tms = (data >> k) & 1 != 0;
                    let bit = self.clock(tdi);
                    tdo = (tdo >> 1) | (u8::from(bit) << 7);
                }
                self.output.push_back(tdo);
                3
            }
            opcode::SET_BITS_LOW => {
                let Some(value) = arg(1) else {
                    return Ok(None);
                };
                if arg(2).is_none() {
                    return Ok(None);
                }
                self.tms = value & PIN_TMS != 0;
                3
            }
            opcode::SET_BITS_HIGH => {
                if arg(2).is_none() {
                    return Ok(None);
                }
                3
            }
            opcode::SET_CLOCK_DIVISOR => {
                let (Some(lo), Some(hi)) = (arg(1), arg(2)) else {
                    return Ok(None);
                };
                self.clock_divisor = u16::from_le_bytes([lo, hi]);
                3
            }
            opcode::LOOPBACK_START => {
                self.loopback = true;
                1
            }
            opcode::LOOPBACK_END => {
                self.loopback = false;
                1
            }
            opcode::SEND_IMMEDIATE
            | opcode::DISABLE_CLOCK_DIVIDE
            | opcode::ENABLE_CLOCK_DIVIDE
            | opcode::ENABLE_3_PHASE
            | opcode::DISABLE_3_PHASE
            | opcode::ENABLE_ADAPTIVE
            | opcode::DISABLE_ADAPTIVE => 1,
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unsupported MPSSE opcode 0x{:02x}", other),
                ));
            }
        };
        Ok(Some(consumed))
    }
}

impl Transport for SimulatedChain {
    /// Executes every complete command. A trailing partial command waits for the next write.
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.writes += 1;
        self.input.extend_from_slice(data);

        let mut pos = 0;
        while pos < self.input.len() {
            let input = std::mem::take(&mut self.input);
            let result = self.execute(&input[pos..]);
            self.input = input;
            match result {
                Ok(Some(consumed)) => pos += consumed,
                Ok(None) => break,
                Err(err) => {
                    self.input.clear();
                    return Err(err);
                }
            }
        }
        self.input.drain(..pos);
        Ok(data.len())
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        if self.output.len() < buf.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "{} read-back bytes requested, {} available",
                    buf.len(),
                    self.output.len()
                ),
            ));
        }
        let len = buf.len();
        for (dst, src) in buf.iter_mut().zip(self.output.drain(..len)) {
            *dst = src;
        }
        Ok(())
    }

    fn queued(&mut self) -> io::Result<usize> {
        Ok(self.output.len())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn byte_run_through_delay() {
        let mut chain = SimulatedChain::new(4);
        chain.write(&[0x39, 0x01, 0x00, 0xAB, 0xCD]).unwrap();
        assert_eq!(chain.queued().unwrap(), 2);
        let mut tdo = [0u8; 1];
        chain.read_exact(&mut tdo).unwrap();
        assert_eq!(tdo, [0xB0]);
        chain.read_exact(&mut tdo).unwrap();
        assert_eq!(tdo, [0xDA]);
        assert_eq!(chain.queued().unwrap(), 0);
        assert_eq!(chain.clocks(), 16);
    }

    #[test]
    fn bit_commands_fill_from_the_top() {
        let mut chain = SimulatedChain::new(0);
        chain.write(&[0x3B, 0x02, 0b101, 0x6B, 0x00, 0x81]).unwrap();
        let mut tdo = [0u8; 2];
        chain.read_exact(&mut tdo).unwrap();
        assert_eq!(tdo, [0b1010_0000, 0x80]);
        assert!(chain.tms);
    }

    #[test]
    fn set_bits_low_drives_tms() {
        let mut chain = SimulatedChain::new(0).record_tms();
        chain
            .write(&[0x6B, 0x00, 0x01, 0x80, 0x00, 0x0B, 0x3B, 0x01, 0x00])
            .unwrap();
        assert_eq!(chain.tms_trace(), &[true, false, false]);
        assert_eq!(chain.queued().unwrap(), 2);
    }

    #[test]
    fn partial_commands_wait_for_more_data() {
        let mut chain = SimulatedChain::new(0);
        chain.write(&[0x39, 0x02, 0x00, 0x11]).unwrap();
        assert_eq!(chain.queued().unwrap(), 0);
        chain.write(&[0x22, 0x33, 0x86, 0x05]).unwrap();
        assert_eq!(chain.queued().unwrap(), 3);
        assert_eq!(chain.clock_divisor(), 0);
        chain.write(&[0x00, 0x87]).unwrap();
        assert_eq!(chain.clock_divisor(), 5);
        assert_eq!(chain.writes(), 3);
    }

    #[test]
    fn loopback_bypasses_the_chain() {
        let mut chain = SimulatedChain::new(8);
        chain.write(&[0x84, 0x39, 0x00, 0x00, 0x5A, 0x85]).unwrap();
        let mut tdo = [0u8; 1];
        chain.read_exact(&mut tdo).unwrap();
        assert_eq!(tdo, [0x5A]);
    }

    #[test]
    fn errors() {
        let mut chain = SimulatedChain::new(0);
        let err = chain.write(&[0xAA]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);

        let mut tdo = [0u8; 1];
        let err = chain.read_exact(&mut tdo).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn init_sequence_is_understood() {
        let settings = crate::settings::MpsseSettings::new(true, true);
        let mut chain = SimulatedChain::new(1);
        chain.write(&settings.init_sequence()).unwrap();
        assert_eq!(chain.queued().unwrap(), 0);
        assert_eq!(chain.clock_divisor(), 0);
        assert!(chain.tms);
    }
}
