//! Pin layout and start-up configuration of the MPSSE engine.
use ftdi_mpsse::MpsseCmdBuilder;

/// ADBUS0, JTAG clock
pub const PIN_TCK: u8 = 1 << 0;
/// ADBUS1, data towards the target
pub const PIN_TDI: u8 = 1 << 1;
/// ADBUS2, data from the target
pub const PIN_TDO: u8 = 1 << 2;
/// ADBUS3, JTAG mode select
pub const PIN_TMS: u8 = 1 << 3;
/// ADBUS7, held high on boards with a Digilent style downloader
pub const PIN_ADBUS7: u8 = 1 << 7;

/// Levels and directions of the low GPIO byte while no clocking command runs.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct JtagPins {
    pub value: u8,
    pub direction: u8,
}

impl Default for JtagPins {
    /// TCK, TDI and TMS as outputs, TMS high and everything else low.
    fn default() -> Self {
        JtagPins {
            value: PIN_TMS,
            direction: PIN_TCK | PIN_TDI | PIN_TMS,
        }
    }
}

impl JtagPins {
    /// Additionally drives ADBUS7 high.
    pub fn with_digilent_pullup(self) -> JtagPins {
        JtagPins {
            value: self.value | PIN_ADBUS7,
            direction: self.direction | PIN_ADBUS7,
        }
    }

    /// The low GPIO byte with TMS driven low and TCK idle.
    pub fn tms_low(&self) -> u8 {
        self.value & !(PIN_TMS | PIN_TCK)
    }
}

/// Start-up configuration of the engine.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MpsseSettings {
    pub pins: JtagPins,
    /// TCK = 12 MHz / ((1 + divisor) * 2)
    pub clock_divisor: u16,
}

impl MpsseSettings {
    pub const DEFAULT_DIVISOR: u16 = 1;
    pub const FAST_DIVISOR: u16 = 0;

    pub fn new(fast_tck: bool, digilent: bool) -> MpsseSettings {
        let pins = if digilent {
            JtagPins::default().with_digilent_pullup()
        } else {
            JtagPins::default()
        };
        MpsseSettings {
            pins,
            clock_divisor: if fast_tck {
                Self::FAST_DIVISOR
            } else {
                Self::DEFAULT_DIVISOR
            },
        }
    }

    pub fn tck_hz(&self) -> u32 {
        12_000_000 / ((1 + u32::from(self.clock_divisor)) * 2)
    }

    /// Commands that put the pins into their idle state and program the clock divisor.
    /// None of them produce read-back bytes.
    pub fn init_sequence(&self) -> Vec<u8> {
        MpsseCmdBuilder::new()
            .disable_loopback()
            .set_gpio_lower(self.pins.value, self.pins.direction)
            .set_clock(self.clock_divisor.into(), None)
            .send_immediate()
            .0
    }
}

impl Default for MpsseSettings {
    fn default() -> Self {
        MpsseSettings::new(false, false)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_init_sequence() {
        let settings = MpsseSettings::default();
        assert_eq!(settings.tck_hz(), 3_000_000);
        assert_eq!(
            settings.init_sequence(),
            vec![0x85, 0x80, 0x08, 0x0B, 0x86, 0x01, 0x00, 0x87]
        );
    }

    #[test]
    fn digilent_fast_init_sequence() {
        let settings = MpsseSettings::new(true, true);
        assert_eq!(settings.tck_hz(), 6_000_000);
        assert_eq!(settings.pins.tms_low(), 0x80);
        assert_eq!(
            settings.init_sequence(),
            vec![0x85, 0x80, 0x88, 0x8B, 0x86, 0x00, 0x00, 0x87]
        );
    }
}
