//! # FTDI USB transport
//!
//! Drives one channel of an FTDI chip through the D2XX driver (`libftd2xx`).
//! D2XX lists every channel of a multi-channel chip as its own device, channel A first.
use std::{io, time::Duration};

use ftdi_mpsse::MpsseCmdBuilder;
use libftd2xx::{BitMode, FtStatus, Ftdi, FtdiCommon, TimeoutError};
use thiserror::Error;
use xvc_mpsse::{MpsseSettings, Transport};

/// Opcode the engine is guaranteed not to know, used to align the read-back stream.
const SYNC_OPCODE: u8 = 0xAA;
/// Answer of the engine to an unknown opcode, followed by the opcode.
const BAD_COMMAND: u8 = 0xFA;

const USB_TRANSFER_SIZE: u32 = 65536;
const LATENCY_TIMER: Duration = Duration::from_millis(1);
const WRITE_TIMEOUT: Duration = Duration::from_secs(1);
/// How long a read may wait for data before the device is considered gone.
const READ_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum FtdiError {
    #[error("no channel {interface:?} on a device with id {vid:04x}:{pid:04x}")]
    NotFound {
        vid: u16,
        pid: u16,
        interface: Interface,
    },
    #[error("MPSSE engine did not answer the sync command, got {0:02x?}")]
    Sync(Vec<u8>),
    #[error("FTDI driver error: {0}")]
    Driver(#[from] FtStatus),
    #[error("FTDI transfer error: {0}")]
    Transfer(#[from] TimeoutError),
}

/// Channel of a multi-channel FTDI chip.
#[derive(Copy, Clone, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum Interface {
    A,
    B,
}

impl Interface {
    /// Position of the channel among the D2XX devices of one chip.
    fn ordinal(self) -> usize {
        match self {
            Interface::A => 0,
            Interface::B => 1,
        }
    }
}

pub struct FtdiDevice {
    ft: Ftdi,
}

impl FtdiDevice {
    /// Opens `interface` of the first device matching `vid:pid`.
    pub fn open(vid: u16, pid: u16, interface: Interface) -> Result<FtdiDevice, FtdiError> {
        log::debug!("Opening FTDI device {:04x}:{:04x}", vid, pid);
        // D2XX only enumerates FTDI's own ids unless told otherwise.
        #[cfg(unix)]
        libftd2xx::set_vid_pid(vid, pid)?;

        let devices = libftd2xx::list_devices()?;
        for info in &devices {
            log::trace!(
                "Found {:04x}:{:04x} {:?} ({})",
                info.vendor_id,
                info.product_id,
                info.description,
                info.serial_number
            );
        }
        let index = channel_index(
            devices.iter().map(|info| (info.vendor_id, info.product_id)),
            vid,
            pid,
            interface,
        )
        .ok_or(FtdiError::NotFound {
            vid,
            pid,
            interface,
        })?;

        let mut ft = Ftdi::with_index(index as i32)?;
        ft.reset()?;
        ft.set_usb_parameters(USB_TRANSFER_SIZE)?;
        ft.set_latency_timer(LATENCY_TIMER)?;
        ft.set_timeouts(READ_TIMEOUT, WRITE_TIMEOUT)?;
        log::info!(
            "Opened FTDI device {:04x}:{:04x}, interface {:?} ({})",
            vid,
            pid,
            interface,
            devices[index].description
        );
        Ok(FtdiDevice { ft })
    }

    /// Switches the channel to MPSSE mode, checks that the engine answers and
    /// sends the start-up commands of `settings`.
    pub fn init_mpsse(&mut self, settings: &MpsseSettings) -> Result<(), FtdiError> {
        let mask = settings.pins.direction;
        self.ft.set_bit_mode(0, BitMode::Reset)?;
        self.ft.set_bit_mode(mask, BitMode::Mpsse)?;
        self.ft.purge_all()?;
        self.sync()?;

        self.ft.write_all(&settings.init_sequence())?;
        log::info!(
            "MPSSE initialized: TCK {} Hz, pins 0x{:02x}/0x{:02x}",
            settings.tck_hz(),
            settings.pins.value,
            settings.pins.direction
        );
        Ok(())
    }

    /// Sends an invalid opcode and expects the engine to echo it back behind 0xFA.
    fn sync(&mut self) -> Result<(), FtdiError> {
        let command = MpsseCmdBuilder::with_vec(vec![SYNC_OPCODE]).send_immediate();
        self.ft.write_all(command.as_slice())?;
        let mut answer = [0u8; 2];
        if let Err(e) = self.ft.read_all(&mut answer) {
            log::debug!("Sync read failed: {}", e);
            return Err(FtdiError::Sync(answer.to_vec()));
        }
        if answer != [BAD_COMMAND, SYNC_OPCODE] {
            return Err(FtdiError::Sync(answer.to_vec()));
        }
        log::debug!("MPSSE engine in sync");
        Ok(())
    }
}

impl Transport for FtdiDevice {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.ft.write(data).map_err(status_to_io)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.ft.read_all(buf).map_err(transfer_to_io)
    }

    fn queued(&mut self) -> io::Result<usize> {
        self.ft.queue_status().map_err(status_to_io)
    }
}

impl Drop for FtdiDevice {
    fn drop(&mut self) {
        if let Err(e) = self.ft.set_bit_mode(0, BitMode::Reset) {
            log::warn!("Could not reset FTDI device: {}", e);
        }
        log::debug!("Closed FTDI device");
    }
}

/// Index of `interface` among the listed devices, counting only those with id `vid:pid`.
fn channel_index(
    ids: impl IntoIterator<Item = (u16, u16)>,
    vid: u16,
    pid: u16,
    interface: Interface,
) -> Option<usize> {
    ids.into_iter()
        .enumerate()
        .filter(|&(_, id)| id == (vid, pid))
        .nth(interface.ordinal())
        .map(|(index, _)| index)
}

fn status_to_io(status: FtStatus) -> io::Error {
    let kind = match status {
        FtStatus::DEVICE_NOT_FOUND | FtStatus::DEVICE_NOT_OPENED => io::ErrorKind::NotConnected,
        FtStatus::IO_ERROR => io::ErrorKind::BrokenPipe,
        _ => io::ErrorKind::Other,
    };
    io::Error::new(kind, status)
}

fn transfer_to_io(err: TimeoutError) -> io::Error {
    match err {
        TimeoutError::FtStatus(status) => status_to_io(status),
        timeout @ TimeoutError::Timeout { .. } => io::Error::new(io::ErrorKind::TimedOut, timeout),
    }
}
