//! # XVC Server for FTDI adapters
//!
//! Serves the Xilinx Virtual Cable protocol on top of an FTDI chip in MPSSE mode
//! (FT2232D/H, FT4232H, FT232H and boards built around them).
//!
//! ## Overview
//!
//! The binary opens the USB device, switches the selected channel to MPSSE mode and
//! hands it to an [`xvc_mpsse::MpsseBackend`]. With `--simulate` a software model
//! of the adapter is used instead, which is handy for trying out clients without
//! hardware.

pub mod ftdi;

use std::error::Error;
use std::net::{IpAddr, SocketAddr};
use std::process::ExitCode;
use std::time::Duration;

use clap::{ArgAction, Parser};
use clap_num::maybe_hex;
use env_logger::Env;
use tokio_util::sync::CancellationToken;
use xvc_mpsse::{
    DEFAULT_CHUNK_BITS, MpsseBackend, MpsseSettings, ShiftEncoder, SimulatedChain, Transport,
};
use xvc_protocol::DEFAULT_MAX_VECTOR_SIZE;
use xvc_server::server::{Config, Server};

use crate::ftdi::{FtdiDevice, Interface};

#[derive(Parser)]
#[command(about = "Xilinx Virtual Cable (XVC) server for FTDI MPSSE adapters", long_about = None)]
struct Args {
    #[arg(
        short,
        long,
        action = ArgAction::Count,
        help = "Increase log level, once for debug, twice for trace"
    )]
    verbose: u8,

    #[arg(short, long, help = "Run TCK at 6 MHz instead of 3 MHz")]
    fast_tck: bool,

    #[arg(short, long, help = "Drive ADBUS7 high, needed by Digilent style boards")]
    digilent: bool,

    #[arg(short, long, default_value = "2542")]
    port: u16,

    #[arg(short, long, default_value = "0.0.0.0")]
    ip: IpAddr,

    #[arg(long, default_value = "0x0403", value_parser = maybe_hex::<u16>)]
    vid: u16,

    #[arg(long, default_value = "0x6010", value_parser = maybe_hex::<u16>)]
    pid: u16,

    #[arg(long, value_enum, ignore_case = true, default_value_t = Interface::A)]
    interface: Interface,

    #[arg(long, default_value_t = DEFAULT_CHUNK_BITS, help = "Bits clocked per USB transaction")]
    chunk_bits: usize,

    #[arg(
        long,
        default_value_t = DEFAULT_MAX_VECTOR_SIZE,
        help = "Largest vector in bytes accepted from clients"
    )]
    max_vector_size: u32,

    #[arg(long, value_name = "SECONDS", help = "Close connections that stay silent this long")]
    idle_timeout: Option<u64>,

    #[arg(
        long,
        value_name = "DELAY",
        help = "Serve a chain of DELAY simulated flip-flops instead of a USB device"
    )]
    simulate: Option<usize>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();
    log::info!("Starting XVC server");

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let config = Config {
        max_vector_size: args.max_vector_size,
        idle_timeout: args.idle_timeout.map(Duration::from_secs),
    };
    log::debug!(
        "Server config: max_vector_size={}, idle_timeout={:?}",
        config.max_vector_size,
        config.idle_timeout
    );

    let addr = SocketAddr::new(args.ip, args.port);
    let settings = MpsseSettings::new(args.fast_tck, args.digilent);
    let encoder = ShiftEncoder::new(args.chunk_bits, settings.pins);
    log::debug!("Encoding shifts in chunks of {} bits", encoder.chunk_bits());

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Received Ctrl-C, shutting down");
            on_signal.cancel();
        }
    });

    match args.simulate {
        Some(delay) => {
            log::info!("Using simulated chain with a delay of {} bits", delay);
            let mut chain = SimulatedChain::new(delay);
            chain.write(&settings.init_sequence())?;
            serve(MpsseBackend::new(chain, encoder), config, addr, shutdown).await
        }
        None => {
            let mut device = FtdiDevice::open(args.vid, args.pid, args.interface)?;
            device.init_mpsse(&settings)?;
            serve(MpsseBackend::new(device, encoder), config, addr, shutdown).await
        }
    }
}

async fn serve<T: Transport + Send + 'static>(
    backend: MpsseBackend<T>,
    config: Config,
    addr: SocketAddr,
    shutdown: CancellationToken,
) -> Result<(), Box<dyn Error>> {
    log::info!("Binding to address: {}", addr);
    let server = Server::new(backend, config);
    server.listen(addr, shutdown).await?;
    Ok(())
}
