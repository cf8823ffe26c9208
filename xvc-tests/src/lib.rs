//! Helpers for end-to-end tests: a server on a loopback port backed by a simulated
//! chain, and a minimal XVC client.
use std::{io, net::SocketAddr};

use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use xvc_mpsse::{JtagPins, MpsseBackend, ShiftEncoder, SimulatedChain};
use xvc_protocol::{Message, XvcInfo, error::ReadError};
use xvc_server::{
    error::ServerError,
    server::{Config, Server},
};

/// A server running in the background.
pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: CancellationToken,
    handle: JoinHandle<Result<(), ServerError>>,
}

impl TestServer {
    /// Serves a chain with `delay` flip-flops between TDI and TDO.
    pub async fn simulated(delay: usize, chunk_bits: usize, config: Config) -> TestServer {
        let backend = MpsseBackend::new(
            SimulatedChain::new(delay),
            ShiftEncoder::new(chunk_bits, JtagPins::default()),
        );
        TestServer::start(Server::new(backend, config)).await
    }

    pub async fn start<T>(server: Server<T>) -> TestServer
    where
        T: xvc_server::XvcServer + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("loopback port available");
        let addr = listener.local_addr().expect("bound listener has an address");
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let handle = tokio::spawn(async move { server.serve(listener, token).await });
        TestServer {
            addr,
            shutdown,
            handle,
        }
    }

    pub async fn connect(&self) -> TestClient {
        TestClient::connect(self.addr)
            .await
            .expect("server accepts connections")
    }

    /// Waits for the server to stop on its own.
    pub async fn join(self) -> Result<(), ServerError> {
        self.handle.await.expect("server task does not panic")
    }

    /// Stops the server and returns how it ended.
    pub async fn stop(self) -> Result<(), ServerError> {
        self.shutdown.cancel();
        self.join().await
    }
}

/// XVC client over a tokio socket.
pub struct TestClient {
    tcp: BufReader<TcpStream>,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> io::Result<TestClient> {
        Ok(TestClient {
            tcp: BufReader::new(TcpStream::connect(addr).await?),
        })
    }

    /// Sends bytes as they are, valid frame or not.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.tcp.get_mut().write_all(bytes).await
    }

    async fn send(&mut self, message: &Message) -> io::Result<()> {
        let mut frame = Vec::new();
        message.write_to(&mut frame)?;
        self.send_raw(&frame).await
    }

    pub async fn get_info(&mut self) -> Result<XvcInfo, ReadError> {
        self.send(&Message::GetInfo).await?;
        self.read_info().await
    }

    pub async fn read_info(&mut self) -> Result<XvcInfo, ReadError> {
        let mut line = Vec::new();
        self.tcp.read_until(b'\n', &mut line).await?;
        XvcInfo::parse(line.trim_ascii_end())
    }

    pub async fn set_tck(&mut self, period_ns: u32) -> io::Result<u32> {
        self.send(&Message::SetTck { period_ns }).await?;
        let mut buf = [0u8; 4];
        self.tcp.read_exact(&mut buf).await?;
        Ok(u32::from_le_bytes(buf))
    }

    pub async fn shift(&mut self, num_bits: u32, tms: &[u8], tdi: &[u8]) -> io::Result<Vec<u8>> {
        self.send(&Message::Shift {
            num_bits,
            tms: tms.into(),
            tdi: tdi.into(),
        })
        .await?;
        self.read_exact(Message::vector_len(num_bits)).await
    }

    pub async fn read_exact(&mut self, len: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0; len];
        self.tcp.read_exact(&mut buf).await?;
        Ok(buf)
    }

    /// Reads until the server closes the connection.
    pub async fn read_to_end(&mut self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.tcp.read_to_end(&mut buf).await?;
        Ok(buf)
    }

    /// Closes the sending half, the server sees end of stream.
    pub async fn shutdown_write(&mut self) -> io::Result<()> {
        self.tcp.get_mut().shutdown().await
    }
}

/// Deterministic pseudo-random bytes.
pub fn lcg_bytes(seed: u32, len: usize) -> Vec<u8> {
    let mut state = seed;
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (state >> 24) as u8
        })
        .collect()
}

/// TDO a fresh chain with `delay` flip-flops returns for `tdi`.
pub fn delayed(tdi: &[u8], num_bits: usize, delay: usize) -> Vec<u8> {
    let mut tdo = vec![0u8; num_bits.div_ceil(8)];
    for bit in delay..num_bits {
        let src = bit - delay;
        if (tdi[src / 8] >> (src % 8)) & 1 != 0 {
            tdo[bit / 8] |= 1 << (bit % 8);
        }
    }
    tdo
}
