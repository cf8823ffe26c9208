use std::{net::SocketAddr, sync::Arc, time::Duration};

use tokio::{
    net::{TcpListener, ToSocketAddrs},
    task::{JoinError, JoinSet},
};
use tokio_util::sync::CancellationToken;
use xvc_protocol::{DEFAULT_MAX_VECTOR_SIZE, Version, XvcInfo};

use crate::{
    XvcServer,
    error::{ServerError, SessionError, ShiftError},
    session::Session,
};

#[derive(Debug, Clone)]
pub struct Config {
    /// Largest TMS or TDI vector in bytes that clients may send. Advertised in `getinfo`.
    pub max_vector_size: u32,
    /// Close connections that do not send a complete command within this time.
    pub idle_timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_vector_size: DEFAULT_MAX_VECTOR_SIZE,
            idle_timeout: None,
        }
    }
}

#[derive(Debug)]
pub struct Server<T: XvcServer> {
    backend: Arc<T>,
    config: Config,
}

/// Builder to create a [Server] instance and modify configuration options
///
/// # Example
///
/// ```ignore
/// use xvc_server::server::Builder;
/// use std::time::Duration;
///
/// let server = Builder::new()
///     .max_vector_size(1024)
///     .idle_timeout(Duration::from_secs(20))
///     .build(my_backend);
/// ```
#[derive(Default)]
pub struct Builder {
    config: Config,
}

impl Builder {
    pub fn new() -> Builder {
        Builder::default()
    }

    /// Set the highest vector size that this server is expected to receive.
    pub fn max_vector_size(mut self, size: u32) -> Self {
        self.config.max_vector_size = size;
        self
    }

    /// Close connections that stay silent for longer than `timeout`
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = Some(timeout);
        self
    }

    /// Build and return the server
    pub fn build<T: XvcServer>(self, backend: T) -> Server<T> {
        Server::new(backend, self.config)
    }
}

type SessionResult = (SocketAddr, Result<(), SessionError>);

impl<T: XvcServer> Server<T> {
    pub fn new(backend: T, config: Config) -> Server<T> {
        Server {
            backend: Arc::new(backend),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The capabilities this server reports to clients.
    pub fn info(&self) -> XvcInfo {
        XvcInfo::new(Version::V1_0, self.config.max_vector_size)
    }
}

impl<T: XvcServer + Send + Sync + 'static> Server<T> {
    /// Binds to `addr` and serves clients until `shutdown` is cancelled.
    pub async fn listen(
        &self,
        addr: impl ToSocketAddrs,
        shutdown: CancellationToken,
    ) -> Result<(), ServerError> {
        let listener = TcpListener::bind(addr).await.map_err(ServerError::Listen)?;
        self.serve(listener, shutdown).await
    }

    /// Serves clients from an already bound listener until `shutdown` is cancelled.
    ///
    /// If the backend reports a fatal error, `shutdown` is cancelled, all other
    /// connections are closed and the error is returned.
    pub async fn serve(
        &self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<(), ServerError> {
        match listener.local_addr() {
            Ok(addr) => log::info!("Server listening for connections on {}", addr),
            Err(_) => log::info!("Server listening for connections"),
        }

        let mut sessions: JoinSet<SessionResult> = JoinSet::new();
        let mut fatal = None;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((tcp, peer)) => {
                        log::info!("New client connection from {}", peer);
                        if let Err(e) = tcp.set_nodelay(true) {
                            log::warn!("Could not set TCP_NODELAY for {}: {}", peer, e);
                        }
                        let session = Session::new(
                            Arc::clone(&self.backend),
                            self.config.clone(),
                            shutdown.clone(),
                        );
                        sessions.spawn(async move { (peer, session.run(tcp).await) });
                    }
                    Err(e) => log::error!("Connection error: {}", e),
                },
                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Some(err) = session_finished(joined) {
                        fatal = Some(err);
                        shutdown.cancel();
                        break;
                    }
                }
            }
        }

        while let Some(joined) = sessions.join_next().await {
            if let Some(err) = session_finished(joined) {
                fatal.get_or_insert(err);
            }
        }

        match fatal {
            Some(err) => Err(ServerError::Transport(err)),
            None => {
                log::info!("Server stopped");
                Ok(())
            }
        }
    }
}

/// Logs the outcome of a session and hands back errors that must stop the server.
fn session_finished(joined: Result<SessionResult, JoinError>) -> Option<ShiftError> {
    match joined {
        Ok((peer, Ok(()))) => {
            log::info!("Client {} disconnected", peer);
            None
        }
        Ok((peer, Err(SessionError::Shift(err)))) if err.is_fatal() => {
            log::error!("Client {} hit a fatal device error: {}", peer, err);
            Some(err)
        }
        Ok((peer, Err(err @ SessionError::IdleTimeout(_)))) => {
            log::warn!("Client {} closed: {}", peer, err);
            None
        }
        Ok((peer, Err(err))) => {
            log::error!("Client {} error: {}", peer, err);
            None
        }
        Err(err) => {
            log::error!("Client task failed: {}", err);
            None
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    /// Echoes TDI as TDO and fails with a transport error when TMS is non-zero.
    struct Echo;

    impl XvcServer for Echo {
        fn set_tck(&self, period_ns: u32) -> u32 {
            period_ns * 2
        }

        fn shift(
            &self,
            _num_bits: u32,
            tms: Box<[u8]>,
            tdi: Box<[u8]>,
        ) -> Result<Box<[u8]>, ShiftError> {
            if tms.iter().any(|b| *b != 0) {
                return Err(ShiftError::Transport(std::io::Error::other("unplugged")));
            }
            Ok(tdi)
        }
    }

    type Running = tokio::task::JoinHandle<Result<(), ServerError>>;

    async fn start(server: Server<Echo>) -> (SocketAddr, CancellationToken, Running) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let handle = tokio::spawn(async move { server.serve(listener, token).await });
        (addr, shutdown, handle)
    }

    #[tokio::test]
    async fn settck_uses_backend_period() {
        let (addr, shutdown, handle) = start(Server::new(Echo, Config::default())).await;
        let mut tcp = TcpStream::connect(addr).await.unwrap();
        tcp.write_all(b"settck:\x0A\x00\x00\x00").await.unwrap();
        let mut reply = [0u8; 4];
        tcp.read_exact(&mut reply).await.unwrap();
        assert_eq!(u32::from_le_bytes(reply), 20);

        shutdown.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn getinfo_advertises_configured_size() {
        let server = Builder::new().max_vector_size(128).build(Echo);
        assert_eq!(server.info().max_vector_len(), 128);
        let (addr, shutdown, handle) = start(server).await;
        let mut tcp = TcpStream::connect(addr).await.unwrap();
        tcp.write_all(b"getinfo:").await.unwrap();
        let mut reply = [0u8; 19];
        tcp.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply, b"xvcServer_v1.0:128\n");

        shutdown.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn fatal_backend_error_stops_server() {
        let (addr, shutdown, handle) = start(Server::new(Echo, Config::default())).await;
        let mut tcp = TcpStream::connect(addr).await.unwrap();
        tcp.write_all(b"shift:\x08\x00\x00\x00\x01\xFF").await.unwrap();
        let mut reply = Vec::new();
        tcp.read_to_end(&mut reply).await.unwrap();
        assert!(reply.is_empty());

        assert!(matches!(
            handle.await.unwrap(),
            Err(ServerError::Transport(ShiftError::Transport(_)))
        ));
        assert!(shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn idle_connection_is_closed() {
        let server = Builder::new()
            .idle_timeout(Duration::from_millis(50))
            .build(Echo);
        let (addr, shutdown, handle) = start(server).await;
        let mut tcp = TcpStream::connect(addr).await.unwrap();
        let mut reply = Vec::new();
        tcp.read_to_end(&mut reply).await.unwrap();
        assert!(reply.is_empty());

        shutdown.cancel();
        handle.await.unwrap().unwrap();
    }
}
