use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::{codec::Framed, sync::CancellationToken};
use xvc_protocol::{Message, Response, Version, XvcInfo, framing::XvcServerCodec};

use crate::{XvcServer, error::SessionError, server::Config};

/// Protocol handler for a single client connection.
pub(crate) struct Session<T> {
    backend: Arc<T>,
    config: Config,
    shutdown: CancellationToken,
}

impl<T: XvcServer + Send + Sync + 'static> Session<T> {
    pub(crate) fn new(backend: Arc<T>, config: Config, shutdown: CancellationToken) -> Session<T> {
        Session {
            backend,
            config,
            shutdown,
        }
    }

    /// Serves commands until the client disconnects, the server shuts down or an error occurs.
    pub(crate) async fn run(self, tcp: TcpStream) -> Result<(), SessionError> {
        let codec = XvcServerCodec::new(self.config.max_vector_size as usize);
        let mut framed = Framed::new(tcp, codec);

        loop {
            let next = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    log::debug!("Server shutting down, closing connection");
                    return Ok(());
                }
                next = self.next_message(&mut framed) => next,
            };

            let message = match next {
                Ok(Some(message)) => message,
                Ok(None) => return Ok(()),
                Err(SessionError::Read(err)) if err.is_disconnect() => {
                    if framed.codec().is_mid_frame() || !framed.read_buffer().is_empty() {
                        log::warn!("Client disconnected in the middle of a command");
                    }
                    return Ok(());
                }
                Err(err) => return Err(err),
            };

            let response = self.process_message(message).await?;
            framed.send(response).await?;
        }
    }

    async fn next_message(
        &self,
        framed: &mut Framed<TcpStream, XvcServerCodec>,
    ) -> Result<Option<Message>, SessionError> {
        let next = match self.config.idle_timeout {
            Some(timeout) => tokio::time::timeout(timeout, framed.next())
                .await
                .map_err(|_| SessionError::IdleTimeout(timeout))?,
            None => framed.next().await,
        };
        Ok(next.transpose()?)
    }

    /// Process each message, forwarding the work to the backend.
    async fn process_message(&self, message: Message) -> Result<Response, SessionError> {
        match message {
            Message::GetInfo => {
                log::debug!("Received GetInfo message");
                let info = XvcInfo::new(Version::V1_0, self.config.max_vector_size);
                Ok(Response::Info(info))
            }
            Message::SetTck { period_ns } => {
                log::debug!("Received SetTck message: period_ns={}", period_ns);
                let backend = Arc::clone(&self.backend);
                let ret_period =
                    tokio::task::spawn_blocking(move || backend.set_tck(period_ns)).await?;
                log::debug!("Set TCK returned: period_ns={}", ret_period);
                Ok(Response::TckPeriod(ret_period))
            }
            Message::Shift { num_bits, tms, tdi } => {
                log::debug!(
                    "Received Shift message: num_bits={}, tms_len={}, tdi_len={}",
                    num_bits,
                    tms.len(),
                    tdi.len()
                );
                log::trace!("Shift TMS data: {:02x?}", &tms[..]);
                log::trace!("Shift TDI data: {:02x?}", &tdi[..]);
                let backend = Arc::clone(&self.backend);
                let tdo =
                    tokio::task::spawn_blocking(move || backend.shift(num_bits, tms, tdi)).await??;
                log::trace!("Shift result TDO data: {:02x?}", &tdo[..]);
                Ok(Response::Tdo(tdo))
            }
        }
    }
}
