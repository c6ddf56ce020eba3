use crate::{AsyncReadAndWrite, BoxedAsyncReadAndWrite, Notifier, SessionConfig, SessionHooks};
use chaos::FaultInjector;
use rfc5321::{Protocol, ProtocolConfig, ProtocolHooks, Reply};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use storage::Storage;
use throttle::{Link, Throttled};
use memchr::memmem;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, error, info, instrument, trace, warn};

/// Mechanisms advertised to peers. Credentials are never checked,
/// only offered to the fault injector.
const AUTH_MECHANISMS: &[&str] = &["PLAIN"];

/// One SMTP conversation over one connection.
///
/// The session owns the socket and moves bytes between it and its
/// [Protocol]: received bytes are buffered until they hold a complete
/// CRLF terminated line, handed to the protocol unaltered, and any
/// reply is written back before more input is considered.
pub struct Session<P> {
    peer: SocketAddr,
    conn: BoxedAsyncReadAndWrite,
    proto: P,
    config: SessionConfig,
    fault_injector: Option<Arc<dyn FaultInjector>>,
    link: Option<Arc<Link>>,
    is_tls: bool,
    /// Received bytes that have not been consumed by the protocol yet
    line: Vec<u8>,
    closed: bool,
}

impl<P: Protocol> Session<P> {
    /// Serve a freshly accepted connection until either side ends it
    pub async fn accept<T>(
        peer: SocketAddr,
        conn: T,
        storage: Arc<dyn Storage>,
        notifier: Notifier,
        config: SessionConfig,
        fault_injector: Option<Arc<dyn FaultInjector>>,
    ) where
        T: AsyncReadAndWrite + 'static,
    {
        Self::new(peer, conn, storage, notifier, config, fault_injector)
            .run()
            .await
    }

    pub fn new<T>(
        peer: SocketAddr,
        conn: T,
        storage: Arc<dyn Storage>,
        notifier: Notifier,
        config: SessionConfig,
        fault_injector: Option<Arc<dyn FaultInjector>>,
    ) -> Self
    where
        T: AsyncReadAndWrite + 'static,
    {
        let hooks = Arc::new(SessionHooks::new(
            config.hostname.clone(),
            peer,
            storage,
            notifier,
            fault_injector.clone(),
        ));
        let proto = P::new(
            ProtocolConfig {
                hostname: config.hostname.clone(),
                auth_mechanisms: AUTH_MECHANISMS.iter().map(|m| m.to_string()).collect(),
            },
            ProtocolHooks::from_handler(hooks),
        );

        let link = fault_injector
            .as_ref()
            .and_then(|injector| injector.link_speed())
            .and_then(|speed| match Link::new(speed) {
                Ok(link) => Some(link),
                Err(err) => {
                    warn!("{peer}: ignoring link speed {speed}: {err:#}");
                    None
                }
            });

        let conn: BoxedAsyncReadAndWrite = match &link {
            Some(link) => Box::new(Throttled::new(conn, link.clone())),
            None => Box::new(conn),
        };

        Self {
            peer,
            conn,
            proto,
            config,
            fault_injector,
            link,
            is_tls: false,
            line: vec![],
            closed: false,
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_tls(&self) -> bool {
        self.is_tls
    }

    /// The simulated link this session is throttled by, if any
    pub fn link(&self) -> Option<&Arc<Link>> {
        self.link.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn protocol(&self) -> &P {
        &self.proto
    }

    #[instrument(name = "session", skip(self), fields(peer = %self.peer))]
    pub async fn run(mut self) {
        info!(
            tls = self.is_tls,
            link_speed = self.link.as_ref().map(|link| link.bytes_per_second()),
            "Starting session"
        );

        let greeting = self.proto.start();
        match self.write(&greeting).await {
            Ok(()) => {
                while self.read().await {
                    if self.should_disconnect() {
                        info!("Dropping connection");
                        break;
                    }
                }
            }
            Err(err) => error!("Error writing greeting: {err:#}"),
        }

        self.close().await;
        info!("Session ended");
    }

    fn should_disconnect(&self) -> bool {
        self.fault_injector
            .as_ref()
            .map(|injector| injector.disconnect())
            .unwrap_or(false)
    }

    /// Take the next chunk of input from the peer and hand every
    /// complete line to the protocol, writing each reply as it is
    /// produced. Returns false once the session must end.
    pub async fn read(&mut self) -> bool {
        if self.closed {
            return false;
        }

        let mut buf = vec![0u8; self.config.read_chunk_size.max(1)];
        let size = match with_timeout(self.config.read_timeout, self.conn.read(&mut buf)).await {
            Ok(0) => {
                info!("Connection closed by remote host");
                self.close().await;
                return false;
            }
            Ok(size) => size,
            Err(err) => {
                error!("Error reading from socket: {err:#}");
                return false;
            }
        };

        let data = &buf[..size];
        trace!(
            "Received {size} bytes: '{}'",
            escape_line_endings(&String::from_utf8_lossy(data))
        );
        self.line.extend_from_slice(data);

        while memmem::find(&self.line, b"\r\n").is_some() {
            let before = self.line.len();
            let (remainder, reply) = self.proto.parse(std::mem::take(&mut self.line)).await;
            let stalled = remainder.len() >= before;
            self.line = remainder;

            if let Some(reply) = reply {
                if let Err(err) = self.write(&reply).await {
                    error!("Error writing reply '{reply}': {err:#}");
                    self.close().await;
                    return false;
                }
                if reply.is_closing() {
                    self.close().await;
                    return false;
                }
            }

            if stalled {
                error!("Protocol consumed none of {before} buffered bytes, ending session");
                self.close().await;
                return false;
            }
        }

        true
    }

    /// Transmit `reply` and flush it to the peer
    pub async fn write(&mut self, reply: &Reply) -> io::Result<()> {
        let lines = reply.wire_lines();
        let conn = &mut self.conn;
        with_timeout(self.config.write_timeout, async move {
            for line in &lines {
                trace!("Sent {} bytes: '{}'", line.len(), escape_line_endings(line));
                conn.write_all(line.as_bytes()).await?;
            }
            conn.flush().await
        })
        .await
    }

    /// Shut the connection down. Only the first call has any effect.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        debug!("Closing connection");
        if let Err(err) = self.conn.shutdown().await {
            debug!("Error while closing connection: {err:#}");
        }
    }
}

async fn with_timeout<T, F>(limit: Option<Duration>, fut: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
            io::Error::new(io::ErrorKind::TimedOut, format!("timed out after {limit:?}"))
        })?,
        None => fut.await,
    }
}

fn escape_line_endings(text: &str) -> String {
    text.replace('\r', "\\r").replace('\n', "\\n")
}
