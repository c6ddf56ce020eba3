use crate::{Notifier, ServerConfig, Session, SessionConfig};
use anyhow::Context;
use chaos::FaultInjector;
use rfc5321::Protocol;
use std::net::SocketAddr;
use std::sync::Arc;
use storage::Storage;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

/// Accepts TCP connections and runs a [Session] for each of them
pub struct Listener {
    listener: TcpListener,
    storage: Arc<dyn Storage>,
    notifier: Notifier,
    config: SessionConfig,
    fault_injector: Option<Arc<dyn FaultInjector>>,
}

impl Listener {
    pub async fn bind(
        config: &ServerConfig,
        storage: Arc<dyn Storage>,
        notifier: Notifier,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(&config.listen)
            .await
            .with_context(|| format!("failed to bind to {}", config.listen))?;
        Ok(Self::new(
            listener,
            storage,
            notifier,
            config.session.clone(),
            config.fault_injector()?,
        ))
    }

    pub fn new(
        listener: TcpListener,
        storage: Arc<dyn Storage>,
        notifier: Notifier,
        config: SessionConfig,
        fault_injector: Option<Arc<dyn FaultInjector>>,
    ) -> Self {
        Self {
            listener,
            storage,
            notifier,
            config,
            fault_injector,
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections forever. Each session runs in its own task.
    pub async fn serve<P: Protocol + 'static>(self) -> anyhow::Result<()> {
        info!("Listening on {}", self.local_addr()?);
        loop {
            let (socket, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    error!("Error accepting connection: {err:#}");
                    continue;
                }
            };

            if let Some(injector) = &self.fault_injector {
                if !injector.accept(peer) {
                    debug!("Refusing connection from {peer}");
                    continue;
                }
            }

            tokio::spawn(Session::<P>::accept(
                peer,
                socket,
                self.storage.clone(),
                self.notifier.clone(),
                self.config.clone(),
                self.fault_injector.clone(),
            ));
        }
    }
}
