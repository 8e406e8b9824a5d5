//! TCP listener serving one peer session at a time.
//!
//! The accept loop runs on the tokio runtime. Each accepted connection is
//! turned back into a blocking stream and its [`Session`] runs on the
//! blocking pool; the next connection waits in the listen backlog until the
//! current session ends. Cancelling the shutdown token stops accepting and
//! shuts the active connection down, which ends its session.

use std::io;
use std::net::{Shutdown, SocketAddr};
use std::path::PathBuf;

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::channel::TcpChannel;
use crate::engine::Dispatcher;
use crate::files::FileStreamer;
use crate::session::{Session, SessionOptions, SessionReport};
use crate::storage::{Capacity, StorageAdapter, StorageEnumerator};

/// Everything needed to start a fresh session.
#[derive(Debug, Clone)]
pub struct SessionFactory<E> {
    pub enumerator: E,
    pub mount_prefix: PathBuf,
    pub capacity: Capacity,
    pub streamer: FileStreamer,
    pub options: SessionOptions,
}

impl<E: StorageEnumerator + Clone> SessionFactory<E> {
    /// Build a session with its own empty hierarchy over `channel`.
    pub fn session<C>(&self, channel: C) -> Session<C, E>
    where
        C: crate::channel::Channel,
    {
        let adapter = StorageAdapter::new(self.enumerator.clone(), self.mount_prefix.clone());
        let dispatcher = Dispatcher::new(adapter, self.capacity);
        Session::new(channel, dispatcher, self.streamer.clone(), self.options)
    }
}

/// Listening daemon.
pub struct Server<E> {
    listener: TcpListener,
    factory: SessionFactory<E>,
}

impl<E> Server<E>
where
    E: StorageEnumerator + Clone + Send + 'static,
{
    /// Bind the listener.
    pub async fn bind(addr: SocketAddr, factory: SessionFactory<E>) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, factory })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept and serve peers until `shutdown` is cancelled.
    ///
    /// Returns the number of sessions served.
    pub async fn serve(self, shutdown: CancellationToken) -> usize {
        let mut served = 0;
        info!(addr = ?self.listener.local_addr().ok(), "accepting peers");

        loop {
            let (stream, peer) = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("shutdown requested, no longer accepting peers");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                },
            };

            info!(%peer, "peer connected");
            match self.run_session(stream, &shutdown).await {
                Ok(report) => {
                    served += 1;
                    info!(%peer, commands = report.commands, end = ?report.end, "peer disconnected");
                }
                Err(e) => error!(%peer, error = %e, "session failed"),
            }
        }

        served
    }

    async fn run_session(
        &self,
        stream: TcpStream,
        shutdown: &CancellationToken,
    ) -> io::Result<SessionReport> {
        let stream = stream.into_std()?;
        stream.set_nonblocking(false)?;
        let channel = TcpChannel::new(stream)?;
        let handle = channel.shutdown_handle()?;

        let session = self.factory.session(channel);
        let mut task = tokio::task::spawn_blocking(move || session.run());

        let joined = tokio::select! {
            joined = &mut task => joined,
            _ = shutdown.cancelled() => {
                info!("shutdown requested, closing active session");
                if let Err(e) = handle.shutdown(Shutdown::Both) {
                    warn!(error = %e, "failed to shut connection down");
                }
                task.await
            }
        };

        joined.map_err(io::Error::other)
    }
}
