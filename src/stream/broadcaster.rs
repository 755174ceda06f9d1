//! TCP broadcast server
//!
//! One accept loop hands every connection its own task. Each task owns an independent
//! [`Packetizer`] starting at sample 0, so a slow or dead client never delays another.
//! A `watch` channel carries the stop signal to the accept loop and every client.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{self, MissedTickBehavior};

use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::frame::FrameLayout;
use crate::recording::Recording;
use crate::stream::dump::DataDump;
use crate::stream::packetizer::Packetizer;
use crate::stream::registry::{ClientId, ConnectionRegistry};

/// Pause after a failed accept before trying again
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Server tuning
#[derive(Debug, Clone, Copy)]
pub struct BroadcastOptions {
    pub layout: FrameLayout,
    /// Longest a single packet write may block before the client is dropped
    pub send_timeout: Duration,
    /// How long shutdown waits for client tasks before aborting them
    pub shutdown_grace: Duration,
    /// Dump every sent packet to the console
    pub print_data: bool,
}

impl Default for BroadcastOptions {
    fn default() -> Self {
        Self::from_config(&RelayConfig::default())
    }
}

impl BroadcastOptions {
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            layout: config.stream.layout(),
            send_timeout: config.server.send_timeout(),
            shutdown_grace: config.server.shutdown_grace(),
            print_data: config.server.print_data,
        }
    }
}

/// A bound listener ready to serve one recording
pub struct BroadcastServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    recording: Arc<Recording>,
    options: BroadcastOptions,
    registry: Arc<ConnectionRegistry>,
    dump: Arc<DataDump>,
}

impl BroadcastServer {
    /// Bind `addr`; the recording must already match the packet layout
    pub async fn bind(addr: &str, recording: Recording, options: BroadcastOptions) -> Result<Self> {
        let layout = options.layout;
        if recording.channel_count() != layout.channels
            || recording.sample_count() % layout.samples_per_packet != 0
        {
            return Err(RelayError::RecordingShape {
                message: format!(
                    "{} channels x {} samples does not fit packets of {} x {}",
                    recording.channel_count(),
                    recording.sample_count(),
                    layout.channels,
                    layout.samples_per_packet
                ),
            });
        }

        // Every client paces by this; refuse before anyone can connect
        recording.packet_period(layout.samples_per_packet)?;

        let listener = TcpListener::bind(addr).await.map_err(|e| RelayError::Bind {
            addr: addr.to_string(),
            message: e.to_string(),
        })?;
        let local_addr = listener.local_addr()?;
        tracing::info!("Listening on {}", local_addr);

        let dump = DataDump::stdout(options.print_data);
        if dump.is_enabled() {
            tracing::info!("Printing sent packets to the console (--ndp to disable)");
        }

        Ok(Self {
            listener,
            local_addr,
            recording: Arc::new(recording),
            options,
            registry: Arc::new(ConnectionRegistry::new()),
            dump: Arc::new(dump),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Start serving in the background
    ///
    /// Dropping the returned handle stops the server as if `shutdown` had been called,
    /// without waiting for it.
    pub fn spawn(self) -> ServerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let local_addr = self.local_addr;
        let registry = self.registry();
        let task = tokio::spawn(self.run(shutdown_rx));
        ServerHandle {
            shutdown: shutdown_tx,
            task,
            local_addr,
            registry,
        }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut clients = JoinSet::new();

        loop {
            tokio::select! {
                _ = stop_requested(&mut shutdown) => break,

                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let id = self.registry.add(Some(peer));
                        tracing::info!("Client {} connected from {} ({} connected)", id, peer, self.registry.len());
                        let client = ClientStream {
                            stream,
                            registration: Registration { registry: self.registry(), id },
                            packetizer: Packetizer::new(
                                Arc::clone(&self.recording),
                                self.options.layout.samples_per_packet,
                            ),
                            dump: Arc::clone(&self.dump),
                            send_timeout: self.options.send_timeout,
                        };
                        clients.spawn(client.run(shutdown.clone()));
                    }
                    Err(e) => {
                        tracing::warn!("Accept failed: {}", e);
                        time::sleep(ACCEPT_BACKOFF).await;
                    }
                },

                Some(joined) = clients.join_next(), if !clients.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!("Client task failed: {}", e);
                    }
                }
            }
        }

        drop(self.listener);
        tracing::info!("Shutting down, waiting for {} client(s)", clients.len());

        let drain = async { while clients.join_next().await.is_some() {} };
        if time::timeout(self.options.shutdown_grace, drain).await.is_err() {
            tracing::warn!(
                "{} client(s) still running after {:?}, aborting",
                clients.len(),
                self.options.shutdown_grace
            );
            clients.abort_all();
            while clients.join_next().await.is_some() {}
        }
        tracing::info!("Server stopped");
    }
}

/// Handle to a running server
pub struct ServerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
    local_addr: SocketAddr,
    registry: Arc<ConnectionRegistry>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Stop accepting, stop every client and wait for them within the grace period
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown.send(true);
        self.task
            .await
            .map_err(|e| RelayError::Io(io::Error::new(io::ErrorKind::Other, e.to_string())))
    }
}

/// Resolves once a stop is requested or the handle is gone
async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Removes the client from the registry when its task ends, however it ends
struct Registration {
    registry: Arc<ConnectionRegistry>,
    id: ClientId,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.remove(&self.id);
    }
}

/// Why a client loop ended
#[derive(Debug)]
enum ClientExit {
    Shutdown,
    SendFailed(io::Error),
    SendTimedOut,
}

struct ClientStream {
    stream: TcpStream,
    registration: Registration,
    packetizer: Packetizer,
    dump: Arc<DataDump>,
    send_timeout: Duration,
}

impl ClientStream {
    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        if let Err(e) = self.stream.set_nodelay(true) {
            tracing::debug!("Could not set TCP_NODELAY for {}: {}", self.registration.id, e);
        }

        let exit = self.pump(&mut shutdown).await;
        let id = &self.registration.id;
        match &exit {
            ClientExit::Shutdown => tracing::debug!("Client {} stopped for shutdown", id),
            ClientExit::SendFailed(e) => tracing::info!("Client {} disconnected: {}", id, e),
            ClientExit::SendTimedOut => {
                tracing::warn!("Client {} dropped: send blocked for {:?}", id, self.send_timeout)
            }
        }
        tracing::debug!(
            "Client {} left after {} full pass(es) of the recording",
            id,
            self.packetizer.wraps()
        );
        // Registration drops with self and releases the registry entry
    }

    async fn pump(&mut self, shutdown: &mut watch::Receiver<bool>) -> ClientExit {
        let mut pacing = time::interval(self.packetizer.pacing_interval());
        pacing.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = stop_requested(shutdown) => return ClientExit::Shutdown,
                _ = pacing.tick() => {}
            }

            let index = self.packetizer.packet_index();
            let packet = self.packetizer.next_packet();
            let bytes = packet.encode();
            self.dump.show(index, packet);

            tokio::select! {
                _ = stop_requested(shutdown) => return ClientExit::Shutdown,
                sent = time::timeout(self.send_timeout, self.stream.write_all(&bytes)) => match sent {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => return ClientExit::SendFailed(e),
                    Err(_) => return ClientExit::SendTimedOut,
                },
            }
        }
    }
}
