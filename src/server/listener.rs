//! The UDP receive loop.

use super::lifecycle::{ServiceState, Stage};
use super::ServerError;
use crate::backend::SharedBackend;
use crate::config::ServerConfig;
use crate::proto::parse_payload;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Consecutive receive failures before escalating from warn to error.
const RECV_ERROR_ESCALATION: u32 = 8;

/// Receive-loop counters, updated with relaxed atomics.
#[derive(Debug, Default)]
pub struct ListenerStats {
    packets: AtomicU64,
    events: AtomicU64,
    parse_errors: AtomicU64,
    recv_errors: AtomicU64,
}

impl ListenerStats {
    /// Datagrams received.
    pub fn packets(&self) -> u64 {
        self.packets.load(Ordering::Relaxed)
    }

    /// Events decoded and handed to the backend.
    pub fn events(&self) -> u64 {
        self.events.load(Ordering::Relaxed)
    }

    /// Lines that failed the wire grammar.
    pub fn parse_errors(&self) -> u64 {
        self.parse_errors.load(Ordering::Relaxed)
    }

    /// Socket receive failures.
    pub fn recv_errors(&self) -> u64 {
        self.recv_errors.load(Ordering::Relaxed)
    }
}

/// The UDP ingestion service.
///
/// Owns the socket and a single receive task. Datagrams are decoded with
/// [`parse_payload`] and every valid event is dispatched to the backend;
/// bad lines are logged and counted without disturbing the rest of the
/// batch.
pub struct UdpServer {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    backend: SharedBackend,
    state: Arc<ServiceState>,
    stats: Arc<ListenerStats>,
    recv_buffer_bytes: usize,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl UdpServer {
    /// Binds the socket. A bind failure is fatal; everything after it is
    /// handled inside the receive loop.
    pub async fn bind(config: &ServerConfig, backend: SharedBackend) -> Result<UdpServer, ServerError> {
        let addr = config.socket_addr()?;
        let socket = UdpSocket::bind(addr).await.map_err(ServerError::Bind)?;
        let local_addr = socket.local_addr().map_err(ServerError::Bind)?;
        Ok(UdpServer {
            socket: Arc::new(socket),
            local_addr,
            backend,
            state: Arc::new(ServiceState::new()),
            stats: Arc::new(ListenerStats::default()),
            recv_buffer_bytes: config.recv_buffer_bytes,
            task: Mutex::new(None),
        })
    }

    /// The address actually bound, with the real port when 0 was asked for.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stage(&self) -> Stage {
        self.state.stage()
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    pub fn stats(&self) -> &ListenerStats {
        &self.stats
    }

    /// Spawns the receive loop. Valid exactly once, on a freshly bound
    /// server.
    pub fn start(&self) -> Result<(), ServerError> {
        self.state.begin_running().map_err(ServerError::AlreadyStarted)?;
        info!("statsd listener started on {}", self.local_addr);
        let task = tokio::spawn(receive_loop(
            self.socket.clone(),
            self.backend.clone(),
            self.state.clone(),
            self.stats.clone(),
            self.recv_buffer_bytes,
        ));
        *self.task.lock() = Some(task);
        Ok(())
    }

    /// Requests a stop and waits for the receive loop to exit. Idempotent,
    /// and callable on a server that was never started.
    pub async fn stop(&self) {
        if let Some(Stage::Created) = self.state.request_stop() {
            self.state.mark_stopped();
            return;
        }
        let task = self.task.lock().take();
        if let Some(task) = task {
            debug!("waiting for receive loop to drain");
            if task.await.is_err() {
                // A dead loop never reached its own mark_stopped.
                error!("receive loop task panicked");
                self.state.mark_stopped();
            }
        }
    }
}

async fn receive_loop(
    socket: Arc<UdpSocket>,
    backend: SharedBackend,
    state: Arc<ServiceState>,
    stats: Arc<ListenerStats>,
    recv_buffer_bytes: usize,
) {
    let mut buf = vec![0u8; recv_buffer_bytes];
    let mut consecutive_recv_errors = 0u32;

    loop {
        tokio::select! {
            _ = state.cancelled() => break,
            received = socket.recv_from(&mut buf) => match received {
                Ok((len, _peer)) => {
                    consecutive_recv_errors = 0;
                    stats.packets.fetch_add(1, Ordering::Relaxed);
                    for parsed in parse_payload(&buf[..len]) {
                        match parsed {
                            Ok(event) => {
                                backend.dispatch(&event);
                                stats.events.fetch_add(1, Ordering::Relaxed);
                            }
                            Err(err) => {
                                stats.parse_errors.fetch_add(1, Ordering::Relaxed);
                                warn!("{}", err);
                            }
                        }
                    }
                }
                Err(e) => {
                    // During shutdown a failing socket is expected, not news.
                    if state.stage() != Stage::Running {
                        break;
                    }
                    stats.recv_errors.fetch_add(1, Ordering::Relaxed);
                    consecutive_recv_errors += 1;
                    if consecutive_recv_errors >= RECV_ERROR_ESCALATION {
                        error!(
                            "Error receiving packet ({} in a row): {}",
                            consecutive_recv_errors, e
                        );
                    } else {
                        warn!("Error receiving packet: {}", e);
                    }
                }
            }
        }
    }

    state.mark_stopped();
    info!(
        packets = stats.packets(),
        events = stats.events(),
        parse_errors = stats.parse_errors(),
        recv_errors = stats.recv_errors(),
        "statsd listener stopped"
    );
}
