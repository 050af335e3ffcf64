//! Kernel transport interface and implementations.
//!
//! Submitting a request never waits for the kernel. Replies arrive on the
//! daemon's reply channel and are correlated by sequence number.
//!
//! - [`RtnlKernel`]: a real `NETLINK_ROUTE` socket (Linux only)
//! - [`DryRunKernel`]: acknowledges every request in-process
//! - [`MockKernel`]: records requests for tests, which deliver replies by hand

use std::sync::{Arc, Mutex, PoisonError};

use netdevd_rtnl::consts::IFLA_IFNAME;
use netdevd_rtnl::{Reply, Request};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::info;

#[cfg(target_os = "linux")]
use netdevd_rtnl::{RtnlSocket, SocketError};

/// Errors from submitting a request.
#[derive(Debug, Error)]
pub enum TransportError {
    #[cfg(target_os = "linux")]
    #[error(transparent)]
    Socket(#[from] SocketError),

    #[error("reply channel closed")]
    Closed,

    #[error("send refused: {0}")]
    Refused(String),
}

/// Where create requests go.
pub trait KernelTransport: Send + Sync {
    /// Hand one request to the kernel. Returns once it has been sent.
    fn submit(&self, request: &Request) -> Result<(), TransportError>;
}

fn request_name(request: &Request) -> &str {
    request
        .attribute(IFLA_IFNAME)
        .and_then(|attr| attr.as_str())
        .unwrap_or("?")
}

// ============================================================================
// Real kernel
// ============================================================================

/// Transport backed by an rtnetlink socket.
///
/// A background task reads datagrams and forwards each reply.
#[cfg(target_os = "linux")]
#[derive(Debug)]
pub struct RtnlKernel {
    socket: Arc<RtnlSocket>,
    receiver: tokio::task::JoinHandle<()>,
}

#[cfg(target_os = "linux")]
impl RtnlKernel {
    /// Open the socket and start forwarding replies. Requires a tokio runtime.
    pub fn open(replies: mpsc::UnboundedSender<Reply>) -> Result<Self, TransportError> {
        let socket = Arc::new(RtnlSocket::open()?);
        let receiver = tokio::spawn(receive_loop(Arc::clone(&socket), replies));
        Ok(Self { socket, receiver })
    }
}

#[cfg(target_os = "linux")]
impl KernelTransport for RtnlKernel {
    fn submit(&self, request: &Request) -> Result<(), TransportError> {
        self.socket.send(request)?;
        Ok(())
    }
}

#[cfg(target_os = "linux")]
impl Drop for RtnlKernel {
    fn drop(&mut self) {
        self.receiver.abort();
    }
}

#[cfg(target_os = "linux")]
async fn receive_loop(socket: Arc<RtnlSocket>, replies: mpsc::UnboundedSender<Reply>) {
    use tracing::{error, warn};

    loop {
        match socket.recv().await {
            Ok(batch) => {
                for reply in batch {
                    if replies.send(reply).is_err() {
                        return;
                    }
                }
            }
            Err(SocketError::Reply(e)) => {
                warn!(error = %e, "Dropping malformed netlink datagram");
            }
            Err(e) => {
                error!(error = %e, "Netlink receive failed");
                return;
            }
        }
    }
}

// ============================================================================
// Dry run
// ============================================================================

/// Acknowledges every request without touching the host.
#[derive(Debug, Clone)]
pub struct DryRunKernel {
    replies: mpsc::UnboundedSender<Reply>,
}

impl DryRunKernel {
    pub fn new(replies: mpsc::UnboundedSender<Reply>) -> Self {
        Self { replies }
    }
}

impl KernelTransport for DryRunKernel {
    fn submit(&self, request: &Request) -> Result<(), TransportError> {
        info!(
            device = request_name(request),
            seq = request.sequence(),
            len = request.len(),
            "Dry run: acknowledging create request"
        );
        self.replies
            .send(Reply::ack(request.sequence()))
            .map_err(|_| TransportError::Closed)
    }
}

// ============================================================================
// Mock
// ============================================================================

#[derive(Debug, Default)]
struct MockState {
    requests: Vec<Request>,
    refuse: bool,
}

/// Records submitted requests. Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct MockKernel {
    state: Arc<Mutex<MockState>>,
}

impl MockKernel {
    pub fn new() -> Self {
        Self::default()
    }

    /// A kernel whose every send fails.
    pub fn refusing() -> Self {
        let kernel = Self::new();
        kernel.set_refuse(true);
        kernel
    }

    pub fn set_refuse(&self, refuse: bool) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .refuse = refuse;
    }

    /// Every request accepted so far, in submission order.
    pub fn requests(&self) -> Vec<Request> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .requests
            .clone()
    }

    /// Sequence number of the accepted request for `name`, if any.
    pub fn sequence_of(&self, name: &str) -> Option<u32> {
        self.requests()
            .iter()
            .rev()
            .find(|r| request_name(r) == name)
            .map(Request::sequence)
    }
}

impl KernelTransport for MockKernel {
    fn submit(&self, request: &Request) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.refuse {
            return Err(TransportError::Refused(request_name(request).to_string()));
        }
        state.requests.push(request.clone());
        Ok(())
    }
}
