//! `NETLINK_ROUTE` socket transport.
//!
//! Sending is a single non-blocking `sendto`; receiving waits on the tokio
//! reactor and parses every reply in the datagram.

use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

use thiserror::Error;
use tokio::io::unix::AsyncFd;
use tracing::{debug, trace};

use crate::builder::Request;
use crate::reply::{parse_replies, Reply, ReplyError};

const RECV_BUFFER: usize = 32 * 1024;

/// Errors from the socket transport.
#[derive(Debug, Error)]
pub enum SocketError {
    #[error("netlink socket error: {0}")]
    Io(#[from] io::Error),

    #[error("short send: {sent} of {len} bytes")]
    ShortSend { sent: usize, len: usize },

    #[error("malformed reply: {0}")]
    Reply(#[from] ReplyError),
}

/// A bound rtnetlink socket.
#[derive(Debug)]
pub struct RtnlSocket {
    fd: AsyncFd<OwnedFd>,
}

impl RtnlSocket {
    /// Open and bind a socket. Must be called inside a tokio runtime.
    pub fn open() -> Result<Self, SocketError> {
        let raw = unsafe {
            libc::socket(
                libc::AF_NETLINK,
                libc::SOCK_RAW | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
                libc::NETLINK_ROUTE,
            )
        };
        if raw < 0 {
            return Err(io::Error::last_os_error().into());
        }
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        let addr = kernel_addr();
        let rc = unsafe {
            libc::bind(
                fd.as_raw_fd(),
                (&addr as *const libc::sockaddr_nl).cast(),
                mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error().into());
        }

        debug!(fd = fd.as_raw_fd(), "Opened rtnetlink socket");

        Ok(Self {
            fd: AsyncFd::new(fd)?,
        })
    }

    /// Send one request to the kernel.
    pub fn send(&self, request: &Request) -> Result<(), SocketError> {
        let bytes = request.as_bytes();
        let addr = kernel_addr();
        let sent = unsafe {
            libc::sendto(
                self.fd.as_raw_fd(),
                bytes.as_ptr().cast(),
                bytes.len(),
                0,
                (&addr as *const libc::sockaddr_nl).cast(),
                mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t,
            )
        };
        if sent < 0 {
            return Err(io::Error::last_os_error().into());
        }
        if sent as usize != bytes.len() {
            return Err(SocketError::ShortSend {
                sent: sent as usize,
                len: bytes.len(),
            });
        }

        trace!(seq = request.sequence(), len = bytes.len(), "Sent request");
        Ok(())
    }

    /// Wait for the next datagram and return the replies it carries.
    pub async fn recv(&self) -> Result<Vec<Reply>, SocketError> {
        let mut buf = vec![0u8; RECV_BUFFER];

        loop {
            let mut guard = self.fd.readable().await?;
            let result = guard.try_io(|inner| {
                let n = unsafe {
                    libc::recv(inner.as_raw_fd(), buf.as_mut_ptr().cast(), buf.len(), 0)
                };
                if n < 0 {
                    Err(io::Error::last_os_error())
                } else {
                    Ok(n as usize)
                }
            });

            match result {
                Ok(Ok(n)) => return Ok(parse_replies(&buf[..n])?),
                Ok(Err(e)) if e.kind() == io::ErrorKind::Interrupted => continue,
                Ok(Err(e)) => return Err(e.into()),
                Err(_would_block) => continue,
            }
        }
    }
}

fn kernel_addr() -> libc::sockaddr_nl {
    let mut addr: libc::sockaddr_nl = unsafe { mem::zeroed() };
    addr.nl_family = libc::AF_NETLINK as libc::sa_family_t;
    addr
}
