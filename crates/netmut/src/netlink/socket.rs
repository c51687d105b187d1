//! Blocking netlink socket and the transport seam used by sessions.

use std::fs::File;
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

use bytes::BytesMut;
use netlink_sys::{Socket, SocketAddr, protocols};

use super::batch;
use super::error::{Error, Result};

/// Netlink protocol families spoken by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// Routing: links and addresses.
    Route,
    /// Netfilter: nftables tables, chains and rules.
    Netfilter,
}

impl Protocol {
    fn as_isize(self) -> isize {
        match self {
            Protocol::Route => protocols::NETLINK_ROUTE,
            Protocol::Netfilter => protocols::NETLINK_NETFILTER,
        }
    }
}

/// A bound kernel socket able to exchange whole datagrams.
///
/// Dropping the transport closes it.
pub trait Transport {
    /// Port id the kernel assigned at bind time.
    fn pid(&self) -> u32;

    /// Send one datagram.
    fn send(&mut self, msg: &[u8]) -> Result<()>;

    /// Block until one datagram arrives.
    fn recv(&mut self) -> Result<Vec<u8>>;
}

/// Opens transports. Every lifecycle operation asks its backend for a
/// fresh transport and drops it before returning.
pub trait Backend {
    type Transport: Transport;

    /// Open and bind a transport for `protocol`.
    fn open(&self, protocol: Protocol) -> Result<Self::Transport>;

    /// Whether the kernel accepts nfnetlink batches.
    fn batching_supported(&self) -> Result<bool> {
        batch::probe_batching(self)
    }
}

/// Blocking netlink socket.
pub struct NetlinkSocket {
    socket: Socket,
    pid: u32,
    protocol: Protocol,
}

/// Receive buffer size for a single datagram.
const RECV_BUF_SIZE: usize = 32768;

impl NetlinkSocket {
    /// Create a new netlink socket for the given protocol.
    pub fn new(protocol: Protocol) -> Result<Self> {
        let mut socket = Socket::new(protocol.as_isize()).map_err(Error::SocketUnavailable)?;

        let mut addr = SocketAddr::new(0, 0);
        socket.bind(&addr).map_err(Error::BindFailed)?;
        socket.get_address(&mut addr).map_err(Error::BindFailed)?;
        let pid = addr.port_number();

        // Extended ACK is best effort; older kernels reject the option.
        socket.set_ext_ack(true).ok();

        tracing::trace!(?protocol, pid, "opened netlink socket");

        Ok(Self {
            socket,
            pid,
            protocol,
        })
    }

    /// Create a socket that operates in the network namespace open at `ns_fd`.
    ///
    /// The calling thread is switched into the namespace for the duration of
    /// the socket creation and switched back afterwards.
    pub fn new_in_namespace(protocol: Protocol, ns_fd: RawFd) -> Result<Self> {
        let current_ns = File::open("/proc/self/ns/net").map_err(Error::SocketUnavailable)?;

        // SAFETY: setns only reads the fd; ns_fd refers to an open namespace file.
        let ret = unsafe { libc::setns(ns_fd, libc::CLONE_NEWNET) };
        if ret < 0 {
            return Err(Error::SocketUnavailable(io::Error::last_os_error()));
        }

        let result = Self::new(protocol);

        // SAFETY: current_ns was opened from /proc/self/ns/net above.
        let restore_ret = unsafe { libc::setns(current_ns.as_raw_fd(), libc::CLONE_NEWNET) };
        if restore_ret < 0 {
            tracing::warn!(
                error = %io::Error::last_os_error(),
                "failed to restore original network namespace"
            );
        }

        result
    }

    /// Create a socket in the namespace at `ns_path`
    /// (e.g. `/var/run/netns/lab` or `/proc/1234/ns/net`).
    pub fn new_in_namespace_path<P: AsRef<Path>>(protocol: Protocol, ns_path: P) -> Result<Self> {
        let ns_file = File::open(ns_path.as_ref()).map_err(Error::SocketUnavailable)?;
        Self::new_in_namespace(protocol, ns_file.as_raw_fd())
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }
}

impl Transport for NetlinkSocket {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn send(&mut self, msg: &[u8]) -> Result<()> {
        let sent = self.socket.send(msg, 0).map_err(Error::SendFailed)?;
        if sent != msg.len() {
            return Err(Error::SendFailed(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short netlink send: {} of {} bytes", sent, msg.len()),
            )));
        }
        Ok(())
    }

    fn recv(&mut self) -> Result<Vec<u8>> {
        let mut buf = BytesMut::with_capacity(RECV_BUF_SIZE);
        self.socket.recv(&mut buf, 0).map_err(Error::ReceiveFailed)?;
        Ok(buf.to_vec())
    }
}

impl AsRawFd for NetlinkSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }
}

/// Backend that talks to the running kernel.
#[derive(Debug, Clone, Default)]
pub struct SystemBackend {
    namespace: Option<PathBuf>,
}

impl SystemBackend {
    /// Backend for the caller's network namespace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend whose sockets are opened inside the namespace at `path`.
    pub fn in_namespace(path: impl Into<PathBuf>) -> Self {
        Self {
            namespace: Some(path.into()),
        }
    }

    pub fn namespace(&self) -> Option<&Path> {
        self.namespace.as_deref()
    }
}

impl Backend for SystemBackend {
    type Transport = NetlinkSocket;

    fn open(&self, protocol: Protocol) -> Result<NetlinkSocket> {
        match &self.namespace {
            Some(path) => NetlinkSocket::new_in_namespace_path(protocol, path),
            None => NetlinkSocket::new(protocol),
        }
    }
}
