/// Socket pair for the broadcast channel.
///
/// Every participant owns two UDP sockets: one broadcast-enabled sender
/// and one bound, non-blocking receiver. Which of `base_port` and
/// `base_port + 1` plays which role is decided by a bind probe: the first
/// instance on a host claims `base_port + 1` for receiving and sends to
/// `base_port`; a later instance finds that port taken, binds `base_port`
/// and swaps, so two instances on one machine talk to each other.
///
/// There is no recovery path when the sockets cannot be set up — a chat
/// transport without network I/O is useless, so `open` hands the error to
/// the caller, which is expected to exit.
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::thread;
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};

use crate::config::Config;
use crate::error::Result;

#[cfg(unix)]
pub type RawHandle = std::os::unix::io::RawFd;
#[cfg(windows)]
pub type RawHandle = std::os::windows::io::RawSocket;

pub struct Transport {
    send_socket: UdpSocket,
    recv_socket: UdpSocket,
    broadcast_dest: SocketAddr,
    pacing_delay: Duration,
}

impl Transport {
    /// Acquire the socket pair and resolve port roles.
    pub fn open(config: &Config) -> Result<Transport> {
        let secondary = config.base_port.checked_add(1).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "base port too large for a port pair",
            )
        })?;

        // Probe the primary receive port; AddrInUse means another instance
        // got there first and we take the swapped role.
        let (recv_socket, recv_port) = match bind_receive(secondary, config.socket_buffer_size) {
            Ok(socket) => (socket, secondary),
            Err(ref e) if e.kind() == io::ErrorKind::AddrInUse => (
                bind_receive(config.base_port, config.socket_buffer_size)?,
                config.base_port,
            ),
            Err(e) => return Err(e.into()),
        };
        recv_socket.set_nonblocking(true)?;

        let send_port = if recv_port == secondary {
            config.base_port
        } else {
            secondary
        };

        let send_socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        send_socket.set_broadcast(true)?;
        let send_socket: UdpSocket = send_socket.into();

        let broadcast_dest = SocketAddr::from((config.broadcast_addr, send_port));
        log::info!(
            "transport open: sending to {}, receiving on port {}",
            broadcast_dest,
            recv_port
        );

        Ok(Transport {
            send_socket,
            recv_socket,
            broadcast_dest,
            pacing_delay: config.pacing_delay,
        })
    }

    /// Broadcast one datagram. If the socket accepts only part of the
    /// payload, sleep the pacing delay and retry with the remainder; a
    /// hard transmit error is logged and absorbed, matching UDP's
    /// unreliable-delivery contract.
    pub fn send_datagram(&self, data: &[u8]) {
        let mut rest = data;
        while !rest.is_empty() {
            match self.send_socket.send_to(rest, self.broadcast_dest) {
                Ok(sent) => {
                    rest = &rest[sent.min(rest.len())..];
                    if !rest.is_empty() {
                        thread::sleep(self.pacing_delay);
                    }
                }
                Err(e) => {
                    log::warn!("dropping datagram after transmit error: {}", e);
                    return;
                }
            }
        }
    }

    /// Non-blocking receive. Returns the datagram length and sender, or
    /// `None` when nothing is waiting. Never blocks the caller.
    pub fn recv_datagram(&self, buf: &mut [u8]) -> Option<(usize, SocketAddr)> {
        match self.recv_socket.recv_from(buf) {
            Ok((len, from)) => Some((len, from)),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => None,
            Err(e) => {
                log::debug!("receive error ignored: {}", e);
                None
            }
        }
    }

    /// Port all outbound frames are addressed to.
    pub fn send_port(&self) -> u16 {
        self.broadcast_dest.port()
    }

    /// Port the receive socket is bound on.
    pub fn recv_port(&self) -> u16 {
        self.recv_socket
            .local_addr()
            .map(|a| a.port())
            .unwrap_or(0)
    }
}

fn bind_receive(port: u16, buffer_size: usize) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    // No SO_REUSEADDR here: the port probe relies on AddrInUse.
    let _ = socket.set_recv_buffer_size(buffer_size);
    socket.bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port).into())?;
    Ok(socket.into())
}

/// Switch an arbitrary raw handle (e.g. stdin) to non-blocking mode.
pub fn set_handle_nonblocking(handle: RawHandle) -> io::Result<()> {
    set_handle_mode(handle, true)
}

/// Switch an arbitrary raw handle back to blocking mode.
pub fn set_handle_blocking(handle: RawHandle) -> io::Result<()> {
    set_handle_mode(handle, false)
}

fn set_handle_mode(handle: RawHandle, nonblocking: bool) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::io::FromRawFd;
        let socket = unsafe { Socket::from_raw_fd(handle) };
        let result = socket.set_nonblocking(nonblocking);
        std::mem::forget(socket);
        result
    }
    #[cfg(windows)]
    {
        use std::os::windows::io::FromRawSocket;
        let socket = unsafe { Socket::from_raw_socket(handle) };
        let result = socket.set_nonblocking(nonblocking);
        std::mem::forget(socket);
        result
    }
}
