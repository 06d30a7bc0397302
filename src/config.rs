/// Engine tunables.
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use crate::{DEFAULT_CHUNK_SIZE, DEFAULT_PORT_BASE};

#[derive(Debug, Clone)]
pub struct Config {
    /// Base UDP port; the transport uses `base_port` and `base_port + 1`.
    pub base_port: u16,

    /// Destination address for every outbound frame. The subnet broadcast
    /// address in production; tests point this at 127.0.0.1.
    pub broadcast_addr: Ipv4Addr,

    /// File data bytes per outbound datagram.
    pub chunk_size: usize,

    /// Inbound datagram buffer. The largest UDP frame we expect on
    /// Ethernet/WiFi is ~1500 bytes, so this leaves headroom.
    pub recv_buffer_size: usize,

    /// OS-level receive buffer requested for the receive socket.
    pub socket_buffer_size: usize,

    /// Holdoff between retries when the socket accepts only part of a
    /// datagram payload; bounds how fast a sender can flood the interface.
    pub pacing_delay: Duration,

    /// Consecutive failed output-file writes tolerated before an inbound
    /// chunk is abandoned.
    pub write_retry_limit: u32,

    /// Delay between output-file write retries.
    pub write_retry_delay: Duration,

    /// Numeric suffixes tried (after the literal name) before a colliding
    /// inbound file name drops the transfer.
    pub name_retry_limit: u32,

    /// Inactivity after which an inbound transfer is swept away.
    pub transfer_timeout: Duration,

    /// Directory where inbound files are created.
    pub output_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            base_port: DEFAULT_PORT_BASE,
            broadcast_addr: Ipv4Addr::BROADCAST,
            chunk_size: DEFAULT_CHUNK_SIZE,
            recv_buffer_size: 2 * 1024,
            socket_buffer_size: 256 * 1024,
            pacing_delay: Duration::from_millis(10),
            write_retry_limit: 20,
            write_retry_delay: Duration::from_secs(1),
            name_retry_limit: 20,
            transfer_timeout: Duration::from_secs(10),
            output_dir: PathBuf::from("."),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }
}
