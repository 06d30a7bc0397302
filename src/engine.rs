/// The transfer engine: chunked file send, get requests, and inbound
/// dispatch on top of the transport, codec, and registry.
///
/// Everything here runs on the caller's single polling thread. The owning
/// loop is expected to alternate: `poll_once`, handle any text, feed local
/// input in, `sweep_timeouts`, sleep briefly, repeat. Nothing blocks
/// indefinitely; the only pauses are the transport's pacing delay and the
/// registry's bounded write retries.
use std::fs::File;
use std::io::{self, Read};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Instant;

use crate::config::Config;
use crate::error::Result;
use crate::protocol::{self, TransferHeader, TransferKind, HEADER_SIZE};
use crate::registry::TransferRegistry;
use crate::transport::Transport;

/// A plain chat frame handed back to the caller, trailing NULs stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextFrame {
    pub bytes: Vec<u8>,
    pub from: SocketAddr,
}

/// Result of an outbound file send. There is no acknowledgment in this
/// protocol; `Sent` means the bytes were handed to the interface, not
/// that anyone received them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent { bytes: u64, chunks: u64 },
    /// The path did not stat or open. Logged unless the send was a reply
    /// to a remote get request, where nobody is listening for the error.
    NotFound,
    /// The file size does not fit the header's 32-bit size field.
    TooLarge,
}

pub struct Node {
    transport: Transport,
    registry: TransferRegistry,
    config: Config,
    recv_buf: Vec<u8>,
}

impl Node {
    pub fn open(config: Config) -> Result<Node> {
        let transport = Transport::open(&config)?;
        let registry = TransferRegistry::new(&config);
        let recv_buf = vec![0u8; config.recv_buffer_size];
        Ok(Node {
            transport,
            registry,
            config,
            recv_buf,
        })
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn registry(&self) -> &TransferRegistry {
        &self.registry
    }

    /// Broadcast chat text. Text frames carry a trailing NUL on the wire.
    pub fn send_text(&mut self, text: &[u8]) {
        let mut frame = Vec::with_capacity(text.len() + 1);
        frame.extend_from_slice(text);
        frame.push(0);
        self.transport.send_datagram(&frame);
    }

    /// Broadcast a file: one `Send` header, then the contents in
    /// `chunk_size` pieces. `reply_to_get` marks a send triggered by a
    /// remote get request, which mutes the not-found report.
    pub fn send_file(&mut self, path: &str, reply_to_get: bool) -> SendOutcome {
        let path = trim_request(path);

        let metadata = match std::fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(_) => return self.report_not_found(path, reply_to_get),
        };
        if metadata.len() > u64::from(u32::MAX) {
            log::error!(
                "file [{}] is {} bytes, too large for the transfer header",
                path,
                metadata.len()
            );
            return SendOutcome::TooLarge;
        }

        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(_) => return self.report_not_found(path, reply_to_get),
        };
        let file_size = metadata.len() as u32;

        let file_name = Path::new(path)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string());

        let header = TransferHeader {
            file_name: file_name.clone(),
            file_size,
            kind: TransferKind::Send,
        };
        self.transport.send_datagram(&header.encode());
        log::info!("sending {} ({} bytes)", file_name, file_size);

        let mut chunk = vec![0u8; self.config.chunk_size];
        let mut bytes = 0u64;
        let mut chunks = 0u64;
        loop {
            match file.read(&mut chunk) {
                Ok(0) => break,
                Ok(read) => {
                    self.transport.send_datagram(&chunk[..read]);
                    bytes += read as u64;
                    chunks += 1;
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    // Receivers will time the truncated transfer out.
                    log::warn!("read of {} failed mid-transfer: {}", path, e);
                    break;
                }
            }
        }
        SendOutcome::Sent { bytes, chunks }
    }

    fn report_not_found(&self, path: &str, reply_to_get: bool) -> SendOutcome {
        if reply_to_get {
            log::debug!("ignoring get request for [{}]; not held here", path);
        } else {
            log::error!("file [{}] was not found", path);
        }
        SendOutcome::NotFound
    }

    /// Ask every listening peer to push the named file back. Whoever
    /// holds it answers with an ordinary `Send` transfer.
    pub fn get_file(&mut self, path: &str) {
        let path = trim_request(path);
        let header = TransferHeader {
            file_name: path.to_string(),
            file_size: 0,
            kind: TransferKind::GetRequest,
        };
        self.transport.send_datagram(&header.encode());
        log::info!("file [{}] was requested", path);
    }

    /// Handle at most one inbound datagram. Transfer traffic is consumed
    /// internally; anything else comes back as chat text for the caller.
    pub fn poll_once(&mut self) -> Option<TextFrame> {
        let (len, from) = self.transport.recv_datagram(&mut self.recv_buf)?;
        if len == 0 {
            // Zero-byte datagrams carry nothing: not a chunk, not text.
            return None;
        }
        let data = self.recv_buf[..len].to_vec();
        let peer = from.ip().to_string();

        if protocol::is_transfer_header(&data) {
            match TransferHeader::parse(&data) {
                Ok(header) => self.dispatch_header(&header, &data, &peer),
                Err(e) => log::warn!("discarding transfer header from {}: {}", peer, e),
            }
            // Tagged frames are never chat text, even when unusable.
            return None;
        }

        if self.registry.append_chunk(&peer, &data, Instant::now()) {
            return None;
        }

        let mut bytes = data;
        while bytes.last() == Some(&0) {
            bytes.pop();
        }
        Some(TextFrame { bytes, from })
    }

    fn dispatch_header(&mut self, header: &TransferHeader, frame: &[u8], peer: &str) {
        match header.kind {
            TransferKind::Send => {
                let now = Instant::now();
                self.registry
                    .start_receiving(peer, &header.file_name, header.file_size, now);
                // The first chunk may ride in the same datagram.
                if frame.len() > HEADER_SIZE {
                    self.registry.append_chunk(peer, &frame[HEADER_SIZE..], now);
                }
            }
            TransferKind::GetRequest => {
                self.send_file(&header.file_name, true);
            }
        }
    }

    /// Discard inbound transfers that have gone quiet. Optional; call it
    /// every few loop iterations.
    pub fn sweep_timeouts(&mut self) -> usize {
        self.registry
            .sweep_timeouts(Instant::now(), self.config.transfer_timeout)
    }
}

/// Operator input arrives with console padding: leading spaces or tabs,
/// trailing CR/LF.
fn trim_request(path: &str) -> &str {
    path.trim_start_matches([' ', '\t'])
        .trim_end_matches(['\r', '\n'])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_trimming() {
        assert_eq!(trim_request("  \tnotes.txt\r\n"), "notes.txt");
        assert_eq!(trim_request("notes.txt"), "notes.txt");
        assert_eq!(trim_request(" a b \n"), "a b ");
    }
}
