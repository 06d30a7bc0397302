/// Per-peer inbound transfer state.
///
/// Each remote peer (keyed by its address string) owns at most one
/// control block at a time: an open output file, the byte count still
/// expected, and the timestamp of the last accepted chunk. Blocks are
/// created by a `Send` header, fed by raw chunk datagrams, and destroyed
/// on completion, on a duplicate start (latest start wins), or by the
/// timeout sweep.
use std::collections::HashMap;
use std::ffi::OsStr;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use crate::config::Config;

pub struct ControlBlock {
    remaining: u64,
    file: File,
    path: PathBuf,
    last_activity: Instant,
}

impl ControlBlock {
    /// Bytes still expected before the transfer completes.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Where the inbound file is being written.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// What came of a `Send` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// A control block was created; the file lands at this path.
    Started(PathBuf),
    /// The header announced zero bytes; nothing to do.
    Ignored,
    /// No collision-free output name (or the file could not be created);
    /// the transfer is silently dropped and its data falls through to the
    /// caller as unrecognized frames.
    Dropped,
}

pub struct TransferRegistry {
    blocks: HashMap<String, ControlBlock>,
    output_dir: PathBuf,
    name_retry_limit: u32,
    write_retry_limit: u32,
    write_retry_delay: Duration,
}

impl TransferRegistry {
    pub fn new(config: &Config) -> TransferRegistry {
        TransferRegistry {
            blocks: HashMap::new(),
            output_dir: config.output_dir.clone(),
            name_retry_limit: config.name_retry_limit,
            write_retry_limit: config.write_retry_limit,
            write_retry_delay: config.write_retry_delay,
        }
    }

    pub fn find(&self, peer: &str) -> Option<&ControlBlock> {
        self.blocks.get(peer)
    }

    pub fn active_count(&self) -> usize {
        self.blocks.len()
    }

    /// Open an inbound transfer for `peer`. An unfinished transfer from
    /// the same peer is aborted first; UDP loses frames, and a fresh
    /// header usually means the sender is retrying.
    pub fn start_receiving(
        &mut self,
        peer: &str,
        file_name: &str,
        file_size: u32,
        now: Instant,
    ) -> StartOutcome {
        if let Some(old) = self.blocks.remove(peer) {
            log::warn!(
                "aborted previous transfer from {} into {} ({} bytes short)",
                peer,
                old.path.display(),
                old.remaining
            );
        }

        if file_size == 0 {
            return StartOutcome::Ignored;
        }

        // Only the name component; a peer does not get to pick our paths.
        let base = match Path::new(file_name).file_name() {
            Some(name) if !name.is_empty() => name,
            _ => {
                log::warn!(
                    "dropping transfer from {} with unusable file name {:?}",
                    peer,
                    file_name
                );
                return StartOutcome::Dropped;
            }
        };

        let (file, path) = match self.create_output(base) {
            Some(created) => created,
            None => {
                log::warn!(
                    "no collision-free name for {:?}; dropping transfer from {}",
                    base,
                    peer
                );
                return StartOutcome::Dropped;
            }
        };

        log::info!(
            "inbound file {} ({} bytes) from {}",
            path.display(),
            file_size,
            peer
        );
        self.blocks.insert(
            peer.to_string(),
            ControlBlock {
                remaining: u64::from(file_size),
                file,
                path: path.clone(),
                last_activity: now,
            },
        );
        StartOutcome::Started(path)
    }

    /// Try the literal name, then `name1`, `name2`, ... up to the retry
    /// limit. `create_new` makes the existence check and the create one
    /// atomic step.
    fn create_output(&self, base: &OsStr) -> Option<(File, PathBuf)> {
        for attempt in 0..=self.name_retry_limit {
            let mut name = base.to_os_string();
            if attempt > 0 {
                name.push(attempt.to_string());
            }
            let path = self.output_dir.join(&name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Some((file, path)),
                Err(ref e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    log::warn!("cannot create {}: {}", path.display(), e);
                    return None;
                }
            }
        }
        None
    }

    /// Append a chunk to the peer's open transfer. Returns false when no
    /// block is open for `peer` — the datagram was not transfer data.
    ///
    /// Writes are retried on zero-byte progress (slow or full file
    /// system) up to the configured bound; on exhaustion the partial file
    /// stays in place and the counter still advances, so a dead disk
    /// cannot wedge the transfer state machine.
    pub fn append_chunk(&mut self, peer: &str, bytes: &[u8], now: Instant) -> bool {
        let retry_limit = self.write_retry_limit;
        let retry_delay = self.write_retry_delay;

        let block = match self.blocks.get_mut(peer) {
            Some(block) => block,
            None => return false,
        };

        // Accept only up to the bytes still expected.
        let take = bytes.len().min(usize::try_from(block.remaining).unwrap_or(usize::MAX));
        let mut rest = &bytes[..take];
        let mut failed_tries = 0u32;
        while !rest.is_empty() && failed_tries < retry_limit {
            match block.file.write(rest) {
                Ok(0) => {
                    failed_tries += 1;
                    thread::sleep(retry_delay);
                }
                Ok(written) => {
                    rest = &rest[written..];
                    failed_tries = 0;
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    log::warn!("write to {} failed: {}", block.path.display(), e);
                    failed_tries += 1;
                    thread::sleep(retry_delay);
                }
            }
        }
        if !rest.is_empty() {
            // Callers must not assume the file is whole; nothing records
            // the corruption beyond this line.
            log::warn!(
                "gave up writing to {} with {} bytes unwritten",
                block.path.display(),
                rest.len()
            );
        }

        block.remaining = block.remaining.saturating_sub(take as u64);
        block.last_activity = now;

        if block.remaining == 0 {
            if let Some(done) = self.blocks.remove(peer) {
                log::info!("completed inbound file {} from {}", done.path.display(), peer);
            }
        }
        true
    }

    /// Remove every transfer idle for `threshold` or longer, closing its
    /// output. Returns the number of transfers timed out. Calling this is
    /// optional; a process that never transfers files can skip it.
    pub fn sweep_timeouts(&mut self, now: Instant, threshold: Duration) -> usize {
        let expired: Vec<String> = self
            .blocks
            .iter()
            .filter(|(_, block)| now.duration_since(block.last_activity) >= threshold)
            .map(|(peer, _)| peer.clone())
            .collect();
        for peer in &expired {
            if let Some(block) = self.blocks.remove(peer) {
                log::warn!(
                    "inbound transfer from {} timed out; {} left {} bytes short",
                    peer,
                    block.path.display(),
                    block.remaining
                );
            }
        }
        expired.len()
    }
}
