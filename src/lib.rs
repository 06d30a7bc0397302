/// lanchat — subnet-broadcast chat with push/pull file transfer.
///
/// Every participant broadcasts UDP datagrams on a fixed port pair and
/// hears whatever anyone sends: no discovery, no addressing, no delivery
/// guarantee beyond what UDP on the local subnet provides. On top of the
/// plain-text channel sits a small file-transfer protocol — push a file to
/// everyone, or ask everyone to push a named file back.
///
/// The engine is single-threaded and poll-driven; see [`engine::Node`]
/// for the surface a front-end loop drives.
pub mod config;
pub mod engine;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod transcript;
pub mod transport;

pub use config::Config;
pub use engine::{Node, SendOutcome, TextFrame};
pub use error::{Error, Result};
pub use protocol::{TransferHeader, TransferKind, HEADER_SIZE, NAME_CAPACITY};
pub use registry::{ControlBlock, StartOutcome, TransferRegistry};
pub use transport::Transport;

/// Base UDP port; the transport uses this and the next port up.
pub const DEFAULT_PORT_BASE: u16 = 5777;

/// Default file data bytes per outbound datagram.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;
