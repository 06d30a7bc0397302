/// Wire format for the broadcast channel.
///
/// Two kinds of frame share the channel:
///   - plain chat text: raw bytes, NUL-terminated, no header
///   - transfer header: fixed layout below, optionally followed in the
///     same datagram by the first chunk of file data
///
/// Any datagram whose leading bytes equal the command tag is a transfer
/// header, never chat text.
///
/// Header layout (big-endian):
///   [0..6]     Command tag ":xfer:"
///   [6..106]   File name (zero-padded, truncated at capacity)
///   [106..110] File size (u32); 0 means "no data" and receivers ignore it
///   [110]      Transfer kind (1 = Send, 2 = GetRequest)
use crate::error::{Error, Result};

/// Marker that distinguishes transfer headers from chat text.
pub const COMMAND_TAG: &[u8; 6] = b":xfer:";

/// Fixed capacity of the file-name field.
pub const NAME_CAPACITY: usize = 100;

const NAME_OFFSET: usize = COMMAND_TAG.len();
const SIZE_OFFSET: usize = NAME_OFFSET + NAME_CAPACITY;
const KIND_OFFSET: usize = SIZE_OFFSET + 4;

/// Total header size on the wire; identical on every transfer frame.
pub const HEADER_SIZE: usize = KIND_OFFSET + 1;

/// What a transfer header is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    /// Unsolicited push of a file to all peers.
    Send = 1,
    /// Request that any peer holding the named file push it back.
    GetRequest = 2,
}

impl TransferKind {
    fn from_wire(byte: u8) -> Option<TransferKind> {
        match byte {
            1 => Some(TransferKind::Send),
            2 => Some(TransferKind::GetRequest),
            _ => None,
        }
    }
}

/// A parsed transfer header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferHeader {
    pub file_name: String,
    pub file_size: u32,
    pub kind: TransferKind,
}

/// True iff the leading bytes equal the command tag.
pub fn is_transfer_header(buf: &[u8]) -> bool {
    buf.len() >= COMMAND_TAG.len() && &buf[..COMMAND_TAG.len()] == COMMAND_TAG
}

impl TransferHeader {
    /// Serialize into the fixed wire layout. File names longer than the
    /// capacity are truncated at the byte level, never overflow.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[..COMMAND_TAG.len()].copy_from_slice(COMMAND_TAG);
        let name = self.file_name.as_bytes();
        let name_len = name.len().min(NAME_CAPACITY);
        buf[NAME_OFFSET..NAME_OFFSET + name_len].copy_from_slice(&name[..name_len]);
        buf[SIZE_OFFSET..SIZE_OFFSET + 4].copy_from_slice(&self.file_size.to_be_bytes());
        buf[KIND_OFFSET] = self.kind as u8;
        buf
    }

    /// Parse a header from the front of a datagram. The caller is expected
    /// to have classified the frame with [`is_transfer_header`] first.
    pub fn parse(buf: &[u8]) -> Result<TransferHeader> {
        if buf.len() < HEADER_SIZE || !is_transfer_header(buf) {
            return Err(Error::MalformedHeader {
                len: buf.len(),
                expected: HEADER_SIZE,
            });
        }

        let name_field = &buf[NAME_OFFSET..NAME_OFFSET + NAME_CAPACITY];
        let name_len = name_field
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(NAME_CAPACITY);
        let file_name = String::from_utf8_lossy(&name_field[..name_len]).into_owned();

        let file_size = u32::from_be_bytes([
            buf[SIZE_OFFSET],
            buf[SIZE_OFFSET + 1],
            buf[SIZE_OFFSET + 2],
            buf[SIZE_OFFSET + 3],
        ]);

        let kind = TransferKind::from_wire(buf[KIND_OFFSET])
            .ok_or(Error::UnknownTransferKind(buf[KIND_OFFSET]))?;

        Ok(TransferHeader {
            file_name,
            file_size,
            kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let header = TransferHeader {
            file_name: "notes.txt".to_string(),
            file_size: 2500,
            kind: TransferKind::Send,
        };
        let wire = header.encode();
        assert_eq!(wire.len(), HEADER_SIZE);
        assert!(is_transfer_header(&wire));
        assert_eq!(TransferHeader::parse(&wire).unwrap(), header);
    }

    #[test]
    fn get_request_round_trip() {
        let header = TransferHeader {
            file_name: "/tmp/report.txt".to_string(),
            file_size: 0,
            kind: TransferKind::GetRequest,
        };
        let parsed = TransferHeader::parse(&header.encode()).unwrap();
        assert_eq!(parsed.kind, TransferKind::GetRequest);
        assert_eq!(parsed.file_size, 0);
        assert_eq!(parsed.file_name, "/tmp/report.txt");
    }

    #[test]
    fn long_name_is_truncated_not_overflowed() {
        let header = TransferHeader {
            file_name: "x".repeat(NAME_CAPACITY * 2),
            file_size: 1,
            kind: TransferKind::Send,
        };
        let wire = header.encode();
        let parsed = TransferHeader::parse(&wire).unwrap();
        assert_eq!(parsed.file_name.len(), NAME_CAPACITY);
    }

    #[test]
    fn short_buffer_is_malformed() {
        let mut wire = TransferHeader {
            file_name: "a".to_string(),
            file_size: 9,
            kind: TransferKind::Send,
        }
        .encode()
        .to_vec();
        wire.truncate(HEADER_SIZE - 1);
        match TransferHeader::parse(&wire) {
            Err(Error::MalformedHeader { len, expected }) => {
                assert_eq!(len, HEADER_SIZE - 1);
                assert_eq!(expected, HEADER_SIZE);
            }
            other => panic!("expected MalformedHeader, got {:?}", other),
        }
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let mut wire = TransferHeader {
            file_name: "a".to_string(),
            file_size: 9,
            kind: TransferKind::Send,
        }
        .encode();
        wire[HEADER_SIZE - 1] = 7;
        assert!(matches!(
            TransferHeader::parse(&wire),
            Err(Error::UnknownTransferKind(7))
        ));
    }

    #[test]
    fn chat_text_is_not_a_header() {
        assert!(!is_transfer_header(b"hello everyone"));
        assert!(!is_transfer_header(b":xf"));
        assert!(is_transfer_header(b":xfer:trailing"));
    }
}
