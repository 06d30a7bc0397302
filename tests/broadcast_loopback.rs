/// Integration tests: full nodes talking over UDP loopback.
///
/// Each test gets its own port pair so the suite can run in parallel.
/// The broadcast address is pointed at 127.0.0.1; everything else is the
/// production path. Within one base-port pair the first node opened
/// receives on `base + 1` and sends to `base`, the second swaps.
use std::fs;
use std::net::{Ipv4Addr, UdpSocket};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use lanchat::{Config, Node, SendOutcome, TransferHeader, TransferKind, HEADER_SIZE};
use tempfile::TempDir;

fn test_config(base_port: u16, output_dir: &Path) -> Config {
    Config {
        base_port,
        broadcast_addr: Ipv4Addr::LOCALHOST,
        output_dir: output_dir.to_path_buf(),
        ..Config::default()
    }
}

fn patterned(len: usize) -> Vec<u8> {
    // Prime modulus for a pattern that exposes reordering or truncation.
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn wait_for<F: FnMut() -> bool>(node: &mut Node, mut done: F) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        node.poll_once();
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

#[test]
fn wire_chunk_sequence_for_2500_byte_file() {
    let _ = env_logger::try_init();
    let dir = TempDir::new().unwrap();

    let payload = patterned(2500);
    let input = dir.path().join("input.bin");
    fs::write(&input, &payload).unwrap();

    // Stand in for the whole subnet: a raw socket on the port the first
    // node broadcasts to.
    let observer = UdpSocket::bind((Ipv4Addr::LOCALHOST, 46200)).unwrap();
    observer
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();

    let mut node = Node::open(test_config(46200, dir.path())).unwrap();
    let outcome = node.send_file(input.to_str().unwrap(), false);
    assert_eq!(
        outcome,
        SendOutcome::Sent {
            bytes: 2500,
            chunks: 3
        }
    );

    let mut buf = [0u8; 4096];

    // First frame on the wire is the header.
    let (len, _) = observer.recv_from(&mut buf).unwrap();
    assert_eq!(len, HEADER_SIZE);
    let header = TransferHeader::parse(&buf[..len]).unwrap();
    assert_eq!(header.kind, TransferKind::Send);
    assert_eq!(header.file_size, 2500);
    assert_eq!(header.file_name, "input.bin");

    // Then exactly ceil(2500 / 1024) = 3 chunks, in order.
    let mut reassembled = Vec::new();
    let mut chunk_sizes = Vec::new();
    for _ in 0..3 {
        let (len, _) = observer.recv_from(&mut buf).unwrap();
        chunk_sizes.push(len);
        reassembled.extend_from_slice(&buf[..len]);
    }
    assert_eq!(chunk_sizes, vec![1024, 1024, 452]);
    assert_eq!(reassembled, payload);
}

#[test]
fn end_to_end_send_reconstructs_file() {
    let _ = env_logger::try_init();
    let a_dir = TempDir::new().unwrap();
    let b_dir = TempDir::new().unwrap();

    let mut a = Node::open(test_config(46210, a_dir.path())).unwrap();
    let mut b = Node::open(test_config(46210, b_dir.path())).unwrap();

    let payload = patterned(2500);
    let input = a_dir.path().join("blob.bin");
    fs::write(&input, &payload).unwrap();

    let outcome = a.send_file(input.to_str().unwrap(), false);
    assert!(matches!(outcome, SendOutcome::Sent { bytes: 2500, .. }));

    let output = b_dir.path().join("blob.bin");
    let arrived = wait_for(&mut b, || {
        fs::metadata(&output).map(|m| m.len()).ok() == Some(2500)
    });
    assert!(arrived, "file never arrived at peer B");
    assert_eq!(b.registry().active_count(), 0);
    assert_eq!(fs::read(&output).unwrap(), payload);
}

#[test]
fn get_request_round_trip() {
    let _ = env_logger::try_init();
    let a_dir = TempDir::new().unwrap();
    let b_dir = TempDir::new().unwrap();

    let mut a = Node::open(test_config(46220, a_dir.path())).unwrap();
    let mut b = Node::open(test_config(46220, b_dir.path())).unwrap();

    let payload = patterned(1000);
    let held = b_dir.path().join("notes.txt");
    fs::write(&held, &payload).unwrap();

    a.get_file(held.to_str().unwrap());

    // B answers the request from inside its own poll; A reassembles.
    let output = a_dir.path().join("notes.txt");
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline && fs::metadata(&output).map(|m| m.len()).ok() != Some(1000) {
        b.poll_once();
        a.poll_once();
        thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(
        fs::metadata(&output).map(|m| m.len()).ok(),
        Some(1000),
        "requested file never arrived back"
    );
    assert_eq!(a.registry().active_count(), 0);
    assert_eq!(fs::read(&output).unwrap(), payload);
}

#[test]
fn get_for_a_file_nobody_holds_takes_no_action() {
    let _ = env_logger::try_init();
    let a_dir = TempDir::new().unwrap();
    let b_dir = TempDir::new().unwrap();

    let mut a = Node::open(test_config(46230, a_dir.path())).unwrap();
    let mut b = Node::open(test_config(46230, b_dir.path())).unwrap();

    a.get_file("never-created.bin");

    // Give B time to see the request and A time to hear any answer.
    let deadline = Instant::now() + Duration::from_millis(300);
    while Instant::now() < deadline {
        b.poll_once();
        assert!(a.poll_once().is_none());
        thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(a.registry().active_count(), 0);
    assert!(!a_dir.path().join("never-created.bin").exists());
}

#[test]
fn empty_file_send_creates_nothing_remotely() {
    let _ = env_logger::try_init();
    let a_dir = TempDir::new().unwrap();
    let b_dir = TempDir::new().unwrap();

    let mut a = Node::open(test_config(46240, a_dir.path())).unwrap();
    let mut b = Node::open(test_config(46240, b_dir.path())).unwrap();

    let input = a_dir.path().join("empty.bin");
    fs::write(&input, b"").unwrap();

    let outcome = a.send_file(input.to_str().unwrap(), false);
    assert_eq!(outcome, SendOutcome::Sent { bytes: 0, chunks: 0 });

    let deadline = Instant::now() + Duration::from_millis(300);
    while Instant::now() < deadline {
        b.poll_once();
        thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(b.registry().active_count(), 0);
    assert!(!b_dir.path().join("empty.bin").exists());
}

#[test]
fn header_with_first_chunk_in_one_datagram() {
    let _ = env_logger::try_init();
    let dir = TempDir::new().unwrap();

    let mut node = Node::open(test_config(46260, dir.path())).unwrap();

    // A sender may glue the first chunk of data onto the header frame.
    let header = TransferHeader {
        file_name: "glued.bin".to_string(),
        file_size: 8,
        kind: TransferKind::Send,
    };
    let mut datagram = header.encode().to_vec();
    datagram.extend_from_slice(b"abcd");

    let sender = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    let dest = (Ipv4Addr::LOCALHOST, node.transport().recv_port());
    sender.send_to(&datagram, dest).unwrap();
    sender.send_to(b"efgh", dest).unwrap();

    let output = dir.path().join("glued.bin");
    let arrived = wait_for(&mut node, || {
        fs::metadata(&output).map(|m| m.len()).ok() == Some(8)
    });
    assert!(arrived, "glued transfer never completed");
    assert_eq!(node.registry().active_count(), 0);
    assert_eq!(fs::read(&output).unwrap(), b"abcdefgh");
}

#[test]
fn zero_length_datagram_is_not_chat() {
    let _ = env_logger::try_init();
    let dir = TempDir::new().unwrap();

    let mut node = Node::open(test_config(46270, dir.path())).unwrap();

    let sender = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    let dest = (Ipv4Addr::LOCALHOST, node.transport().recv_port());
    sender.send_to(&[], dest).unwrap();
    sender.send_to(b"ping\0", dest).unwrap();

    // Loopback preserves ordering, so the first frame the node hands back
    // must be the text; the empty datagram before it never surfaces.
    let deadline = Instant::now() + Duration::from_secs(5);
    let frame = loop {
        if let Some(frame) = node.poll_once() {
            break frame;
        }
        assert!(Instant::now() < deadline, "text never arrived");
        thread::sleep(Duration::from_millis(2));
    };
    assert_eq!(frame.bytes, b"ping");
}

#[test]
fn plain_text_reaches_the_caller() {
    let _ = env_logger::try_init();
    let a_dir = TempDir::new().unwrap();
    let b_dir = TempDir::new().unwrap();

    let mut a = Node::open(test_config(46250, a_dir.path())).unwrap();
    let mut b = Node::open(test_config(46250, b_dir.path())).unwrap();

    a.send_text(b"hello everyone\n");

    let deadline = Instant::now() + Duration::from_secs(5);
    let frame = loop {
        if let Some(frame) = b.poll_once() {
            break frame;
        }
        assert!(Instant::now() < deadline, "text never arrived");
        thread::sleep(Duration::from_millis(2));
    };
    // The wire NUL terminator is stripped before text reaches the caller.
    assert_eq!(frame.bytes, b"hello everyone\n");
    assert!(frame.from.ip().is_loopback());

    // Sending a file name nobody asked about must not leak as text either.
    a.send_file("missing-file.bin", false);
    assert!(b.poll_once().is_none());
}
