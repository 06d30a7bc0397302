/// Interactive console front end for the broadcast chat engine.
///
/// Drives the single-threaded polling loop: check for inbound frames,
/// accumulate non-blocking console input until a full line arrives,
/// dispatch commands, sweep transfer timeouts, sleep a few milliseconds,
/// repeat. Commands:
///
///   exit           terminate
///   :send <path>   broadcast a file to every listener
///   :get <name>    ask every listener to push the named file back
///   :log           toggle the chat transcript
///
/// Anything else typed is broadcast as chat text. An optional single
/// argument overrides the base UDP port.
use std::io::{self, Read, Write};
use std::path::Path;
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use lanchat::transcript::Transcript;
use lanchat::transport;
use lanchat::{Config, Node};

const COMMAND_EXIT: &str = "exit";
const COMMAND_SEND: &str = ":send";
const COMMAND_GET: &str = ":get";
const COMMAND_LOG: &str = ":log";

const LOOP_SLEEP: Duration = Duration::from_millis(5);

/// Cap on buffered console input; bounds how much one line can flood
/// onto the network.
const MAX_CONSOLE_IN: usize = 1024;

enum ConsoleInput {
    Line(String),
    Pending,
    Eof,
}

/// Accumulate console bytes until a CR/LF ends the line or the buffer
/// cap is hit. Non-blocking: returns `Pending` when nothing is ready.
fn read_console(pending: &mut Vec<u8>) -> ConsoleInput {
    let mut chunk = [0u8; 256];
    match io::stdin().read(&mut chunk) {
        Ok(0) => ConsoleInput::Eof,
        Ok(read) => {
            pending.extend_from_slice(&chunk[..read]);
            let complete = matches!(pending.last(), Some(&b'\n') | Some(&b'\r'));
            if complete || pending.len() >= MAX_CONSOLE_IN {
                let line = String::from_utf8_lossy(pending).into_owned();
                pending.clear();
                ConsoleInput::Line(line)
            } else {
                ConsoleInput::Pending
            }
        }
        Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => ConsoleInput::Pending,
        Err(e) => {
            log::warn!("console read error: {}", e);
            ConsoleInput::Pending
        }
    }
}

#[cfg(unix)]
fn main() -> ExitCode {
    use std::os::unix::io::AsRawFd;

    env_logger::init();

    let mut config = Config::default();
    if let Some(arg) = std::env::args().nth(1) {
        match arg.parse::<u16>() {
            Ok(port) => config.base_port = port,
            Err(_) => {
                eprintln!("usage: lanchat [base-port]");
                return ExitCode::FAILURE;
            }
        }
    }

    let mut node = match Node::open(config) {
        Ok(node) => node,
        Err(e) => {
            log::error!("cannot open the broadcast transport: {}", e);
            return ExitCode::from(10);
        }
    };

    let mut transcript = Transcript::create_in(Path::new("."));

    let console = io::stdin().as_raw_fd();
    if let Err(e) = transport::set_handle_nonblocking(console) {
        log::warn!("console stays blocking: {}", e);
    }

    let mut pending = Vec::with_capacity(MAX_CONSOLE_IN);
    let mut running = true;
    while running {
        // Inbound first. Transfer traffic is consumed inside the engine;
        // only chat text surfaces here.
        if let Some(frame) = node.poll_once() {
            let text = String::from_utf8_lossy(&frame.bytes).into_owned();
            print!("{}", text);
            let _ = io::stdout().flush();
            transcript.write_line(&text);
        }

        match read_console(&mut pending) {
            ConsoleInput::Line(line) => {
                if line.starts_with(COMMAND_EXIT) {
                    running = false;
                } else if line.starts_with(COMMAND_SEND) {
                    node.send_file(&line[COMMAND_SEND.len()..], false);
                } else if line.starts_with(COMMAND_GET) {
                    node.get_file(&line[COMMAND_GET.len()..]);
                } else if line.starts_with(COMMAND_LOG) {
                    let enabled = !transcript.is_enabled();
                    transcript.set_enabled(enabled);
                    println!(" Logging has been turned {}", if enabled { "ON" } else { "OFF" });
                } else {
                    node.send_text(line.as_bytes());
                    transcript.write_line(&line);
                }
            }
            ConsoleInput::Eof => running = false,
            ConsoleInput::Pending => {}
        }

        node.sweep_timeouts();
        thread::sleep(LOOP_SLEEP);
    }

    let _ = transport::set_handle_blocking(console);
    ExitCode::SUCCESS
}

#[cfg(not(unix))]
fn main() -> ExitCode {
    eprintln!("the lanchat console requires a unix-like terminal");
    ExitCode::FAILURE
}
