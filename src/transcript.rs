/// Append-only chat transcript.
///
/// A collaborator of the engine, not part of it: the front end hands over
/// exactly the text strings that cross the engine boundary. Failures are
/// reported once and absorbed; chat keeps working without a transcript.
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;

pub struct Transcript {
    file: Option<File>,
    path: PathBuf,
    enabled: bool,
}

impl Transcript {
    /// Create a transcript named from the local date and time, e.g.
    /// `30Aug202614-05-09-chatlog.txt`, inside `dir`.
    pub fn create_in(dir: &Path) -> Transcript {
        let name = Local::now().format("%d%b%Y%H-%M-%S-chatlog.txt").to_string();
        let path = dir.join(name);
        let file = match File::create(&path) {
            Ok(file) => Some(file),
            Err(e) => {
                log::error!("unable to create transcript file {}: {}", path.display(), e);
                None
            }
        };
        Transcript {
            file,
            path,
            enabled: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Append one line of chat text and flush.
    pub fn write_line(&mut self, text: &str) {
        if !self.enabled {
            return;
        }
        if let Some(file) = &mut self.file {
            let line = text.trim_end_matches(['\r', '\n']);
            if let Err(e) = writeln!(file, "{}", line).and_then(|_| file.flush()) {
                log::error!("transcript write to {} failed: {}", self.path.display(), e);
                self.file = None;
            }
        }
    }
}
