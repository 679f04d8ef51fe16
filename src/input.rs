//! Event source reading one JSON-encoded event per line
//!
//! Each record looks like this (whitespace added for readability):
//!
//! ```text
//! {"run": 1, "subrun": 0, "event": 42, "candidates": [
//!     {"pdg": 14, "energy": 1.2, "position": [10.0, -3.0, -4500.0],
//!      "momentum": [0.001, -0.0005, 1.2],
//!      "parent": {"pdg": 211, "momentum": [0.01, 0.0, 3.4]},
//!      "weight": 1.0}
//! ]}
//! ```
//!
//! Records which cannot be decoded are reported as malformed events, and
//! reading goes on with the next line. A failure of the underlying reader ends
//! the sequence after being reported once.

use crate::{error::MalformedEvent, event::Event};
use std::io::BufRead;

/// Iterator over the events of a JSON-lines stream
pub struct EventReader<R: BufRead> {
    reader: R,
    line: Vec<u8>,
    record: usize,
    failed: bool,
}
//
impl<R: BufRead> EventReader<R> {
    /// Start reading events from a buffered reader
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: Vec::new(),
            record: 0,
            failed: false,
        }
    }
}

impl<R: BufRead> Iterator for EventReader<R> {
    type Item = Result<Event, MalformedEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            self.record += 1;
            let record = self.record;
            self.line.clear();
            // Lines are decoded as raw bytes, so that invalid UTF-8 only spoils
            // its own record
            match self.reader.read_until(b'\n', &mut self.line) {
                Ok(0) => return None,
                Ok(_) if self.line.iter().all(u8::is_ascii_whitespace) => continue,
                Ok(_) => {
                    return Some(serde_json::from_slice::<Event>(&self.line).map_err(|e| {
                        MalformedEvent::Unparseable {
                            record,
                            reason: e.to_string(),
                        }
                    }))
                }
                Err(e) => {
                    self.failed = true;
                    return Some(Err(MalformedEvent::Unreadable {
                        record,
                        reason: e.to_string(),
                    }));
                }
            }
        }
    }
}
