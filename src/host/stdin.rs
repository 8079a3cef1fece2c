//! JSON-lines host event feed.
//!
//! The `run` command reads one [`HostEvent`] per line on a reader thread and
//! forwards them to the main context over a channel.

use std::io::BufRead;
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};
use tracing::debug;

use super::HostEvent;

/// What the reader thread sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostInput {
    Event(HostEvent),
    Malformed { line: String, error: String },
    /// Input ended or could not be read.
    Closed,
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Option<HostInput> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(match serde_json::from_str::<HostEvent>(trimmed) {
        Ok(event) => HostInput::Event(event),
        Err(e) => HostInput::Malformed {
            line: trimmed.to_string(),
            error: e.to_string(),
        },
    })
}

/// Read events from `reader` until EOF, then send `Closed`.
pub fn spawn_reader<R>(reader: R, tx: Sender<HostInput>) -> std::io::Result<JoinHandle<()>>
where
    R: BufRead + Send + 'static,
{
    thread::Builder::new()
        .name("wakabeat-host-input".to_string())
        .spawn(move || {
            for line in reader.lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        debug!(error = %e, "host input read failed");
                        break;
                    }
                };
                if let Some(input) = parse_line(&line) {
                    if tx.send(input).is_err() {
                        return;
                    }
                }
            }
            let _ = tx.send(HostInput::Closed);
        })
}
