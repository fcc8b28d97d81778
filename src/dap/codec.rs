//! Wire codec: `Content-Length` framing over the adapter's stdio pipes
//! (spec §4.1).
//!
//! `write_frame` is a single blocking write. `poll_frame` is bounded: it
//! returns `Ok(None)` rather than blocking past `timeout`, so a session tick
//! can interleave reading with draining the outbound queue. Pipes don't
//! support `set_read_timeout` the way a sibling's TCP socket does, so reads
//! go through `timeout_readwrite::TimeoutReader`, the same mechanism the
//! console output poller uses. A frame read partway through one `poll_frame`
//! call resumes on the next rather than losing the bytes already off the
//! pipe.

use std::io::Read;
use std::process::{ChildStdin, ChildStdout};
use std::time::{Duration, Instant};

use serde_json::Value;
use timeout_readwrite::TimeoutReader;

use crate::error::{Error, Result};

/// How long a single underlying `read` is allowed to block before returning
/// `WouldBlock`/`TimedOut`. Short so `poll_frame`'s own deadline is honored
/// promptly rather than overshooting by a whole attempt.
const READ_ATTEMPT_TIMEOUT: Duration = Duration::from_millis(5);

enum Phase {
    ReadingHeader(String),
    ReadingBody {
        content_length: usize,
        buf: Vec<u8>,
        read: usize,
    },
}

pub struct WireCodec {
    stdin: ChildStdin,
    reader: TimeoutReader<ChildStdout>,
    phase: Phase,
}

impl WireCodec {
    pub fn new(stdin: ChildStdin, stdout: ChildStdout) -> Self {
        Self {
            stdin,
            reader: TimeoutReader::new(stdout, READ_ATTEMPT_TIMEOUT),
            phase: Phase::ReadingHeader(String::new()),
        }
    }

    /// Serialize and write one frame. A single call to `write_all` so a
    /// concurrent reader never observes a half-written frame.
    pub fn write_frame(&mut self, message: &Value) -> Result<()> {
        use std::io::Write;

        let payload = serde_json::to_vec(message)?;
        let mut framed = format!("Content-Length: {}\r\n\r\n", payload.len()).into_bytes();
        framed.extend_from_slice(&payload);
        self.stdin.write_all(&framed)?;
        self.stdin.flush()?;
        Ok(())
    }

    /// Try to read one complete frame within `timeout`. Returns `Ok(None)`
    /// on timeout with no frame ready; the partially-read header or body is
    /// retained and picked back up on the next call.
    pub fn poll_frame(&mut self, timeout: Duration) -> Result<Option<Value>> {
        let deadline = Instant::now() + timeout;

        loop {
            if Instant::now() > deadline {
                return Ok(None);
            }

            match &mut self.phase {
                Phase::ReadingHeader(partial) => {
                    let mut byte = [0u8; 1];
                    match self.reader.read(&mut byte) {
                        Ok(0) => {
                            return Err(Error::Protocol(
                                "adapter closed stdout mid-header".to_string(),
                            ));
                        }
                        Ok(_) => {
                            partial.push(byte[0] as char);
                            if partial.ends_with("\r\n\r\n") {
                                let content_length = parse_content_length(partial)?;
                                self.phase = Phase::ReadingBody {
                                    content_length,
                                    buf: vec![0u8; content_length],
                                    read: 0,
                                };
                            }
                        }
                        Err(err) if is_retryable(&err) => continue,
                        Err(err) => return Err(err.into()),
                    }
                }
                Phase::ReadingBody {
                    content_length,
                    buf,
                    read,
                } => {
                    if *read == *content_length {
                        let value: Value = serde_json::from_slice(buf)?;
                        self.phase = Phase::ReadingHeader(String::new());
                        return Ok(Some(value));
                    }
                    match self.reader.read(&mut buf[*read..]) {
                        Ok(0) => {
                            return Err(Error::Protocol(
                                "adapter closed stdout mid-body".to_string(),
                            ));
                        }
                        Ok(n) => *read += n,
                        Err(err) if is_retryable(&err) => continue,
                        Err(err) => return Err(err.into()),
                    }
                }
            }
        }
    }
}

fn is_retryable(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

/// Parses accumulated `Header: value\r\n` lines terminated by a blank line,
/// looking for `Content-Length` (the only header DAP frames carry in
/// practice, mirroring the LSP framing it was adapted from).
fn parse_content_length(raw_header: &str) -> Result<usize> {
    for line in raw_header.split("\r\n") {
        if let Some(value) = line.strip_prefix("Content-Length:") {
            return value
                .trim()
                .parse::<usize>()
                .map_err(|_| Error::Protocol(format!("malformed Content-Length: `{value}`")));
        }
    }
    Err(Error::Protocol(
        "frame header missing Content-Length".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_content_length_header() {
        let header = "Content-Length: 42\r\n\r\n";
        assert_eq!(parse_content_length(header).unwrap(), 42);
    }

    #[test]
    fn rejects_missing_content_length() {
        let header = "X-Other: 1\r\n\r\n";
        assert!(parse_content_length(header).is_err());
    }

    #[test]
    fn rejects_malformed_content_length() {
        let header = "Content-Length: not-a-number\r\n\r\n";
        assert!(parse_content_length(header).is_err());
    }
}
