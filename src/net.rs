// Blocking TCP helpers shared by the three processes
//
// Every connection is made once and held for the process lifetime.
// Reads use a short timeout so the owning loop can check for cancellation
// between lines instead of sitting in a blocking read forever.

use std::io::{self, BufRead, BufReader, ErrorKind, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::debug;

/// Outcome of one [`LineReader::read_line`] call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadLine {
    /// A complete record, newline stripped
    Line(String),
    /// Nothing complete arrived before the read timeout
    Idle,
    /// Peer closed the connection
    Closed,
}

/// Newline-framed reader over a TCP stream with a read timeout.
///
/// Bytes of a line that is still in flight when the timeout hits are kept
/// and completed by the next call.
pub struct LineReader {
    reader: BufReader<TcpStream>,
    pending: Vec<u8>,
}

impl LineReader {
    pub fn new(stream: TcpStream, timeout: Duration) -> io::Result<Self> {
        stream.set_read_timeout(Some(timeout))?;
        Ok(Self {
            reader: BufReader::new(stream),
            pending: Vec::new(),
        })
    }

    pub fn read_line(&mut self) -> io::Result<ReadLine> {
        match self.reader.read_until(b'\n', &mut self.pending) {
            Ok(0) if self.pending.is_empty() => Ok(ReadLine::Closed),
            // A final line without a trailing newline is still a line
            Ok(_) => Ok(ReadLine::Line(self.take_line())),
            Err(e) if is_timeout(&e) => Ok(ReadLine::Idle),
            Err(e) => Err(e),
        }
    }

    fn take_line(&mut self) -> String {
        if self.pending.last() == Some(&b'\n') {
            self.pending.pop();
        }
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        line
    }

    pub fn close(&self) -> io::Result<()> {
        close_stream(self.reader.get_ref())
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
    )
}

/// Write one newline-terminated record
pub fn send_line(stream: &mut TcpStream, line: &str) -> io::Result<()> {
    stream.write_all(line.as_bytes())?;
    stream.flush()
}

/// Shut both directions down. A peer that already went away is not an error.
pub fn close_stream(stream: &TcpStream) -> io::Result<()> {
    match stream.shutdown(Shutdown::Both) {
        Err(e) if e.kind() == ErrorKind::NotConnected => Ok(()),
        other => other,
    }
}

/// Accept exactly one client, giving up with `Ok(None)` once `running` is cleared.
pub fn accept_one(
    listener: &TcpListener,
    running: &AtomicBool,
    poll: Duration,
) -> io::Result<Option<(TcpStream, SocketAddr)>> {
    listener.set_nonblocking(true)?;

    while running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, addr)) => {
                stream.set_nonblocking(false)?;
                return Ok(Some((stream, addr)));
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => std::thread::sleep(poll),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    debug!("Accept abandoned, shutdown requested");
    Ok(None)
}
