//! Socket loop.
//!
//! The server dials out to the editor and speaks newline-delimited JSON.
//! When the connection drops it redials with capped exponential backoff.

use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::config::{ReconnectConfig, ServerConfig};
use crate::session::Session;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Gave up connecting to {address} after {attempts} attempts")]
    GaveUp { address: String, attempts: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closed,
}

impl ConnectionState {
    /// Whether `next` may follow `self`. A failed connect goes through
    /// `Closed` like a dropped connection does.
    pub fn allows(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting) | (Connecting, Open) | (Connecting, Closed) | (Open, Closed) | (Closed, Connecting)
        )
    }

    fn advance(&mut self, next: ConnectionState) {
        debug_assert!(self.allows(next), "{:?} -> {:?}", self, next);
        debug!(from = ?*self, to = ?next, "connection state");
        *self = next;
    }
}

/// Delay schedule between connection attempts.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    multiplier: f64,
    max_attempts: Option<u32>,
    attempts: u32,
    next: Duration,
}

impl Backoff {
    pub fn new(config: &ReconnectConfig) -> Self {
        Self {
            initial: config.initial_delay(),
            max: config.max_delay(),
            multiplier: config.multiplier,
            max_attempts: config.max_attempts,
            attempts: 0,
            next: config.initial_delay(),
        }
    }

    /// The delay before the next attempt, or `None` once the attempt budget
    /// is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.max_attempts.is_some_and(|max| self.attempts >= max) {
            return None;
        }
        self.attempts += 1;
        let delay = self.next;
        self.next = Duration::try_from_secs_f64(self.next.as_secs_f64() * self.multiplier)
            .unwrap_or(self.max)
            .min(self.max);
        Some(delay)
    }

    /// Called after a successful connect.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.next = self.initial;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// One newline-delimited frame as read off the wire.
#[derive(Debug, PartialEq, Eq)]
pub enum Frame {
    /// The line is in the buffer, terminator stripped.
    Line,
    /// The line ran past the limit. Only the first `max + 1` bytes were
    /// buffered; the rest was skipped up to the next newline.
    Oversized { len: usize },
    Eof,
}

/// Read the next frame into `buf`, holding at most `max + 1` bytes of it.
pub async fn read_frame<R>(reader: &mut R, max: usize, buf: &mut Vec<u8>) -> std::io::Result<Frame>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let limit = (max as u64).saturating_add(1);
    let read = (&mut *reader).take(limit).read_until(b'\n', buf).await?;
    if read == 0 {
        return Ok(Frame::Eof);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
        return Ok(Frame::Line);
    }
    if buf.len() <= max {
        // Last line, no terminator.
        return Ok(Frame::Line);
    }
    let skipped = skip_line(reader).await?;
    Ok(Frame::Oversized { len: buf.len() + skipped })
}

/// Consume input through the next newline without keeping it. Returns the
/// number of bytes skipped before the newline.
async fn skip_line<R>(reader: &mut R) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut skipped = 0;
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(skipped);
        }
        match available.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                reader.consume(pos + 1);
                return Ok(skipped + pos);
            }
            None => {
                let n = available.len();
                reader.consume(n);
                skipped += n;
            }
        }
    }
}

/// Serve one connection until the peer closes it.
pub async fn serve<S>(stream: S, session: &mut Session) -> Result<(), TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        let replies = match read_frame(&mut reader, session.max_frame_bytes(), &mut buf).await? {
            Frame::Eof => break,
            Frame::Oversized { len } => session.reject_oversized(len),
            Frame::Line => {
                let line = String::from_utf8_lossy(&buf);
                if line.trim().is_empty() {
                    continue;
                }
                session.handle_frame(&line)
            }
        };
        for frame in replies {
            let mut text = frame.to_line();
            text.push('\n');
            writer.write_all(text.as_bytes()).await?;
        }
        writer.flush().await?;
    }
    Ok(())
}

/// Connect, serve, and reconnect until the attempt budget runs out.
pub async fn run(config: &ServerConfig, session: &mut Session) -> Result<(), TransportError> {
    let address = config.connection.address();
    let mut backoff = Backoff::new(&config.reconnect);
    let mut state = ConnectionState::Disconnected;

    loop {
        state.advance(ConnectionState::Connecting);
        match TcpStream::connect(&address).await {
            Ok(stream) => {
                state.advance(ConnectionState::Open);
                info!(address = %address, "connected");
                backoff.reset();
                let result = serve(stream, session).await;
                session.on_disconnect();
                state.advance(ConnectionState::Closed);
                match result {
                    Ok(()) => info!(address = %address, "peer closed the connection"),
                    Err(e) => warn!(address = %address, error = %e, "connection lost"),
                }
            }
            Err(e) => {
                debug!(address = %address, error = %e, "connect failed");
                state.advance(ConnectionState::Closed);
            }
        }

        let Some(delay) = backoff.next_delay() else {
            return Err(TransportError::GaveUp {
                address,
                attempts: backoff.attempts(),
            });
        };
        debug!(attempt = backoff.attempts(), delay_ms = delay.as_millis() as u64, "reconnecting");
        tokio::time::sleep(delay).await;
    }
}
