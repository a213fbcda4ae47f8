//! Separator-delimited framing over a byte stream.
//!
//! A frame is every byte up to (and excluding) a fixed separator byte. The channel does not
//! escape anything: payloads containing the separator are refused on write, and it is up to the
//! [`Codec`](crate::codec::Codec) to make sure they never contain it.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, instrument, trace};

use crate::error::PlayerError;

/// Separator of the structured (JSON lines) wire format.
pub const NEWLINE: u8 = 0x0A;
/// Separator of the legacy raw-text wire format (ETX).
pub const ETX: u8 = 0x03;

/// Reads and writes whole frames over a stream.
///
/// Reads are buffered; writes go straight to the underlying stream and are flushed after each
/// frame.
#[derive(Debug)]
pub struct FramedChannel<S: Read + Write> {
    reader: BufReader<S>,
    separator: u8,
}

impl<S: Read + Write> FramedChannel<S> {
    /// Wrap `stream`, delimiting frames with `separator`.
    pub fn new(stream: S, separator: u8) -> Self {
        FramedChannel {
            reader: BufReader::new(stream),
            separator,
        }
    }

    /// Byte ending every frame.
    pub fn separator(&self) -> u8 {
        self.separator
    }

    /// Block until a full frame is available and return it without its separator.
    ///
    /// # Errors
    /// [`PlayerError::StreamClosed`] if the stream ends before a separator is seen, even when
    /// part of a frame was already received. [`PlayerError::Io`] on transport errors, read
    /// timeouts included.
    pub fn read_frame(&mut self) -> Result<Vec<u8>, PlayerError> {
        let mut frame = Vec::new();
        let n = self.reader.read_until(self.separator, &mut frame)?;

        if n == 0 || frame.last() != Some(&self.separator) {
            if !frame.is_empty() {
                debug!(
                    "dropping {} byte(s) of incomplete frame at end of stream",
                    frame.len()
                );
            }
            return Err(PlayerError::StreamClosed);
        }

        frame.pop();
        trace!(len = frame.len(), "frame received");
        Ok(frame)
    }

    /// Append the separator to `payload` and write it as one buffer.
    ///
    /// # Errors
    /// [`PlayerError::MalformedMessage`] if `payload` contains the separator byte,
    /// [`PlayerError::Io`] if the write fails.
    pub fn write_frame(&mut self, payload: &[u8]) -> Result<(), PlayerError> {
        if payload.contains(&self.separator) {
            return Err(PlayerError::MalformedMessage(format!(
                "payload contains the frame separator 0x{:02X}",
                self.separator
            )));
        }

        let mut frame = Vec::with_capacity(payload.len() + 1);
        frame.extend_from_slice(payload);
        frame.push(self.separator);

        let stream = self.reader.get_mut();
        stream.write_all(&frame)?;
        stream.flush()?;
        trace!(len = payload.len(), "frame sent");
        Ok(())
    }

    /// The underlying stream.
    pub fn get_ref(&self) -> &S {
        self.reader.get_ref()
    }

    /// Give back the underlying stream. Bytes already buffered but not yet read are lost.
    pub fn into_inner(self) -> S {
        self.reader.into_inner()
    }
}

/// Open a TCP connection to a game server.
///
/// `read_timeout` bounds every blocking read on the returned stream; `None` waits forever.
#[instrument]
pub fn connect(
    addr: impl ToSocketAddrs + std::fmt::Debug,
    read_timeout: Option<Duration>,
) -> Result<TcpStream, PlayerError> {
    let stream = TcpStream::connect(addr)?;
    stream.set_read_timeout(read_timeout)?;
    stream.set_nodelay(true)?;
    debug!(peer = ?stream.peer_addr().ok(), "connected to game server");
    Ok(stream)
}
