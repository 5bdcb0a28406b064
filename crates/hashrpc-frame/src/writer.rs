use std::io::{ErrorKind, Write};
use std::time::Instant;

use bytes::{Buf, BytesMut};

use crate::error::{FrameError, Result};
use crate::packet::{encode_packet, PacketConfig, HEADER_SIZE};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete packets to any `Write` stream.
///
/// Two modes share one writer:
/// - [`send`](Self::send) for blocking streams, where a full stream simply waits;
/// - [`enqueue`](Self::enqueue) + [`flush_queue`](Self::flush_queue) for
///   non-blocking streams. Bytes the stream does not take stay queued, bounded by
///   `max_pending` and `write_timeout`.
pub struct PacketWriter<T> {
    inner: T,
    buf: BytesMut,
    queue: BytesMut,
    stalled_since: Option<Instant>,
    config: PacketConfig,
}

impl<T: Write> PacketWriter<T> {
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, PacketConfig::default())
    }

    pub fn with_config(inner: T, config: PacketConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            queue: BytesMut::new(),
            stalled_since: None,
            config,
        }
    }

    /// Frame and send one packet (blocking).
    ///
    /// Packets larger than the configured maximum are rejected before any byte
    /// is written. A `WouldBlock` from the stream is returned as `FrameError::Io`.
    pub fn send(&mut self, packet: &[u8]) -> Result<()> {
        self.check_size(packet)?;

        self.buf.clear();
        encode_packet(packet, &mut self.buf)?;

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Frame `packet` onto the outbound queue and write as much as the stream takes.
    ///
    /// Fails with `Backpressure` when the queue would grow past `max_pending`;
    /// the packet is not queued in that case.
    pub fn enqueue(&mut self, packet: &[u8]) -> Result<()> {
        self.check_size(packet)?;
        let queued = self.queue.len();
        if queued + HEADER_SIZE + packet.len() > self.config.max_pending {
            return Err(FrameError::Backpressure {
                queued,
                max: self.config.max_pending,
            });
        }
        encode_packet(packet, &mut self.queue)?;
        self.flush_queue()
    }

    /// Write queued bytes until the queue is empty or the stream would block.
    ///
    /// Fails with `WriteStalled` once the queue has made no progress for
    /// `write_timeout`.
    pub fn flush_queue(&mut self) -> Result<()> {
        while !self.queue.is_empty() {
            match self.inner.write(&self.queue) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => {
                    self.queue.advance(n);
                    self.stalled_since = None;
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => return self.check_stall(),
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
        self.stalled_since = None;
        Ok(())
    }

    /// Bytes accepted by [`enqueue`](Self::enqueue) but not yet written.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    pub fn config(&self) -> &PacketConfig {
        &self.config
    }

    fn check_size(&self, packet: &[u8]) -> Result<()> {
        if packet.len() > self.config.max_packet_size {
            return Err(FrameError::PayloadTooLarge {
                size: packet.len(),
                max: self.config.max_packet_size,
            });
        }
        Ok(())
    }

    fn check_stall(&mut self) -> Result<()> {
        let since = *self.stalled_since.get_or_insert_with(Instant::now);
        match self.config.write_timeout {
            Some(limit) if since.elapsed() >= limit => Err(FrameError::WriteStalled {
                queued: self.queue.len(),
                waited_ms: since.elapsed().as_millis(),
            }),
            _ => Ok(()),
        }
    }
}
