use std::io::{ErrorKind, Read};

use bytes::{Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::packet::{decode_packet, PacketConfig};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete packets from any `Read` stream.
///
/// Partial reads are buffered internally, so callers only ever see whole packets.
pub struct PacketReader<T> {
    inner: T,
    buf: BytesMut,
    config: PacketConfig,
}

impl<T: Read> PacketReader<T> {
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, PacketConfig::default())
    }

    pub fn with_config(inner: T, config: PacketConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next complete packet (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` at EOF. A `WouldBlock` or
    /// `TimedOut` read surfaces as `FrameError::Io`; buffered bytes are kept, so
    /// the call can simply be retried.
    pub fn read_packet(&mut self) -> Result<Bytes> {
        loop {
            if let Some(packet) = decode_packet(&mut self.buf, self.config.max_packet_size)? {
                tracing::trace!(len = packet.len(), buffered = self.buf.len(), "packet read");
                return Ok(packet);
            }
            self.fill()?;
        }
    }

    /// Read the next packet if one can be completed without blocking.
    ///
    /// Intended for non-blocking streams: returns `Ok(None)` once the stream
    /// reports it has nothing more right now.
    pub fn try_read_packet(&mut self) -> Result<Option<Bytes>> {
        match self.read_packet() {
            Ok(packet) => Ok(Some(packet)),
            Err(err) if err.is_would_block() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Bytes received but not yet returned as a packet.
    pub fn buffered(&self) -> usize {
        self.buf.len()
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

    fn fill(&mut self) -> Result<()> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            match self.inner.read(&mut chunk) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => {
                    self.buf.extend_from_slice(&chunk[..n]);
                    return Ok(());
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::BufMut;

    use super::*;
    use crate::packet::{encode_packet, MAGIC};

    fn wire(packets: &[&[u8]]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for packet in packets {
            encode_packet(packet, &mut buf).unwrap();
        }
        buf.to_vec()
    }

    #[test]
    fn reads_packets_in_order() {
        let mut reader = PacketReader::new(Cursor::new(wire(&[b"one", b"two", b"three"])));
        assert_eq!(reader.read_packet().unwrap().as_ref(), b"one");
        assert_eq!(reader.read_packet().unwrap().as_ref(), b"two");
        assert_eq!(reader.read_packet().unwrap().as_ref(), b"three");
        assert!(matches!(
            reader.read_packet(),
            Err(FrameError::ConnectionClosed)
        ));
    }

    #[test]
    fn packet_larger_than_read_chunk() {
        let payload = vec![0xAB; 12 * 1024];
        let mut reader = PacketReader::new(Cursor::new(wire(&[&payload])));
        assert_eq!(reader.read_packet().unwrap().as_ref(), payload.as_slice());
    }

    #[test]
    fn byte_at_a_time_stream() {
        let mut reader = PacketReader::new(Trickle {
            bytes: wire(&[b"slow"]),
            pos: 0,
        });
        assert_eq!(reader.read_packet().unwrap().as_ref(), b"slow");
    }

    #[test]
    fn closed_mid_packet() {
        let mut partial = BytesMut::new();
        partial.put_slice(&MAGIC);
        partial.put_u32_le(16);
        partial.put_slice(b"only-part");

        let mut reader = PacketReader::new(Cursor::new(partial.to_vec()));
        assert!(matches!(
            reader.read_packet(),
            Err(FrameError::ConnectionClosed)
        ));
    }

    #[test]
    fn oversized_packet_in_stream() {
        let cfg = PacketConfig::default().with_max_packet_size(4);
        let mut reader = PacketReader::with_config(Cursor::new(wire(&[b"too long"])), cfg);
        assert!(matches!(
            reader.read_packet(),
            Err(FrameError::PayloadTooLarge { size: 8, max: 4 })
        ));
    }

    #[test]
    fn try_read_resumes_after_would_block() {
        let bytes = wire(&[b"resumed"]);
        let mut reader = PacketReader::new(Stalling {
            bytes,
            pos: 0,
            stall_at: 4,
            stalled: false,
        });

        assert!(reader.try_read_packet().unwrap().is_none());
        assert_eq!(reader.buffered(), 4);
        let packet = reader.try_read_packet().unwrap().unwrap();
        assert_eq!(packet.as_ref(), b"resumed");
    }

    #[test]
    fn interrupted_read_retries() {
        let mut reader = PacketReader::new(InterruptOnce {
            inner: Cursor::new(wire(&[b"ok"])),
            interrupted: false,
        });
        assert_eq!(reader.read_packet().unwrap().as_ref(), b"ok");
    }

    #[test]
    #[cfg(unix)]
    fn roundtrip_over_stream_pair() {
        let (left, right) = hashrpc_transport::RpcStream::pair().unwrap();
        let mut writer = crate::writer::PacketWriter::new(left);
        let mut reader = PacketReader::new(right);

        writer.send(b"ping").unwrap();
        writer.send(b"").unwrap();
        assert_eq!(reader.read_packet().unwrap().as_ref(), b"ping");
        assert!(reader.read_packet().unwrap().is_empty());
    }

    struct Trickle {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    struct Stalling {
        bytes: Vec<u8>,
        pos: usize,
        stall_at: usize,
        stalled: bool,
    }

    impl Read for Stalling {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos == self.stall_at && !self.stalled {
                self.stalled = true;
                return Err(ErrorKind::WouldBlock.into());
            }
            let end = if self.stalled {
                self.bytes.len()
            } else {
                self.stall_at
            };
            let n = (end - self.pos).min(buf.len());
            buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    struct InterruptOnce {
        inner: Cursor<Vec<u8>>,
        interrupted: bool,
    }

    impl Read for InterruptOnce {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(ErrorKind::Interrupted.into());
            }
            self.inner.read(buf)
        }
    }
}
