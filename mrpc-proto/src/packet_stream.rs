//! Per-conversation virtual byte stream, layered on packets plus two queues:
//! a reader queue owned by this stream, and a writer queue shared with every
//! other conversation on the same underlying byte stream.

use crate::error::ProtoError;
use crate::packet::{Packet, Role};
use flume::{bounded, Receiver, Sender};
use mrpc_core::pool::Pool;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PacketStreamOptions {
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub reader_queue_capacity: usize,
}

impl Default for PacketStreamOptions {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(2),
            write_timeout: Duration::from_secs(2),
            reader_queue_capacity: 100,
        }
    }
}

/// A single conversation's virtual duplex stream.
pub struct PacketStream {
    conversation_id: Option<u8>,
    writer_tx: Sender<Packet>,
    reader_tx: Sender<Packet>,
    reader_rx: Receiver<Packet>,
    pool: Pool<Packet>,
    current_read: Option<Packet>,
    current_write: Option<Packet>,
    options: PacketStreamOptions,
    /// Set before a write-then-flush sequence takes ownership of
    /// `current_write` and cleared only once the sequence fully completes.
    /// If the task driving `publish_current_write` is cancelled mid-sequence
    /// (e.g. by an enclosing timeout), this stays set and every subsequent
    /// `write`/`flush` fails instead of silently continuing on corrupted state.
    poisoned: bool,
}

impl PacketStream {
    /// `writer_tx` is shared with every other conversation's packet stream
    /// on the same connection; `pool` is likewise shared.
    #[must_use]
    pub fn new(writer_tx: Sender<Packet>, pool: Pool<Packet>, options: PacketStreamOptions) -> Self {
        let (reader_tx, reader_rx) = bounded(options.reader_queue_capacity);
        Self {
            conversation_id: None,
            writer_tx,
            reader_tx,
            reader_rx,
            pool,
            current_read: None,
            current_write: None,
            options,
            poisoned: false,
        }
    }

    #[must_use]
    pub const fn conversation_id(&self) -> Option<u8> {
        self.conversation_id
    }

    /// Binds this stream to a conversation id.
    ///
    /// # Panics
    /// Panics (debug-only) if the stream was not freshly created or shut
    /// down — initializing over live state is a caller bug.
    pub fn initialize(&mut self, conversation_id: u8) {
        debug_assert!(self.conversation_id.is_none());
        debug_assert!(self.current_read.is_none());
        debug_assert!(self.current_write.is_none());
        self.conversation_id = Some(conversation_id);
    }

    /// Producer-side entry point: hands an inbound packet to this
    /// conversation's reader queue.
    pub async fn push_packet(&self, packet: Packet) {
        let _ = self.reader_tx.send_async(packet).await;
    }

    /// Clones the producer-side handle so a routing table can deliver
    /// packets to this conversation without holding the stream itself.
    #[must_use]
    pub fn reader_sender(&self) -> Sender<Packet> {
        self.reader_tx.clone()
    }

    async fn prefetch_read_packet(&mut self) -> Result<(), ProtoError> {
        let packet = compio::time::timeout(self.options.read_timeout, self.reader_rx.recv_async())
            .await
            .map_err(|_| ProtoError::Timeout)?
            .map_err(|_| ProtoError::Disconnected)?;

        if self.current_read.is_none() && packet.role() == Role::End && packet.is_empty() {
            // Synthetic disconnect marker pushed by `disconnect`.
        }
        self.current_read = Some(packet);
        Ok(())
    }

    /// Reads exactly `buf.len()` bytes, blocking on the reader queue as
    /// packets are exhausted. The first packet observed must open the
    /// conversation (START/SINGLE); once an END/SINGLE packet is consumed,
    /// further reads fail.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<(), ProtoError> {
        let mut filled = 0;
        while filled < buf.len() {
            let needs_refill = match self.current_read.as_ref() {
                Some(p) => !p.has_unread(),
                None => true,
            };
            if needs_refill {
                let was_first = self.current_read.is_none();
                let previous_role = self.current_read.as_ref().map(Packet::role);
                if let Some(exhausted) = self.current_read.take() {
                    self.pool.release(exhausted);
                }
                self.prefetch_read_packet().await?;
                let role = self.current_read.as_ref().unwrap().role();
                if was_first {
                    if !role.opens_conversation() {
                        return Err(ProtoError::Framing("first packet must be START or SINGLE"));
                    }
                } else {
                    if previous_role.is_some_and(Role::closes_conversation) {
                        return Err(ProtoError::Framing("read past end of conversation"));
                    }
                    if role.opens_conversation() {
                        return Err(ProtoError::Framing("unexpected START/SINGLE mid-stream"));
                    }
                }
            }
            let packet = self.current_read.as_mut().unwrap();
            filled += packet.read_bytes(&mut buf[filled..]);
        }
        Ok(())
    }

    async fn current_write_mut(&mut self) -> &mut Packet {
        if self.current_write.is_none() {
            let mut p = self.pool.acquire().await;
            p.reset();
            p.set_conversation_id(self.conversation_id.expect("stream initialized before write"));
            p.set_role(Role::Start);
            self.current_write = Some(p);
        }
        self.current_write.as_mut().unwrap()
    }

    /// Buffers `buf` into the outgoing packet, publishing full packets to
    /// the writer queue as needed. Fails if the stream was already flushed
    /// or left poisoned by a cancelled write-then-flush sequence.
    pub async fn write(&mut self, buf: &[u8]) -> Result<(), ProtoError> {
        if self.poisoned {
            return Err(ProtoError::Framing("stream poisoned by a cancelled write"));
        }
        if self
            .current_write
            .as_ref()
            .is_some_and(|p| p.role() == Role::End)
        {
            return Err(ProtoError::Framing("write after flush"));
        }

        let mut offset = 0;
        while offset < buf.len() {
            let packet = self.current_write_mut().await;
            offset += packet.write_bytes(&buf[offset..]);
            if self.current_write.as_ref().unwrap().remaining_capacity() == 0 && offset < buf.len()
            {
                self.publish_current_write(Role::Middle).await?;
            }
        }
        Ok(())
    }

    /// Takes ownership of `current_write` and hands it to the writer queue,
    /// then installs a fresh packet with `next_role`. Cancelling the task
    /// partway through this sequence (e.g. via `compio::time::timeout`)
    /// leaves `poisoned` set, so the next `write`/`flush` fails fast instead
    /// of silently resuming on a connection that may have lost a packet.
    async fn publish_current_write(&mut self, next_role: Role) -> Result<(), ProtoError> {
        self.poisoned = true;
        let packet = self.current_write.take().expect("publish called with no current packet");
        compio::time::timeout(self.options.write_timeout, self.writer_tx.send_async(packet))
            .await
            .map_err(|_| ProtoError::Timeout)?
            .map_err(|_| ProtoError::Disconnected)?;

        let mut fresh = self.pool.acquire().await;
        fresh.reset();
        fresh.set_conversation_id(self.conversation_id.expect("stream initialized before write"));
        fresh.set_role(next_role);
        self.current_write = Some(fresh);
        self.poisoned = false;
        Ok(())
    }

    /// Publishes the outgoing packet as SINGLE (if it was still START) or
    /// END (if it had grown past one packet), then installs a sentinel END
    /// packet so subsequent writes are rejected. No-op if nothing was
    /// written since the last flush.
    pub async fn flush(&mut self) -> Result<(), ProtoError> {
        if self.poisoned {
            return Err(ProtoError::Framing("stream poisoned by a cancelled write"));
        }
        let Some(packet) = self.current_write.as_mut() else {
            return Ok(());
        };
        if packet.role() == Role::End {
            return Ok(());
        }
        let final_role = if packet.role() == Role::Start {
            Role::Single
        } else {
            Role::End
        };
        packet.set_role(final_role);
        self.publish_current_write(Role::End).await
    }

    /// Flushes, releases any held packets, drains the reader queue back to
    /// the pool, and unbinds the conversation id.
    pub async fn shutdown(&mut self) {
        let _ = self.flush().await;
        if let Some(p) = self.current_write.take() {
            self.pool.release(p);
        }
        if let Some(p) = self.current_read.take() {
            self.pool.release(p);
        }
        while let Ok(p) = self.reader_rx.try_recv() {
            self.pool.release(p);
        }
        self.conversation_id = None;
        self.poisoned = false;
    }

    /// Flushes, then enqueues a synthetic END packet so a blocked reader
    /// observes end-of-stream instead of timing out.
    pub async fn disconnect(&mut self) {
        let _ = self.flush().await;
        let mut marker = self.pool.acquire().await;
        marker.reset();
        if let Some(id) = self.conversation_id {
            marker.set_conversation_id(id);
        }
        marker.set_role(Role::End);
        let _ = self.reader_tx.send_async(marker).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_stream() -> (PacketStream, Receiver<Packet>) {
        let (writer_tx, writer_rx) = bounded(16);
        let pool = Pool::new(16, Packet::new);
        let mut stream = PacketStream::new(writer_tx, pool, PacketStreamOptions::default());
        stream.initialize(3);
        (stream, writer_rx)
    }

    #[compio::test]
    async fn write_then_flush_emits_single_packet() {
        let (mut stream, writer_rx) = test_stream();
        stream.write(b"hello").await.unwrap();
        stream.flush().await.unwrap();

        let packet = writer_rx.try_recv().unwrap();
        assert_eq!(packet.role(), Role::Single);
        assert_eq!(packet.conversation_id(), 3);
    }

    #[compio::test]
    async fn write_after_flush_fails() {
        let (mut stream, _writer_rx) = test_stream();
        stream.write(b"hi").await.unwrap();
        stream.flush().await.unwrap();
        assert!(stream.write(b"more").await.is_err());
    }

    #[compio::test]
    async fn failed_publish_poisons_the_stream() {
        // A full, undrained writer queue makes `send_async` block until the
        // write timeout fires, simulating the same "interrupted mid-publish"
        // outcome a cancelled task would leave behind.
        let (writer_tx, _writer_rx) = bounded(1);
        writer_tx.try_send(Packet::new()).unwrap();
        let pool = Pool::new(16, Packet::new);
        let options = PacketStreamOptions {
            write_timeout: Duration::from_millis(10),
            ..PacketStreamOptions::default()
        };
        let mut stream = PacketStream::new(writer_tx, pool, options);
        stream.initialize(3);

        stream.write(b"hello").await.unwrap();
        assert!(stream.flush().await.is_err());

        // The stream must now refuse further use rather than silently
        // continuing on a connection that may have lost a packet.
        assert!(stream.write(b"more").await.is_err());
        assert!(stream.flush().await.is_err());
    }

    #[compio::test]
    async fn roundtrip_through_push_packet() {
        let (mut writer_side, writer_rx) = test_stream();
        writer_side.write(b"roundtrip data").await.unwrap();
        writer_side.flush().await.unwrap();
        let packet = writer_rx.try_recv().unwrap();

        let (reader_tx, reader_rx) = bounded(16);
        let pool = Pool::new(16, Packet::new);
        let mut reader_side = PacketStream::new(reader_tx, pool, PacketStreamOptions::default());
        reader_side.initialize(3);
        reader_side.push_packet(packet).await;

        let mut buf = [0u8; 14];
        reader_side.read(&mut buf).await.unwrap();
        assert_eq!(&buf, b"roundtrip data");
        let _ = reader_rx;
    }

    #[compio::test]
    async fn multi_packet_write_reassembles() {
        let (writer_tx, writer_rx) = bounded(16);
        let pool = Pool::new(16, Packet::new);
        let mut writer_side = PacketStream::new(writer_tx, pool.clone(), PacketStreamOptions::default());
        writer_side.initialize(1);

        let payload = vec![7u8; crate::packet::MAX_PACKET_PAYLOAD * 2 + 50];
        writer_side.write(&payload).await.unwrap();
        writer_side.flush().await.unwrap();

        let (reader_tx, _reader_rx) = bounded(16);
        let mut reader_side = PacketStream::new(reader_tx, pool, PacketStreamOptions::default());
        reader_side.initialize(1);
        while let Ok(p) = writer_rx.try_recv() {
            reader_side.push_packet(p).await;
        }

        let mut out = vec![0u8; payload.len()];
        reader_side.read(&mut out).await.unwrap();
        assert_eq!(out, payload);
    }

    #[compio::test]
    async fn repeated_start_mid_conversation_is_rejected() {
        let (reader_tx, _reader_rx) = bounded(16);
        let pool = Pool::new(16, Packet::new);
        let mut reader_side = PacketStream::new(reader_tx, pool.clone(), PacketStreamOptions::default());
        reader_side.initialize(1);

        let mut first = pool.try_acquire().unwrap();
        first.reset();
        first.set_conversation_id(1);
        first.set_role(Role::Start);
        first.write_bytes(b"ab");
        reader_side.push_packet(first).await;

        let mut second = pool.try_acquire().unwrap();
        second.reset();
        second.set_conversation_id(1);
        second.set_role(Role::Start);
        reader_side.push_packet(second).await;

        let mut buf = [0u8; 4];
        assert!(reader_side.read(&mut buf).await.is_err());
    }
}
