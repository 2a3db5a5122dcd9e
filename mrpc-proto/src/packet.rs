//! Wire-framed packet: the atomic unit multiplexed over one byte stream.
//!
//! Wire layout: `conversation_id: u8 | varint(length << 2 | role) | payload`.

use crate::error::ProtoError;
use crate::varint::{read_u64, write_u64};
use compio::buf::BufResult;
use compio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Packets carry at most this many payload bytes. The header reserves its
/// top bits for length, capping the payload at 4,095 bytes rather than the
/// 16,383 some comments in the reference sources suggest (see `DESIGN.md`).
pub const MAX_PACKET_PAYLOAD: usize = 4095;

/// Position of a packet within a conversation's logical byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Role {
    /// First packet of a multi-packet conversation.
    Start = 0,
    /// An interior packet of a multi-packet conversation.
    Middle = 1,
    /// Final packet of a multi-packet conversation.
    End = 2,
    /// The conversation's entire payload fit in one packet.
    Single = 3,
}

impl Role {
    const fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Start),
            1 => Some(Self::Middle),
            2 => Some(Self::End),
            3 => Some(Self::Single),
            _ => None,
        }
    }

    /// True for the two roles that may legally start a read sequence.
    #[must_use]
    pub const fn opens_conversation(self) -> bool {
        matches!(self, Self::Start | Self::Single)
    }

    /// True for the two roles that may legally end a read sequence.
    #[must_use]
    pub const fn closes_conversation(self) -> bool {
        matches!(self, Self::End | Self::Single)
    }
}

/// A reusable, fixed-capacity packet buffer.
///
/// Packets are recycled through a pool (see `mrpc_core::pool::Pool`); `reset`
/// restores a packet to its just-acquired state so the pool can hand it back
/// out without reallocating.
#[derive(Debug, Clone)]
pub struct Packet {
    conversation_id: u8,
    role: Role,
    data: Vec<u8>,
    cursor: usize,
}

impl Default for Packet {
    fn default() -> Self {
        Self::new()
    }
}

impl Packet {
    #[must_use]
    pub fn new() -> Self {
        Self {
            conversation_id: 0,
            role: Role::Start,
            data: Vec::with_capacity(MAX_PACKET_PAYLOAD),
            cursor: 0,
        }
    }

    /// Restores the packet to a freshly-created state for reuse from a pool.
    pub fn reset(&mut self) {
        self.conversation_id = 0;
        self.role = Role::Start;
        self.data.clear();
        self.cursor = 0;
    }

    #[must_use]
    pub const fn conversation_id(&self) -> u8 {
        self.conversation_id
    }

    pub fn set_conversation_id(&mut self, id: u8) {
        self.conversation_id = id;
    }

    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    pub fn set_role(&mut self, role: Role) {
        self.role = role;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn remaining_capacity(&self) -> usize {
        MAX_PACKET_PAYLOAD - self.data.len()
    }

    /// Appends as much of `buf` as fits; returns the number of bytes written.
    pub fn write_bytes(&mut self, buf: &[u8]) -> usize {
        let take = buf.len().min(self.remaining_capacity());
        self.data.extend_from_slice(&buf[..take]);
        take
    }

    /// Copies up to `buf.len()` unread bytes into `buf`, advancing the
    /// read cursor. Returns the number of bytes copied.
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> usize {
        let available = self.data.len() - self.cursor;
        let take = buf.len().min(available);
        buf[..take].copy_from_slice(&self.data[self.cursor..self.cursor + take]);
        self.cursor += take;
        take
    }

    #[must_use]
    pub fn has_unread(&self) -> bool {
        self.cursor < self.data.len()
    }

    /// Serializes this packet's header + payload to `out`.
    fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.conversation_id);
        let header = ((self.data.len() as u64) << 2) | (self.role as u64);
        write_u64(out, header);
        out.extend_from_slice(&self.data);
    }

    /// Writes this packet to an async byte stream.
    pub async fn write_to<S>(&self, stream: &mut S) -> Result<(), ProtoError>
    where
        S: AsyncWrite + Unpin,
    {
        let mut frame = Vec::with_capacity(self.data.len() + 5);
        self.encode(&mut frame);
        let BufResult(res, _) = stream.write_all(frame).await;
        res.map_err(ProtoError::Io)?;
        Ok(())
    }

    /// Reads one packet from an async byte stream, replacing this packet's
    /// contents in place (so it can be reused from a pool without
    /// reallocating).
    pub async fn read_from<S>(&mut self, stream: &mut S) -> Result<(), ProtoError>
    where
        S: AsyncRead + Unpin,
    {
        let mut id_buf = vec![0u8; 1];
        let BufResult(res, buf) = stream.read_exact(id_buf).await;
        res.map_err(|_| ProtoError::Disconnected)?;
        id_buf = buf;
        self.conversation_id = id_buf[0];

        // Varint header: read one byte at a time until the continuation bit
        // clears, same approach the original uses since header length is
        // not known up front.
        let mut header_bytes = Vec::with_capacity(crate::varint::MAX_VARINT64_LEN);
        loop {
            let byte_buf = vec![0u8; 1];
            let BufResult(res, buf) = stream.read_exact(byte_buf).await;
            res.map_err(|_| ProtoError::Disconnected)?;
            let byte = buf[0];
            header_bytes.push(byte);
            if byte & 0x80 == 0 {
                break;
            }
            if header_bytes.len() >= crate::varint::MAX_VARINT64_LEN {
                return Err(ProtoError::Framing("packet header too long"));
            }
        }
        let (header, _) =
            read_u64(&header_bytes).ok_or(ProtoError::Framing("malformed packet header"))?;
        let role = Role::from_u8((header & 0x3) as u8).ok_or(ProtoError::Framing("bad role"))?;
        let length = (header >> 2) as usize;
        if length > MAX_PACKET_PAYLOAD {
            return Err(ProtoError::Framing("packet length exceeds maximum"));
        }

        self.role = role;
        self.cursor = 0;
        if length == 0 {
            self.data.clear();
            return Ok(());
        }

        let payload_buf = vec![0u8; length];
        let BufResult(res, buf) = stream.read_exact(payload_buf).await;
        res.map_err(|_| ProtoError::Disconnected)?;
        self.data = buf;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_bytes_truncates_at_capacity() {
        let mut p = Packet::new();
        let big = vec![7u8; MAX_PACKET_PAYLOAD + 100];
        let written = p.write_bytes(&big);
        assert_eq!(written, MAX_PACKET_PAYLOAD);
        assert_eq!(p.len(), MAX_PACKET_PAYLOAD);
    }

    #[test]
    fn read_write_bytes_roundtrip() {
        let mut p = Packet::new();
        p.write_bytes(b"hello world");
        let mut out = [0u8; 5];
        let n = p.read_bytes(&mut out);
        assert_eq!(n, 5);
        assert_eq!(&out, b"hello");
        assert!(p.has_unread());
    }

    #[test]
    fn reset_clears_state() {
        let mut p = Packet::new();
        p.set_conversation_id(42);
        p.set_role(Role::End);
        p.write_bytes(b"data");
        p.reset();
        assert_eq!(p.conversation_id(), 0);
        assert_eq!(p.role(), Role::Start);
        assert_eq!(p.len(), 0);
    }

    #[test]
    fn role_classification() {
        assert!(Role::Start.opens_conversation());
        assert!(Role::Single.opens_conversation());
        assert!(!Role::Middle.opens_conversation());
        assert!(Role::End.closes_conversation());
        assert!(Role::Single.closes_conversation());
        assert!(!Role::Start.closes_conversation());
    }

    /// Exercises the same header math `write_to`/`read_from` rely on, without
    /// requiring a live async stream.
    #[test]
    fn encode_header_matches_role_and_length() {
        let mut p = Packet::new();
        p.set_conversation_id(9);
        p.set_role(Role::Single);
        p.write_bytes(b"payload bytes");

        let mut wire = Vec::new();
        p.encode(&mut wire);

        assert_eq!(wire[0], 9);
        let (header, header_len) = read_u64(&wire[1..]).unwrap();
        assert_eq!(header & 0x3, Role::Single as u64);
        assert_eq!(header >> 2, 13);
        assert_eq!(&wire[1 + header_len..], b"payload bytes");
    }
}
