//! Primitive value codec: the parameter kinds a method's request/response
//! list is built from, each able to decode/encode itself against a
//! [`PacketStream`] and to contribute a hash when it is an `is_key` request
//! parameter.

use crate::error::ProtoError;
use crate::hash::hash32;
use crate::packet_stream::PacketStream;
use crate::varint::{read_i32, read_i64, read_u32, read_u64, write_i32, write_i64, write_u32, write_u64};
use bytes::Bytes;

const MAX_CHAR_ARRAY_LEN: usize = 16_383;
const MAX_STRING_LEN: usize = 65_536;

/// Which primitive a [`Parameter`] holds. Used by method/interface tables to
/// declare a request or response shape without holding live values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    U32,
    U64,
    I32,
    I64,
    CharArray,
    WcharArray,
    String,
    Blob,
}

impl ParamKind {
    /// A value-less placeholder of this kind, ready to `decode_from_stream`.
    #[must_use]
    pub fn default_value(self) -> Parameter {
        match self {
            Self::U32 => Parameter::U32(0),
            Self::U64 => Parameter::U64(0),
            Self::I32 => Parameter::I32(0),
            Self::I64 => Parameter::I64(0),
            Self::CharArray => Parameter::CharArray(Vec::new()),
            Self::WcharArray => Parameter::WcharArray(Vec::new()),
            Self::String => Parameter::String(String::new()),
            Self::Blob => Parameter::Blob(Bytes::new()),
        }
    }
}

/// A live primitive value. Variants mirror [`ParamKind`] one-to-one.
#[derive(Debug, Clone, PartialEq)]
pub enum Parameter {
    U32(u32),
    U64(u64),
    I32(i32),
    I64(i64),
    CharArray(Vec<u8>),
    WcharArray(Vec<char>),
    String(String),
    Blob(Bytes),
}

impl Parameter {
    #[must_use]
    pub const fn kind(&self) -> ParamKind {
        match self {
            Self::U32(_) => ParamKind::U32,
            Self::U64(_) => ParamKind::U64,
            Self::I32(_) => ParamKind::I32,
            Self::I64(_) => ParamKind::I64,
            Self::CharArray(_) => ParamKind::CharArray,
            Self::WcharArray(_) => ParamKind::WcharArray,
            Self::String(_) => ParamKind::String,
            Self::Blob(_) => ParamKind::Blob,
        }
    }

    /// Encodes this value's body (no framing beyond what each kind defines)
    /// into `stream`.
    pub async fn encode_to_stream(&self, stream: &mut PacketStream) -> Result<(), ProtoError> {
        match self {
            Self::U32(v) => {
                let mut buf = Vec::with_capacity(5);
                write_u32(&mut buf, *v);
                stream.write(&buf).await
            }
            Self::U64(v) => {
                let mut buf = Vec::with_capacity(10);
                write_u64(&mut buf, *v);
                stream.write(&buf).await
            }
            Self::I32(v) => {
                let mut buf = Vec::with_capacity(5);
                write_i32(&mut buf, *v);
                stream.write(&buf).await
            }
            Self::I64(v) => {
                let mut buf = Vec::with_capacity(10);
                write_i64(&mut buf, *v);
                stream.write(&buf).await
            }
            Self::CharArray(bytes) => {
                if bytes.len() > MAX_CHAR_ARRAY_LEN {
                    return Err(ProtoError::OutOfBounds("char array exceeds max length"));
                }
                let mut header = Vec::with_capacity(5);
                write_u64(&mut header, bytes.len() as u64);
                stream.write(&header).await?;
                stream.write(bytes).await
            }
            Self::WcharArray(chars) => encode_code_points(stream, chars, MAX_CHAR_ARRAY_LEN).await,
            Self::String(s) => {
                let chars: Vec<char> = s.chars().collect();
                encode_code_points(stream, &chars, MAX_STRING_LEN).await
            }
            Self::Blob(bytes) => {
                let mut header = Vec::with_capacity(10);
                write_u64(&mut header, bytes.len() as u64);
                stream.write(&header).await?;
                stream.write(bytes).await
            }
        }
    }

    /// Decodes a value of `self`'s current kind from `stream`, replacing the
    /// current value in place.
    pub async fn decode_from_stream(&mut self, stream: &mut PacketStream) -> Result<(), ProtoError> {
        match self {
            Self::U32(v) => *v = read_varint_u32(stream).await?,
            Self::U64(v) => *v = read_varint_u64(stream).await?,
            Self::I32(v) => *v = read_varint_i32(stream).await?,
            Self::I64(v) => *v = read_varint_i64(stream).await?,
            Self::CharArray(bytes) => {
                let len = read_length(stream, MAX_CHAR_ARRAY_LEN).await?;
                let mut buf = vec![0u8; len];
                stream.read(&mut buf).await?;
                *bytes = buf;
            }
            Self::WcharArray(chars) => {
                *chars = decode_code_points(stream, MAX_CHAR_ARRAY_LEN).await?;
            }
            Self::String(s) => {
                let chars = decode_code_points(stream, MAX_STRING_LEN).await?;
                *s = chars.into_iter().collect();
            }
            Self::Blob(bytes) => {
                let len = read_length_unbounded(stream).await?;
                let mut buf = vec![0u8; len];
                stream.read(&mut buf).await?;
                *bytes = Bytes::from(buf);
            }
        }
        Ok(())
    }

    /// Contributes this value to a running request-hash accumulator.
    #[must_use]
    pub fn hash(&self, seed: u32) -> u32 {
        match self {
            Self::U32(v) => hash32(seed, &[*v]),
            Self::U64(v) => hash32(seed, &[*v as u32, (*v >> 32) as u32]),
            Self::I32(v) => hash32(seed, &[*v as u32]),
            Self::I64(v) => hash32(seed, &[*v as u32, ((*v as u64) >> 32) as u32]),
            Self::CharArray(bytes) => hash_bytes(seed, bytes),
            Self::WcharArray(chars) => {
                let words: Vec<u32> = chars.iter().map(|c| *c as u32).collect();
                hash32(seed, &words)
            }
            Self::String(s) => {
                let words: Vec<u32> = s.chars().map(|c| c as u32).collect();
                hash32(seed, &words)
            }
            Self::Blob(bytes) => hash_bytes(seed, bytes),
        }
    }
}

fn hash_bytes(seed: u32, bytes: &[u8]) -> u32 {
    let words: Vec<u32> = bytes
        .chunks(4)
        .map(|chunk| {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            u32::from_le_bytes(word)
        })
        .collect();
    hash32(seed, &words)
}

async fn encode_code_points(
    stream: &mut PacketStream,
    chars: &[char],
    max_len: usize,
) -> Result<(), ProtoError> {
    if chars.len() > max_len {
        return Err(ProtoError::OutOfBounds("code point array exceeds max length"));
    }
    let mut out = Vec::with_capacity(5 + chars.len() * 2);
    write_u64(&mut out, chars.len() as u64);
    for c in chars {
        write_u32(&mut out, *c as u32);
    }
    stream.write(&out).await
}

async fn decode_code_points(stream: &mut PacketStream, max_len: usize) -> Result<Vec<char>, ProtoError> {
    let len = read_length(stream, max_len).await?;
    let mut chars = Vec::with_capacity(len);
    for _ in 0..len {
        let code_point = read_varint_u32(stream).await?;
        let c = char::from_u32(code_point).ok_or(ProtoError::OutOfBounds("code point exceeds wchar max"))?;
        chars.push(c);
    }
    Ok(chars)
}

async fn read_length(stream: &mut PacketStream, max_len: usize) -> Result<usize, ProtoError> {
    let len = read_length_unbounded(stream).await?;
    if len > max_len {
        return Err(ProtoError::OutOfBounds("declared length exceeds maximum"));
    }
    Ok(len)
}

async fn read_length_unbounded(stream: &mut PacketStream) -> Result<usize, ProtoError> {
    Ok(read_varint_u64(stream).await? as usize)
}

async fn read_varint_byte(stream: &mut PacketStream) -> Result<u8, ProtoError> {
    let mut buf = [0u8; 1];
    stream.read(&mut buf).await?;
    Ok(buf[0])
}

async fn read_varint_u64(stream: &mut PacketStream) -> Result<u64, ProtoError> {
    let mut bytes = Vec::with_capacity(crate::varint::MAX_VARINT64_LEN);
    loop {
        let byte = read_varint_byte(stream).await?;
        bytes.push(byte);
        if byte & 0x80 == 0 {
            break;
        }
        if bytes.len() >= crate::varint::MAX_VARINT64_LEN {
            return Err(ProtoError::Framing("varint too long"));
        }
    }
    let (value, _) = read_u64(&bytes).ok_or(ProtoError::Framing("malformed varint"))?;
    Ok(value)
}

async fn read_varint_u32(stream: &mut PacketStream) -> Result<u32, ProtoError> {
    let mut bytes = Vec::with_capacity(crate::varint::MAX_VARINT32_LEN);
    loop {
        let byte = read_varint_byte(stream).await?;
        bytes.push(byte);
        if byte & 0x80 == 0 {
            break;
        }
        if bytes.len() >= crate::varint::MAX_VARINT64_LEN {
            return Err(ProtoError::Framing("varint too long"));
        }
    }
    read_u32(&bytes)
        .map(|(v, _)| v)
        .ok_or(ProtoError::Framing("malformed or overflowing u32 varint"))
}

async fn read_varint_i32(stream: &mut PacketStream) -> Result<i32, ProtoError> {
    let mut bytes = Vec::with_capacity(crate::varint::MAX_VARINT32_LEN);
    loop {
        let byte = read_varint_byte(stream).await?;
        bytes.push(byte);
        if byte & 0x80 == 0 {
            break;
        }
        if bytes.len() >= crate::varint::MAX_VARINT64_LEN {
            return Err(ProtoError::Framing("varint too long"));
        }
    }
    read_i32(&bytes)
        .map(|(v, _)| v)
        .ok_or(ProtoError::Framing("malformed or overflowing i32 varint"))
}

async fn read_varint_i64(stream: &mut PacketStream) -> Result<i64, ProtoError> {
    let mut bytes = Vec::with_capacity(crate::varint::MAX_VARINT64_LEN);
    loop {
        let byte = read_varint_byte(stream).await?;
        bytes.push(byte);
        if byte & 0x80 == 0 {
            break;
        }
        if bytes.len() >= crate::varint::MAX_VARINT64_LEN {
            return Err(ProtoError::Framing("varint too long"));
        }
    }
    let (value, _) = read_i64(&bytes).ok_or(ProtoError::Framing("malformed varint"))?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Packet;
    use flume::bounded;
    use mrpc_core::pool::Pool;

    async fn roundtrip(value: Parameter) -> Parameter {
        let (writer_tx, writer_rx) = bounded(16);
        let pool = Pool::new(16, Packet::new);
        let mut write_side = PacketStream::new(writer_tx, pool.clone(), Default::default());
        write_side.initialize(1);
        value.encode_to_stream(&mut write_side).await.unwrap();
        write_side.flush().await.unwrap();

        let (reader_tx, _rx) = bounded(16);
        let mut read_side = PacketStream::new(reader_tx, pool, Default::default());
        read_side.initialize(1);
        while let Ok(p) = writer_rx.try_recv() {
            read_side.push_packet(p).await;
        }

        let mut decoded = value.kind().default_value();
        decoded.decode_from_stream(&mut read_side).await.unwrap();
        decoded
    }

    #[compio::test]
    async fn u32_roundtrip() {
        assert_eq!(roundtrip(Parameter::U32(123_456)).await, Parameter::U32(123_456));
    }

    #[compio::test]
    async fn i64_roundtrip_negative() {
        assert_eq!(roundtrip(Parameter::I64(-99)).await, Parameter::I64(-99));
    }

    #[compio::test]
    async fn string_roundtrip() {
        let v = Parameter::String("hello, mrpc".to_string());
        assert_eq!(roundtrip(v.clone()).await, v);
    }

    #[compio::test]
    async fn blob_roundtrip() {
        let v = Parameter::Blob(Bytes::from_static(b"binary data \x00\x01\x02"));
        assert_eq!(roundtrip(v.clone()).await, v);
    }

    #[test]
    fn hash_is_deterministic_and_sensitive() {
        let a = Parameter::U32(1).hash(7);
        let b = Parameter::U32(1).hash(7);
        let c = Parameter::U32(2).hash(7);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
