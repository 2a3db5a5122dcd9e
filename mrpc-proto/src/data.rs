//! Request/response framing over a conversation: couples a [`Method`] with
//! live parameter values and reads/writes them in the declared order.

use crate::error::ProtoError;
use crate::method::Method;
use crate::packet_stream::PacketStream;
use crate::params::Parameter;

/// Writes `method_id` followed by each request parameter in declared order.
/// If the method declares no request parameters, only the id is sent.
pub async fn write_request(
    stream: &mut PacketStream,
    method: &Method,
    request: &[Parameter],
) -> Result<(), ProtoError> {
    debug_assert_eq!(request.len(), method.request_params().len());
    stream.write(&[method.method_id()]).await?;
    for value in request {
        value.encode_to_stream(stream).await?;
    }
    Ok(())
}

/// Reads a method id, resolves it against `method` (the caller must already
/// know which method this conversation is for), then decodes each request
/// parameter in declared order.
///
/// # Panics
/// Panics (debug-only) if the decoded method id does not match `method` —
/// a caller-contract violation, since a server request processor is bound
/// to a single method before this is called.
pub async fn read_request(stream: &mut PacketStream, method: &Method) -> Result<Vec<Parameter>, ProtoError> {
    let mut id_buf = [0u8; 1];
    stream.read(&mut id_buf).await?;
    debug_assert_eq!(id_buf[0], method.method_id(), "request method id mismatch");
    read_request_params(stream, method).await
}

/// Decodes request parameters only, assuming the method id byte has
/// already been consumed (e.g. via [`peek_method_id`] during dispatch).
pub async fn read_request_params(stream: &mut PacketStream, method: &Method) -> Result<Vec<Parameter>, ProtoError> {
    let mut values = Vec::with_capacity(method.request_params().len());
    for param in method.request_params() {
        let mut value = param.kind.default_value();
        value.decode_from_stream(stream).await?;
        values.push(value);
    }
    Ok(values)
}

/// Reads the method id byte only, without decoding parameters — used by a
/// server accept loop to dispatch before it knows which method's codec to
/// run.
pub async fn peek_method_id(stream: &mut PacketStream) -> Result<u8, ProtoError> {
    let mut id_buf = [0u8; 1];
    stream.read(&mut id_buf).await?;
    Ok(id_buf[0])
}

/// Writes each response parameter in declared order, or a single zero byte
/// if the method declares none.
pub async fn write_response(
    stream: &mut PacketStream,
    method: &Method,
    response: &[Parameter],
) -> Result<(), ProtoError> {
    debug_assert_eq!(response.len(), method.response_params().len());
    if method.response_params().is_empty() {
        stream.write(&[0]).await?;
    } else {
        for value in response {
            value.encode_to_stream(stream).await?;
        }
    }
    Ok(())
}

/// Reads a response: each response parameter in declared order, or a single
/// byte that must be zero if the method declares none.
pub async fn read_response(stream: &mut PacketStream, method: &Method) -> Result<Vec<Parameter>, ProtoError> {
    if method.response_params().is_empty() {
        let mut marker = [0u8; 1];
        stream.read(&mut marker).await?;
        if marker[0] != 0 {
            return Err(ProtoError::MalformedEmptyResponse);
        }
        return Ok(Vec::new());
    }

    let mut values = Vec::with_capacity(method.response_params().len());
    for kind in method.response_params() {
        let mut value = kind.default_value();
        value.decode_from_stream(stream).await?;
        values.push(value);
    }
    Ok(values)
}

/// Folds every `is_key`-marked request parameter's hash into a running
/// value; parameters with `is_key == false` do not participate, even when
/// present.
#[must_use]
pub fn get_request_hash(method: &Method, request: &[Parameter], seed: u32) -> u32 {
    debug_assert_eq!(request.len(), method.request_params().len());
    method
        .request_params()
        .iter()
        .zip(request)
        .filter(|(param, _)| param.is_key)
        .fold(seed, |acc, (_, value)| value.hash(acc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::RequestParam;
    use crate::packet::Packet;
    use crate::params::ParamKind;
    use flume::bounded;
    use mrpc_core::pool::Pool;

    fn stream() -> (PacketStream, flume::Receiver<Packet>) {
        let (writer_tx, writer_rx) = bounded(16);
        let pool = Pool::new(16, Packet::new);
        let mut s = PacketStream::new(writer_tx, pool, Default::default());
        s.initialize(1);
        (s, writer_rx)
    }

    #[compio::test]
    async fn request_roundtrips_through_the_wire() {
        let method = Method::new(
            7,
            vec![RequestParam::new(ParamKind::U32, true), RequestParam::new(ParamKind::String, false)],
            vec![ParamKind::U64],
        );
        let request = vec![Parameter::U32(42), Parameter::String("hi".to_string())];

        let (mut write_side, writer_rx) = stream();
        write_request(&mut write_side, &method, &request).await.unwrap();
        write_side.flush().await.unwrap();

        let pool = Pool::new(16, Packet::new);
        let (reader_tx, _rx) = bounded(16);
        let mut read_side = PacketStream::new(reader_tx, pool, Default::default());
        read_side.initialize(1);
        while let Ok(p) = writer_rx.try_recv() {
            read_side.push_packet(p).await;
        }

        let decoded = read_request(&mut read_side, &method).await.unwrap();
        assert_eq!(decoded, request);
    }

    #[compio::test]
    async fn empty_response_is_a_single_zero_byte() {
        let method = Method::new(1, vec![], vec![]);
        let (mut write_side, writer_rx) = stream();
        write_response(&mut write_side, &method, &[]).await.unwrap();
        write_side.flush().await.unwrap();

        let pool = Pool::new(16, Packet::new);
        let (reader_tx, _rx) = bounded(16);
        let mut read_side = PacketStream::new(reader_tx, pool, Default::default());
        read_side.initialize(1);
        while let Ok(p) = writer_rx.try_recv() {
            read_side.push_packet(p).await;
        }
        let decoded = read_response(&mut read_side, &method).await.unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn request_hash_skips_non_key_params() {
        let method = Method::new(
            1,
            vec![RequestParam::new(ParamKind::U32, true), RequestParam::new(ParamKind::U32, false)],
            vec![],
        );
        let a = get_request_hash(&method, &[Parameter::U32(1), Parameter::U32(999)], 0);
        let b = get_request_hash(&method, &[Parameter::U32(1), Parameter::U32(111)], 0);
        assert_eq!(a, b, "non-key parameter must not affect the hash");

        let c = get_request_hash(&method, &[Parameter::U32(2), Parameter::U32(999)], 0);
        assert_ne!(a, c, "key parameter must affect the hash");
    }
}
