//! Owns one outbound connection: multiplexes up to 256 concurrent requests
//! over it, routes inbound packets by conversation id, and runs a writer
//! fiber that drains the shared writer queue independently of the reader
//! loop so a blocked read never stalls pending writes.

use crate::error::{MrpcError, Result};
use crate::options::ClientOptions;
use compio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use dashmap::DashMap;
use flume::{bounded, Receiver, Sender};
use mrpc_core::gate::ActiveGate;
use mrpc_core::pool::Pool;
use mrpc_proto::bitmap::IdBitmap;
use mrpc_proto::{Method, Packet, PacketStream, PacketStreamOptions, Parameter, Role};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

const STOPPED: u8 = 0;
const WORKING: u8 = 1;
const STOP_INITIATED: u8 = 2;

/// Per-connection state: rebuilt fresh on every `process_stream` call so a
/// reconnect starts every caller from a clean slate.
#[derive(Clone)]
struct ConnState {
    writer_tx: Sender<Packet>,
    bitmap: Arc<Mutex<IdBitmap>>,
    slot_pool: Pool<PacketStream>,
    active_slots: Arc<DashMap<u8, Sender<Packet>>>,
    active_gate: Arc<ActiveGate>,
}

struct Inner {
    options: ClientOptions,
    packet_pool: Pool<Packet>,
    state: AtomicU8,
    conn: Mutex<Option<ConnState>>,
}

/// One client's view of a single outbound connection.
#[derive(Clone)]
pub struct ClientStreamProcessor {
    inner: Arc<Inner>,
}

impl ClientStreamProcessor {
    #[must_use]
    pub fn new(options: ClientOptions) -> Self {
        let packet_pool = Pool::new(options.packet_pool_size, Packet::new);
        Self {
            inner: Arc::new(Inner {
                options,
                packet_pool,
                state: AtomicU8::new(STOPPED),
                conn: Mutex::new(None),
            }),
        }
    }

    /// Acquires a conversation id and packet stream, usable only while this
    /// processor is actively driving a connection.
    pub async fn create_request_stream(&self) -> Result<RequestStream> {
        let conn = self
            .inner
            .conn
            .lock()
            .clone()
            .ok_or(MrpcError::InvalidState)?;
        debug_assert_eq!(
            self.inner.state.load(Ordering::SeqCst),
            WORKING,
            "create_request_stream called while the processor is not WORKING"
        );

        let id = {
            let mut bitmap = conn.bitmap.lock();
            bitmap
                .acquire()
                .expect("id bitmap exhausted: more than 256 concurrent requests") as u8
        };
        let mut stream = conn.slot_pool.acquire().await;
        stream.initialize(id);
        conn.active_slots.insert(id, stream.reader_sender());
        conn.active_gate.increment();

        Ok(RequestStream {
            id,
            packet_stream: Some(stream),
            conn,
        })
    }

    /// Convenience wrapper: opens a request stream, writes the request,
    /// flushes, reads the response, and closes.
    pub async fn invoke_rpc(&self, method: &Method, request: &[Parameter]) -> Result<Vec<Parameter>> {
        let mut stream = self.create_request_stream().await?;
        mrpc_proto::write_request(stream.packet_stream_mut(), method, request).await?;
        stream.flush().await?;
        let response = mrpc_proto::read_response(stream.packet_stream_mut(), method).await?;
        stream.close().await;
        Ok(response)
    }

    /// Drives one connection until it fails or a stop is requested. Returns
    /// once every in-flight request stream has been torn down.
    ///
    /// If a stop was already requested while this processor was idle, this
    /// returns immediately without touching `byte_stream`.
    pub async fn process_stream<S>(&self, byte_stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Clone + Unpin + 'static,
    {
        if self.inner.state.load(Ordering::SeqCst) == STOP_INITIATED {
            self.inner.state.store(STOPPED, Ordering::SeqCst);
            return Ok(());
        }
        self.inner.state.store(WORKING, Ordering::SeqCst);

        let (writer_tx, writer_rx) = bounded(self.inner.options.writer_queue_capacity);
        let bitmap = Arc::new(Mutex::new(IdBitmap::new(256)));
        let active_slots: Arc<DashMap<u8, Sender<Packet>>> = Arc::new(DashMap::new());
        let active_gate = Arc::new(ActiveGate::new());

        let stream_options = PacketStreamOptions {
            read_timeout: self.inner.options.read_timeout,
            write_timeout: self.inner.options.write_timeout,
            reader_queue_capacity: 64,
        };
        let packet_pool_for_slots = self.inner.packet_pool.clone();
        let writer_tx_for_slots = writer_tx.clone();
        let slot_pool = Pool::new(256, move || {
            PacketStream::new(
                writer_tx_for_slots.clone(),
                packet_pool_for_slots.clone(),
                stream_options.clone(),
            )
        });

        *self.inner.conn.lock() = Some(ConnState {
            writer_tx: writer_tx.clone(),
            bitmap,
            slot_pool,
            active_slots: active_slots.clone(),
            active_gate: active_gate.clone(),
        });

        let writer_task = compio::runtime::spawn(run_writer_fiber(
            byte_stream.clone(),
            writer_rx,
            self.inner.options.write_timeout,
            self.inner.options.flush_timeout,
        ));

        let mut read_stream = byte_stream;
        loop {
            if self.inner.state.load(Ordering::SeqCst) == STOP_INITIATED {
                break;
            }
            let mut packet = self.inner.packet_pool.acquire().await;
            let outcome =
                compio::time::timeout(self.inner.options.read_timeout, packet.read_from(&mut read_stream)).await;
            match outcome {
                Err(_) => {
                    self.inner.packet_pool.release(packet);
                    break;
                }
                Ok(Err(_)) => {
                    self.inner.packet_pool.release(packet);
                    break;
                }
                Ok(Ok(())) => {
                    let id = packet.conversation_id();
                    match active_slots.get(&id).map(|s| s.clone()) {
                        Some(sender) => {
                            let _ = sender.send_async(packet).await;
                        }
                        None => {
                            self.inner.packet_pool.release(packet);
                            break;
                        }
                    }
                }
            }
        }

        self.inner.state.store(STOP_INITIATED, Ordering::SeqCst);
        for entry in active_slots.iter() {
            let mut marker = Packet::new();
            marker.set_conversation_id(*entry.key());
            marker.set_role(Role::End);
            let _ = entry.value().send_async(marker).await;
        }
        active_gate.wait_for_zero().await;

        drop(writer_tx);
        *self.inner.conn.lock() = None;
        let _ = writer_task.await;

        self.inner.state.store(STOPPED, Ordering::SeqCst);
        Ok(())
    }

    /// Requests a stop. If a connection is currently being processed, the
    /// read loop observes this on its next iteration and tears down; if the
    /// processor is idle, the next `process_stream` call returns
    /// immediately. Idempotent.
    pub fn stop_async(&self) {
        let prior = self.inner.state.load(Ordering::SeqCst);
        if prior != STOP_INITIATED {
            self.inner.state.store(STOP_INITIATED, Ordering::SeqCst);
        }
    }
}

async fn run_writer_fiber<S>(mut stream: S, rx: Receiver<Packet>, write_timeout: Duration, flush_timeout: Duration)
where
    S: AsyncWrite + Unpin,
{
    loop {
        let packet = match rx.recv_async().await {
            Ok(p) => p,
            Err(_) => break,
        };
        if compio::time::timeout(write_timeout, packet.write_to(&mut stream)).await.is_err() {
            break;
        }
        if rx.is_empty() && compio::time::timeout(flush_timeout, stream.flush()).await.is_err() {
            break;
        }
    }
}

/// A virtual byte stream for one in-flight request, bound to a conversation
/// id on its owning processor's connection. Releases its id back to the
/// bitmap and its packet stream back to the pool on `close`.
pub struct RequestStream {
    id: u8,
    packet_stream: Option<PacketStream>,
    conn: ConnState,
}

impl RequestStream {
    #[must_use]
    pub const fn conversation_id(&self) -> u8 {
        self.id
    }

    pub(crate) fn packet_stream_mut(&mut self) -> &mut PacketStream {
        self.packet_stream.as_mut().expect("request stream used after close")
    }

    pub async fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        Ok(self.packet_stream_mut().read(buf).await?)
    }

    pub async fn write(&mut self, buf: &[u8]) -> Result<()> {
        Ok(self.packet_stream_mut().write(buf).await?)
    }

    pub async fn flush(&mut self) -> Result<()> {
        Ok(self.packet_stream_mut().flush().await?)
    }

    pub async fn disconnect(&mut self) {
        self.packet_stream_mut().disconnect().await;
    }

    /// Flushes, releases the conversation id, and returns the packet stream
    /// to the connection's slot pool for reuse.
    pub async fn close(mut self) {
        let mut stream = self.packet_stream.take().expect("close called twice");
        stream.shutdown().await;
        self.conn.active_slots.remove(&self.id);
        self.conn.bitmap.lock().release(self.id as usize);
        self.conn.active_gate.decrement();
        self.conn.slot_pool.release(stream);
    }
}
