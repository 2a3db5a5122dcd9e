//! Owns one accepted connection: demultiplexes inbound packets by
//! conversation id into per-request fibers, bounded to a fixed concurrency
//! of in-flight requests, and runs a writer fiber independent of the
//! reader loop for the same reason the client side needs one.

use crate::error::Result;
use crate::options::ServerOptions;
use crate::service::Service;
use compio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use dashmap::DashMap;
use flume::{bounded, Receiver, Sender};
use mrpc_core::gate::ActiveGate;
use mrpc_core::pool::Pool;
use mrpc_proto::{Interface, Packet, PacketStream, PacketStreamOptions, Role};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

const STOPPED: u8 = 0;
const WORKING: u8 = 1;
const STOP_INITIATED: u8 = 2;

#[derive(Clone)]
struct ConnState {
    writer_tx: Sender<Packet>,
    request_slots: Pool<()>,
    active_processors: Arc<DashMap<u8, Sender<Packet>>>,
    active_gate: Arc<ActiveGate>,
    failed: Arc<AtomicBool>,
}

struct Inner {
    options: ServerOptions,
    packet_pool: Pool<Packet>,
    state: AtomicU8,
}

/// Drives one accepted connection, dispatching decoded requests to a
/// [`Service`].
#[derive(Clone)]
pub struct ServerStreamProcessor {
    inner: Arc<Inner>,
}

impl ServerStreamProcessor {
    #[must_use]
    pub fn new(options: ServerOptions) -> Self {
        let packet_pool = Pool::new(options.packet_pool_size, Packet::new);
        Self {
            inner: Arc::new(Inner {
                options,
                packet_pool,
                state: AtomicU8::new(STOPPED),
            }),
        }
    }

    /// Drives `byte_stream` until it fails or a stop is requested, then
    /// calls `on_release` so the caller's fixed-size processor pool can
    /// reclaim this processor.
    pub async fn start<S>(
        &self,
        byte_stream: S,
        interface: Arc<Interface>,
        service: Arc<dyn Service>,
        on_release: impl FnOnce() + 'static,
    ) where
        S: AsyncRead + AsyncWrite + Clone + Unpin + 'static,
    {
        self.inner.state.store(WORKING, Ordering::SeqCst);

        let (writer_tx, writer_rx) = bounded(self.inner.options.writer_queue_capacity);
        let request_slots = Pool::new(self.inner.options.request_processor_pool_size, || ());
        let active_processors: Arc<DashMap<u8, Sender<Packet>>> = Arc::new(DashMap::new());
        let active_gate = Arc::new(ActiveGate::new());
        let failed = Arc::new(AtomicBool::new(false));

        let conn = ConnState {
            writer_tx: writer_tx.clone(),
            request_slots,
            active_processors: active_processors.clone(),
            active_gate: active_gate.clone(),
            failed: failed.clone(),
        };

        let writer_task = compio::runtime::spawn(run_writer_fiber(
            byte_stream.clone(),
            writer_rx,
            self.inner.options.write_timeout,
            self.inner.options.flush_timeout,
        ));

        let stream_options = PacketStreamOptions {
            read_timeout: self.inner.options.read_timeout,
            write_timeout: self.inner.options.write_timeout,
            reader_queue_capacity: 64,
        };

        let mut read_stream = byte_stream;
        loop {
            if self.inner.state.load(Ordering::SeqCst) == STOP_INITIATED || failed.load(Ordering::SeqCst) {
                break;
            }
            let mut packet = self.inner.packet_pool.acquire().await;
            let outcome =
                compio::time::timeout(self.inner.options.read_timeout, packet.read_from(&mut read_stream)).await;
            let Ok(Ok(())) = outcome else {
                self.inner.packet_pool.release(packet);
                break;
            };

            let id = packet.conversation_id();
            let is_new = packet.role().opens_conversation();

            if is_new {
                if active_processors.contains_key(&id) {
                    self.inner.packet_pool.release(packet);
                    tracing::warn!(id, "protocol error: conversation id already active");
                    break;
                }
                let slots = conn.request_slots.clone();
                let token = slots.acquire().await;
                let mut stream = PacketStream::new(writer_tx.clone(), self.inner.packet_pool.clone(), stream_options.clone());
                stream.initialize(id);
                active_processors.insert(id, stream.reader_sender());
                active_gate.increment();
                stream.push_packet(packet).await;

                let interface = interface.clone();
                let service = service.clone();
                let conn = conn.clone();
                compio::runtime::spawn(async move {
                    run_request_fiber(id, stream, interface, service, conn).await;
                    slots.release(token);
                })
                .detach();
            } else {
                match active_processors.get(&id).map(|s| s.clone()) {
                    Some(sender) => {
                        let _ = sender.send_async(packet).await;
                    }
                    None => {
                        self.inner.packet_pool.release(packet);
                        tracing::warn!(id, "protocol error: packet for inactive conversation id");
                        break;
                    }
                }
            }
        }

        self.inner.state.store(STOP_INITIATED, Ordering::SeqCst);
        for entry in active_processors.iter() {
            let mut marker = Packet::new();
            marker.set_conversation_id(*entry.key());
            marker.set_role(Role::End);
            let _ = entry.value().send_async(marker).await;
        }
        active_gate.wait_for_zero().await;

        drop(writer_tx);
        let _ = writer_task.await;

        self.inner.state.store(STOPPED, Ordering::SeqCst);
        on_release();
    }

    /// Requests a stop; the reader loop observes this on its next iteration.
    pub fn stop_async(&self) {
        let prior = self.inner.state.load(Ordering::SeqCst);
        if prior != STOP_INITIATED {
            self.inner.state.store(STOP_INITIATED, Ordering::SeqCst);
        }
    }
}

async fn run_request_fiber(
    id: u8,
    mut stream: PacketStream,
    interface: Arc<Interface>,
    service: Arc<dyn Service>,
    conn: ConnState,
) {
    let result = handle_request(&mut stream, &interface, &*service).await;

    // Remove from the routing table before the shutdown call below performs
    // its (possibly blocking) final flush, so the id is safe to reuse
    // without misrouting a packet meant for this handler's tail write.
    conn.active_processors.remove(&id);
    conn.active_gate.decrement();

    if let Err(e) = result {
        tracing::warn!(id, error = %e, "request handler failed, tearing down connection");
        conn.failed.store(true, Ordering::SeqCst);
    }

    stream.shutdown().await;
}

async fn handle_request(stream: &mut PacketStream, interface: &Interface, service: &dyn Service) -> Result<()> {
    let method_id = mrpc_proto::peek_method_id(stream).await?;
    let method = interface.find(method_id)?;
    let request = mrpc_proto::read_request_params(stream, method).await?;
    let response = service.call(method_id, request).await?;
    mrpc_proto::write_response(stream, method, &response).await?;
    Ok(())
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
