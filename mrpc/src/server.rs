//! Top-level server: an accept loop drawing server stream processors from a
//! fixed-size pool and handing each an accepted connection.

use crate::options::ServerOptions;
use crate::server_stream_processor::ServerStreamProcessor;
use crate::service::Service;
use compio::io::{AsyncRead, AsyncWrite};
use dashmap::DashMap;
use mrpc_core::gate::ActiveGate;
use mrpc_core::pool::Pool;
use mrpc_proto::Interface;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Accepts fresh byte streams for the server to process.
#[async_trait::async_trait(?Send)]
pub trait Acceptor {
    type Stream: AsyncRead + AsyncWrite + Clone + Unpin + 'static;

    async fn accept(&self) -> std::io::Result<Self::Stream>;

    /// Called by `Server::stop` to unblock a pending `accept` call.
    fn shutdown(&self) {}
}

pub struct Server<A: Acceptor + 'static> {
    acceptor: Arc<A>,
    stopped: Arc<AtomicBool>,
    accept_done: Arc<ActiveGate>,
    active: Arc<DashMap<u64, ServerStreamProcessor>>,
    fleet: Arc<ActiveGate>,
}

impl<A: Acceptor + 'static> Server<A> {
    /// Spawns the accept loop and returns immediately.
    pub fn start(options: ServerOptions, interface: Interface, service: Arc<dyn Service>, acceptor: A) -> Self {
        let acceptor = Arc::new(acceptor);
        let interface = Arc::new(interface);
        let stopped = Arc::new(AtomicBool::new(false));
        let accept_done = Arc::new(ActiveGate::new());
        accept_done.increment();
        let active: Arc<DashMap<u64, ServerStreamProcessor>> = Arc::new(DashMap::new());
        let fleet = Arc::new(ActiveGate::new());
        let next_id = Arc::new(AtomicU64::new(0));

        let pool_size = options.processor_pool_size;
        let pool_options = options.clone();
        let pool = Pool::new(pool_size, move || ServerStreamProcessor::new(pool_options.clone()));

        let loop_acceptor = acceptor.clone();
        let loop_stopped = stopped.clone();
        let loop_gate = accept_done.clone();
        let loop_active = active.clone();
        let loop_fleet = fleet.clone();
        let loop_pool = pool.clone();
        let loop_interface = interface.clone();
        let loop_service = service.clone();
        let loop_next_id = next_id.clone();

        compio::runtime::spawn(async move {
            loop {
                if loop_stopped.load(Ordering::SeqCst) {
                    break;
                }
                let stream = match loop_acceptor.accept().await {
                    Ok(s) => s,
                    Err(e) => {
                        tracing::debug!(error = %e, "accept failed, stopping accept loop");
                        break;
                    }
                };

                let processor = loop_pool.acquire().await;
                let id = loop_next_id.fetch_add(1, Ordering::SeqCst);
                loop_active.insert(id, processor.clone());
                loop_fleet.increment();

                let release_pool = loop_pool.clone();
                let release_active = loop_active.clone();
                let release_fleet = loop_fleet.clone();
                let release_processor = processor.clone();
                let conn_interface = loop_interface.clone();
                let conn_service = loop_service.clone();
                compio::runtime::spawn(async move {
                    processor
                        .start(stream, conn_interface, conn_service, move || {
                            release_active.remove(&id);
                            release_fleet.decrement();
                            release_pool.release(release_processor);
                        })
                        .await;
                })
                .detach();
            }
            loop_gate.decrement();
        })
        .detach();

        Self {
            acceptor,
            stopped,
            accept_done,
            active,
            fleet,
        }
    }

    /// Shuts the acceptor down, waits for the accept loop to exit, then asks
    /// every currently active processor to stop and waits for the fleet to
    /// drain.
    pub async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.acceptor.shutdown();
        self.accept_done.wait_for_zero().await;

        for entry in self.active.iter() {
            entry.value().stop_async();
        }
        self.fleet.wait_for_zero().await;
    }
}
