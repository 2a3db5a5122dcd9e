//! Top-level client: a connect-retry loop feeding one
//! [`ClientStreamProcessor`], reusing `mrpc_core::reconnect::ReconnectState`
//! for its exponential-backoff reconnect path.

use crate::client_stream_processor::ClientStreamProcessor;
use crate::error::Result;
use crate::options::ClientOptions;
use compio::io::{AsyncRead, AsyncWrite};
use mrpc_core::gate::ActiveGate;
use mrpc_core::options::SocketOptions;
use mrpc_core::reconnect::ReconnectState;
use mrpc_proto::{Method, Parameter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Produces a fresh byte stream for each (re)connection attempt.
#[async_trait::async_trait(?Send)]
pub trait Connector {
    type Stream: AsyncRead + AsyncWrite + Clone + Unpin + 'static;

    async fn connect(&self) -> std::io::Result<Self::Stream>;

    /// Called by `Client::stop` to unblock a `connect` call the loop fiber
    /// may currently be awaiting. Default no-op for connectors that can't
    /// be interrupted (the loop still exits on its next failed attempt).
    fn shutdown(&self) {}
}

/// One outbound connection to a single server, reconnecting on failure.
pub struct Client<C: Connector + 'static> {
    processor: ClientStreamProcessor,
    connector: Arc<C>,
    stopped: Arc<AtomicBool>,
    loop_done: Arc<ActiveGate>,
}

impl<C: Connector + 'static> Client<C> {
    /// Spawns the connect-retry loop and returns immediately.
    pub fn start(options: ClientOptions, connector: C) -> Self {
        let socket_options = SocketOptions::new()
            .with_reconnect_ivl(options.reconnect_ivl)
            .with_reconnect_ivl_max(options.reconnect_ivl_max);
        let processor = ClientStreamProcessor::new(options);
        let connector = Arc::new(connector);
        let stopped = Arc::new(AtomicBool::new(false));
        let loop_done = Arc::new(ActiveGate::new());
        loop_done.increment();

        let loop_processor = processor.clone();
        let loop_connector = connector.clone();
        let loop_stopped = stopped.clone();
        let loop_gate = loop_done.clone();
        compio::runtime::spawn(async move {
            let mut reconnect = ReconnectState::new(&socket_options);
            loop {
                if loop_stopped.load(Ordering::SeqCst) {
                    break;
                }
                match loop_connector.connect().await {
                    Ok(stream) => {
                        reconnect.reset();
                        let _ = loop_processor.process_stream(stream).await;
                    }
                    Err(e) => {
                        let delay = reconnect.next_delay();
                        tracing::debug!(attempt = reconnect.attempt(), ?delay, error = %e, "connect failed, backing off");
                        compio::time::sleep(delay).await;
                    }
                }
            }
            loop_gate.decrement();
        })
        .detach();

        Self {
            processor,
            connector,
            stopped,
            loop_done,
        }
    }

    #[must_use]
    pub const fn processor(&self) -> &ClientStreamProcessor {
        &self.processor
    }

    /// Shorthand for `self.processor().invoke_rpc(...)`.
    pub async fn invoke_rpc(&self, method: &Method, request: &[Parameter]) -> Result<Vec<Parameter>> {
        self.processor.invoke_rpc(method, request).await
    }

    /// Shuts the connector down (unblocking any pending `connect`), stops
    /// the stream processor, and waits for the loop fiber to exit.
    pub async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.connector.shutdown();
        self.processor.stop_async();
        self.loop_done.wait_for_zero().await;
    }
}
