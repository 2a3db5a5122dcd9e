//! Routes requests to one of several backing clients via a consistent-hash
//! ring, so adding or removing a backend only reshuffles a small fraction
//! of keys.

use crate::client::{Client, Connector};
use crate::error::{MrpcError, Result};
use crate::options::{ClientOptions, DistributedClientOptions};
use dashmap::DashMap;
use mrpc_core::gate::ActiveGate;
use mrpc_proto::ConsistentHashRing;
use parking_lot::Mutex;
use std::sync::Arc;

/// Hashes a backend-selection key for ring placement.
#[must_use]
fn hash_key(key: u64) -> u32 {
    mrpc_proto::hash::hash_u64(0, key)
}

/// A backing client plus the ref count gating its shutdown: `acquire_client`
/// increments this before handing the client out, `release_client`
/// decrements it, and `stop` waits for it to reach zero before tearing the
/// client down.
struct ClientWrapper<C: Connector + 'static> {
    client: Arc<Client<C>>,
    refs: ActiveGate,
}

impl<C: Connector + 'static> ClientWrapper<C> {
    fn start(options: ClientOptions, connector: C) -> Self {
        Self {
            client: Arc::new(Client::start(options, connector)),
            refs: ActiveGate::new(),
        }
    }

    async fn stop(&self) {
        self.refs.wait_for_zero().await;
        self.client.stop().await;
    }
}

/// A lease on a backing client handed out by [`DistributedClient::acquire_client`].
/// Pass it back to [`DistributedClient::release_client`] when done.
pub struct ClientLease<C: Connector + 'static> {
    wrapper: Arc<ClientWrapper<C>>,
}

impl<C: Connector + 'static> ClientLease<C> {
    #[must_use]
    pub fn client(&self) -> &Arc<Client<C>> {
        &self.wrapper.client
    }
}

pub struct DistributedClient<C: Connector + 'static> {
    client_options: ClientOptions,
    options: DistributedClientOptions,
    ring: Mutex<ConsistentHashRing<Arc<ClientWrapper<C>>>>,
    clients: DashMap<u64, Arc<ClientWrapper<C>>>,
}

impl<C: Connector + 'static> DistributedClient<C> {
    #[must_use]
    pub fn new(client_options: ClientOptions, options: DistributedClientOptions) -> Self {
        let ring = ConsistentHashRing::new(options.ring_order, options.ring_uniform_factor);
        Self {
            client_options,
            options,
            ring: Mutex::new(ring),
            clients: DashMap::new(),
        }
    }

    /// Adds a new backing client under `key`. Duplicate keys are rejected
    /// with a warning rather than replacing the existing entry.
    pub fn add_client(&self, connector: C, key: u64) {
        if self.clients.contains_key(&key) {
            tracing::warn!(key, "distributed client key already present, ignoring add_client");
            return;
        }
        let wrapper = Arc::new(ClientWrapper::start(self.client_options.clone(), connector));
        self.clients.insert(key, wrapper.clone());
        self.ring.lock().add_entry(hash_key(key), wrapper);
    }

    /// Stops and removes the backing client registered under `key`, if any.
    pub async fn remove_client(&self, key: u64) {
        if let Some((_, wrapper)) = self.clients.remove(&key) {
            self.ring.lock().remove_entry(hash_key(key));
            wrapper.stop().await;
        }
    }

    /// Stops and removes every backing client.
    pub async fn remove_all_clients(&self) {
        self.ring.lock().remove_all_entries();
        let keys: Vec<u64> = self.clients.iter().map(|e| *e.key()).collect();
        for key in keys {
            if let Some((_, wrapper)) = self.clients.remove(&key) {
                wrapper.stop().await;
            }
        }
    }

    /// Resolves `request_hash` against the ring and leases the client it
    /// maps to, incrementing its ref count. Retries a few times with a short
    /// sleep if the ring is momentarily empty (e.g. during startup, before
    /// any client has been added).
    pub async fn acquire_client(&self, request_hash: u32) -> Result<ClientLease<C>> {
        for attempt in 0..=self.options.acquire_retry_count {
            if let Some(wrapper) = self.ring.lock().get_entry(request_hash).cloned() {
                wrapper.refs.increment();
                return Ok(ClientLease { wrapper });
            }
            if attempt < self.options.acquire_retry_count {
                compio::time::sleep(self.options.acquire_retry_delay).await;
            }
        }
        Err(MrpcError::NoServerAvailable)
    }

    /// Releases a lease acquired via `acquire_client`.
    pub fn release_client(&self, lease: ClientLease<C>) {
        lease.wrapper.refs.decrement();
    }
}

/// One message from an abstract control plane driving a [`DistributedClient`].
pub enum ControllerMessage<C> {
    AddClient { connector: C, key: u64 },
    RemoveClient { key: u64 },
    RemoveAllClients,
    Stop,
}

/// A sequential source of [`ControllerMessage`]s. Implementations must yield
/// `Stop` on every call once the underlying control source has shut down.
#[async_trait::async_trait(?Send)]
pub trait DistributedClientController<C> {
    async fn next_message(&mut self) -> ControllerMessage<C>;
}

/// Drives `controller`'s messages into `distributed` until it yields `Stop`.
pub async fn run_controller<C: Connector + 'static>(
    distributed: &DistributedClient<C>,
    mut controller: impl DistributedClientController<C>,
) {
    loop {
        match controller.next_message().await {
            ControllerMessage::AddClient { connector, key } => distributed.add_client(connector, key),
            ControllerMessage::RemoveClient { key } => distributed.remove_client(key).await,
            ControllerMessage::RemoveAllClients => distributed.remove_all_clients().await,
            ControllerMessage::Stop => break,
        }
    }
}
