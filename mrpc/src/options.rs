//! Builder-pattern configuration for client and server stream processors,
//! in the same `with_*` fluent-setter shape as `mrpc_core::options::SocketOptions`.

use std::time::Duration;

/// Options for a client stream processor (one per outbound connection).
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub packet_pool_size: usize,
    pub writer_queue_capacity: usize,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub flush_timeout: Duration,
    /// Initial delay between failed connect attempts.
    pub reconnect_ivl: Duration,
    /// Ceiling for the connect-retry backoff. `Duration::ZERO` disables
    /// growth — every attempt waits `reconnect_ivl`.
    pub reconnect_ivl_max: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            packet_pool_size: 512,
            writer_queue_capacity: 512,
            read_timeout: Duration::from_secs(2),
            write_timeout: Duration::from_secs(2),
            flush_timeout: Duration::from_secs(2),
            reconnect_ivl: Duration::from_millis(100),
            reconnect_ivl_max: Duration::ZERO,
        }
    }
}

impl ClientOptions {
    #[must_use]
    pub fn with_packet_pool_size(mut self, n: usize) -> Self {
        self.packet_pool_size = n;
        self
    }

    #[must_use]
    pub fn with_writer_queue_capacity(mut self, n: usize) -> Self {
        self.writer_queue_capacity = n;
        self
    }

    #[must_use]
    pub fn with_read_timeout(mut self, d: Duration) -> Self {
        self.read_timeout = d;
        self
    }

    #[must_use]
    pub fn with_write_timeout(mut self, d: Duration) -> Self {
        self.write_timeout = d;
        self
    }

    #[must_use]
    pub fn with_flush_timeout(mut self, d: Duration) -> Self {
        self.flush_timeout = d;
        self
    }

    #[must_use]
    pub fn with_reconnect_ivl(mut self, d: Duration) -> Self {
        self.reconnect_ivl = d;
        self
    }

    #[must_use]
    pub fn with_reconnect_ivl_max(mut self, d: Duration) -> Self {
        self.reconnect_ivl_max = d;
        self
    }
}

/// Options for a server stream processor (one per accepted connection).
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub packet_pool_size: usize,
    pub writer_queue_capacity: usize,
    pub request_processor_pool_size: usize,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub flush_timeout: Duration,
    /// Fixed-size pool of server stream processors an accept loop draws from.
    pub processor_pool_size: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            packet_pool_size: 1000,
            writer_queue_capacity: 1000,
            request_processor_pool_size: 256,
            read_timeout: Duration::from_secs(2),
            write_timeout: Duration::from_secs(2),
            flush_timeout: Duration::from_secs(2),
            processor_pool_size: 256,
        }
    }
}

impl ServerOptions {
    #[must_use]
    pub fn with_packet_pool_size(mut self, n: usize) -> Self {
        self.packet_pool_size = n;
        self
    }

    #[must_use]
    pub fn with_writer_queue_capacity(mut self, n: usize) -> Self {
        self.writer_queue_capacity = n;
        self
    }

    #[must_use]
    pub fn with_request_processor_pool_size(mut self, n: usize) -> Self {
        self.request_processor_pool_size = n;
        self
    }

    #[must_use]
    pub fn with_processor_pool_size(mut self, n: usize) -> Self {
        self.processor_pool_size = n;
        self
    }
}

/// Options for the distributed client: consistent-hash ring parameters and
/// retry policy for routing a request when the ring is momentarily empty.
#[derive(Debug, Clone)]
pub struct DistributedClientOptions {
    pub ring_order: u32,
    pub ring_uniform_factor: u8,
    pub acquire_retry_count: u32,
    pub acquire_retry_delay: Duration,
}

impl Default for DistributedClientOptions {
    fn default() -> Self {
        Self {
            ring_order: 8,
            ring_uniform_factor: 10,
            acquire_retry_count: 3,
            acquire_retry_delay: Duration::from_millis(100),
        }
    }
}

impl DistributedClientOptions {
    #[must_use]
    pub fn with_ring_order(mut self, order: u32) -> Self {
        self.ring_order = order;
        self
    }

    #[must_use]
    pub fn with_ring_uniform_factor(mut self, factor: u8) -> Self {
        self.ring_uniform_factor = factor;
        self
    }

    #[must_use]
    pub fn with_acquire_retry_count(mut self, n: u32) -> Self {
        self.acquire_retry_count = n;
        self
    }

    #[must_use]
    pub fn with_acquire_retry_delay(mut self, d: Duration) -> Self {
        self.acquire_retry_delay = d;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = ClientOptions::default();
        assert_eq!(c.packet_pool_size, 512);
        assert_eq!(c.writer_queue_capacity, 512);

        let s = ServerOptions::default();
        assert_eq!(s.packet_pool_size, 1000);
        assert_eq!(s.request_processor_pool_size, 256);

        let d = DistributedClientOptions::default();
        assert_eq!(d.ring_order, 8);
        assert_eq!(d.ring_uniform_factor, 10);
        assert_eq!(d.acquire_retry_count, 3);
    }

    #[test]
    fn builder_setters_are_fluent() {
        let c = ClientOptions::default()
            .with_packet_pool_size(64)
            .with_read_timeout(Duration::from_secs(1));
        assert_eq!(c.packet_pool_size, 64);
        assert_eq!(c.read_timeout, Duration::from_secs(1));
    }
}
