//! # mrpc
//!
//! A lightweight RPC runtime built on `io_uring`: a client multiplexes many
//! concurrent calls over one connection, a server demultiplexes them into
//! per-request handlers, and a distributed client spreads calls across a
//! pool of backends via a consistent-hash ring.
//!
//! ## Architecture
//!
//! - **`mrpc-core`**: runtime-agnostic ambient building blocks (object
//!   pooling, reconnect backoff, an active-count shutdown gate)
//! - **`mrpc-proto`**: the sans-IO wire protocol — packet framing, varint
//!   codecs, the consistent-hash ring, method/interface tables
//! - **`mrpc`** (this crate): the client/server stream processors, the
//!   distributed client, and the top-level connect/accept loops
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mrpc::{Client, ClientOptions, Connector};
//!
//! struct TcpConnector { addr: std::net::SocketAddr }
//!
//! #[async_trait::async_trait(?Send)]
//! impl Connector for TcpConnector {
//!     type Stream = compio::net::TcpStream;
//!
//!     async fn connect(&self) -> std::io::Result<Self::Stream> {
//!         compio::net::TcpStream::connect(self.addr).await
//!     }
//! }
//!
//! # async fn example() -> mrpc::Result<()> {
//! let client = Client::start(
//!     ClientOptions::default(),
//!     TcpConnector { addr: "127.0.0.1:9000".parse().unwrap() },
//! );
//! // client.invoke_rpc(&method, &request).await?;
//! client.stop().await;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::future_not_send)] // compio is a thread-per-core runtime; futures need not be Send.
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]

pub use bytes::Bytes;

pub mod client;
pub mod client_stream_processor;
pub mod dev_tracing;
pub mod distributed_client;
pub mod error;
pub mod options;
pub mod server;
pub mod server_stream_processor;
pub mod service;

pub use client::{Client, Connector};
pub use client_stream_processor::{ClientStreamProcessor, RequestStream};
pub use distributed_client::{ClientLease, ControllerMessage, DistributedClient, DistributedClientController};
pub use error::{MrpcError, Result};
pub use options::{ClientOptions, DistributedClientOptions, ServerOptions};
pub use server::{Acceptor, Server};
pub use server_stream_processor::ServerStreamProcessor;
pub use service::Service;

pub use mrpc_proto::{Interface, Method, ParamKind, Parameter, RequestParam};
