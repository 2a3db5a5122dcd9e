//! # mrpc-proto
//!
//! **Internal wire-protocol crate for `mrpc`.**
//!
//! This is an internal implementation detail — use the `mrpc` crate for the
//! public API. It provides a sans-IO-flavored protocol layer: packet framing
//! and varint/ZigZag codecs that operate against any `compio` byte stream,
//! a round-robin conversation-id allocator, a consistent-hash ring for
//! routing requests across servers, and the primitive value / method /
//! interface tables request and response payloads are built from.
//!
//! None of this crate knows about sockets, connectors, or reconnection —
//! that lives in the `mrpc` crate, layered on top.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]

pub mod bitmap;
pub mod consistent_hash;
pub mod data;
pub mod error;
pub mod hash;
pub mod interface;
pub mod method;
pub mod packet;
pub mod packet_stream;
pub mod params;
pub mod varint;

pub use bitmap::IdBitmap;
pub use consistent_hash::ConsistentHashRing;
pub use data::{get_request_hash, peek_method_id, read_request, read_request_params, read_response, write_request, write_response};
pub use error::{ProtoError, Result};
pub use interface::Interface;
pub use method::{Method, RequestParam};
pub use packet::{Packet, Role, MAX_PACKET_PAYLOAD};
pub use packet_stream::{PacketStream, PacketStreamOptions};
pub use params::{ParamKind, Parameter};

pub mod prelude {
    pub use super::{
        get_request_hash, peek_method_id, read_request, read_request_params, read_response, write_request,
        write_response, ConsistentHashRing, IdBitmap, Interface, Method, ParamKind, Packet, PacketStream,
        PacketStreamOptions, Parameter, ProtoError, RequestParam, Role,
    };
}
