//! mrpc-core
//!
//! Runtime-agnostic ambient building blocks shared by the wire protocol and
//! public API crates:
//! - Builder-pattern reconnect-backoff options (`options`)
//! - Exponential-backoff reconnect state (`reconnect`)
//! - Fixed-capacity object pool (`pool`)
//! - "Wait until active count is zero" gate (`gate`)

#![deny(unsafe_code)]
// Allow some pedantic lints that are intentional in this crate
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::needless_pass_by_ref_mut)]
#![allow(clippy::match_same_arms)]

pub mod gate;
pub mod options;
pub mod pool;
pub mod reconnect;

pub mod prelude {
    pub use crate::gate::ActiveGate;
    pub use crate::options::SocketOptions;
    pub use crate::pool::Pool;
    pub use crate::reconnect::ReconnectState;
}
