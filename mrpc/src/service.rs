//! Service callback trait invoked by a server stream processor once a
//! request has been fully decoded.
//!
//! A `?Send` async trait object, since the runtime this crate targets
//! drives futures on a single-threaded io_uring executor per connection.

use crate::error::Result;
use mrpc_proto::Parameter;

#[async_trait::async_trait(?Send)]
pub trait Service {
    /// Handles one decoded request for `method_id` and returns the response
    /// parameters in the order the method's interface declares them.
    async fn call(&self, method_id: u8, request: Vec<Parameter>) -> Result<Vec<Parameter>>;
}

#[async_trait::async_trait(?Send)]
impl<F> Service for F
where
    F: Fn(u8, Vec<Parameter>) -> Result<Vec<Parameter>>,
{
    async fn call(&self, method_id: u8, request: Vec<Parameter>) -> Result<Vec<Parameter>> {
        self(method_id, request)
    }
}
