//! HTTP transport for the vendor cloud API
//!
//! The service only depends on the [`HttpTransport`] trait; the production
//! implementation is backed by reqwest.

pub mod http;
#[cfg(test)]
pub(crate) mod mock;
pub mod traits;

pub use http::ReqwestTransport;
pub use traits::{HeaderObserver, HttpRequest, HttpResponse, HttpTransport, TransportError};
