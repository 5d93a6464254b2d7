//! The provided transports.
//!
//! This module exposes the delivery pipeline that is compiled into the
//! library: the rate limiter, the asynchronous connection with its bounded
//! worker queue, and the `ureq` based HTTP transport behind the
//! `transport` feature.

use std::sync::Arc;

use crate::{ClientOptions, Transport, TransportFactory};

mod connection;
mod ratelimit;
mod worker;

pub use connection::{
    AlwaysConnected, AsyncConnection, RequestOutcome, ResponsePolicy, SendRequest, TransportGate,
};
pub use ratelimit::{RateLimitCategory, RateLimiter};

#[cfg(feature = "transport")]
mod http;
#[cfg(feature = "transport")]
pub use http::UreqHttpTransport;

/// The default http transport.
#[cfg(feature = "transport")]
pub type HttpTransport = UreqHttpTransport;

/// Creates the default HTTP transport.
///
/// This is the default value for `transport` on the client options. It
/// creates an [`HttpTransport`]. If no http transport was compiled into
/// the library it will panic on transport creation.
#[derive(Clone)]
pub struct DefaultTransportFactory;

impl TransportFactory for DefaultTransportFactory {
    fn create_transport(&self, options: &ClientOptions) -> Arc<dyn Transport> {
        #[cfg(feature = "transport")]
        {
            Arc::new(HttpTransport::new(options))
        }
        #[cfg(not(feature = "transport"))]
        {
            let _ = options;
            panic!("faultline crate was compiled without a transport")
        }
    }
}
