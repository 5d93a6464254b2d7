//! This crate provides the core of the faultline SDK, which can be used to
//! log events and errors.
//!
//! `faultline-core` is meant for integration authors and third-party library
//! authors that want to instrument their code.
//!
//! Regular users who wish to integrate the SDK into their applications
//! should instead use the `faultline` crate, which comes with a default
//! transport and the panic integration.
//!
//! # Core Concepts
//!
//! This crate is centered around the concepts of [`Client`], [`Hub`] and
//! [`Scope`], as well as the extension points via the [`Integration`],
//! [`Transport`] and [`TransportFactory`] traits.
//!
//! # Parallelism, Concurrency and Async
//!
//! The main concurrency primitive is the [`Hub`]. In general, all concurrent
//! code, no matter if multithreaded parallelism or futures concurrency,
//! needs to run with its own copy of a [`Hub`].
//!
//! For threads or tasks that are running concurrently or outlive the
//! current execution context, a new hub needs to be derived and bound for
//! the computation:
//!
//! ```rust
//! use std::sync::Arc;
//! use faultline_core::Hub;
//!
//! // Spawned thread that is being joined:
//! let hub = Arc::new(Hub::new_from_top(Hub::current()));
//! let result = std::thread::spawn(|| Hub::run(hub, || 1_u32)).join();
//!
//! assert_eq!(result.unwrap(), 1);
//! ```
//!
//! # Features
//!
//! - `feature = "test"`: Activates the [`test`] module, which can be used to
//!   write integration tests. It comes with a test transport which can
//!   capture all sent envelopes for inspection.
//! - `feature = "debug-logs"`: Uses the `log` crate for diagnostic output,
//!   instead of printing to stderr.
#![warn(missing_docs)]

// macros; these need to be first to be used by other modules
#[macro_use]
#[doc(hidden)]
pub mod macros;

mod api;
mod breadcrumbs;
mod client;
mod clientoptions;
mod constants;
mod error;
mod hint;
mod hub;
mod hub_impl;
mod integration;
mod intodsn;
mod scope;
mod session;
mod transport;
pub mod utils;

// public api or exports from this crate
pub use crate::api::*;
pub use crate::breadcrumbs::IntoBreadcrumbs;
pub use crate::client::Client;
pub use crate::clientoptions::{BeforeCallback, ClientOptions};
pub use crate::constants::VERSION;
pub use crate::error::{capture_error, event_from_error};
pub use crate::hint::{FlushSignal, Hint};
pub use crate::hub::Hub;
pub use crate::hub_impl::SwitchGuard;
pub use crate::integration::Integration;
pub use crate::intodsn::IntoDsn;
pub use crate::scope::{EventProcessor, Scope, ScopeGuard};
pub use crate::session::Session;
pub use crate::transport::{Transport, TransportFactory};

// test utilities
#[cfg(feature = "test")]
pub mod test;

// public api from other crates
#[doc(inline)]
pub use faultline_types as types;
pub use faultline_types::protocol::v1 as protocol;
pub use faultline_types::protocol::v1::{Breadcrumb, Envelope, Level, User};

#[cfg(feature = "debug-logs")]
#[doc(hidden)]
pub use log;
