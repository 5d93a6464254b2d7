//! This crate provides common types for working with the faultline protocol
//! or the faultline server. It's used by the faultline client crate as well
//! as the tooling that speaks the ingestion wire format.
//!
//! Most notably it exposes the [`protocol`] module with the event, session
//! and envelope types, as well as [`Dsn`] handling for client keys.
#![warn(missing_docs)]
#![deny(unsafe_code)]

mod auth;
mod dsn;
mod project_id;
pub mod utils;

pub mod protocol;

pub use crate::auth::{Auth, ParseAuthError};
pub use crate::dsn::{Dsn, ParseDsnError, Scheme};
pub use crate::project_id::{ParseProjectIdError, ProjectId};

pub use url::Url;
pub use uuid::{Uuid, Variant as UuidVariant, Version as UuidVersion};

/// Generates a new random v4 [`Uuid`].
///
/// This goes through `rand` rather than the `uuid` crate's own entropy
/// gathering so that all randomness the crate consumes is drawn from one
/// source.
pub fn random_uuid() -> Uuid {
    let bytes: [u8; 16] = rand::random();
    uuid::Builder::from_random_bytes(bytes).into_uuid()
}
