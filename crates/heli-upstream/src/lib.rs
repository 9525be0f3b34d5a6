//! Upstream ADS-B providers behind one adapter contract.
//!
//! Adapters shape the query for their provider, authenticate, retry transient
//! failures and hand back normalized, classified [`heli_core::FlightRecord`]s.

pub mod adapter;
pub mod adsbfi;
pub mod backoff;
pub mod error;
pub mod normalize;
pub mod opensky;
pub mod token;

pub use adapter::{HttpSettings, ProviderKind, QueryCapability, QueryShape, Snapshot, UpstreamAdapter};
pub use adsbfi::AdsbFiAdapter;
pub use backoff::{retry_with_backoff, Backoff, RetryPolicy};
pub use error::UpstreamError;
pub use opensky::{OpenSkyAdapter, OpenSkyAuth};
pub use token::{ClientCredentials, TokenSource, TokenStore};
