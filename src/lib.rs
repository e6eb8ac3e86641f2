//! Zone Crab
//!
//! Manages the configuration of a [BIND] server that is authoritative for a root origin and
//! hands out one delegated sub-zone per user. Users edit their zone file through an HTTP API
//! behind an authenticating proxy, or update a single `A` record with a token, dyndns style.
//!
//! Every user edit is checked with `named-checkzone` and only kept if `named` reloads it
//! cleanly; otherwise the previous zone is put back.
//!
//! [BIND]: https://www.isc.org/bind/
//!
#![warn(clippy::pedantic)]

pub mod api;
pub mod config;
pub mod error;
pub mod named;
pub mod public_ip;
pub mod template;
pub mod token_store;
pub mod zone;

pub use api::new as new_http;
pub use config::{Config, Shared};
pub use named::NamedProcess;
pub use token_store::FileTokenStore;
pub use zone::{SharedZoneManager, ZoneManager};
