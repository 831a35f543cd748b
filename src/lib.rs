//! Control plane for zones served by CoreDNS.
//!
//! Zones live as plain zone files next to a Corefile that lists them. The
//! [`service::ZoneService`] keeps the two in step while zones and address
//! records are created and removed, and [`http_server`] exposes it over HTTP.

pub mod config;
pub mod error;
pub mod http_server;
pub mod problem;
pub mod registry;
pub mod service;
pub mod store;
pub mod validation;
pub mod zone;

pub use error::{ConfigError, ServiceError};
pub use service::ZoneService;
