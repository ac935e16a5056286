//! Core library for the `skycast` weather/location lookup app.
//!
//! This crate defines:
//! - The shared HTTP dispatch layer (in-flight de-duplication + transparent
//!   retry of transient failures)
//! - Thin clients for the two upstream services (LocationIQ geocoding,
//!   OpenWeather conditions/forecast)
//! - Configuration & credentials handling
//!
//! It is used by `skycast-cli`, but can also be reused by other binaries or
//! services.

pub mod config;
pub mod dispatch;
pub mod model;
pub mod service;

pub use config::{Config, ServiceConfig};
pub use dispatch::{DispatchError, Dispatcher, RequestDescriptor, Transport};
pub use model::Coordinates;
pub use service::{ServiceId, locationiq_from_config, openweather_from_config};
