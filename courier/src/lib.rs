//! Relays text, images, videos and community wall posts to a messaging
//! platform's RPC-style API.

pub mod api;
pub mod attachment;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod fetch;
pub mod metrics_defs;
pub mod transport;
pub mod upload;

#[cfg(any(test, feature = "testutils"))]
pub mod testutils;

pub use config::Credentials;
pub use dispatch::{Courier, VideoDelivery};
pub use errors::{Error, ErrorKind};
