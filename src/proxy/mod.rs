//! Proxy handling for outbound requests
//!
//! This module provides functionality for:
//! - Parsing proxy lists in the common text formats
//! - Checking proxy validity concurrently
//! - Rotating requests across a pool of proxies and evicting dead ones
//! - Filtering proxies by country

pub mod checker;
pub mod geo;
pub mod models;
pub mod parser;
pub mod pool;

pub use checker::{CheckerConfig, ProxyChecker};
pub use geo::{GeoLocation, GeoLocator};
pub use models::{Proxy, ProxyAuth, ProxyCheckResult, ProxyCheckStatus, ProxyType};
pub use parser::ProxyParser;
pub use pool::{ProxyPool, ProxyStats, RotationStrategy};
