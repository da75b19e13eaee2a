//! Proxy geolocation backed by a MaxMind database
//!
//! Used to keep only proxies that exit from a given country, which matters
//! for sites serving region-specific Malayalam content.

use crate::proxy::models::Proxy;
use crate::Result;
use maxminddb::{geoip2, Reader};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Where an IP address is located
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GeoLocation {
    /// ISO 3166-1 alpha-2 country code (e.g., "IN")
    pub country_code: Option<String>,
    pub country_name: Option<String>,
    pub city_name: Option<String>,
}

impl GeoLocation {
    pub fn with_country(country_code: Option<String>, country_name: Option<String>) -> Self {
        Self {
            country_code,
            country_name,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.country_code.is_none() && self.country_name.is_none() && self.city_name.is_none()
    }

    /// Case-insensitive match against an ISO country code
    pub fn is_in(&self, country_code: &str) -> bool {
        self.country_code
            .as_deref()
            .is_some_and(|cc| cc.eq_ignore_ascii_case(country_code))
    }
}

impl std::fmt::Display for GeoLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.city_name, &self.country_code) {
            (Some(city), Some(cc)) => write!(f, "{}, {}", city, cc),
            (None, Some(cc)) => write!(f, "{}", cc),
            (Some(city), None) => write!(f, "{}", city),
            (None, None) => write!(f, "Unknown"),
        }
    }
}

/// Looks up proxy hosts in an MMDB file
pub struct GeoLocator {
    reader: Arc<Reader<Vec<u8>>>,
}

impl GeoLocator {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = Reader::open_readfile(path)?;
        Ok(Self {
            reader: Arc::new(reader),
        })
    }

    /// Look up an IP address given as a string; host names are not resolved
    pub fn lookup(&self, ip_str: &str) -> Result<GeoLocation> {
        let ip: IpAddr = ip_str.parse()?;
        let lookup_result = self.reader.lookup(ip)?;
        let city: Option<geoip2::City> = lookup_result.decode()?;

        let Some(city) = city else {
            return Ok(GeoLocation::default());
        };

        Ok(GeoLocation {
            country_code: city.country.iso_code.map(String::from),
            country_name: city.country.names.english.map(String::from),
            city_name: city.city.names.english.map(String::from),
        })
    }

    /// Keep the proxies located in `country_code`; unknown locations are dropped
    pub fn filter_by_country(&self, proxies: Vec<Proxy>, country_code: &str) -> Vec<Proxy> {
        proxies
            .into_iter()
            .filter(|proxy| match self.lookup(&proxy.host) {
                Ok(location) => location.is_in(country_code),
                Err(e) => {
                    debug!(proxy = %proxy, error = %e, "No location for proxy");
                    false
                }
            })
            .collect()
    }
}

impl Clone for GeoLocator {
    fn clone(&self) -> Self {
        Self {
            reader: Arc::clone(&self.reader),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geo_location_default() {
        let loc = GeoLocation::default();
        assert!(loc.is_empty());
        assert_eq!(loc.to_string(), "Unknown");
        assert!(!loc.is_in("IN"));
    }

    #[test]
    fn test_geo_location_country_match() {
        let loc = GeoLocation::with_country(Some("IN".to_string()), Some("India".to_string()));
        assert!(loc.is_in("in"));
        assert!(loc.is_in("IN"));
        assert!(!loc.is_in("US"));
    }

    #[test]
    fn test_geo_location_display() {
        let mut loc = GeoLocation::with_country(Some("IN".to_string()), None);
        assert_eq!(loc.to_string(), "IN");
        loc.city_name = Some("Kochi".to_string());
        assert_eq!(loc.to_string(), "Kochi, IN");
    }

    #[test]
    fn test_missing_database() {
        assert!(GeoLocator::from_path("/nonexistent/GeoLite2-City.mmdb").is_err());
    }
}
