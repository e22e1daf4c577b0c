//! Platform location sources for the nearby client.
//!
//! The tracker only sees the [`LocationProvider`] trait. Two concrete sources
//! exist: [`IpLocator`], which geolocates the machine's public address via
//! IpApi, and [`FixedLocator`], which always answers with coordinates taken
//! from the config. [`LocationSource`] picks one at startup and also models
//! a user who opted out of sharing.
//!
//! Providers never enforce timeouts themselves; the caller wraps each
//! acquisition in [`PositionOptions::timeout`].

use crate::config::{LocationConfig, ProviderKind};
use crate::error::LocationError;
use crate::models::{Fix, PositionOptions};
use chrono::Utc;
use ipgeolocate::{Locator, Service};
use std::future::Future;
use tracing::{debug, info, warn};

/// Anything that can answer "where am I right now".
pub trait LocationProvider: Send + Sync {
    fn current_position(
        &self,
        options: PositionOptions,
    ) -> impl Future<Output = Result<Fix, LocationError>> + Send;
}

/// Resolves the user's approximate location via IP geolocation.
///
/// Accuracy options are accepted but meaningless here; IpApi always answers
/// at city granularity.
#[derive(Debug, Clone, Default)]
pub struct IpLocator {
    ip: String,
}

impl IpLocator {
    pub fn new(ip: impl Into<String>) -> Self {
        Self { ip: ip.into() }
    }
}

impl LocationProvider for IpLocator {
    async fn current_position(&self, options: PositionOptions) -> Result<Fix, LocationError> {
        debug!(high_accuracy = options.high_accuracy, "Querying IpApi");
        match Locator::get(&self.ip, Service::IpApi).await {
            Ok(loc) => {
                // A field that fails to parse stays empty; the tracker treats
                // an incomplete fix as an unavailable position.
                let latitude = loc.latitude.parse::<f64>().ok();
                let longitude = loc.longitude.parse::<f64>().ok();
                info!("Geolocation successful - ({:?}, {:?})", latitude, longitude);
                Ok(Fix {
                    latitude,
                    longitude,
                    accuracy_m: None,
                    timestamp: Utc::now(),
                })
            }
            Err(e) => {
                warn!("Error using geolocation service: {}", e);
                Err(LocationError::PositionUnavailable(e.to_string()))
            }
        }
    }
}

/// Always reports the same coordinates.
#[derive(Debug, Clone, Copy)]
pub struct FixedLocator {
    latitude: f64,
    longitude: f64,
}

impl FixedLocator {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

impl LocationProvider for FixedLocator {
    async fn current_position(&self, _options: PositionOptions) -> Result<Fix, LocationError> {
        Ok(Fix {
            accuracy_m: Some(0.0),
            ..Fix::new(self.latitude, self.longitude)
        })
    }
}

/// Provider selected from `[location]` in config.toml.
#[derive(Debug, Clone)]
pub enum LocationSource {
    Ip(IpLocator),
    Manual(FixedLocator),
    /// The user opted out; every request is refused.
    Disabled,
}

impl LocationSource {
    pub fn from_config(config: &LocationConfig) -> Self {
        if !config.share_location {
            return LocationSource::Disabled;
        }
        match config.provider {
            ProviderKind::Ip => LocationSource::Ip(IpLocator::new(config.lookup_ip.clone())),
            ProviderKind::Manual => {
                LocationSource::Manual(FixedLocator::new(config.manual_lat, config.manual_lon))
            }
        }
    }
}

impl LocationProvider for LocationSource {
    async fn current_position(&self, options: PositionOptions) -> Result<Fix, LocationError> {
        match self {
            LocationSource::Ip(p) => p.current_position(options).await,
            LocationSource::Manual(p) => p.current_position(options).await,
            LocationSource::Disabled => Err(LocationError::PermissionDenied),
        }
    }
}
