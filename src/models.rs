use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A point on the Earth's surface in decimal degrees (WGS84).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Great-circle distance to `other` in meters.
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        crate::geo::haversine_meters(self, other)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.5}, {:.5})", self.latitude, self.longitude)
    }
}

/// Raw reading handed back by a location provider.
///
/// Providers may fail to fill in either axis (e.g. an unparsable field from a
/// geolocation service), so both are optional until converted into a
/// [`Coordinate`].
#[derive(Debug, Clone, PartialEq)]
pub struct Fix {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub accuracy_m: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl Fix {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude: Some(latitude),
            longitude: Some(longitude),
            accuracy_m: None,
            timestamp: Utc::now(),
        }
    }

    /// Returns the coordinate if both axes are present and finite.
    pub fn coordinate(&self) -> Option<Coordinate> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite() => {
                Some(Coordinate::new(lat, lon))
            }
            _ => None,
        }
    }
}

/// Lifecycle of the device's consent to share location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    #[default]
    Idle,
    Requesting,
    Granted,
    Denied,
    Error,
}

impl fmt::Display for PermissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PermissionState::Idle => "idle",
            PermissionState::Requesting => "requesting",
            PermissionState::Granted => "granted",
            PermissionState::Denied => "denied",
            PermissionState::Error => "error",
        };
        f.write_str(s)
    }
}

/// Options forwarded to the platform location API on each acquisition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionOptions {
    pub timeout: std::time::Duration,
    pub high_accuracy: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl User {
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or("unknown user")
    }
}

/// Body returned by `POST /api/auth/google`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GoogleAuthRequest<'a> {
    pub access_token: &'a str,
}

/// A candidate shown in the discovery feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyUser {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub goal: Option<String>,
    #[serde(default)]
    pub distance: Option<String>,
    #[serde(default)]
    pub pic: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fix_with_missing_axis_has_no_coordinate() {
        let mut fix = Fix::new(40.0, -74.0);
        assert_eq!(fix.coordinate(), Some(Coordinate::new(40.0, -74.0)));

        fix.longitude = None;
        assert_eq!(fix.coordinate(), None);

        fix.longitude = Some(f64::NAN);
        assert_eq!(fix.coordinate(), None);
    }

    #[test]
    fn coordinate_serializes_as_lat_lon_object() {
        let body = serde_json::to_value(Coordinate::new(40.0009, -74.0)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "latitude": 40.0009, "longitude": -74.0 })
        );
    }

    #[test]
    fn nearby_user_tolerates_sparse_payloads() {
        let user: NearbyUser = serde_json::from_str(r#"{"id":"4","name":"Diana E."}"#).unwrap();
        assert_eq!(user.name.as_deref(), Some("Diana E."));
        assert!(user.goal.is_none());
    }

    #[test]
    fn permission_state_uses_lowercase_names() {
        assert_eq!(PermissionState::Granted.to_string(), "granted");
        assert_eq!(
            serde_json::to_string(&PermissionState::Denied).unwrap(),
            "\"denied\""
        );
    }
}
