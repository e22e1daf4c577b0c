use crate::models::PermissionState;
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Failures from a platform location acquisition.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LocationError {
    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Location information is unavailable: {0}")]
    PositionUnavailable(String),

    #[error("The request to get user location timed out after {0:?}")]
    Timeout(Duration),

    #[error("An unknown error occurred while getting location: {0}")]
    Unknown(String),
}

impl LocationError {
    /// Permission state this failure demotes the gate to.
    pub fn permission_state(&self) -> PermissionState {
        match self {
            LocationError::PermissionDenied => PermissionState::Denied,
            _ => PermissionState::Error,
        }
    }

    /// Whether another attempt shortly after could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LocationError::Timeout(_) | LocationError::PositionUnavailable(_)
        )
    }
}

/// Failures talking to the backend.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Backend rejected credentials ({0})")]
    Unauthorized(StatusCode),

    #[error("Backend returned {0}")]
    Status(StatusCode),

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid backend URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Invalid response from backend: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    /// 401/403 responses invalidate the session.
    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::Unauthorized(_))
    }

    pub(crate) fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Unauthorized(status),
            other => ApiError::Status(other),
        }
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session data is corrupt: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_explicit_refusal_maps_to_denied() {
        assert_eq!(
            LocationError::PermissionDenied.permission_state(),
            PermissionState::Denied
        );
        assert_eq!(
            LocationError::Timeout(Duration::from_secs(10)).permission_state(),
            PermissionState::Error
        );
        assert_eq!(
            LocationError::Unknown("boom".into()).permission_state(),
            PermissionState::Error
        );
    }

    #[test]
    fn timeouts_are_transient_denials_are_not() {
        assert!(LocationError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(LocationError::PositionUnavailable("no fix".into()).is_transient());
        assert!(!LocationError::PermissionDenied.is_transient());
        assert!(!LocationError::Unknown("?".into()).is_transient());
    }

    #[test]
    fn forbidden_and_unauthorized_are_auth_errors() {
        assert!(ApiError::from_status(StatusCode::UNAUTHORIZED).is_auth());
        assert!(ApiError::from_status(StatusCode::FORBIDDEN).is_auth());
        assert!(!ApiError::from_status(StatusCode::INTERNAL_SERVER_ERROR).is_auth());
    }
}
