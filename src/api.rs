use crate::config::BackendConfig;
use crate::cookies::cookie_value;
use crate::error::ApiError;
use crate::models::{AuthResponse, Coordinate, GoogleAuthRequest, NearbyUser};
use crate::reporter::LocationSink;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::multipart::Form;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};
use url::Url;

pub const XSRF_COOKIE: &str = "XSRF-TOKEN";
pub const XSRF_HEADER: &str = "X-XSRF-TOKEN";

/// HTTP client for the matching backend.
///
/// The session cookie lives in the cookie jar and is replayed by reqwest on
/// every request; this type never reads it. The only cookie it looks at is
/// the non-HTTP-only `XSRF-TOKEN`, which gets echoed back as a header.
pub struct BackendClient {
    client: Client,
    jar: Arc<Jar>,
    base: Url,
    bearer: RwLock<Option<String>>,
}

impl BackendClient {
    pub fn new(config: &BackendConfig) -> Result<Self, ApiError> {
        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .timeout(config.request_timeout())
            .cookie_provider(jar.clone())
            .build()?;

        // Endpoints are joined relative to the base, so keep any path prefix
        // (e.g. `https://host/app`) by making it a directory.
        let mut base = Url::parse(&config.base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            client,
            jar,
            base,
            bearer: RwLock::new(None),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Seeds the jar, e.g. with cookies persisted from an earlier run.
    pub fn add_cookie(&self, cookie: &str) {
        self.jar.add_cookie_str(cookie, &self.base);
    }

    pub fn set_bearer(&self, token: Option<String>) {
        *self.bearer.write().unwrap_or_else(PoisonError::into_inner) = token;
    }

    fn bearer_token(&self) -> Option<String> {
        self.bearer.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Current CSRF token from the jar, if the backend has issued one.
    pub fn xsrf_token(&self) -> Option<String> {
        let header = self.jar.cookies(&self.base)?;
        let header = header.to_str().ok()?;
        cookie_value(header, XSRF_COOKIE)
    }

    fn authorize(&self, mut req: RequestBuilder, state_changing: bool) -> RequestBuilder {
        if let Some(token) = self.bearer_token() {
            req = req.bearer_auth(token);
        }
        if state_changing {
            match self.xsrf_token() {
                Some(token) => req = req.header(XSRF_HEADER, token),
                None => debug!("No {} cookie present; sending without CSRF header", XSRF_COOKIE),
            }
        }
        req
    }

    fn check(res: Response) -> Result<Response, ApiError> {
        let status = res.status();
        if status.is_success() {
            Ok(res)
        } else {
            Err(ApiError::from_status(status))
        }
    }

    /// Posts the device's position to `/api/location/update`.
    pub async fn report_location(&self, coordinate: Coordinate) -> Result<(), ApiError> {
        let url = self.base.join("api/location/update")?;
        let req = self.authorize(self.client.post(url).json(&coordinate), true);
        Self::check(req.send().await?)?;
        debug!("Location update accepted for {}", coordinate);
        Ok(())
    }

    /// Exchanges a Google OAuth access token for an app session.
    pub async fn login_with_google(&self, access_token: &str) -> Result<AuthResponse, ApiError> {
        let url = self.base.join("api/auth/google")?;
        let res = self
            .client
            .post(url)
            .json(&GoogleAuthRequest { access_token })
            .send()
            .await?;
        let body: serde_json::Value = Self::check(res)?.json().await?;

        let auth: AuthResponse = serde_json::from_value(body).map_err(|e| {
            ApiError::InvalidResponse(format!("expected {{ token, user }}: {}", e))
        })?;
        if auth.token.is_empty() {
            return Err(ApiError::InvalidResponse("empty token".to_string()));
        }

        self.set_bearer(Some(auth.token.clone()));
        info!("Backend login successful for {}", auth.user.display_name());
        Ok(auth)
    }

    /// Fetches the discovery feed for the current position.
    pub async fn fetch_nearby(&self) -> Result<Vec<NearbyUser>, ApiError> {
        let url = self.base.join("api/users/nearby")?;
        let res = Self::check(self.authorize(self.client.get(url), false).send().await?)?;

        if res.status() == StatusCode::NO_CONTENT {
            info!("No nearby users found (204 No Content).");
            return Ok(Vec::new());
        }

        let body: serde_json::Value = res.json().await?;
        Ok(parse_nearby(body))
    }

    /// Replaces the signed-in user's bio. Sent as `multipart/form-data`, the
    /// same shape the profile form posts; the picture part is not supported.
    pub async fn update_profile(&self, bio: &str) -> Result<(), ApiError> {
        let url = self.base.join("api/users/me/profile")?;
        let form = Form::new().text("bio", bio.to_string());
        let req = self.authorize(self.client.post(url).multipart(form), true);
        Self::check(req.send().await?)?;
        info!("Profile updated ({} characters of bio)", bio.chars().count());
        Ok(())
    }
}

impl LocationSink for BackendClient {
    async fn report(&self, coordinate: Coordinate) -> Result<(), ApiError> {
        self.report_location(coordinate).await
    }
}

fn parse_nearby(body: serde_json::Value) -> Vec<NearbyUser> {
    if !body.is_array() {
        warn!("Nearby users response was not an array; treating as empty");
        return Vec::new();
    }
    match serde_json::from_value(body) {
        Ok(users) => users,
        Err(e) => {
            warn!("Could not decode nearby users: {}", e);
            Vec::new()
        }
    }
}
