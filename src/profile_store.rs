//! User profile lookup. Profiles are owned by an external store; this service
//! only reads one snapshot per request.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::UserMedicalProfile;

#[derive(Error, Debug)]
pub enum ProfileLookupError {
    #[error("Profile store connection failed: {0}")]
    Connection(String),

    #[error("Profile store returned HTTP {0}")]
    Status(u16),

    #[error("Profile parsing error: {0}")]
    ResponseParsing(String),
}

/// Fetch-by-id over the profile store. `Ok(None)` means not found.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn fetch_profile(
        &self,
        user_id: &str,
    ) -> Result<Option<UserMedicalProfile>, ProfileLookupError>;
}

/// REST profile store: `GET {base_url}/{user_id}`.
pub struct HttpProfileStore {
    base_url: String,
    client: reqwest::Client,
}

impl HttpProfileStore {
    pub fn new(base_url: &str, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }
}

#[async_trait]
impl ProfileStore for HttpProfileStore {
    async fn fetch_profile(
        &self,
        user_id: &str,
    ) -> Result<Option<UserMedicalProfile>, ProfileLookupError> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| ProfileLookupError::Connection(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| ProfileLookupError::Connection("base URL cannot have a path".into()))?
            .push(user_id);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProfileLookupError::Connection(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ProfileLookupError::Status(status.as_u16()));
        }

        response
            .json::<UserMedicalProfile>()
            .await
            .map(Some)
            .map_err(|e| ProfileLookupError::ResponseParsing(e.to_string()))
    }
}

/// Store used when no profile backend is configured: every lookup misses.
pub struct NoProfileStore;

#[async_trait]
impl ProfileStore for NoProfileStore {
    async fn fetch_profile(
        &self,
        _user_id: &str,
    ) -> Result<Option<UserMedicalProfile>, ProfileLookupError> {
        Ok(None)
    }
}

/// Fixed set of profiles keyed by user id.
#[derive(Default)]
pub struct InMemoryProfileStore {
    profiles: HashMap<String, UserMedicalProfile>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(mut self, user_id: &str, profile: UserMedicalProfile) -> Self {
        self.profiles.insert(user_id.to_string(), profile);
        self
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn fetch_profile(
        &self,
        user_id: &str,
    ) -> Result<Option<UserMedicalProfile>, ProfileLookupError> {
        Ok(self.profiles.get(user_id).cloned())
    }
}

/// Shared HTTP client for collaborator adapters. Only the connect phase is
/// bounded; request deadlines belong to the hosting transport.
pub fn collaborator_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Falling back to default HTTP client");
            reqwest::Client::new()
        })
}
