//! Remote profile client
//!
//! Fetches the signed-in user's live profile, which carries the authoritative
//! `roles_permissions` list.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE},
    Client,
};
use serde::Deserialize;

use super::error::{check_response, json_with_limit, ClientError};
use crate::config::ApiConfig;
use crate::models::{Locale, UserProfile};

/// Source of the authoritative user profile
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProfileFetcher: Send + Sync {
    /// Fetch the profile for the bearer `token`
    async fn fetch_profile(&self, token: &str) -> Result<UserProfile, ClientError>;
}

/// The profile endpoint answers with either the bare object or a `data` envelope
#[derive(Deserialize)]
#[serde(untagged)]
enum ProfileEnvelope {
    Wrapped { data: UserProfile },
    Bare(UserProfile),
}

impl ProfileEnvelope {
    fn into_profile(self) -> UserProfile {
        match self {
            Self::Wrapped { data } | Self::Bare(data) => data,
        }
    }
}

/// HTTP client for the profile endpoint
#[derive(Debug, Clone)]
pub struct HttpProfileClient {
    profile_url: String,
    locale: Locale,
    client: Client,
}

impl HttpProfileClient {
    /// Create a client from the API configuration
    pub fn new(config: &ApiConfig, locale: Locale) -> Result<Self, ClientError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| ClientError::InvalidConfig(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self::with_client(config, locale, client))
    }

    /// Create a client reusing an existing connection pool
    #[must_use]
    pub fn with_client(config: &ApiConfig, locale: Locale, client: Client) -> Self {
        Self {
            profile_url: config.profile_url(),
            locale,
            client,
        }
    }

    #[must_use]
    pub fn profile_url(&self) -> &str {
        &self.profile_url
    }

    fn build_headers(&self) -> Result<HeaderMap, ClientError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_str(self.locale.as_str())?);
        Ok(headers)
    }
}

#[async_trait]
impl ProfileFetcher for HttpProfileClient {
    async fn fetch_profile(&self, token: &str) -> Result<UserProfile, ClientError> {
        if token.trim().is_empty() {
            return Err(ClientError::Unauthenticated);
        }

        tracing::debug!(url = %self.profile_url, "Fetching user profile");

        let response = self
            .client
            .get(&self.profile_url)
            .headers(self.build_headers()?)
            .bearer_auth(token)
            .send()
            .await?;

        let response = check_response(response)?;
        let envelope: ProfileEnvelope = json_with_limit(response).await?;
        Ok(envelope.into_profile())
    }
}
