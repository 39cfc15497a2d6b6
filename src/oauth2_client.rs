// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # OAuth2 Client
//!
//! Access-token handling for the Wahoo API. [`TokenManager`] keeps the token
//! pair in the local database and refreshes the access token when it is
//! about to expire; [`StaticToken`] serves a fixed token.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::constants::limits::TOKEN_REFRESH_MARGIN_SECS;
use crate::constants::wahoo_api::{AUTHORIZE_PATH, DEFAULT_SCOPES, TOKEN_PATH};
use crate::database::Database;
use crate::models::StoredTokens;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("no refresh token available; authorize the application first")]
    MissingRefreshToken,

    #[error("token endpoint returned {status}: {body}")]
    Refresh { status: u16, body: String },

    #[error("token request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid OAuth URL: {0}")]
    Url(#[from] url::ParseError),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Source of bearer tokens for API calls
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String, TokenError>;
}

/// Fixed token, for scripts and tests
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

#[async_trait]
impl AccessTokenProvider for StaticToken {
    async fn access_token(&self) -> Result<String, TokenError> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuth2Config {
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub token_url: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
}

impl OAuth2Config {
    /// Endpoints of the Wahoo authorization server at `api_base`
    pub fn wahoo(client_id: &str, client_secret: &str, redirect_uri: &str, api_base: &str) -> Self {
        let api_base = api_base.trim_end_matches('/');
        Self {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            auth_url: format!("{api_base}{AUTHORIZE_PATH}"),
            token_url: format!("{api_base}{TOKEN_PATH}"),
            redirect_uri: redirect_uri.to_string(),
            scopes: DEFAULT_SCOPES.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: i64,
    /// Unix seconds at which the token was issued
    created_at: Option<i64>,
}

impl TokenResponse {
    fn expires_at(&self) -> DateTime<Utc> {
        let issued = self
            .created_at
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or_else(Utc::now);
        issued + Duration::seconds(self.expires_in)
    }
}

/// Token pair persisted in the `tokens` table, refreshed on demand
pub struct TokenManager {
    config: OAuth2Config,
    db: Database,
    client: reqwest::Client,
}

impl TokenManager {
    pub fn new(config: OAuth2Config, db: Database) -> Self {
        Self {
            config,
            db,
            client: reqwest::Client::new(),
        }
    }

    /// URL the athlete visits to grant access
    pub fn authorization_url(&self, state: &str) -> Result<String, TokenError> {
        let mut url = Url::parse(&self.config.auth_url)?;

        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.config.scopes.join(" "))
            .append_pair("state", state);

        Ok(url.to_string())
    }

    /// Exchange an authorization code for the first token pair and store it
    pub async fn exchange_code(&self, code: &str) -> Result<StoredTokens, TokenError> {
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];

        let response = self.request_token(&params).await?;
        let tokens = StoredTokens {
            access_token: response.access_token.clone(),
            access_token_expires_at: response.expires_at(),
            refresh_token: response.refresh_token.ok_or(TokenError::MissingRefreshToken)?,
        };
        self.db.store_tokens(&tokens).await?;

        info!("Authorization code exchanged, token valid until {}", tokens.access_token_expires_at);
        Ok(tokens)
    }

    /// Refresh the access token and store the new pair
    pub async fn refresh(&self, refresh_token: &str) -> Result<StoredTokens, TokenError> {
        if refresh_token.is_empty() {
            return Err(TokenError::MissingRefreshToken);
        }

        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];

        let response = self.request_token(&params).await?;
        let tokens = StoredTokens {
            access_token: response.access_token.clone(),
            access_token_expires_at: response.expires_at(),
            // Keep the old refresh token when the server does not rotate it
            refresh_token: response.refresh_token.unwrap_or_else(|| refresh_token.to_string()),
        };
        self.db.store_tokens(&tokens).await?;

        info!("Access token refreshed successfully");
        Ok(tokens)
    }

    async fn request_token(&self, params: &[(&str, &str)]) -> Result<TokenResponse, TokenError> {
        let response = self.client.post(&self.config.token_url).form(params).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %body, "Token request rejected");
            return Err(TokenError::Refresh {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl AccessTokenProvider for TokenManager {
    async fn access_token(&self) -> Result<String, TokenError> {
        let stored = self.db.get_tokens().await?;

        match stored {
            Some(tokens) if !tokens.is_expired(TOKEN_REFRESH_MARGIN_SECS) => Ok(tokens.access_token),
            Some(tokens) => Ok(self.refresh(&tokens.refresh_token).await?.access_token),
            None => Err(TokenError::MissingRefreshToken),
        }
    }
}
