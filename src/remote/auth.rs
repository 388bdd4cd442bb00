//! Authentication against the remote storage provider
//!
//! Session establishment is a two-phase protocol so the core stays testable
//! without console interaction:
//! - phase 1 ([`Authenticator::begin_authorization`]) loads the OAuth client
//!   credentials and produces a [`PendingAuthorization`] carrying the URL
//!   the user must visit;
//! - phase 2 ([`PendingAuthorization::exchange`]) takes the authorization
//!   code, supplied by whatever [`CodeSource`] the caller injects, and
//!   trades it for a token.
//!
//! [`Authenticator::obtain_token`] wires the phases together with the
//! persisted-token and refresh shortcuts: a stored unexpired token wins, an
//! expired token with a refresh token is refreshed, and only then does the
//! interactive flow run.

use crate::config::{expand_tilde, RemoteSettings};
use anyhow::Result;
use chrono::Utc;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Scope requested from the storage provider: per-application file access
pub const SCOPE: &str = "https://www.googleapis.com/auth/drive.file";

/// Out-of-band redirect: the provider displays the code for manual entry
const REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";

/// Seconds subtracted from the reported lifetime so a token is refreshed
/// before it actually lapses mid-request
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("credentials file not found: {0} (download OAuth client credentials from the provider console)")]
    MissingCredentials(PathBuf),

    #[error("failed to read {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed credentials file {path}: {message}")]
    MalformedCredentials { path: PathBuf, message: String },

    #[error("invalid authorization endpoint: {0}")]
    BadEndpoint(String),

    #[error("authorization code exchange failed: {0}")]
    Exchange(String),

    #[error("token refresh failed: {0}")]
    Refresh(String),

    #[error("no authorization code supplied: {0}")]
    NoCode(String),

    #[error("token endpoint request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to persist token: {0}")]
    Persist(std::io::Error),
}

/// Supplies the authorization code for phase 2 of the interactive flow.
///
/// The binary prompts on the console; tests inject a canned code.
pub trait CodeSource {
    fn obtain_code(&self, authorize_url: &str) -> Result<String>;
}

/// OAuth client credentials, read from the configured credentials file.
/// Both the provider-console wrapper object (`{"installed": {...}}`) and a
/// flat object are accepted.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub auth_uri: String,
    pub token_uri: String,
}

#[derive(Debug, Deserialize)]
struct WrappedCredentials {
    installed: ClientCredentials,
}

/// A persisted session token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Unix timestamp after which the access token is considered stale
    pub expires_at: i64,
}

impl StoredToken {
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() >= self.expires_at
    }
}

/// Raw response from the token endpoint
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

impl TokenResponse {
    fn into_stored(self, prior_refresh: Option<String>) -> StoredToken {
        StoredToken {
            access_token: self.access_token,
            // The endpoint only returns a refresh token on the first
            // exchange; keep the prior one across refreshes.
            refresh_token: self.refresh_token.or(prior_refresh),
            expires_at: Utc::now().timestamp() + self.expires_in - EXPIRY_MARGIN_SECS,
        }
    }
}

/// Phase-1 handle: the URL to visit plus everything needed to complete the
/// code exchange.
pub struct PendingAuthorization {
    credentials: ClientCredentials,
    authorize_url: String,
}

impl PendingAuthorization {
    fn new(credentials: ClientCredentials) -> Result<Self, AuthError> {
        let authorize_url = build_authorize_url(&credentials)?;
        Ok(Self {
            credentials,
            authorize_url,
        })
    }

    /// The URL the user must visit to approve access
    pub fn authorize_url(&self) -> &str {
        &self.authorize_url
    }

    /// Phase 2: exchange an externally-supplied authorization code for a
    /// token.
    pub fn exchange(&self, http: &Client, code: &str) -> Result<StoredToken, AuthError> {
        let params = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", REDIRECT_URI),
            ("grant_type", "authorization_code"),
        ];

        let response = http
            .post(&self.credentials.token_uri)
            .form(&params)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(AuthError::Exchange(format!("status {}: {}", status, body)));
        }

        let token: TokenResponse = response
            .json()
            .map_err(|e| AuthError::Exchange(format!("unreadable token response: {}", e)))?;
        Ok(token.into_stored(None))
    }
}

fn build_authorize_url(credentials: &ClientCredentials) -> Result<String, AuthError> {
    let url = reqwest::Url::parse_with_params(
        &credentials.auth_uri,
        &[
            ("client_id", credentials.client_id.as_str()),
            ("redirect_uri", REDIRECT_URI),
            ("response_type", "code"),
            ("scope", SCOPE),
            ("access_type", "offline"),
            ("prompt", "consent"),
        ],
    )
    .map_err(|e| AuthError::BadEndpoint(format!("{}: {}", credentials.auth_uri, e)))?;
    Ok(url.into())
}

/// Manages stored tokens and the authorization flow for one remote account
pub struct Authenticator {
    credentials_file: PathBuf,
    token_file: PathBuf,
    http: Client,
}

impl Authenticator {
    pub fn new(settings: &RemoteSettings) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            credentials_file: expand_tilde(&settings.credentials_file),
            token_file: expand_tilde(&settings.token_file),
            http,
        }
    }

    /// Produce a usable token: stored, refreshed, or interactively obtained
    /// via `codes`. The credentials file is only touched once the stored
    /// token cannot be used as-is.
    pub fn obtain_token(&self, codes: &dyn CodeSource) -> Result<StoredToken, AuthError> {
        let stored = self.load_stored_token();

        if let Some(token) = &stored {
            if !token.is_expired() {
                return Ok(token.clone());
            }
        }

        let credentials = self.load_credentials()?;

        if let Some(token) = stored {
            if let Some(refresh_token) = token.refresh_token.clone() {
                info!("Refreshing expired session token");
                match self.refresh(&credentials, &refresh_token) {
                    Ok(refreshed) => {
                        self.persist(&refreshed)?;
                        return Ok(refreshed);
                    }
                    Err(e) => {
                        warn!("Token refresh failed, starting authorization flow: {}", e);
                    }
                }
            }
        }

        info!("No valid session token found, starting authorization flow");
        let pending = PendingAuthorization::new(credentials)?;
        let code = codes
            .obtain_code(pending.authorize_url())
            .map_err(|e| AuthError::NoCode(e.to_string()))?;
        let token = pending.exchange(&self.http, code.trim())?;
        self.persist(&token)?;
        Ok(token)
    }

    /// Phase 1, exposed for callers that drive the exchange themselves
    pub fn begin_authorization(&self) -> Result<PendingAuthorization, AuthError> {
        let credentials = self.load_credentials()?;
        PendingAuthorization::new(credentials)
    }

    fn load_stored_token(&self) -> Option<StoredToken> {
        if !self.token_file.exists() {
            return None;
        }
        match fs::read_to_string(&self.token_file) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(token) => Some(token),
                Err(e) => {
                    warn!(
                        "Ignoring unreadable token file {}: {}",
                        self.token_file.display(),
                        e
                    );
                    None
                }
            },
            Err(e) => {
                warn!(
                    "Ignoring unreadable token file {}: {}",
                    self.token_file.display(),
                    e
                );
                None
            }
        }
    }

    fn load_credentials(&self) -> Result<ClientCredentials, AuthError> {
        if !self.credentials_file.exists() {
            return Err(AuthError::MissingCredentials(self.credentials_file.clone()));
        }
        let contents =
            fs::read_to_string(&self.credentials_file).map_err(|source| AuthError::ReadError {
                path: self.credentials_file.clone(),
                source,
            })?;
        parse_credentials(&contents).map_err(|message| AuthError::MalformedCredentials {
            path: self.credentials_file.clone(),
            message,
        })
    }

    fn refresh(
        &self,
        credentials: &ClientCredentials,
        refresh_token: &str,
    ) -> Result<StoredToken, AuthError> {
        let params = [
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let response = self.http.post(&credentials.token_uri).form(&params).send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(AuthError::Refresh(format!("status {}: {}", status, body)));
        }

        let token: TokenResponse = response
            .json()
            .map_err(|e| AuthError::Refresh(format!("unreadable token response: {}", e)))?;
        Ok(token.into_stored(Some(refresh_token.to_string())))
    }

    fn persist(&self, token: &StoredToken) -> Result<(), AuthError> {
        if let Some(parent) = self.token_file.parent() {
            fs::create_dir_all(parent).map_err(AuthError::Persist)?;
        }
        let contents = serde_json::to_string_pretty(token)
            .map_err(|e| AuthError::Persist(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        fs::write(&self.token_file, contents).map_err(AuthError::Persist)?;
        info!("Session token saved to {}", self.token_file.display());
        Ok(())
    }
}

fn parse_credentials(contents: &str) -> Result<ClientCredentials, String> {
    if let Ok(wrapped) = serde_json::from_str::<WrappedCredentials>(contents) {
        return Ok(wrapped.installed);
    }
    serde_json::from_str::<ClientCredentials>(contents).map_err(|e| e.to_string())
}
