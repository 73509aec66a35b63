use anyhow::Result;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::auth::oauth::{self, GMAIL_READONLY_SCOPE, Tokens};
use crate::auth::token_store::{self, TokenBlob};
use crate::config::{self, Config};

/// The two ways a credential can be (re)obtained. Split out as a trait so the
/// acquisition policy below can be exercised without touching Google.
pub trait TokenSource {
    /// Exchange a refresh token for a fresh access token.
    fn refresh(&self, refresh_token: &str) -> Result<Tokens>;

    /// Full interactive authorization (browser + loopback redirect).
    fn reauthorize(&self) -> Result<Tokens>;
}

#[derive(Clone)]
pub struct TokenManager {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    tokens_path: PathBuf,
}

impl TokenManager {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let creds_path = config::resolve_credentials_path(cfg)?;
        let secrets = token_store::load_client_secrets(&creds_path)?;

        let client_secret = secrets
            .installed
            .client_secret
            .or_else(|| std::env::var("OAUTH_CLIENT_SECRET").ok());

        Ok(Self {
            client_id: secrets.installed.client_id,
            client_secret,
            redirect_uri: cfg.redirect_uri(),
            tokens_path: config::tokens_path()?,
        })
    }

    /// Returns a valid access token; refreshes or reauthorizes if needed and
    /// rewrites the persisted blob whenever the credential changed.
    pub fn get_access_token(&self) -> Result<String> {
        let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as i64;
        let cached = token_store::load_tokens(&self.tokens_path)?;

        if let Some(blob) = &cached
            && let Some(at) = blob.valid_access_token(now)
        {
            return Ok(at.to_string());
        }

        let prior_refresh = cached.as_ref().and_then(|b| b.refresh_token.clone());
        let tokens = acquire(self, prior_refresh.as_deref())?;

        // A refresh response may omit the refresh token; keep the prior one.
        let blob = TokenBlob {
            access_token: Some(tokens.access_token.clone()),
            refresh_token: tokens.refresh_token.clone().or(prior_refresh),
            expires_at_epoch: Some(expiry_epoch(now, tokens.expires_in)),
        };
        token_store::save_tokens(&self.tokens_path, &blob)?;

        Ok(tokens.access_token)
    }
}

impl TokenSource for TokenManager {
    fn refresh(&self, refresh_token: &str) -> Result<Tokens> {
        oauth::refresh_access_token(&self.client_id, self.client_secret.as_deref(), refresh_token)
    }

    fn reauthorize(&self) -> Result<Tokens> {
        oauth::perform_pkce_flow(
            &self.client_id,
            self.client_secret.as_deref(),
            &self.redirect_uri,
            GMAIL_READONLY_SCOPE,
        )
    }
}

/// Acquisition policy once the cache has missed: refresh when a refresh token
/// is at hand, falling back to interactive reauthorization when the refresh
/// is rejected or absent.
fn acquire(source: &dyn TokenSource, refresh_token: Option<&str>) -> Result<Tokens> {
    if let Some(rt) = refresh_token {
        match source.refresh(rt) {
            Ok(t) => return Ok(t),
            Err(e) => {
                eprintln!("Refresh failed: {e}, falling back to interactive auth");
            }
        }
    }
    source.reauthorize()
}

fn expiry_epoch(now: i64, expires_in: Option<u64>) -> i64 {
    // When the provider omits expires_in, assume just under the usual hour.
    expires_in.map(|s| now + s as i64).unwrap_or(now + 3500)
}
