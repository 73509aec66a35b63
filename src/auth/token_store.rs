use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Token blob persisted at ~/.config/mailwatch/tokens.json.
/// Read at startup, rewritten after every refresh or reauthorization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBlob {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at_epoch: Option<i64>, // epoch seconds
}

impl TokenBlob {
    /// Cached access token, if it is still valid at `now`.
    pub fn valid_access_token(&self, now: i64) -> Option<&str> {
        match (&self.access_token, self.expires_at_epoch) {
            (Some(at), Some(exp)) if now < exp => Some(at),
            _ => None,
        }
    }
}

pub fn save_tokens(path: &Path, blob: &TokenBlob) -> Result<()> {
    let s = serde_json::to_string_pretty(blob)?;
    fs::write(path, s)?;
    Ok(())
}

pub fn load_tokens(path: &Path) -> Result<Option<TokenBlob>> {
    if !path.exists() {
        return Ok(None);
    }
    let s = fs::read_to_string(path)?;
    let blob: TokenBlob = serde_json::from_str(&s)?;
    Ok(Some(blob))
}

/// Google "installed application" client identity document (credentials.json).
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub installed: InstalledApp,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstalledApp {
    pub client_id: String,
    pub client_secret: Option<String>,
}

pub fn load_client_secrets(path: &Path) -> Result<ClientSecrets> {
    let s = fs::read_to_string(path).map_err(|e| {
        anyhow!(
            "could not read client credentials at {}: {e}",
            path.display()
        )
    })?;
    let secrets: ClientSecrets = serde_json::from_str(&s)
        .map_err(|e| anyhow!("malformed credentials document {}: {e}", path.display()))?;
    Ok(secrets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_access_token_respects_expiry() {
        let blob = TokenBlob {
            access_token: Some("abc".into()),
            refresh_token: None,
            expires_at_epoch: Some(1000),
        };
        assert_eq!(blob.valid_access_token(999), Some("abc"));
        assert_eq!(blob.valid_access_token(1000), None);
        assert_eq!(blob.valid_access_token(2000), None);
    }

    #[test]
    fn blob_round_trips_through_disk() {
        let dir = std::env::temp_dir().join(format!("mailwatch-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("tokens.json");

        assert!(load_tokens(&path).unwrap().is_none());

        let blob = TokenBlob {
            access_token: Some("at".into()),
            refresh_token: Some("rt".into()),
            expires_at_epoch: Some(42),
        };
        save_tokens(&path, &blob).unwrap();

        let loaded = load_tokens(&path).unwrap().unwrap();
        assert_eq!(loaded.access_token.as_deref(), Some("at"));
        assert_eq!(loaded.refresh_token.as_deref(), Some("rt"));
        assert_eq!(loaded.expires_at_epoch, Some(42));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn parses_installed_credentials_document() {
        let json = r#"{
            "installed": {
                "client_id": "id.apps.googleusercontent.com",
                "client_secret": "shhh",
                "auth_uri": "https://accounts.google.com/o/oauth2/auth",
                "redirect_uris": ["http://localhost"]
            }
        }"#;
        let secrets: ClientSecrets = serde_json::from_str(json).unwrap();
        assert_eq!(secrets.installed.client_id, "id.apps.googleusercontent.com");
        assert_eq!(secrets.installed.client_secret.as_deref(), Some("shhh"));
    }
}
