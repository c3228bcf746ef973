use serde::Deserialize;
use std::path::Path;

use crate::error::{Error, Result};

/// OAuth scopes for the Gmail API surface.
pub mod scope {
    /// Full mailbox access, including permanent deletion.
    pub const FULL_ACCESS: &str = "https://mail.google.com/";
    pub const READONLY: &str = "https://www.googleapis.com/auth/gmail.readonly";
    pub const MODIFY: &str = "https://www.googleapis.com/auth/gmail.modify";
    pub const SEND: &str = "https://www.googleapis.com/auth/gmail.send";
    pub const COMPOSE: &str = "https://www.googleapis.com/auth/gmail.compose";
    pub const LABELS: &str = "https://www.googleapis.com/auth/gmail.labels";
}

/// OAuth client configuration, normally loaded from the client-secrets JSON
/// file downloaded from the Google API console.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

fn default_auth_uri() -> String {
    "https://accounts.google.com/o/oauth2/v2/auth".to_string()
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

// The console wraps the secrets under an "installed" or "web" key depending
// on the application type.
#[derive(Deserialize)]
struct SecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        ClientSecrets {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            auth_uri: default_auth_uri(),
            token_uri: default_token_uri(),
            redirect_uris: Vec::new(),
        }
    }

    /// Load secrets from a client-secrets JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::Secrets(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let file: SecretsFile =
            serde_json::from_str(json).map_err(|e| Error::Secrets(e.to_string()))?;
        let secrets = file
            .installed
            .or(file.web)
            .ok_or_else(|| Error::Secrets("missing \"installed\" or \"web\" section".into()))?;
        secrets.validate()?;
        Ok(secrets)
    }

    fn validate(&self) -> Result<()> {
        if self.client_id.is_empty() {
            return Err(Error::Secrets("client_id cannot be empty".into()));
        }
        if self.client_secret.is_empty() {
            return Err(Error::Secrets("client_secret cannot be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_installed_secrets() {
        let json = r#"{
            "installed": {
                "client_id": "abc.apps.googleusercontent.com",
                "client_secret": "shhh",
                "auth_uri": "https://accounts.google.com/o/oauth2/auth",
                "token_uri": "https://oauth2.googleapis.com/token",
                "redirect_uris": ["http://localhost"]
            }
        }"#;
        let secrets = ClientSecrets::from_json(json).unwrap();
        assert_eq!(secrets.client_id, "abc.apps.googleusercontent.com");
        assert_eq!(secrets.client_secret, "shhh");
        assert_eq!(secrets.redirect_uris, vec!["http://localhost"]);
    }

    #[test]
    fn test_parse_web_secrets_with_defaults() {
        let json = r#"{"web": {"client_id": "id", "client_secret": "secret"}}"#;
        let secrets = ClientSecrets::from_json(json).unwrap();
        assert_eq!(secrets.token_uri, "https://oauth2.googleapis.com/token");
        assert!(secrets.redirect_uris.is_empty());
    }

    #[test]
    fn test_invalid_secrets_rejected() {
        assert!(ClientSecrets::from_json("{}").is_err());
        assert!(ClientSecrets::from_json(r#"{"installed":{"client_id":"","client_secret":"x"}}"#).is_err());
        assert!(ClientSecrets::from_file("/nonexistent/creds.json").is_err());
    }
}
