use log::{info, warn};
use std::fs;
use std::path::{Path, PathBuf};

use super::oauth::{self, Credentials, PendingAuth, load_credentials, save_credentials};
use super::secrets::{ClientSecrets, scope};
use crate::error::{Error, Result};

const DEFAULT_REDIRECT_PORT: u16 = 8080;

/// A named authentication session: client secrets plus a token file the
/// session persists credentials under, so consent is only needed once.
#[derive(Debug, Clone)]
pub struct Session {
    secrets: ClientSecrets,
    name: String,
    scopes: Vec<String>,
    token_dir: Option<PathBuf>,
}

impl Session {
    /// Create a session from a client-secrets JSON file. Credentials are
    /// persisted under the session name in the user config directory.
    pub fn new(secrets_path: impl AsRef<Path>, name: impl Into<String>) -> Result<Self> {
        Ok(Self::with_secrets(
            ClientSecrets::from_file(secrets_path)?,
            name,
        ))
    }

    pub fn with_secrets(secrets: ClientSecrets, name: impl Into<String>) -> Self {
        Session {
            secrets,
            name: name.into(),
            scopes: vec![scope::FULL_ACCESS.to_string()],
            token_dir: None,
        }
    }

    pub fn with_scopes(mut self, scopes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Override where the token file lives (the default is the user config
    /// directory).
    pub fn with_token_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.token_dir = Some(dir.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a token file exists for this session.
    pub fn is_authenticated(&self) -> bool {
        self.token_path().map(|p| p.exists()).unwrap_or(false)
    }

    /// Produce ready-to-use credentials: loads the stored token, refreshes
    /// it when expired, and falls back to the local interactive consent
    /// flow when neither works. Persists whatever it obtains.
    pub async fn authenticate(&self) -> Result<Credentials> {
        let token_path = self.token_path()?;
        if token_path.exists() {
            match load_credentials(&token_path) {
                Ok(creds) if !creds.is_expired() => {
                    info!("using stored credentials for session '{}'", self.name);
                    return Ok(creds);
                }
                Ok(creds) => {
                    if let Some(refresh_token) = creds.refresh_token {
                        match oauth::refresh(&self.secrets, &refresh_token, &self.scopes).await {
                            Ok(fresh) => {
                                save_credentials(&token_path, &fresh)?;
                                return Ok(fresh);
                            }
                            Err(e) => {
                                warn!("token refresh failed, re-running consent flow: {e}");
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!("ignoring unreadable token file {}: {e}", token_path.display());
                }
            }
        }
        self.local_flow(DEFAULT_REDIRECT_PORT).await
    }

    /// Interactive consent flow on the loopback interface: opens the
    /// consent URL in the default browser and blocks until the redirect
    /// lands. Pass port 0 to bind an ephemeral port.
    pub async fn local_flow(&self, port: u16) -> Result<Credentials> {
        let pending = oauth::begin_flow(&self.secrets, &self.scopes, "127.0.0.1", port).await?;
        if let Err(e) = webbrowser::open(pending.auth_url()) {
            warn!(
                "failed to open browser automatically: {e}; open this URL manually: {}",
                pending.auth_url()
            );
        }
        let creds = pending.wait().await?;
        self.store(&creds)?;
        Ok(creds)
    }

    /// Consent flow on a caller-supplied host. Returns immediately with
    /// the consent URL; call [`UrlFlow::wait`] to block until consent
    /// completes, or hand the URL to the user and wait later.
    pub async fn url_flow(&self, host: &str, port: u16) -> Result<UrlFlow<'_>> {
        let pending = oauth::begin_flow(&self.secrets, &self.scopes, host, port).await?;
        Ok(UrlFlow {
            pending,
            session: self,
        })
    }

    /// Delete the stored token, forcing a fresh consent next time.
    pub fn clear(&self) -> Result<()> {
        let token_path = self.token_path()?;
        if token_path.exists() {
            fs::remove_file(&token_path)?;
            info!("cleared credentials for session '{}'", self.name);
        }
        Ok(())
    }

    fn token_path(&self) -> Result<PathBuf> {
        let dir = match &self.token_dir {
            Some(dir) => dir.clone(),
            None => dirs::config_dir()
                .ok_or_else(|| Error::Auth("could not determine config directory".into()))?
                .join("gmailbox"),
        };
        fs::create_dir_all(&dir)?;
        Ok(dir.join(format!("{}.json", self.name)))
    }

    fn store(&self, creds: &Credentials) -> Result<()> {
        save_credentials(&self.token_path()?, creds)
    }
}

/// A URL-based consent flow in progress, tied to the session that will
/// persist its credentials.
pub struct UrlFlow<'a> {
    pending: PendingAuth,
    session: &'a Session,
}

impl UrlFlow<'_> {
    pub fn auth_url(&self) -> &str {
        self.pending.auth_url()
    }

    pub fn redirect_port(&self) -> Result<u16> {
        self.pending.redirect_port()
    }

    /// Block until the redirect arrives, exchange the code and persist the
    /// resulting credentials under the session name.
    pub async fn wait(self) -> Result<Credentials> {
        let creds = self.pending.wait().await?;
        self.session.store(&creds)?;
        Ok(creds)
    }
}
