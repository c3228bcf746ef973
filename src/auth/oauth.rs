use chrono::Utc;
use log::info;
use oauth2::basic::{BasicClient, BasicTokenResponse};
use oauth2::reqwest::async_http_client;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    PkceCodeVerifier, RedirectUrl, RefreshToken, Scope, TokenResponse, TokenUrl,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use url::Url;

use super::secrets::ClientSecrets;
use crate::error::{Error, Result};

/// Token material for one authenticated account, persisted between runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl Credentials {
    /// Check if the access token is expired or close to expiring (within 5 minutes).
    pub fn is_expired(&self) -> bool {
        if let Some(expires_at) = self.expires_at {
            let now = Utc::now().timestamp();
            now >= (expires_at - 300)
        } else {
            false
        }
    }
}

/// Save credentials to a token file.
pub(crate) fn save_credentials(token_path: &Path, creds: &Credentials) -> Result<()> {
    let json = serde_json::to_string_pretty(creds)?;
    fs::write(token_path, json)?;
    info!("credentials saved to {}", token_path.display());
    Ok(())
}

/// Load credentials from a token file.
pub(crate) fn load_credentials(token_path: &Path) -> Result<Credentials> {
    let json = fs::read_to_string(token_path)?;
    let creds = serde_json::from_str(&json)?;
    Ok(creds)
}

pub(crate) fn build_oauth_client(
    secrets: &ClientSecrets,
    redirect_uri: Option<RedirectUrl>,
) -> Result<BasicClient> {
    let mut client = BasicClient::new(
        ClientId::new(secrets.client_id.clone()),
        Some(ClientSecret::new(secrets.client_secret.clone())),
        AuthUrl::new(secrets.auth_uri.clone())?,
        Some(TokenUrl::new(secrets.token_uri.clone())?),
    );
    if let Some(redirect_uri) = redirect_uri {
        client = client.set_redirect_uri(redirect_uri);
    }
    Ok(client)
}

/// An authorization flow that has produced its consent URL but has not yet
/// received the redirect. Dropping it without calling [`wait`](Self::wait)
/// abandons the flow.
pub struct PendingAuth {
    auth_url: String,
    listener: TcpListener,
    oauth: BasicClient,
    csrf: CsrfToken,
    pkce_verifier: PkceCodeVerifier,
    scopes: Vec<String>,
}

/// Bind the redirect listener and construct the consent URL. Returns
/// immediately; the caller decides whether to block on the redirect.
pub(crate) async fn begin_flow(
    secrets: &ClientSecrets,
    scopes: &[String],
    host: &str,
    port: u16,
) -> Result<PendingAuth> {
    let listener = TcpListener::bind((host, port)).await.map_err(|e| {
        Error::OAuth(format!("failed to bind redirect listener on {host}:{port}: {e}"))
    })?;
    let bound_port = listener.local_addr()?.port();
    let redirect_uri = RedirectUrl::new(format!("http://{host}:{bound_port}/"))?;

    let oauth = build_oauth_client(secrets, Some(redirect_uri))?;
    let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

    let mut auth_request = oauth
        .authorize_url(CsrfToken::new_random)
        .set_pkce_challenge(pkce_challenge);
    for scope in scopes {
        auth_request = auth_request.add_scope(Scope::new(scope.clone()));
    }
    let (auth_url, csrf) = auth_request.url();

    Ok(PendingAuth {
        auth_url: auth_url.to_string(),
        listener,
        oauth,
        csrf,
        pkce_verifier,
        scopes: scopes.to_vec(),
    })
}

impl PendingAuth {
    /// The consent URL the user must visit.
    pub fn auth_url(&self) -> &str {
        &self.auth_url
    }

    /// The port the redirect listener is bound to.
    pub fn redirect_port(&self) -> Result<u16> {
        Ok(self.listener.local_addr()?.port())
    }

    /// Block until the consent redirect arrives, then exchange the
    /// authorization code for tokens. Single attempt; a denied consent or
    /// a failed exchange surfaces to the caller.
    pub async fn wait(self) -> Result<Credentials> {
        let (mut stream, _) = self.listener.accept().await?;

        let mut request_line = String::new();
        {
            let mut reader = BufReader::new(&mut stream);
            reader.read_line(&mut request_line).await?;
        }
        let path = request_line
            .split_whitespace()
            .nth(1)
            .ok_or_else(|| Error::OAuth("malformed redirect request".into()))?;
        let url = Url::parse(&format!("http://localhost{path}"))?;

        if let Some((_, reason)) = url.query_pairs().find(|(key, _)| key == "error") {
            let _ = stream.write_all(DENIED_RESPONSE.as_bytes()).await;
            return Err(Error::Auth(format!("consent denied: {reason}")));
        }

        let code = url
            .query_pairs()
            .find(|(key, _)| key == "code")
            .map(|(_, value)| AuthorizationCode::new(value.into_owned()))
            .ok_or_else(|| Error::OAuth("authorization code not found in redirect".into()))?;
        let state = url
            .query_pairs()
            .find(|(key, _)| key == "state")
            .map(|(_, value)| value.into_owned())
            .ok_or_else(|| Error::OAuth("state not found in redirect".into()))?;

        if state != *self.csrf.secret() {
            return Err(Error::OAuth("CSRF state mismatch".into()));
        }

        stream.write_all(SUCCESS_RESPONSE.as_bytes()).await?;

        let token = self
            .oauth
            .exchange_code(code)
            .set_pkce_verifier(self.pkce_verifier)
            .request_async(async_http_client)
            .await
            .map_err(|e| Error::OAuth(format!("code exchange failed: {e}")))?;

        Ok(credentials_from_token(&token, None, &self.scopes))
    }
}

/// Exchange a refresh token for a fresh access token.
pub(crate) async fn refresh(
    secrets: &ClientSecrets,
    refresh_token: &str,
    scopes: &[String],
) -> Result<Credentials> {
    info!("refreshing expired access token");
    let oauth = build_oauth_client(secrets, None)?;
    let token = oauth
        .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
        .request_async(async_http_client)
        .await
        .map_err(|e| Error::OAuth(format!("token refresh failed: {e}")))?;

    Ok(credentials_from_token(
        &token,
        Some(refresh_token.to_string()),
        scopes,
    ))
}

// Google does not return the refresh token on refresh grants, so carry the
// old one forward.
fn credentials_from_token(
    token: &BasicTokenResponse,
    fallback_refresh: Option<String>,
    scopes: &[String],
) -> Credentials {
    let expires_at = token
        .expires_in()
        .map(|d| Utc::now().timestamp() + d.as_secs() as i64);
    Credentials {
        access_token: token.access_token().secret().clone(),
        refresh_token: token
            .refresh_token()
            .map(|t| t.secret().clone())
            .or(fallback_refresh),
        expires_at,
        scopes: scopes.to_vec(),
    }
}

const SUCCESS_RESPONSE: &str = "HTTP/1.1 200 OK\r\n\r\n\
    <html><body>\
    <h1>Authorization successful</h1>\
    <p>You can close this window and return to the application.</p>\
    </body></html>";

const DENIED_RESPONSE: &str = "HTTP/1.1 200 OK\r\n\r\n\
    <html><body>\
    <h1>Authorization was not granted</h1>\
    </body></html>";
