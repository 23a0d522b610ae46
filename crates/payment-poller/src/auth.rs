//! OAuth session for the Gmail API.
//!
//! Uses the installed-app flow: the first run opens a browser redirect and
//! the resulting tokens are cached on disk. Later runs reuse the cache and
//! refresh expired access tokens; if the refresh token is gone or revoked the
//! interactive flow runs again.

use std::path::Path;

use google_gmail1::hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use google_gmail1::Gmail;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use crate::error::{PollerError, PollerResult};

/// Read-only access is all a pass needs
pub const GMAIL_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";

pub type GmailHub = Gmail<HttpsConnector<HttpConnector>>;

/// An authenticated Gmail hub, built once at startup and handed to the client
pub struct Session {
    hub: GmailHub,
}

impl Session {
    pub async fn establish(credentials_path: &Path, token_cache_path: &Path) -> PollerResult<Self> {
        if !credentials_path.exists() {
            return Err(PollerError::Auth(format!(
                "OAuth client credentials not found at {}",
                credentials_path.display()
            )));
        }

        // Use the yup_oauth2 re-exported by google_gmail1 to avoid version mismatch
        let secret = google_gmail1::yup_oauth2::read_application_secret(credentials_path)
            .await
            .map_err(|e| {
                PollerError::Auth(format!(
                    "failed to read OAuth credentials from {}: {}",
                    credentials_path.display(),
                    e
                ))
            })?;

        let auth = google_gmail1::yup_oauth2::InstalledFlowAuthenticator::builder(
            secret,
            google_gmail1::yup_oauth2::InstalledFlowReturnMethod::HTTPRedirect,
        )
        .persist_tokens_to_disk(token_cache_path)
        .build()
        .await
        .map_err(|e| PollerError::Auth(format!("failed to build authenticator: {}", e)))?;

        // Ask for a token now so a failed authorization is a setup error,
        // not the first fetch error of the first pass.
        auth.token(&[GMAIL_READONLY_SCOPE])
            .await
            .map_err(PollerError::auth)?;
        tracing::debug!("OAuth token ready, cached at {}", token_cache_path.display());

        let connector = HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(|e| PollerError::Auth(format!("failed to load native TLS roots: {}", e)))?
            .https_or_http()
            .enable_http1()
            .build();

        let client = Client::builder(TokioExecutor::new()).build(connector);
        let hub = Gmail::new(client, auth);

        Ok(Self { hub })
    }

    pub fn into_hub(self) -> GmailHub {
        self.hub
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_credentials_is_auth_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = Session::establish(
            &dir.path().join("credentials.json"),
            &dir.path().join("token.json"),
        )
        .await;

        match result {
            Err(PollerError::Auth(msg)) => assert!(msg.contains("credentials.json")),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("session should not be established"),
        }
    }

    #[tokio::test]
    async fn test_malformed_credentials_is_auth_error() {
        let dir = tempfile::tempdir().unwrap();
        let creds = dir.path().join("credentials.json");
        std::fs::write(&creds, "{}").unwrap();

        let result = Session::establish(&creds, &dir.path().join("token.json")).await;
        assert!(matches!(result, Err(PollerError::Auth(_))));
    }
}
