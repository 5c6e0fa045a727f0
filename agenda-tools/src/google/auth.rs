use crate::error::{Result, ToolError};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

pub(crate) const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Refresh this long before Google says the token expires.
const EXPIRY_SKEW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub enum GoogleAuth {
    /// Pre-issued bearer token, used as is.
    AccessToken(String),
    /// Installed-app OAuth credentials exchanged for short-lived access tokens.
    RefreshToken {
        client_id: String,
        client_secret: String,
        refresh_token: String,
        token_url: String,
    },
}

impl GoogleAuth {
    pub fn refresh_token(client_id: &str, client_secret: &str, refresh_token: &str) -> Self {
        Self::RefreshToken {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            refresh_token: refresh_token.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
        }
    }
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

pub(crate) struct TokenSource {
    auth: GoogleAuth,
    cached: Mutex<Option<CachedToken>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

impl TokenSource {
    pub(crate) fn new(auth: GoogleAuth) -> Self {
        Self {
            auth,
            cached: Mutex::new(None),
        }
    }

    pub(crate) async fn access_token(&self, http: &reqwest::Client) -> Result<String> {
        let (client_id, client_secret, refresh_token, token_url) = match &self.auth {
            GoogleAuth::AccessToken(token) => return Ok(token.clone()),
            GoogleAuth::RefreshToken {
                client_id,
                client_secret,
                refresh_token,
                token_url,
            } => (client_id, client_secret, refresh_token, token_url),
        };

        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        tracing::debug!("refreshing google access token");
        let response = http
            .post(token_url)
            .form(&[
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
                ("refresh_token", refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read response body>".to_string());
            return Err(ToolError::Unauthorized(format!(
                "google token refresh failed: status={status} body={body}"
            )));
        }

        let token: TokenResponse = response.json().await?;
        let lifetime = Duration::from_secs(token.expires_in.unwrap_or(3600));
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            refresh_at: Instant::now() + lifetime.saturating_sub(EXPIRY_SKEW),
        });
        Ok(token.access_token)
    }

    /// Drops the cached token so the next request refreshes.
    pub(crate) async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn refresh_auth(server: &MockServer) -> GoogleAuth {
        GoogleAuth::RefreshToken {
            client_id: "cid".to_string(),
            client_secret: "secret".to_string(),
            refresh_token: "rt".to_string(),
            token_url: format!("{}/token", server.uri()),
        }
    }

    #[tokio::test]
    async fn refreshed_token_is_cached() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access_token": "ya29.a", "expires_in": 3599})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let source = TokenSource::new(refresh_auth(&server));
        let http = reqwest::Client::new();
        assert_eq!(source.access_token(&http).await.expect("first"), "ya29.a");
        assert_eq!(source.access_token(&http).await.expect("cached"), "ya29.a");
    }

    #[tokio::test]
    async fn rejected_refresh_is_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let source = TokenSource::new(refresh_auth(&server));
        let err = source
            .access_token(&reqwest::Client::new())
            .await
            .expect_err("refresh must fail");
        match err {
            ToolError::Unauthorized(msg) => assert!(msg.contains("invalid_grant")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn static_token_skips_network() {
        let source = TokenSource::new(GoogleAuth::AccessToken("static".to_string()));
        let token = source
            .access_token(&reqwest::Client::new())
            .await
            .expect("static token");
        assert_eq!(token, "static");
    }
}
