//! Service-account credential with cached OAuth2 access token.
//!
//! The key file is read and validated once. Access tokens are minted through
//! the JWT bearer grant and reused until shortly before they expire.

use std::fmt;
use std::path::Path;

use drive_export_core::FetchError;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Scopes requested for every token.
pub const DRIVE_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/drive",
    "https://www.googleapis.com/auth/drive.install",
    "https://www.googleapis.com/auth/drive.file",
    "https://www.googleapis.com/auth/drive.appdata",
];

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Fields used from a service-account JSON key.
#[derive(Clone, Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Debug, Serialize)]
struct JwtClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

/// Cached token with expiration.
#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: chrono::DateTime<chrono::Utc>,
}

impl CachedToken {
    fn is_expired(&self) -> bool {
        chrono::Utc::now() >= self.expires_at - chrono::Duration::minutes(5)
    }
}

/// Immutable service-account identity scoped to a fixed set of permissions.
pub struct ServiceAccountCredential {
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    scope: String,
    cache: Mutex<Option<CachedToken>>,
}

impl fmt::Debug for ServiceAccountCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountCredential")
            .field("client_email", &self.key.client_email)
            .field("token_uri", &self.key.token_uri)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountCredential {
    /// Load a JSON key file. Fails before any network call when the file is
    /// missing or malformed.
    pub async fn load(path: &Path, scopes: &[&str]) -> Result<Self, FetchError> {
        let exists = tokio::fs::try_exists(path).await.unwrap_or(false);
        if !exists {
            return Err(FetchError::Configuration(format!(
                "file at {} does not exist",
                path.display()
            )));
        }

        let json = tokio::fs::read_to_string(path).await.map_err(|e| {
            FetchError::Configuration(format!("unable to read {}: {}", path.display(), e))
        })?;

        let credential = Self::from_json(&json, scopes).map_err(|e| match e {
            FetchError::Configuration(msg) => {
                FetchError::Configuration(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })?;

        info!(
            "Loaded service account {} from {}",
            credential.client_email(),
            path.display()
        );
        Ok(credential)
    }

    /// Parse a JSON key held in memory.
    pub fn from_json(json: &str, scopes: &[&str]) -> Result<Self, FetchError> {
        let key: ServiceAccountKey = serde_json::from_str(json)
            .map_err(|e| FetchError::Configuration(format!("invalid service account key: {}", e)))?;

        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| FetchError::Configuration(format!("invalid private key: {}", e)))?;

        Ok(Self {
            key,
            encoding_key,
            scope: scopes.join(" "),
            cache: Mutex::new(None),
        })
    }

    pub fn client_email(&self) -> &str {
        &self.key.client_email
    }

    /// Space-separated scope string sent with every token request.
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Get a valid access token, minting a new one when the cached token is
    /// missing or about to expire.
    pub async fn access_token(&self, http: &reqwest::Client) -> Result<String, FetchError> {
        let mut cache = self.cache.lock().await;

        if let Some(cached) = cache.as_ref() {
            if !cached.is_expired() {
                debug!("Token cache hit for {}", self.key.client_email);
                return Ok(cached.access_token.clone());
            }
            debug!("Token expired for {}, minting a new one", self.key.client_email);
        }

        let token = self.fetch_token(http).await?;
        let access_token = token.access_token.clone();
        *cache = Some(token);
        Ok(access_token)
    }

    /// Exchange a signed assertion for an access token.
    async fn fetch_token(&self, http: &reqwest::Client) -> Result<CachedToken, FetchError> {
        let now = chrono::Utc::now();
        let claims = JwtClaims {
            iss: &self.key.client_email,
            scope: &self.scope,
            aud: &self.key.token_uri,
            iat: now.timestamp(),
            exp: now.timestamp() + 3600,
        };

        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)
            .map_err(|e| FetchError::Configuration(format!("unable to sign assertion: {}", e)))?;

        let resp = http
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| FetchError::Remote(format!("token request failed: {}", e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(FetchError::Remote(format!(
                "token exchange failed for {}: {} {}",
                self.key.client_email, status, body
            )));
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| FetchError::Remote(format!("invalid token response: {}", e)))?;

        let expires_at = now + chrono::Duration::seconds(token.expires_in);
        info!(
            "Minted access token for {}, expires at {}",
            self.key.client_email,
            expires_at.to_rfc3339()
        );

        Ok(CachedToken {
            access_token: token.access_token,
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const KEY_FIXTURE: &str = include_str!("../tests/fixtures/service_account.json");

    fn key_with_token_uri(token_uri: &str) -> String {
        let mut key: serde_json::Value = serde_json::from_str(KEY_FIXTURE).unwrap();
        key["token_uri"] = serde_json::Value::String(token_uri.to_string());
        key.to_string()
    }

    #[tokio::test]
    async fn test_missing_key_file_is_configuration_error() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nope.json");

        let err = ServiceAccountCredential::load(&missing, DRIVE_SCOPES)
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Configuration(_)));
        assert!(err.to_string().contains(&missing.display().to_string()));
    }

    #[tokio::test]
    async fn test_malformed_key_file_is_configuration_error() {
        let temp_dir = TempDir::new().unwrap();
        let key_path = temp_dir.path().join("creds.json");
        tokio::fs::write(&key_path, r#"{"client_email": "x"}"#)
            .await
            .unwrap();

        let err = ServiceAccountCredential::load(&key_path, DRIVE_SCOPES)
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_load_scopes_credential() {
        let temp_dir = TempDir::new().unwrap();
        let key_path = temp_dir.path().join("creds.json");
        tokio::fs::write(&key_path, KEY_FIXTURE).await.unwrap();

        let credential = ServiceAccountCredential::load(&key_path, DRIVE_SCOPES)
            .await
            .unwrap();

        assert_eq!(
            credential.client_email(),
            "exporter@drive-export-test.iam.gserviceaccount.com"
        );
        assert_eq!(credential.scope().split(' ').count(), 4);
        assert!(credential
            .scope()
            .contains("https://www.googleapis.com/auth/drive.appdata"));
    }

    #[tokio::test]
    async fn test_token_is_minted_once_and_cached() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.test",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let credential = ServiceAccountCredential::from_json(
            &key_with_token_uri(&format!("{}/token", server.uri())),
            DRIVE_SCOPES,
        )
        .unwrap();
        let http = reqwest::Client::new();

        assert_eq!(credential.access_token(&http).await.unwrap(), "ya29.test");
        assert_eq!(credential.access_token(&http).await.unwrap(), "ya29.test");
    }

    #[tokio::test]
    async fn test_rejected_assertion_is_remote_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(400).set_body_string(r#"{"error":"invalid_grant"}"#),
            )
            .mount(&server)
            .await;

        let credential = ServiceAccountCredential::from_json(
            &key_with_token_uri(&format!("{}/token", server.uri())),
            DRIVE_SCOPES,
        )
        .unwrap();

        let err = credential
            .access_token(&reqwest::Client::new())
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Remote(_)));
        assert!(err.to_string().contains("invalid_grant"));
    }
}
