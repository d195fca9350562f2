// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Service account keys and OAuth2 access tokens.
//!
//! An organization's credentials Secret holds a JSON service account key. The key
//! signs an RS256 JWT assertion which is exchanged at the token endpoint for a
//! short-lived bearer token (the OAuth2 JWT-bearer grant).

use crate::constants::{GCP_ASSERTION_LIFETIME_SECS, GCP_OAUTH_SCOPE, GCP_TOKEN_URI};
use crate::errors::ProviderError;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use ring::rand::SystemRandom;
use ring::signature::{RsaKeyPair, RSA_PKCS1_SHA256};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

const KEY_TYPE_SERVICE_ACCOUNT: &str = "service_account";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// A JSON service account key as downloaded from GCP.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAccountKey {
    #[serde(rename = "type")]
    pub key_type: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub private_key_id: String,
    pub private_key: String,
    pub client_email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_uri: Option<String>,
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

impl ServiceAccountKey {
    /// Parses and validates a JSON key.
    ///
    /// # Errors
    ///
    /// [`ProviderError::Auth`] when the document is not a usable service account key.
    pub fn from_json(data: &[u8]) -> Result<Self, ProviderError> {
        let key: Self = serde_json::from_slice(data)
            .map_err(|e| ProviderError::Auth(format!("invalid service account key: {e}")))?;
        if key.key_type != KEY_TYPE_SERVICE_ACCOUNT {
            return Err(ProviderError::Auth(format!(
                "unsupported credentials type '{}', expected '{KEY_TYPE_SERVICE_ACCOUNT}'",
                key.key_type
            )));
        }
        if key.client_email.is_empty() {
            return Err(ProviderError::Auth("service account key has no client_email".to_string()));
        }
        if key.private_key.is_empty() {
            return Err(ProviderError::Auth("service account key has no private_key".to_string()));
        }
        Ok(key)
    }

    /// Token endpoint named in the key, or the Google default.
    #[must_use]
    pub fn token_uri(&self) -> &str {
        self.token_uri.as_deref().unwrap_or(GCP_TOKEN_URI)
    }

    /// Builds and signs a JWT assertion for `audience`, issued at `issued_at`
    /// (seconds since the epoch).
    ///
    /// # Errors
    ///
    /// [`ProviderError::Auth`] when the private key cannot be loaded or used.
    pub fn signed_assertion(
        &self,
        audience: &str,
        issued_at: i64,
    ) -> Result<String, ProviderError> {
        let header = json!({
            "alg": "RS256",
            "typ": "JWT",
            "kid": self.private_key_id,
        });
        let claims = json!({
            "iss": self.client_email,
            "scope": GCP_OAUTH_SCOPE,
            "aud": audience,
            "iat": issued_at,
            "exp": issued_at + GCP_ASSERTION_LIFETIME_SECS,
        });
        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header.to_string()),
            URL_SAFE_NO_PAD.encode(claims.to_string())
        );

        let der = pem_to_der(&self.private_key)?;
        let key_pair = RsaKeyPair::from_pkcs8(&der)
            .map_err(|e| ProviderError::Auth(format!("unable to load private key: {e}")))?;
        let mut signature = vec![0; key_pair.public().modulus_len()];
        key_pair
            .sign(
                &RSA_PKCS1_SHA256,
                &SystemRandom::new(),
                signing_input.as_bytes(),
                &mut signature,
            )
            .map_err(|_| ProviderError::Auth("unable to sign token assertion".to_string()))?;

        Ok(format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature)))
    }

    /// Exchanges a signed assertion for an access token.
    ///
    /// `token_uri` overrides the endpoint named in the key.
    ///
    /// # Errors
    ///
    /// [`ProviderError::Auth`] when the grant is refused, transport errors otherwise.
    pub async fn access_token(
        &self,
        http: &reqwest::Client,
        token_uri: Option<&str>,
    ) -> Result<String, ProviderError> {
        let endpoint = token_uri.unwrap_or_else(|| self.token_uri());
        let assertion = self.signed_assertion(endpoint, chrono::Utc::now().timestamp())?;
        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", JWT_BEARER_GRANT)
            .append_pair("assertion", &assertion)
            .finish();

        debug!(client_email = %self.client_email, endpoint, "Requesting GCP access token");
        let response = http
            .post(endpoint)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport {
                service: "oauth2".to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Auth(format!(
                "token endpoint returned HTTP {}: {text}",
                status.as_u16()
            )));
        }
        let token: TokenResponse = response.json().await.map_err(|e| ProviderError::Decode {
            service: "oauth2".to_string(),
            message: e.to_string(),
        })?;
        Ok(token.access_token)
    }
}

/// Decodes the body of a PEM block.
pub(crate) fn pem_to_der(pem: &str) -> Result<Vec<u8>, ProviderError> {
    let body: String = pem
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("-----"))
        .collect();
    if body.is_empty() {
        return Err(ProviderError::Auth("private key is not PEM encoded".to_string()));
    }
    STANDARD
        .decode(body)
        .map_err(|e| ProviderError::Auth(format!("private key is not valid base64: {e}")))
}

#[cfg(test)]
#[path = "credentials_tests.rs"]
mod credentials_tests;
