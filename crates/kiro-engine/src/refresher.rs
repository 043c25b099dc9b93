//! Concrete `CredentialRefresher`: performs the OAuth refresh-token
//! exchange the upstream's three auth methods share, grounded in the
//! teacher's `refresh_access_token` (`claudecode/refresh.rs`) — same
//! `grant_type=refresh_token` POST, same "bubble a `RefreshError` up
//! rather than ever read token contents into a log line" discipline.

use async_trait::async_trait;
use serde::Deserialize;
use time::OffsetDateTime;

use kiro_common::AuthMethod;
use kiro_identity::{Credentials, Identity, RefreshError};

const IDC_TOKEN_URL: &str = "https://oidc.us-east-1.amazonaws.com/token";
const SOCIAL_TOKEN_URL: &str = "https://prod.us-east-1.auth.desktop.kiro.dev/refreshToken";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(alias = "accessToken")]
    access_token: String,
    #[serde(default, alias = "refreshToken")]
    refresh_token: Option<String>,
    #[serde(default, alias = "expiresIn")]
    expires_in: Option<i64>,
}

pub struct OAuthRefresher {
    client: wreq::Client,
}

impl OAuthRefresher {
    pub fn new() -> Result<Self, wreq::Error> {
        Ok(Self { client: wreq::Client::builder().build()? })
    }
}

#[async_trait]
impl kiro_identity::CredentialRefresher for OAuthRefresher {
    async fn refresh(&self, identity: &Identity, current: &Credentials) -> Result<Credentials, RefreshError> {
        let refresh_token = current
            .refresh_token
            .clone()
            .ok_or_else(|| RefreshError::new(format!("identity {} has no refresh_token", identity.id)))?;

        let (url, payload) = match current.auth_method {
            AuthMethod::Idc => {
                let client_id = current
                    .client_id
                    .clone()
                    .ok_or_else(|| RefreshError::new("idc refresh requires client_id"))?;
                let client_secret = current
                    .client_secret
                    .clone()
                    .ok_or_else(|| RefreshError::new("idc refresh requires client_secret"))?;
                (
                    IDC_TOKEN_URL.to_string(),
                    serde_json::json!({
                        "grantType": "refresh_token",
                        "refreshToken": refresh_token,
                        "clientId": client_id,
                        "clientSecret": client_secret,
                    }),
                )
            }
            AuthMethod::Device | AuthMethod::Social => (
                SOCIAL_TOKEN_URL.to_string(),
                serde_json::json!({ "grant_type": "refresh_token", "refresh_token": refresh_token }),
            ),
        };

        let response = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|err| RefreshError::new(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(RefreshError::new(format!("refresh endpoint returned {status}")));
        }

        let parsed: TokenResponse = response.json().await.map_err(|err| RefreshError::new(err.to_string()))?;
        let expires_at = OffsetDateTime::now_utc().unix_timestamp() + parsed.expires_in.unwrap_or(3600);

        Ok(Credentials {
            access_token: parsed.access_token,
            refresh_token: parsed.refresh_token.or(Some(refresh_token)),
            auth_method: current.auth_method,
            region: current.region.clone(),
            client_id: current.client_id.clone(),
            client_secret: current.client_secret.clone(),
            profile_arn: current.profile_arn.clone(),
            expires_at,
        })
    }
}
