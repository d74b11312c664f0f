//! Password auth against the hosted auth service (`/auth/v1`).

use async_trait::async_trait;
use feedline_shared::service::{AuthService, AuthSession, AuthUser};
use feedline_shared::ServiceResult;
use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::error::{NetError, NetResult};
use crate::rest::{checked, HostedData};

#[derive(Debug, Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

/// Token grant. Sign-up returns the same shape when no email confirmation
/// is required, and a bare user object otherwise.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    user: Option<AuthUser>,
    /// Present when the body is a bare user.
    #[serde(default)]
    id: Option<String>,
}

impl TokenResponse {
    fn into_session(self) -> NetResult<AuthSession> {
        let pending_user = self.user.is_some() || self.id.is_some();
        match (self.access_token, self.user) {
            (Some(access_token), Some(user)) => Ok(AuthSession { user, access_token }),
            (None, _) if pending_user => Err(NetError::Auth(
                "Confirm your email address before signing in".into(),
            )),
            _ => Err(NetError::InvalidResponse(
                "auth response carried no session".into(),
            )),
        }
    }
}

impl HostedData {
    async fn password_grant(&self, path: &str, email: &str, password: &str) -> NetResult<AuthSession> {
        let url = self.endpoint(path)?;
        let response = self
            .http
            .post(url)
            .header("apikey", &self.config.anon_key)
            .json(&Credentials { email, password })
            .send()
            .await?;

        let response = checked(response).await.map_err(|e| match e {
            NetError::Api { status, message } if status < 500 => NetError::Auth(message),
            other => other,
        })?;

        let session = response.json::<TokenResponse>().await?.into_session()?;
        self.set_access_token(Some(session.access_token.clone()));

        tracing::info!(user_id = %session.user.id, "signed in to hosted service");
        Ok(session)
    }
}

#[async_trait]
impl AuthService for HostedData {
    async fn sign_up(&self, email: &str, password: &str) -> ServiceResult<AuthSession> {
        Ok(self.password_grant("auth/v1/signup", email, password).await?)
    }

    async fn sign_in(&self, email: &str, password: &str) -> ServiceResult<AuthSession> {
        Ok(self
            .password_grant("auth/v1/token?grant_type=password", email, password)
            .await?)
    }

    async fn sign_out(&self, session: &AuthSession) -> ServiceResult<()> {
        let url = self.endpoint("auth/v1/logout")?;
        let result = self
            .http
            .request(Method::POST, url)
            .header("apikey", &self.config.anon_key)
            .bearer_auth(&session.access_token)
            .send()
            .await;

        // the local session is dropped even if the revoke call fails
        self.set_access_token(None);

        checked(result.map_err(NetError::from)?).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_response_becomes_session() {
        let body = r#"{
            "access_token": "jwt",
            "token_type": "bearer",
            "expires_in": 3600,
            "refresh_token": "r",
            "user": {"id": "1a2b3c4d-0000-4000-8000-000000000000", "email": "ada@example.com", "role": "authenticated"}
        }"#;
        let session = serde_json::from_str::<TokenResponse>(body)
            .unwrap()
            .into_session()
            .unwrap();

        assert_eq!(session.access_token, "jwt");
        assert_eq!(session.user.email.as_deref(), Some("ada@example.com"));
    }

    #[test]
    fn unconfirmed_sign_up_is_an_auth_error() {
        let body = r#"{"id": "1a2b3c4d-0000-4000-8000-000000000000", "email": "ada@example.com",
                       "confirmation_sent_at": "2024-05-01T10:00:00Z"}"#;
        let result = serde_json::from_str::<TokenResponse>(body)
            .unwrap()
            .into_session();
        assert!(matches!(result, Err(NetError::Auth(_))));
    }

    #[test]
    fn endpoint_keeps_grant_query() {
        let data = HostedData::new(
            crate::HostedConfig::new("https://demo.example.co", "anon").unwrap(),
        )
        .unwrap();
        let url = data.endpoint("auth/v1/token?grant_type=password").unwrap();
        assert_eq!(
            url.as_str(),
            "https://demo.example.co/auth/v1/token?grant_type=password"
        );
    }
}
