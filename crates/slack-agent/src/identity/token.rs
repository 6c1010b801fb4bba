use chrono::{DateTime, Utc};
use std::fmt;

use super::AuthError;

const LOG_PREFIX_LEN: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFlow {
    /// Client-credentials exchange with no end user involved
    M2M,
}

/// Parameters of one token request against the identity broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRequest {
    pub provider_name: String,
    pub scopes: Vec<String>,
    pub auth_flow: AuthFlow,
    pub force_authentication: bool,
    pub workload_name: String,
    pub user_id: String,
}

impl TokenRequest {
    pub fn m2m<P, W, U>(provider_name: P, scope: &str, workload_name: W, user_id: U) -> Self
    where
        P: Into<String>,
        W: Into<String>,
        U: Into<String>,
    {
        Self {
            provider_name: provider_name.into(),
            scopes: vec![scope.to_string()],
            auth_flow: AuthFlow::M2M,
            force_authentication: false,
            workload_name: workload_name.into(),
            user_id: user_id.into(),
        }
    }

    pub fn with_force_authentication(mut self, force: bool) -> Self {
        self.force_authentication = force;
        self
    }

    /// Reject requests the broker could never satisfy before any network round trip
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.scopes.is_empty() || self.scopes.iter().any(|s| s.trim().is_empty()) {
            return Err(AuthError::InvalidRequest("scope must be non-empty".into()));
        }
        if self.workload_name.trim().is_empty() {
            return Err(AuthError::InvalidRequest(
                "workload name must be non-empty".into(),
            ));
        }
        Ok(())
    }
}

/// Opaque bearer credential. Never empty once constructed.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    secret: String,
    scopes: Vec<String>,
    workload_name: String,
    expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn new(
        secret: impl Into<String>,
        request: &TokenRequest,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Self, AuthError> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(AuthError::MalformedResponse("empty access token".into()));
        }
        Ok(Self {
            secret,
            scopes: request.scopes.clone(),
            workload_name: request.workload_name.clone(),
            expires_at,
        })
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    pub fn workload_name(&self) -> &str {
        &self.workload_name
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Value for an `Authorization` header
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.secret)
    }

    /// Safe-to-log rendering: the first few characters only
    pub fn prefix(&self) -> &str {
        let end = self
            .secret
            .char_indices()
            .nth(LOG_PREFIX_LEN)
            .map(|(i, _)| i)
            .unwrap_or(self.secret.len());
        &self.secret[..end]
    }

    /// Length of the secret in characters, for logs
    pub fn secret_len(&self) -> usize {
        self.secret.chars().count()
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("prefix", &format!("{}...", self.prefix()))
            .field("len", &self.secret_len())
            .field("scopes", &self.scopes)
            .field("workload_name", &self.workload_name)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
