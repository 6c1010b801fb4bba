use chrono::{Duration, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::token::{AccessToken, TokenRequest};

/// Tokens closer than this to expiry are treated as already expired
const EXPIRY_SKEW_SECS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    provider_name: String,
    scopes: Vec<String>,
    workload_name: String,
    user_id: String,
}

impl From<&TokenRequest> for CacheKey {
    fn from(request: &TokenRequest) -> Self {
        Self {
            provider_name: request.provider_name.clone(),
            scopes: request.scopes.clone(),
            workload_name: request.workload_name.clone(),
            user_id: request.user_id.clone(),
        }
    }
}

/// Process-lifetime token cache. Only tokens with a known expiry are stored.
#[derive(Default)]
pub struct TokenCache {
    tokens: Mutex<HashMap<CacheKey, AccessToken>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn load_token(&self, request: &TokenRequest) -> Option<AccessToken> {
        let mut tokens = self.tokens.lock().await;
        let key = CacheKey::from(request);
        let fresh = tokens
            .get(&key)
            .and_then(|token| token.expires_at())
            .map(|expires_at| expires_at - Duration::seconds(EXPIRY_SKEW_SECS) > Utc::now())
            .unwrap_or(false);

        if fresh {
            tokens.get(&key).cloned()
        } else {
            tokens.remove(&key);
            None
        }
    }

    pub async fn save_token(&self, request: &TokenRequest, token: &AccessToken) {
        if token.expires_at().is_none() {
            return;
        }
        self.tokens
            .lock()
            .await
            .insert(CacheKey::from(request), token.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(scope: &str) -> TokenRequest {
        TokenRequest::m2m("provider", scope, "workload", "user")
    }

    #[tokio::test]
    async fn test_roundtrip_fresh_token() {
        let cache = TokenCache::new();
        let req = request("chat:write");
        let token =
            AccessToken::new("T1", &req, Some(Utc::now() + Duration::seconds(3600))).unwrap();
        cache.save_token(&req, &token).await;

        assert_eq!(cache.load_token(&req).await, Some(token));
        assert_eq!(cache.load_token(&request("channels:read")).await, None);
    }

    #[tokio::test]
    async fn test_nearly_expired_token_is_dropped() {
        let cache = TokenCache::new();
        let req = request("chat:write");
        let token = AccessToken::new("T1", &req, Some(Utc::now() + Duration::seconds(5))).unwrap();
        cache.save_token(&req, &token).await;

        assert_eq!(cache.load_token(&req).await, None);
    }

    #[tokio::test]
    async fn test_token_without_expiry_not_cached() {
        let cache = TokenCache::new();
        let req = request("chat:write");
        let token = AccessToken::new("T1", &req, None).unwrap();
        cache.save_token(&req, &token).await;

        assert_eq!(cache.load_token(&req).await, None);
    }
}
