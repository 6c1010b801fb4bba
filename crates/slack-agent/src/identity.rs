//! Access-token acquisition from the identity broker.
//!
//! The wrapper never receives a token implicitly: it builds a [`TokenRequest`], hands it
//! to an [`IdentityBroker`] and passes the resulting [`AccessToken`] on explicitly.
pub mod cache;
pub mod oauth;
pub mod token;

pub use cache::TokenCache;
pub use oauth::{ClientCredentialsBroker, ClientCredentialsConfig};
pub use token::{AccessToken, AuthFlow, TokenRequest};

use async_trait::async_trait;
use thiserror::Error;

/// Detailed reasons a token request failed. These stay inside the crate's logs; callers
/// of the wrapper only ever see a generic authentication failure.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("invalid token request: {0}")]
    InvalidRequest(String),

    #[error("identity broker rejected the request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("identity broker returned a malformed response: {0}")]
    MalformedResponse(String),

    #[error("identity broker unreachable: {0}")]
    Network(#[from] reqwest::Error),
}

/// A service able to exchange workload credentials for a bearer token
#[async_trait]
pub trait IdentityBroker: Send + Sync {
    async fn get_token(&self, request: &TokenRequest) -> Result<AccessToken, AuthError>;
}
