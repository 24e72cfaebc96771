//! Bearer-token authentication for the HTTP API.

use crate::error::{ExplorerError, ExplorerResult};
use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::warn;

/// Accepted tokens. An empty set disables authentication.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    tokens: HashSet<String>,
}

impl AuthConfig {
    pub fn from_tokens(tokens: &[String]) -> ExplorerResult<Self> {
        let mut accepted = HashSet::new();
        for token in tokens {
            let token = token.trim();
            if token.is_empty() {
                return Err(ExplorerError::config("Empty value in --auth-token"));
            }
            accepted.insert(token.to_string());
        }
        Ok(Self { tokens: accepted })
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        !self.tokens.is_empty()
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    /// Compares against every token so timing does not reveal which one matched.
    fn accepts(&self, provided: &str) -> bool {
        self.tokens.iter().fold(false, |found, expected| {
            found | constant_time_eq(provided.as_bytes(), expected.as_bytes())
        })
    }
}

/// Rejects requests without a valid `Authorization: Bearer <token>` header.
pub async fn auth_middleware(
    State(auth): State<Arc<AuthConfig>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    match bearer_token(&request) {
        Ok(token) if auth.accepts(token) => next.run(request).await,
        Ok(token) => {
            warn!(token_prefix = %mask_token(token), "Rejected request with unknown token");
            unauthorized("Invalid bearer token")
        }
        Err(message) => {
            warn!(reason = message, "Rejected unauthenticated request");
            unauthorized(message)
        }
    }
}

fn bearer_token(request: &Request<Body>) -> Result<&str, &'static str> {
    let value = request
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or("Missing Authorization header")?
        .to_str()
        .map_err(|_| "Authorization header contains invalid characters")?;

    let token = value
        .strip_prefix("Bearer ")
        .ok_or("Expected 'Authorization: Bearer <token>'")?
        .trim();
    if token.is_empty() {
        return Err("Bearer token is empty");
    }
    Ok(token)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

fn mask_token(token: &str) -> String {
    match token.char_indices().nth(3) {
        Some((idx, _)) => format!("{}***", &token[..idx]),
        None => "***".to_string(),
    }
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "error": {
                "kind": "unauthorized",
                "message": message,
                "suggestion": "Send 'Authorization: Bearer <token>' with a token configured via --auth-token",
            }
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(auth: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri("/ask");
        if let Some(value) = auth {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_from_tokens() {
        let config = AuthConfig::from_tokens(&[" a ".into(), "b".into(), "a".into()]).unwrap();
        assert!(config.is_enabled());
        assert_eq!(config.token_count(), 2);
        assert!(config.accepts("a"));
        assert!(!config.accepts("c"));

        assert!(AuthConfig::from_tokens(&["".into()]).is_err());
        assert!(!AuthConfig::from_tokens(&[]).unwrap().is_enabled());
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token(&request(Some("Bearer abc"))), Ok("abc"));
        assert!(bearer_token(&request(None)).is_err());
        assert!(bearer_token(&request(Some("Basic abc"))).is_err());
        assert!(bearer_token(&request(Some("Bearer  "))).is_err());
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"secreT"));
        assert!(!constant_time_eq(b"secret", b"secret-longer"));
    }

    #[test]
    fn test_mask_token() {
        assert_eq!(mask_token("abcdef"), "abc***");
        assert_eq!(mask_token("ab"), "***");
        assert_eq!(mask_token("abc"), "***");
    }
}
