//! Bearer token authentication for the HTTP transport.
//!
//! Tokens come from `--auth-token` / `MCP_AUTH_TOKENS`. When none are
//! configured the middleware is not installed at all.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::warn;

/// Accepted bearer tokens.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    enabled: bool,
    tokens: HashSet<String>,
}

impl AuthConfig {
    /// Build from configured tokens. Blank entries are rejected.
    pub fn from_tokens(tokens: Vec<String>) -> Result<Self, String> {
        let mut valid_tokens = HashSet::new();
        for token in tokens {
            let trimmed = token.trim().to_string();
            if trimmed.is_empty() {
                return Err("Empty token value in configuration".to_string());
            }
            valid_tokens.insert(trimmed);
        }
        let enabled = !valid_tokens.is_empty();
        Ok(Self {
            enabled,
            tokens: valid_tokens,
        })
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            tokens: HashSet::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    /// Compare against every configured token without short-circuiting.
    pub fn verify(&self, provided: &str) -> bool {
        let mut found = false;
        for expected in &self.tokens {
            if constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
                found = true;
            }
        }
        found
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Rejects requests without a valid `Authorization: Bearer` header.
pub async fn auth_middleware(
    State(auth_config): State<Arc<AuthConfig>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let token = match extract_bearer_token(&request) {
        Ok(Some(token)) => token,
        Ok(None) => {
            warn!("Authentication failed: missing Authorization header");
            return unauthorized_response(
                "Missing Bearer token in Authorization header",
                "Include a valid token: 'Authorization: Bearer <token>'",
            );
        }
        Err(msg) => {
            warn!("Authentication failed: invalid header format");
            return unauthorized_response(
                msg,
                "Use the format: 'Authorization: Bearer <your-token>'",
            );
        }
    };

    if auth_config.verify(token) {
        next.run(request).await
    } else {
        warn!(token_prefix = %mask_token(token), "Authentication failed: invalid token");
        unauthorized_response(
            "Invalid Bearer token",
            "Check that you are using a token configured on the server",
        )
    }
}

fn extract_bearer_token(request: &Request<Body>) -> Result<Option<&str>, &'static str> {
    let Some(auth_header) = request.headers().get(header::AUTHORIZATION) else {
        return Ok(None);
    };

    let auth_str = auth_header
        .to_str()
        .map_err(|_| "Authorization header contains invalid characters")?;

    let Some(token) = auth_str.strip_prefix("Bearer ") else {
        return Err("Invalid Authorization header format. Expected 'Bearer <token>'");
    };

    if token.is_empty() {
        return Err("Bearer token is empty");
    }

    Ok(Some(token))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

fn mask_token(token: &str) -> String {
    if token.chars().count() <= 3 {
        "***".to_string()
    } else {
        format!("{}***", token.chars().take(3).collect::<String>())
    }
}

fn unauthorized_response(message: impl Into<String>, suggestion: impl Into<String>) -> Response {
    #[derive(Serialize)]
    struct ErrorResponse {
        error: ErrorDetail,
    }
    #[derive(Serialize)]
    struct ErrorDetail {
        code: &'static str,
        message: String,
        suggestion: String,
    }

    let body = ErrorResponse {
        error: ErrorDetail {
            code: "unauthorized",
            message: message.into(),
            suggestion: suggestion.into(),
        },
    };
    let json = serde_json::to_string(&body).unwrap_or_else(|_| {
        r#"{"error":{"code":"unauthorized","message":"Authentication failed"}}"#.to_string()
    });

    (
        StatusCode::UNAUTHORIZED,
        [(header::CONTENT_TYPE, "application/json")],
        json,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_with(header_value: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri("/");
        if let Some(value) = header_value {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_from_tokens() {
        let config = AuthConfig::from_tokens(vec![" alpha ".into(), "beta".into()]).unwrap();
        assert!(config.is_enabled());
        assert_eq!(config.token_count(), 2);
        assert!(config.verify("alpha"));
        assert!(!config.verify("gamma"));

        assert!(!AuthConfig::from_tokens(vec![]).unwrap().is_enabled());
        assert!(AuthConfig::from_tokens(vec!["  ".into()]).is_err());
    }

    #[test]
    fn test_extract_bearer_token() {
        assert_eq!(extract_bearer_token(&request_with(None)), Ok(None));
        assert_eq!(
            extract_bearer_token(&request_with(Some("Bearer s3cret"))),
            Ok(Some("s3cret"))
        );
        assert!(extract_bearer_token(&request_with(Some("Basic abc"))).is_err());
        assert!(extract_bearer_token(&request_with(Some("Bearer "))).is_err());
    }

    #[test]
    fn test_mask_token() {
        assert_eq!(mask_token("ab"), "***");
        assert_eq!(mask_token("abcdef"), "abc***");
        assert_eq!(mask_token("ééééé"), "ééé***");
    }

    #[test]
    fn test_unauthorized_response_status() {
        let response = unauthorized_response("nope", "try again");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json"
        );
    }
}
