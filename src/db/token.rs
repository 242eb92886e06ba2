//! Access token sources for token-authenticated connections.
//!
//! Azure Database for PostgreSQL accepts a Microsoft Entra ID access token as
//! the connection password. Tokens are obtained either with a service
//! principal (client credentials flow) or from a logged-in Azure CLI.

use crate::error::{DbError, DbResult};
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// OAuth scope for Azure Database for PostgreSQL.
pub const POSTGRES_TOKEN_SCOPE: &str = "https://ossrdbms-aad.database.windows.net/.default";

const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";
const CLI_TIMEOUT: Duration = Duration::from_secs(30);
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// A bearer token and the instant it stops being accepted.
#[derive(Clone)]
pub struct AccessToken {
    pub secret: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(secret: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            secret: secret.into(),
            expires_at,
        }
    }

    /// True when the token expires within `margin` of `now` (or already has).
    pub fn expires_within(&self, margin: Duration, now: DateTime<Utc>) -> bool {
        let margin = chrono::Duration::from_std(margin).unwrap_or(chrono::Duration::MAX);
        self.expires_at - now <= margin
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Something that can mint a fresh access token.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch(&self) -> DbResult<AccessToken>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

// =============================================================================
// Client credentials flow
// =============================================================================

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

/// Service principal token source using the OAuth2 client credentials grant.
pub struct ClientSecretTokenSource {
    http: reqwest::Client,
    authority: String,
    tenant_id: String,
    client_id: String,
    client_secret: String,
    scope: String,
}

impl ClientSecretTokenSource {
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> DbResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| DbError::internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            authority: DEFAULT_AUTHORITY.to_string(),
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scope: POSTGRES_TOKEN_SCOPE.to_string(),
        })
    }

    pub fn token_endpoint(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority.trim_end_matches('/'),
            self.tenant_id
        )
    }
}

#[async_trait]
impl TokenSource for ClientSecretTokenSource {
    async fn fetch(&self) -> DbResult<AccessToken> {
        let form = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", self.scope.as_str()),
            ("grant_type", "client_credentials"),
        ];

        let response = self
            .http
            .post(self.token_endpoint())
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                DbError::connection(
                    format!("Token request failed: {}", e),
                    "Check network access to login.microsoftonline.com",
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DbError::connection(
                format!("Token endpoint returned {}: {}", status, body),
                "Verify AZURE_TENANT_ID, AZURE_CLIENT_ID and AZURE_CLIENT_SECRET",
            ));
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            DbError::connection(
                format!("Malformed token response: {}", e),
                "Verify the identity provider endpoint",
            )
        })?;

        debug!(expires_in = token.expires_in, "Received client credentials token");
        let expires_at = Utc::now() + chrono::Duration::seconds(token.expires_in as i64);
        Ok(AccessToken::new(token.access_token, expires_at))
    }

    fn name(&self) -> &'static str {
        "client_secret"
    }
}

// =============================================================================
// Azure CLI flow
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliToken {
    access_token: String,
    /// Local time, e.g. "2024-05-01 12:34:56.000000"
    expires_on: Option<String>,
    /// Unix seconds; newer CLI versions only
    #[serde(rename = "expires_on")]
    expires_on_unix: Option<i64>,
}

/// Token source that shells out to `az account get-access-token`.
pub struct AzureCliTokenSource {
    program: String,
    scope: String,
}

impl AzureCliTokenSource {
    pub fn new() -> Self {
        Self {
            program: "az".to_string(),
            scope: POSTGRES_TOKEN_SCOPE.to_string(),
        }
    }
}

impl Default for AzureCliTokenSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenSource for AzureCliTokenSource {
    async fn fetch(&self) -> DbResult<AccessToken> {
        let mut command = Command::new(&self.program);
        command
            .args([
                "account",
                "get-access-token",
                "--scope",
                &self.scope,
                "--output",
                "json",
            ])
            .kill_on_drop(true);

        let output = tokio::time::timeout(CLI_TIMEOUT, command.output())
            .await
            .map_err(|_| DbError::timeout("az account get-access-token", CLI_TIMEOUT.as_secs()))?
            .map_err(|e| {
                DbError::connection(
                    format!("Failed to run Azure CLI: {}", e),
                    "Install the Azure CLI and run 'az login', or configure a service principal",
                )
            })?;

        if !output.status.success() {
            return Err(DbError::connection(
                format!(
                    "Azure CLI token request failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
                "Run 'az login' and make sure the account has access to the server",
            ));
        }

        parse_cli_token(&String::from_utf8_lossy(&output.stdout))
    }

    fn name(&self) -> &'static str {
        "azure_cli"
    }
}

/// Parse the JSON printed by `az account get-access-token`.
pub fn parse_cli_token(stdout: &str) -> DbResult<AccessToken> {
    let parsed: CliToken = serde_json::from_str(stdout).map_err(|e| {
        DbError::connection(
            format!("Unexpected Azure CLI output: {}", e),
            "Upgrade the Azure CLI",
        )
    })?;

    let expires_at = match (parsed.expires_on_unix, parsed.expires_on.as_deref()) {
        (Some(unix), _) => Utc.timestamp_opt(unix, 0).single(),
        (None, Some(local)) => parse_local_timestamp(local),
        (None, None) => None,
    }
    .ok_or_else(|| {
        DbError::connection(
            "Azure CLI token has no usable expiry",
            "Upgrade the Azure CLI",
        )
    })?;

    Ok(AccessToken::new(parsed.access_token, expires_at))
}

fn parse_local_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f").ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}
